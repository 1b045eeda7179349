//! Infrastructure implementations for Agentflow.
//!
//! Implements the provider "ports" defined in `agentflow-core` against
//! real backends. Currently: an OpenAI-compatible LLM provider.

pub mod llm;
