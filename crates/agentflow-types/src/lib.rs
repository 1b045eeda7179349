//! Shared domain types for Agentflow.
//!
//! This crate contains the core domain types used across the Agentflow
//! workflow engine: the typed parameter model, workflow result records,
//! structured validation issues, and LLM request/response types.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod llm;
pub mod workflow;
