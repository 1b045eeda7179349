//! Workflow engine logic for Agentflow.
//!
//! This crate owns the workflow model: parsing and validating YAML
//! definitions, the step capability contract, the step registry, and
//! the sequential run loop. It also defines the LLM provider "port"
//! that `agentflow-infra` implements. It depends only on
//! `agentflow-types` -- never on any network or IO crate.

pub mod llm;
pub mod workflow;
