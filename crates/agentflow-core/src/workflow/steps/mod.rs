//! Built-in step types.

pub mod dummy;
pub mod llm;
