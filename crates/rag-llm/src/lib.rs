//! rag-llm - In-process LLM clients
//!
//! Deterministic implementations of the [`TextLlm`] and [`MultiModalLlm`]
//! traits for fixtures, demos, and tests.
//!
//! - [`ScriptedLlm`]: answers with a fixed response and records every call.
//! - [`EchoLlm`]: answers with the prompt it received, handy for inspecting
//!   prompt assembly.

mod scripted;

pub use scripted::{EchoLlm, RecordedCall, ScriptedLlm};

// Re-export the traits for convenience
pub use rag_core::{MultiModalLlm, TextLlm, TextStream};
