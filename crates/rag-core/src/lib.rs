//! rag-core - Core types and traits for the fusion RAG system
//!
//! This crate provides the node model, the collaborator traits (retrievers,
//! LLMs, postprocessors), error handling, and configuration shared by the
//! rest of the rag-fusion workspace.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::{RagError, Result};
pub use traits::*;
pub use types::*;
