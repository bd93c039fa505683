//! Error types for the RAG system.

use thiserror::Error;

/// Result type alias using RagError.
pub type Result<T> = std::result::Result<T, RagError>;

/// Errors that can occur in the RAG system.
#[derive(Error, Debug)]
pub enum RagError {
    /// Invalid or incomplete configuration (unknown fusion mode, missing client, ...).
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A single-source retriever call failed.
    #[error("Retriever '{retriever}' failed: {message}")]
    UpstreamRetrieval { retriever: String, message: String },

    /// An LLM or multi-modal LLM call failed.
    #[error("Inference with '{model}' failed: {message}")]
    UpstreamInference { model: String, message: String },

    /// Invalid argument provided.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// A node violates the text/image content invariant.
    #[error("Invalid node {id}: {reason}")]
    InvalidNode { id: String, reason: String },

    /// A score was required but never assigned.
    #[error("Score not set for node {id}")]
    ScoreNotSet { id: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error (unexpected).
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl RagError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an upstream retrieval error.
    pub fn upstream_retrieval(retriever: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UpstreamRetrieval {
            retriever: retriever.into(),
            message: message.into(),
        }
    }

    /// Create an upstream inference error.
    pub fn upstream_inference(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UpstreamInference {
            model: model.into(),
            message: message.into(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create an invalid node error.
    pub fn invalid_node(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidNode {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable error code for callers mapping failures onto their own surface.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config { .. } => "CONFIG_ERROR",
            Self::UpstreamRetrieval { .. } => "UPSTREAM_RETRIEVAL_ERROR",
            Self::UpstreamInference { .. } => "UPSTREAM_INFERENCE_ERROR",
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::InvalidNode { .. } => "INVALID_NODE",
            Self::ScoreNotSet { .. } => "SCORE_NOT_SET",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}
