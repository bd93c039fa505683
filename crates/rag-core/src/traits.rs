//! Core traits defining the interfaces to external collaborators.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::{RagError, Result};
use crate::types::{ImageDocument, ScoredNode};

/// A lazy, single-pass stream of answer deltas.
pub type TextStream = BoxStream<'static, Result<String>>;

/// A single retrieval source (vector index, keyword index, image index, ...).
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Name used in logs and error messages.
    fn name(&self) -> &str;

    /// Retrieve scored nodes for a text query.
    async fn retrieve(&self, query: &str) -> Result<Vec<ScoredNode>>;

    /// Retrieve nodes similar to an image.
    async fn retrieve_by_image(&self, _image_url: &str) -> Result<Vec<ScoredNode>> {
        Err(RagError::config(format!(
            "Retriever '{}' does not support image queries",
            self.name()
        )))
    }

    /// Whether answers built from this retriever's results should include images.
    fn needs_image(&self) -> bool {
        false
    }
}

/// Text-only language model.
#[async_trait]
pub trait TextLlm: Send + Sync {
    /// Model name used in logs and error messages.
    fn model_name(&self) -> &str;

    /// Single-shot completion.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Incremental completion.
    async fn stream_complete(&self, prompt: &str) -> Result<TextStream>;
}

/// Language model that also accepts images.
#[async_trait]
pub trait MultiModalLlm: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, prompt: &str, images: &[ImageDocument]) -> Result<String>;

    async fn stream_complete(&self, prompt: &str, images: &[ImageDocument]) -> Result<TextStream>;
}

/// Post-retrieval transformation of text nodes (re-ranking, filtering).
#[async_trait]
pub trait NodePostprocessor: Send + Sync {
    async fn postprocess(&self, query: &str, nodes: Vec<ScoredNode>) -> Result<Vec<ScoredNode>>;
}
