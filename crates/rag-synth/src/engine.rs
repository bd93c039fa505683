//! Retrieval plus synthesis in one call.

use std::sync::Arc;

use tracing::info;

use rag_core::{RagError, Result, Retriever, ScoredNode};

use crate::partition::partition_with;
use crate::synthesizer::{Answer, MultiModalSynthesizer};

/// Query engine pairing a retriever with a synthesizer.
pub struct QueryEngine {
    retriever: Arc<dyn Retriever>,
    synthesizer: MultiModalSynthesizer,
}

impl QueryEngine {
    pub fn new(retriever: Arc<dyn Retriever>, synthesizer: MultiModalSynthesizer) -> Self {
        Self {
            retriever,
            synthesizer,
        }
    }

    pub fn retriever(&self) -> &Arc<dyn Retriever> {
        &self.retriever
    }

    pub fn synthesizer(&self) -> &MultiModalSynthesizer {
        &self.synthesizer
    }

    /// Retrieve for `query` and synthesize an answer.
    pub async fn query(&self, query: &str, streaming: bool) -> Result<Answer> {
        check_query(query)?;

        let nodes = self.retriever.retrieve(query).await?;
        let needs_image = self.retriever.needs_image();

        info!(
            "Query via {} returned {} nodes (needs_image={})",
            self.retriever.name(),
            nodes.len(),
            needs_image
        );

        self.synthesizer
            .synthesize(query, nodes, streaming, needs_image)
            .await
    }

    /// Retrieve without synthesizing.
    ///
    /// For image-aware retrievers the result is the capped image nodes followed
    /// by the postprocessed text nodes.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<ScoredNode>> {
        check_query(query)?;

        let nodes = self.retriever.retrieve(query).await?;
        if !self.retriever.needs_image() {
            return Ok(nodes);
        }

        Ok(self.synthesizer.prepare(query, &nodes).await?.into_nodes())
    }

    /// Retrieve images similar to `image_url` and answer `prompt` over them.
    pub async fn image_query(&self, image_url: &str, prompt: &str) -> Result<Answer> {
        if image_url.trim().is_empty() {
            return Err(RagError::invalid_argument("Image URL must not be empty"));
        }
        check_query(prompt)?;

        let nodes = self.retriever.retrieve_by_image(image_url).await?;
        let image_nodes = partition_with(&nodes, self.synthesizer.partition_config()).image_nodes;

        info!(
            "Image query via {} kept {} of {} nodes",
            self.retriever.name(),
            image_nodes.len(),
            nodes.len()
        );

        self.synthesizer.synthesize_images(prompt, image_nodes).await
    }
}

fn check_query(query: &str) -> Result<()> {
    if query.trim().is_empty() {
        return Err(RagError::invalid_argument("Query must not be empty"));
    }
    Ok(())
}
