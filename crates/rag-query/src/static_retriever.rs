//! Fixed-result retriever for fixtures, demos, and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use rag_core::{Result, Retriever, ScoredNode};

/// A retriever answering from precomputed result lists.
///
/// Results registered for an exact query take precedence over the default
/// list. Nodes without a retriever tag are tagged with the retriever name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticRetriever {
    pub name: String,

    /// Results for any query without a dedicated entry.
    #[serde(default)]
    pub results: Vec<ScoredNode>,

    /// Results keyed by exact query string.
    #[serde(default)]
    pub by_query: HashMap<String, Vec<ScoredNode>>,

    /// Results for image-to-image queries.
    #[serde(default)]
    pub image_results: Option<Vec<ScoredNode>>,

    #[serde(default)]
    pub need_image: bool,
}

impl StaticRetriever {
    /// Create a retriever returning `results` for every query.
    pub fn new(name: impl Into<String>, results: Vec<ScoredNode>) -> Self {
        Self {
            name: name.into(),
            results,
            ..Default::default()
        }
    }

    /// Register results for one query.
    pub fn with_query(mut self, query: impl Into<String>, results: Vec<ScoredNode>) -> Self {
        self.by_query.insert(query.into(), results);
        self
    }

    /// Register results for image queries.
    pub fn with_image_results(mut self, results: Vec<ScoredNode>) -> Self {
        self.image_results = Some(results);
        self
    }

    pub fn with_need_image(mut self, need_image: bool) -> Self {
        self.need_image = need_image;
        self
    }

    /// Check every stored node against the content invariant.
    pub fn validate(&self) -> Result<()> {
        self.results
            .iter()
            .chain(self.by_query.values().flatten())
            .chain(self.image_results.iter().flatten())
            .try_for_each(ScoredNode::validate)
    }

    fn tagged(&self, nodes: &[ScoredNode]) -> Vec<ScoredNode> {
        nodes
            .iter()
            .cloned()
            .map(|mut node| {
                if node.retriever_tag.is_none() {
                    node.retriever_tag = Some(self.name.clone());
                }
                node
            })
            .collect()
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    fn name(&self) -> &str {
        &self.name
    }

    async fn retrieve(&self, query: &str) -> Result<Vec<ScoredNode>> {
        let nodes = self.by_query.get(query).unwrap_or(&self.results);
        Ok(self.tagged(nodes))
    }

    async fn retrieve_by_image(&self, image_url: &str) -> Result<Vec<ScoredNode>> {
        match &self.image_results {
            Some(nodes) => Ok(self.tagged(nodes)),
            None => Err(rag_core::RagError::config(format!(
                "Retriever '{}' has no image index (query image: {})",
                self.name, image_url
            ))),
        }
    }

    fn needs_image(&self) -> bool {
        self.need_image
    }
}
