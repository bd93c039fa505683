//! JSON fixtures describing retrievers and scripted expansions.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use rag_core::{RagError, Result, RetrievalConfig, Retriever};
use rag_llm::ScriptedLlm;
use rag_query::{FusionRetriever, QueryExpander, StaticRetriever};

/// One retriever entry; `weight` is optional and defaults to 1.0 when any
/// other retriever sets one.
#[derive(Debug, Deserialize)]
pub struct FixtureRetriever {
    #[serde(flatten)]
    pub retriever: StaticRetriever,

    #[serde(default)]
    pub weight: Option<f32>,
}

#[derive(Debug, Deserialize)]
pub struct Fixture {
    pub retrievers: Vec<FixtureRetriever>,

    /// Nested retrievable objects keyed by the id nodes reference.
    #[serde(default)]
    pub objects: HashMap<String, StaticRetriever>,

    /// Queries the expansion LLM answers with, in order.
    #[serde(default)]
    pub expansions: Vec<String>,
}

impl Fixture {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let fixture: Self = serde_json::from_str(content)?;
        fixture.validate()?;
        Ok(fixture)
    }

    fn validate(&self) -> Result<()> {
        if self.retrievers.is_empty() {
            return Err(RagError::config("Fixture defines no retrievers"));
        }
        self.retrievers
            .iter()
            .map(|r| &r.retriever)
            .chain(self.objects.values())
            .try_for_each(StaticRetriever::validate)
    }

    /// Weights for the retrievers, or `None` when no entry sets one.
    pub fn weights(&self) -> Option<Vec<f32>> {
        if self.retrievers.iter().all(|r| r.weight.is_none()) {
            return None;
        }
        Some(
            self.retrievers
                .iter()
                .map(|r| r.weight.unwrap_or(1.0))
                .collect(),
        )
    }

    /// Build the fusion retriever. Fixture weights override configured ones.
    pub fn into_retriever(self, mut config: RetrievalConfig) -> Result<FusionRetriever> {
        if let Some(weights) = self.weights() {
            config.retriever_weights = Some(weights);
        }

        let retrievers: Vec<Arc<dyn Retriever>> = self
            .retrievers
            .into_iter()
            .map(|r| Arc::new(r.retriever) as Arc<dyn Retriever>)
            .collect();

        debug!(
            "Fixture: {} retrievers, {} objects, {} expansions",
            retrievers.len(),
            self.objects.len(),
            self.expansions.len()
        );

        let mut fusion = FusionRetriever::new(retrievers, config)?;

        if !self.expansions.is_empty() {
            let llm = ScriptedLlm::new("scripted-expander", self.expansions.join("\n"));
            fusion = fusion.with_expander(QueryExpander::new(Arc::new(llm)));
        }

        for (id, object) in self.objects {
            fusion = fusion.with_object(id, Arc::new(object));
        }

        Ok(fusion)
    }
}
