//! Multi-retriever fusion engine.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::future::{join_all, BoxFuture};
use tracing::{debug, info, warn};

use rag_core::{
    FanOutResults, FusionMode, QueryTask, RagError, Result, RetrievalConfig, Retriever,
    RetrieverWeights, ScoredNode,
};

use crate::expand::QueryExpander;
use crate::fusion::fuse;

/// Fans one query (plus its expansions) out to several retrievers and fuses
/// the per-source result lists into a single ranking.
pub struct FusionRetriever {
    /// Name reported when this retriever is itself nested.
    name: String,

    /// Single-source retrievers, addressed by index.
    retrievers: Vec<Arc<dyn Retriever>>,

    /// Normalized per-retriever weights.
    weights: RetrieverWeights,

    /// Query expansion, used when `num_queries > 1`.
    expander: Option<QueryExpander>,

    /// Nested retrievable objects referenced by `ScoredNode::index_ref`.
    objects: HashMap<String, Arc<dyn Retriever>>,

    config: RetrievalConfig,
}

impl FusionRetriever {
    /// Create a fusion retriever over `retrievers`.
    ///
    /// Fails when no retriever is given or the configured weights do not
    /// match the retrievers.
    pub fn new(retrievers: Vec<Arc<dyn Retriever>>, config: RetrievalConfig) -> Result<Self> {
        if retrievers.is_empty() {
            return Err(RagError::config(
                "Fusion retriever needs at least one retriever",
            ));
        }

        let weights =
            RetrieverWeights::new(config.retriever_weights.as_deref(), retrievers.len())?;

        Ok(Self {
            name: "fusion".to_string(),
            retrievers,
            weights,
            expander: None,
            objects: HashMap::new(),
            config,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Attach a query expander. A configured `query_gen_prompt` overrides its template.
    pub fn with_expander(mut self, expander: QueryExpander) -> Self {
        let expander = match &self.config.query_gen_prompt {
            Some(template) => expander.with_template(template.clone()),
            None => expander,
        };
        self.expander = Some(expander);
        self
    }

    /// Register a nested retrievable object under `id`.
    pub fn with_object(mut self, id: impl Into<String>, object: Arc<dyn Retriever>) -> Self {
        self.objects.insert(id.into(), object);
        self
    }

    pub fn weights(&self) -> &RetrieverWeights {
        &self.weights
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Retrieve with the configured fusion mode and top-k.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<ScoredNode>> {
        self.retrieve_with(query, self.config.mode, self.config.similarity_top_k)
            .await
    }

    /// Retrieve with an explicit fusion mode and top-k.
    pub async fn retrieve_with(
        &self,
        query: &str,
        mode: FusionMode,
        top_k: usize,
    ) -> Result<Vec<ScoredNode>> {
        let start = Instant::now();

        info!("Fusion retrieval ({}) for: {:?}", mode, query);

        let queries = self.queries(query).await?;

        let results = if self.config.concurrent {
            self.run_concurrent(&queries).await?
        } else {
            self.run_sequential(&queries).await?
        };

        debug!(
            "{} queries x {} retrievers returned {} nodes",
            queries.len(),
            self.retrievers.len(),
            results.total_nodes()
        );

        let mut fused = fuse(mode, &results, &self.weights, self.config.rrf_k as f32);
        if mode.truncates() {
            fused.truncate(top_k);
        }

        let mut stack = Vec::new();
        let nodes = self.expand_nested(query, fused, &mut stack).await?;

        info!(
            "Fusion retrieval completed in {}ms, returned {} nodes",
            start.elapsed().as_millis(),
            nodes.len()
        );

        Ok(nodes)
    }

    /// The original query followed by its expansions.
    async fn queries(&self, query: &str) -> Result<Vec<String>> {
        let mut queries = vec![query.to_string()];
        if self.config.num_queries > 1 {
            if let Some(expander) = &self.expander {
                queries.extend(expander.expand(query, self.config.num_queries).await?);
            }
        }
        Ok(queries)
    }

    fn tasks(&self, queries: &[String]) -> Vec<QueryTask> {
        queries
            .iter()
            .flat_map(|query| {
                (0..self.retrievers.len()).map(move |i| QueryTask::new(query.clone(), i))
            })
            .collect()
    }

    /// Issue every (query, retriever) call at once and wait for all of them.
    pub async fn run_concurrent(&self, queries: &[String]) -> Result<FanOutResults> {
        let tasks = self.tasks(queries);

        let outcomes = join_all(tasks.iter().map(|task| {
            let retriever = &self.retrievers[task.retriever_index];
            async move {
                retriever
                    .retrieve(&task.query)
                    .await
                    .map_err(|e| upstream(retriever.name(), e))
            }
        }))
        .await;

        let mut results = FanOutResults::new();
        for (task, outcome) in tasks.into_iter().zip(outcomes) {
            results.insert(task, outcome?);
        }
        Ok(results)
    }

    /// Issue the (query, retriever) calls one after another.
    pub async fn run_sequential(&self, queries: &[String]) -> Result<FanOutResults> {
        let mut results = FanOutResults::new();
        for task in self.tasks(queries) {
            let retriever = &self.retrievers[task.retriever_index];
            let nodes = retriever
                .retrieve(&task.query)
                .await
                .map_err(|e| upstream(retriever.name(), e))?;
            results.insert(task, nodes);
        }
        Ok(results)
    }

    /// Replace nodes referencing nested objects with those objects' results.
    ///
    /// `stack` holds the object ids currently being expanded; meeting one of
    /// them again is a cycle.
    fn expand_nested<'a>(
        &'a self,
        query: &'a str,
        nodes: Vec<ScoredNode>,
        stack: &'a mut Vec<String>,
    ) -> BoxFuture<'a, Result<Vec<ScoredNode>>> {
        Box::pin(async move {
            let mut expanded = Vec::with_capacity(nodes.len());

            for node in nodes {
                let Some(object_id) = node.index_ref.clone() else {
                    expanded.push(node);
                    continue;
                };

                let Some(object) = self.objects.get(&object_id) else {
                    warn!("No nested object registered for {:?}", object_id);
                    expanded.push(node);
                    continue;
                };

                if stack.contains(&object_id) {
                    return Err(RagError::config(format!(
                        "Recursive retrieval cycle: {} -> {}",
                        stack.join(" -> "),
                        object_id
                    )));
                }

                debug!("Retrieval entering {}: {}", object_id, object.name());

                let score = node.score.unwrap_or(1.0);
                let nested: Vec<ScoredNode> = object
                    .retrieve(query)
                    .await
                    .map_err(|e| upstream(object.name(), e))?
                    .into_iter()
                    .map(|mut n| {
                        if n.score.is_none() {
                            n.score = Some(score);
                        }
                        n
                    })
                    .collect();

                stack.push(object_id);
                let nested = self.expand_nested(query, nested, stack).await?;
                stack.pop();

                expanded.extend(nested);
            }

            Ok(expanded)
        })
    }
}

#[async_trait]
impl Retriever for FusionRetriever {
    fn name(&self) -> &str {
        &self.name
    }

    async fn retrieve(&self, query: &str) -> Result<Vec<ScoredNode>> {
        FusionRetriever::retrieve(self, query).await
    }

    fn needs_image(&self) -> bool {
        self.config.need_image
    }
}

/// Attribute a failure to the retriever that raised it.
fn upstream(retriever: &str, err: RagError) -> RagError {
    match err {
        RagError::UpstreamRetrieval { .. } | RagError::Config { .. } => err,
        other => RagError::upstream_retrieval(retriever, other.to_string()),
    }
}

/// One-shot fusion over `retrievers` without query expansion.
pub async fn fusion_retrieve(
    query: &str,
    mode: FusionMode,
    top_k: usize,
    retrievers: Vec<Arc<dyn Retriever>>,
    weights: Option<&[f32]>,
) -> Result<Vec<ScoredNode>> {
    let config = RetrievalConfig {
        mode,
        similarity_top_k: top_k,
        num_queries: 1,
        retriever_weights: weights.map(<[f32]>::to_vec),
        ..Default::default()
    };
    FusionRetriever::new(retrievers, config)?.retrieve(query).await
}
