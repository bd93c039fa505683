//! LLM-driven query expansion.

use std::sync::Arc;

use tracing::debug;

use rag_core::{Result, TextLlm};

/// Default prompt asking the LLM for one query per line.
pub const QUERY_GEN_PROMPT: &str = "You are a helpful assistant that generates multiple search queries based on a \
single input query. Generate {num_queries} search queries, one on each line, \
related to the following input query:\n\
Query: {query}\n\
Queries:\n";

/// Generates paraphrased or sub-queries for one input query.
pub struct QueryExpander {
    llm: Arc<dyn TextLlm>,
    template: String,
}

impl QueryExpander {
    /// Create an expander using the default prompt.
    pub fn new(llm: Arc<dyn TextLlm>) -> Self {
        Self {
            llm,
            template: QUERY_GEN_PROMPT.to_string(),
        }
    }

    /// Replace the prompt. `{num_queries}` and `{query}` are substituted.
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    /// Render the prompt asking for `count` additional queries.
    pub fn prompt(&self, query: &str, count: usize) -> String {
        self.template
            .replace("{num_queries}", &count.to_string())
            .replace("{query}", query)
    }

    /// Generate up to `num_queries - 1` additional queries.
    ///
    /// Returns fewer queries when the LLM produces fewer usable lines, and
    /// none without calling the LLM when `num_queries <= 1`. LLM failures
    /// are returned as-is.
    pub async fn expand(&self, query: &str, num_queries: usize) -> Result<Vec<String>> {
        if num_queries <= 1 {
            return Ok(Vec::new());
        }
        let wanted = num_queries - 1;

        let response = self.llm.complete(&self.prompt(query, wanted)).await?;

        let queries: Vec<String> = response
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .take(wanted)
            .map(String::from)
            .collect();

        debug!("Generated {} queries: {:?}", queries.len(), queries);

        Ok(queries)
    }
}
