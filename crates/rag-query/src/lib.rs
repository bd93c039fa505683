//! rag-query - Query expansion and multi-retriever fusion
//!
//! This crate fans a query (and LLM-generated variants of it) out to several
//! retrievers and merges the per-source result lists into one ranking.
//!
//! # Features
//!
//! - LLM query expansion
//! - Concurrent or sequential retrieval fan-out
//! - Reciprocal rank, relative score, distance-based score, and simple fusion
//! - Recursive expansion of nodes that reference nested retrievers
//!
//! # Example
//!
//! ```rust,ignore
//! use rag_query::{FusionRetriever, QueryExpander};
//! use rag_core::RetrievalConfig;
//!
//! let retriever = FusionRetriever::new(vec![vector, keyword], RetrievalConfig::default())?
//!     .with_expander(QueryExpander::new(llm));
//! let nodes = retriever.retrieve("error handling").await?;
//! ```

mod engine;
mod expand;
mod fusion;
mod static_retriever;

pub use engine::{fusion_retrieve, FusionRetriever};
pub use expand::{QueryExpander, QUERY_GEN_PROMPT};
pub use fusion::{
    detailed_reciprocal_rank_fusion, distance_based_score_fusion, distance_bounds, fuse,
    min_max_bounds, no_fusion, normalize, reciprocal_rank_fusion, relative_score_fusion,
    simple_fusion, RRF_K,
};
pub use static_retriever::StaticRetriever;

// Re-export for convenience
pub use rag_core::{FusionMode, ScoredNode};
