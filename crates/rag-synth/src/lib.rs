//! rag-synth - Multi-modal answer synthesis
//!
//! Turns fused retrieval results into a prompt and asks a text or
//! multi-modal LLM for the answer, either in one piece or as a stream.
//!
//! # Features
//!
//! - Image/text partitioning with a cap on attached images
//! - Promotion of images referenced from text metadata
//! - Text-only postprocessing hooks
//! - Batch and streaming answers
//!
//! # Example
//!
//! ```rust,ignore
//! use rag_synth::{MultiModalSynthesizer, QueryEngine};
//!
//! let synthesizer = MultiModalSynthesizer::new()
//!     .with_llm(llm)
//!     .with_multi_modal_llm(vision_llm);
//! let engine = QueryEngine::new(retriever, synthesizer);
//! let answer = engine.query("how does borrowing work?", false).await?;
//! ```

mod engine;
mod partition;
mod prompt;
mod synthesizer;

pub use engine::QueryEngine;
pub use partition::{
    partition, partition_with, PartitionConfig, Partitioned, IMAGE_MAX_PIECES, TEXT_IMAGE_WEIGHT,
};
pub use prompt::{
    text_context, with_image_section, PromptTemplate, DEFAULT_TEXT_QA_TEMPLATE,
    IMAGE_SECTION_LABEL,
};
pub use synthesizer::{synthesize, Answer, AnswerBody, MultiModalSynthesizer};
