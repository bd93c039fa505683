//! Configuration types for the RAG system.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::FusionMode;

/// Main configuration for the RAG system.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RagConfig {
    /// Retrieval and fusion configuration.
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Answer synthesis configuration.
    #[serde(default)]
    pub synthesis: SynthesisConfig,
}

/// Retrieval and fusion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Fusion strategy.
    #[serde(default = "default_mode")]
    pub mode: FusionMode,

    /// Number of fused results kept.
    #[serde(default = "default_top_k")]
    pub similarity_top_k: usize,

    /// Total queries issued per call, original included (1 disables expansion).
    #[serde(default = "default_num_queries")]
    pub num_queries: usize,

    /// RRF constant k.
    #[serde(default = "default_rrf_k")]
    pub rrf_k: u32,

    /// Issue the retrieval fan-out concurrently.
    #[serde(default = "default_true")]
    pub concurrent: bool,

    /// Per-retriever weights (relative and distance-based fusion).
    #[serde(default)]
    pub retriever_weights: Option<Vec<f32>>,

    /// Override for the query generation prompt.
    #[serde(default)]
    pub query_gen_prompt: Option<String>,

    /// Answers built from this retrieval include images.
    #[serde(default)]
    pub need_image: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            mode: FusionMode::ReciprocalRank,
            similarity_top_k: 10,
            num_queries: 4,
            rrf_k: 60,
            concurrent: true,
            retriever_weights: None,
            query_gen_prompt: None,
            need_image: false,
        }
    }
}

/// Answer synthesis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Maximum images handed to the multi-modal LLM.
    #[serde(default = "default_image_max_pieces")]
    pub image_max_pieces: usize,

    /// Score discount for images referenced only from text metadata.
    #[serde(default = "default_text_image_weight")]
    pub text_image_weight: f32,

    /// Stream answers by default.
    #[serde(default)]
    pub streaming: bool,

    /// Override for the text QA prompt.
    #[serde(default)]
    pub text_qa_template: Option<String>,

    /// Override for the image QA prompt.
    #[serde(default)]
    pub image_qa_template: Option<String>,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            image_max_pieces: 5,
            text_image_weight: 0.5,
            streaming: false,
            text_qa_template: None,
            image_qa_template: None,
        }
    }
}

// Default value functions

fn default_true() -> bool {
    true
}

fn default_mode() -> FusionMode {
    FusionMode::ReciprocalRank
}

fn default_top_k() -> usize {
    10
}

fn default_num_queries() -> usize {
    4
}

fn default_rrf_k() -> u32 {
    60
}

fn default_image_max_pieces() -> usize {
    5
}

fn default_text_image_weight() -> f32 {
    0.5
}

impl RagConfig {
    /// Load configuration from file.
    pub fn load(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            crate::error::RagError::config(format!("Failed to parse config: {}", e))
        })?;
        Ok(config)
    }

    /// Load configuration from default paths.
    pub fn load_default() -> crate::error::Result<Self> {
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("rag-fusion").join("config.toml");
            if user_config.exists() {
                return Self::load(&user_config);
            }
        }

        let local_config = PathBuf::from("rag-fusion.toml");
        if local_config.exists() {
            return Self::load(&local_config);
        }

        Ok(Self::default())
    }
}
