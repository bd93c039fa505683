//! Core domain types for the RAG system.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use ulid::Ulid;

use crate::error::{RagError, Result};

/// Metadata key under which text nodes list their associated images.
pub const IMAGE_URL_KEY: &str = "image_url";

/// Metadata key carrying the originating file name.
pub const FILE_NAME_KEY: &str = "file_name";

/// Kind of content carried by a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Text,
    Image,
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Image => write!(f, "image"),
        }
    }
}

/// Contribution of one source list to a reciprocal-rank fused score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    /// Query string of the source list.
    pub query: String,

    /// Index of the retriever that produced the list.
    pub retriever_index: usize,

    /// Zero-based rank of the node within the list.
    pub rank: usize,

    /// Reciprocal-rank score contributed by this list.
    pub score: f32,
}

/// A unit of retrieved content (text passage or image) with a relevance score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredNode {
    /// Node identifier.
    pub id: String,

    /// Text or image.
    pub kind: ContentKind,

    /// Passage text, present for text nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Image location, present for image nodes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    /// Arbitrary metadata. Ordered so prompt rendering is stable.
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,

    /// Relevance score, unset until a retriever or fusion strategy assigns one.
    #[serde(default)]
    pub score: Option<f32>,

    /// Tag of the retriever that produced the node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retriever_tag: Option<String>,

    /// Id of a nested retrievable object this node stands in for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_ref: Option<String>,

    /// Per-source breakdown, filled by detailed reciprocal-rank fusion.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contributions: Vec<Contribution>,
}

impl ScoredNode {
    /// Create a text node with a fresh id.
    pub fn text(text: impl Into<String>) -> Self {
        Self::text_with_id(Ulid::new().to_string(), text)
    }

    /// Create a text node with the given id.
    pub fn text_with_id(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: ContentKind::Text,
            text: Some(text.into()),
            image_url: None,
            metadata: BTreeMap::new(),
            score: None,
            retriever_tag: None,
            index_ref: None,
            contributions: Vec::new(),
        }
    }

    /// Create an image node with a fresh id.
    pub fn image(image_url: impl Into<String>) -> Self {
        Self::image_with_id(Ulid::new().to_string(), image_url)
    }

    /// Create an image node with the given id.
    pub fn image_with_id(id: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: ContentKind::Image,
            text: None,
            image_url: Some(image_url.into()),
            metadata: BTreeMap::new(),
            score: None,
            retriever_tag: None,
            index_ref: None,
            contributions: Vec::new(),
        }
    }

    /// Create a text node that stands in for a nested retrievable object.
    pub fn index(text: impl Into<String>, index_ref: impl Into<String>) -> Self {
        Self {
            index_ref: Some(index_ref.into()),
            ..Self::text(text)
        }
    }

    /// Set the score.
    pub fn with_score(mut self, score: f32) -> Self {
        self.score = Some(score);
        self
    }

    /// Set the retriever tag.
    pub fn with_retriever_tag(mut self, tag: impl Into<String>) -> Self {
        self.retriever_tag = Some(tag.into());
        self
    }

    /// Insert a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Check the text/image content invariant.
    pub fn validate(&self) -> Result<()> {
        match self.kind {
            ContentKind::Text if self.text.is_none() => {
                Err(RagError::invalid_node(&self.id, "text node without text"))
            }
            ContentKind::Image if self.image_url.is_none() => {
                Err(RagError::invalid_node(&self.id, "image node without image_url"))
            }
            _ => Ok(()),
        }
    }

    pub fn is_image(&self) -> bool {
        self.kind == ContentKind::Image
    }

    /// Score for ranking purposes; unset and NaN scores rank as 0.0.
    pub fn score_or_zero(&self) -> f32 {
        match self.score {
            Some(score) if !score.is_nan() => score,
            _ => 0.0,
        }
    }

    /// Total order placing higher ranking scores first.
    pub fn cmp_by_score_desc(&self, other: &Self) -> std::cmp::Ordering {
        other.score_or_zero().total_cmp(&self.score_or_zero())
    }

    /// Score, failing if it was never assigned.
    pub fn try_score(&self) -> Result<f32> {
        self.score.ok_or_else(|| RagError::ScoreNotSet {
            id: self.id.clone(),
        })
    }

    /// Content used for de-duplication: the text, or the image url for images.
    pub fn content(&self) -> &str {
        match self.kind {
            ContentKind::Text => self.text.as_deref().unwrap_or_default(),
            ContentKind::Image => self.image_url.as_deref().unwrap_or_default(),
        }
    }

    /// Content as presented to an LLM: scalar metadata lines, then the content.
    pub fn content_with_metadata(&self) -> String {
        let header: Vec<String> = self
            .metadata
            .iter()
            .filter(|(key, _)| key.as_str() != IMAGE_URL_KEY)
            .filter_map(|(key, value)| match value {
                serde_json::Value::String(s) => Some(format!("{}: {}", key, s)),
                serde_json::Value::Number(n) => Some(format!("{}: {}", key, n)),
                serde_json::Value::Bool(b) => Some(format!("{}: {}", key, b)),
                _ => None,
            })
            .collect();

        if header.is_empty() {
            self.content().to_string()
        } else {
            format!("{}\n\n{}", header.join("\n"), self.content())
        }
    }

    /// Image references listed in this node's metadata.
    pub fn image_refs(&self) -> Vec<String> {
        match self.metadata.get(IMAGE_URL_KEY) {
            Some(serde_json::Value::String(url)) if !url.is_empty() => vec![url.clone()],
            Some(serde_json::Value::Array(urls)) => urls
                .iter()
                .filter_map(|v| v.as_str())
                .filter(|url| !url.is_empty())
                .map(String::from)
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// An image handed inline to a multi-modal LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDocument {
    pub image_url: String,

    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl ImageDocument {
    /// Build from an image node; `None` for text nodes.
    pub fn from_node(node: &ScoredNode) -> Option<Self> {
        if !node.is_image() {
            return None;
        }
        node.image_url.as_ref().map(|url| Self {
            image_url: url.clone(),
            metadata: node.metadata.clone(),
        })
    }
}

/// Identifies one retrieval call within a fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryTask {
    pub query: String,
    pub retriever_index: usize,
}

impl QueryTask {
    pub fn new(query: impl Into<String>, retriever_index: usize) -> Self {
        Self {
            query: query.into(),
            retriever_index,
        }
    }
}

/// Per-(query, retriever) result lists, kept in task issuance order.
#[derive(Debug, Clone, Default)]
pub struct FanOutResults {
    entries: Vec<(QueryTask, Vec<ScoredNode>)>,
}

impl FanOutResults {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a result list. An existing task keeps its position and gets the new list.
    pub fn insert(&mut self, task: QueryTask, nodes: Vec<ScoredNode>) {
        match self.entries.iter_mut().find(|(t, _)| *t == task) {
            Some((_, existing)) => *existing = nodes,
            None => self.entries.push((task, nodes)),
        }
    }

    pub fn get(&self, task: &QueryTask) -> Option<&[ScoredNode]> {
        self.entries
            .iter()
            .find(|(t, _)| t == task)
            .map(|(_, nodes)| nodes.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&QueryTask, &[ScoredNode])> {
        self.entries.iter().map(|(t, nodes)| (t, nodes.as_slice()))
    }

    /// Number of result lists.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of distinct queries across all tasks.
    pub fn num_queries(&self) -> usize {
        let mut seen: Vec<&str> = Vec::new();
        for (task, _) in &self.entries {
            if !seen.contains(&task.query.as_str()) {
                seen.push(&task.query);
            }
        }
        seen.len()
    }

    /// Total number of nodes across all lists.
    pub fn total_nodes(&self) -> usize {
        self.entries.iter().map(|(_, nodes)| nodes.len()).sum()
    }
}

impl FromIterator<(QueryTask, Vec<ScoredNode>)> for FanOutResults {
    fn from_iter<I: IntoIterator<Item = (QueryTask, Vec<ScoredNode>)>>(iter: I) -> Self {
        let mut results = Self::new();
        for (task, nodes) in iter {
            results.insert(task, nodes);
        }
        results
    }
}

/// Strategy used to merge per-source result lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionMode {
    #[serde(alias = "reciprocal_rerank")]
    ReciprocalRank,
    #[serde(alias = "detail_reciprocal_rank", alias = "detail_reciprocal_rerank")]
    DetailedReciprocalRank,
    RelativeScore,
    #[serde(alias = "dist_based_score")]
    DistanceBasedScore,
    Simple,
    NoFusion,
}

impl FusionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReciprocalRank => "reciprocal_rank",
            Self::DetailedReciprocalRank => "detailed_reciprocal_rank",
            Self::RelativeScore => "relative_score",
            Self::DistanceBasedScore => "distance_based_score",
            Self::Simple => "simple",
            Self::NoFusion => "no_fusion",
        }
    }

    /// Whether results are cut to `top_k` after fusion.
    pub fn truncates(&self) -> bool {
        !matches!(self, Self::NoFusion)
    }
}

impl std::fmt::Display for FusionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FusionMode {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "reciprocal_rank" | "reciprocal_rerank" => Ok(Self::ReciprocalRank),
            "detailed_reciprocal_rank" | "detail_reciprocal_rank" | "detail_reciprocal_rerank" => {
                Ok(Self::DetailedReciprocalRank)
            }
            "relative_score" => Ok(Self::RelativeScore),
            "distance_based_score" | "dist_based_score" => Ok(Self::DistanceBasedScore),
            "simple" => Ok(Self::Simple),
            "no_fusion" => Ok(Self::NoFusion),
            other => Err(RagError::config(format!("Invalid fusion mode: {}", other))),
        }
    }
}

/// Per-retriever weights, normalized to sum to 1.0.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrieverWeights {
    weights: Vec<f32>,
}

impl RetrieverWeights {
    /// Equal weight for each of `count` retrievers.
    pub fn uniform(count: usize) -> Self {
        let weight = if count == 0 { 0.0 } else { 1.0 / count as f32 };
        Self {
            weights: vec![weight; count],
        }
    }

    /// Normalize explicit weights, or fall back to uniform weights.
    pub fn new(weights: Option<&[f32]>, count: usize) -> Result<Self> {
        let Some(weights) = weights else {
            return Ok(Self::uniform(count));
        };

        if weights.len() != count {
            return Err(RagError::config(format!(
                "Expected {} retriever weights, got {}",
                count,
                weights.len()
            )));
        }
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(RagError::config(
                "Retriever weights must be finite and non-negative",
            ));
        }

        let total: f32 = weights.iter().sum();
        if total <= 0.0 {
            return Err(RagError::config("Retriever weights must not sum to zero"));
        }

        Ok(Self {
            weights: weights.iter().map(|w| w / total).collect(),
        })
    }

    /// Weight of the retriever at `index` (0.0 when out of range).
    pub fn get(&self, index: usize) -> f32 {
        self.weights.get(index).copied().unwrap_or(0.0)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_constructors_hold_invariant() {
        assert!(ScoredNode::text("hello").validate().is_ok());
        assert!(ScoredNode::image("http://img/1.png").validate().is_ok());

        let mut broken = ScoredNode::image("http://img/1.png");
        broken.image_url = None;
        assert!(matches!(broken.validate(), Err(RagError::InvalidNode { .. })));
    }

    #[test]
    fn test_node_from_json_validates() {
        let node: ScoredNode =
            serde_json::from_str(r#"{"id": "n1", "kind": "text", "score": 0.4}"#).unwrap();
        assert!(node.validate().is_err());

        let node: ScoredNode =
            serde_json::from_str(r#"{"id": "n2", "kind": "image", "image_url": "a.png"}"#).unwrap();
        assert!(node.validate().is_ok());
        assert_eq!(node.score, None);
    }

    #[test]
    fn test_unset_score() {
        let node = ScoredNode::text_with_id("n1", "x");
        assert_eq!(node.score_or_zero(), 0.0);
        assert!(matches!(node.try_score(), Err(RagError::ScoreNotSet { .. })));
        assert_eq!(node.with_score(0.7).try_score().unwrap(), 0.7);
    }

    #[test]
    fn test_content_key() {
        assert_eq!(ScoredNode::text("passage").content(), "passage");
        assert_eq!(ScoredNode::image("a.png").content(), "a.png");
    }

    #[test]
    fn test_content_with_metadata() {
        let node = ScoredNode::text("body")
            .with_metadata("file_name", "guide.md")
            .with_metadata("image_url", serde_json::json!(["a.png"]))
            .with_metadata("page", 3);
        assert_eq!(node.content_with_metadata(), "file_name: guide.md\npage: 3\n\nbody");

        assert_eq!(ScoredNode::text("plain").content_with_metadata(), "plain");
    }

    #[test]
    fn test_image_refs() {
        let listed = ScoredNode::text("x").with_metadata(
            IMAGE_URL_KEY,
            serde_json::json!(["a.png", "", "b.png"]),
        );
        assert_eq!(listed.image_refs(), vec!["a.png", "b.png"]);

        let single = ScoredNode::text("x").with_metadata(IMAGE_URL_KEY, "c.png");
        assert_eq!(single.image_refs(), vec!["c.png"]);

        assert!(ScoredNode::text("x").image_refs().is_empty());
    }

    #[test]
    fn test_image_document_from_node() {
        let doc = ImageDocument::from_node(&ScoredNode::image("a.png")).unwrap();
        assert_eq!(doc.image_url, "a.png");
        assert!(ImageDocument::from_node(&ScoredNode::text("x")).is_none());
    }

    #[test]
    fn test_fan_out_results_replace_keeps_position() {
        let mut results = FanOutResults::new();
        results.insert(QueryTask::new("q", 0), vec![ScoredNode::text("a")]);
        results.insert(QueryTask::new("q", 1), vec![]);
        results.insert(QueryTask::new("q", 0), vec![]);

        let order: Vec<usize> = results.iter().map(|(t, _)| t.retriever_index).collect();
        assert_eq!(order, vec![0, 1]);
        assert_eq!(results.total_nodes(), 0);
        assert_eq!(results.num_queries(), 1);
    }

    #[test]
    fn test_fusion_mode_parse() {
        assert_eq!("reciprocal_rank".parse::<FusionMode>().unwrap(), FusionMode::ReciprocalRank);
        assert_eq!("reciprocal_rerank".parse::<FusionMode>().unwrap(), FusionMode::ReciprocalRank);
        assert_eq!(
            "dist_based_score".parse::<FusionMode>().unwrap(),
            FusionMode::DistanceBasedScore
        );
        assert_eq!("NO_FUSION".parse::<FusionMode>().unwrap(), FusionMode::NoFusion);

        let err = "borda".parse::<FusionMode>().unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
        assert!(err.to_string().contains("borda"));
    }

    #[test]
    fn test_weights_normalize() {
        let weights = RetrieverWeights::new(Some(&[2.0, 1.0, 1.0]), 3).unwrap();
        let total: f32 = weights.as_slice().iter().sum();
        assert!((total - 1.0).abs() < 1e-6);
        assert!((weights.get(0) - 0.5).abs() < 1e-6);

        let uniform = RetrieverWeights::new(None, 4).unwrap();
        assert!((uniform.as_slice().iter().sum::<f32>() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_weights_rejected() {
        assert!(RetrieverWeights::new(Some(&[1.0]), 2).is_err());
        assert!(RetrieverWeights::new(Some(&[0.0, 0.0]), 2).is_err());
        assert!(RetrieverWeights::new(Some(&[-1.0, 2.0]), 2).is_err());
        assert!(RetrieverWeights::new(Some(&[f32::NAN, 1.0]), 2).is_err());
    }

    #[test]
    fn test_nan_score_ranks_as_zero() {
        let nan = ScoredNode::text("x").with_score(f32::NAN);
        let low = ScoredNode::text("y").with_score(0.1);

        assert_eq!(nan.score_or_zero(), 0.0);
        assert_eq!(low.cmp_by_score_desc(&nan), std::cmp::Ordering::Less);
        assert_eq!(nan.cmp_by_score_desc(&low), std::cmp::Ordering::Greater);
    }

    #[test]
    fn test_fusion_mode_legacy_names_deserialize() {
        let mode: FusionMode = serde_json::from_str("\"reciprocal_rerank\"").unwrap();
        assert_eq!(mode, FusionMode::ReciprocalRank);
        let mode: FusionMode = serde_json::from_str("\"dist_based_score\"").unwrap();
        assert_eq!(mode, FusionMode::DistanceBasedScore);
        let mode: FusionMode = serde_json::from_str("\"detail_reciprocal_rerank\"").unwrap();
        assert_eq!(mode, FusionMode::DetailedReciprocalRank);
    }
}
