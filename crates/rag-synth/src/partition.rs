//! Splitting retrieved nodes into image and text context.

use std::collections::{HashMap, HashSet};

use rag_core::{ScoredNode, SynthesisConfig, FILE_NAME_KEY, IMAGE_URL_KEY};

/// Maximum number of images handed to the multi-modal LLM.
pub const IMAGE_MAX_PIECES: usize = 5;

/// Score discount for images only referenced from text metadata.
pub const TEXT_IMAGE_WEIGHT: f32 = 0.5;

/// Limits applied while partitioning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartitionConfig {
    pub image_max_pieces: usize,
    pub text_image_weight: f32,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            image_max_pieces: IMAGE_MAX_PIECES,
            text_image_weight: TEXT_IMAGE_WEIGHT,
        }
    }
}

impl From<&SynthesisConfig> for PartitionConfig {
    fn from(config: &SynthesisConfig) -> Self {
        Self {
            image_max_pieces: config.image_max_pieces,
            text_image_weight: config.text_image_weight,
        }
    }
}

/// Nodes split by modality.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partitioned {
    /// Native images by score, then images promoted from text metadata, capped.
    pub image_nodes: Vec<ScoredNode>,

    /// Text nodes in input order.
    pub text_nodes: Vec<ScoredNode>,
}

impl Partitioned {
    /// Image nodes followed by text nodes.
    pub fn into_nodes(self) -> Vec<ScoredNode> {
        let mut nodes = self.image_nodes;
        nodes.extend(self.text_nodes);
        nodes
    }
}

/// Partition with the default image cap and weight.
pub fn partition(nodes: &[ScoredNode]) -> Partitioned {
    partition_with(nodes, &PartitionConfig::default())
}

/// Split `nodes` into image and text nodes.
///
/// Image references in a text node's metadata that do not match a native
/// image node become synthetic image nodes scored at the text node's score
/// times `text_image_weight`. A reference shared by several text nodes is
/// promoted once, with the best score.
pub fn partition_with(nodes: &[ScoredNode], config: &PartitionConfig) -> Partitioned {
    let native_urls: HashSet<&str> = nodes
        .iter()
        .filter(|n| n.is_image())
        .filter_map(|n| n.image_url.as_deref())
        .collect();

    let mut image_nodes = Vec::new();
    let mut text_nodes = Vec::new();
    let mut promoted: Vec<ScoredNode> = Vec::new();
    let mut promoted_at: HashMap<String, usize> = HashMap::new();

    for node in nodes {
        if node.is_image() {
            image_nodes.push(node.clone());
            continue;
        }

        for url in node.image_refs() {
            if native_urls.contains(url.as_str()) {
                continue;
            }
            let score = node.score.map(|s| s * config.text_image_weight);
            match promoted_at.get(&url) {
                Some(&idx) => {
                    if score.unwrap_or(0.0) > promoted[idx].score_or_zero() {
                        promoted[idx].score = score;
                    }
                }
                None => {
                    promoted_at.insert(url.clone(), promoted.len());
                    promoted.push(promote(node, url, score));
                }
            }
        }

        text_nodes.push(node.clone());
    }

    sort_by_score(&mut image_nodes);
    sort_by_score(&mut promoted);
    image_nodes.extend(promoted);
    image_nodes.truncate(config.image_max_pieces);

    Partitioned {
        image_nodes,
        text_nodes,
    }
}

/// Synthetic image node for an image referenced by `source`.
fn promote(source: &ScoredNode, url: String, score: Option<f32>) -> ScoredNode {
    let id = format!("img-{}", &blake3::hash(url.as_bytes()).to_hex()[..16]);
    let file_name = source
        .metadata
        .get(FILE_NAME_KEY)
        .cloned()
        .unwrap_or_else(|| serde_json::Value::String(String::new()));

    let mut node = ScoredNode::image_with_id(id, url.clone())
        .with_metadata(IMAGE_URL_KEY, url)
        .with_metadata(FILE_NAME_KEY, file_name);
    node.score = score;
    node.retriever_tag = source.retriever_tag.clone();
    node
}

fn sort_by_score(nodes: &mut [ScoredNode]) {
    nodes.sort_by(ScoredNode::cmp_by_score_desc);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn image(url: &str, score: f32) -> ScoredNode {
        ScoredNode::image_with_id(url, url).with_score(score)
    }

    fn text_with_images(text: &str, score: f32, urls: &[&str]) -> ScoredNode {
        ScoredNode::text_with_id(text, text)
            .with_score(score)
            .with_metadata(IMAGE_URL_KEY, json!(urls))
            .with_metadata(FILE_NAME_KEY, "manual.pdf")
    }

    fn urls(nodes: &[ScoredNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.content()).collect()
    }

    #[test]
    fn test_image_cap_keeps_top_scores() {
        let scores = [0.3, 0.9, 0.5, 0.7, 0.4, 0.8, 0.6];
        let nodes: Vec<ScoredNode> = scores
            .iter()
            .map(|s| image(&format!("{}.png", s), *s))
            .collect();

        let parts = partition(&nodes);

        assert_eq!(parts.image_nodes.len(), 5);
        let kept: Vec<f32> = parts.image_nodes.iter().map(|n| n.score.unwrap()).collect();
        assert_eq!(kept, vec![0.9, 0.8, 0.7, 0.6, 0.5]);
        assert!(parts.text_nodes.is_empty());
    }

    #[test]
    fn test_text_image_weighting() {
        let nodes = vec![text_with_images("caption", 0.8, &["fig1.png"])];

        let parts = partition(&nodes);

        assert_eq!(parts.image_nodes.len(), 1);
        let promoted = &parts.image_nodes[0];
        assert!(promoted.is_image());
        assert_eq!(promoted.image_url.as_deref(), Some("fig1.png"));
        assert!((promoted.score.unwrap() - 0.4).abs() < 1e-6);
        assert_eq!(promoted.metadata[FILE_NAME_KEY], json!("manual.pdf"));
        assert!(promoted.validate().is_ok());
        assert_eq!(parts.text_nodes.len(), 1);
    }

    #[test]
    fn test_native_images_before_promoted() {
        let nodes = vec![
            text_with_images("t", 1.0, &["promoted.png"]),
            image("native.png", 0.1),
        ];

        let parts = partition(&nodes);

        assert_eq!(urls(&parts.image_nodes), vec!["native.png", "promoted.png"]);
    }

    #[test]
    fn test_reference_to_native_image_not_promoted() {
        let nodes = vec![
            text_with_images("t", 0.9, &["shared.png", "extra.png"]),
            image("shared.png", 0.2),
        ];

        let parts = partition(&nodes);

        assert_eq!(urls(&parts.image_nodes), vec!["shared.png", "extra.png"]);
    }

    #[test]
    fn test_shared_reference_promoted_once_with_best_score() {
        let nodes = vec![
            text_with_images("low", 0.2, &["fig.png"]),
            text_with_images("high", 0.6, &["fig.png"]),
        ];

        let parts = partition(&nodes);

        assert_eq!(parts.image_nodes.len(), 1);
        assert!((parts.image_nodes[0].score.unwrap() - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_text_order_preserved() {
        let nodes = vec![
            ScoredNode::text_with_id("1", "low").with_score(0.1),
            image("a.png", 0.5),
            ScoredNode::text_with_id("2", "high").with_score(0.9),
        ];

        let parts = partition(&nodes);

        assert_eq!(urls(&parts.text_nodes), vec!["low", "high"]);
    }

    #[test]
    fn test_promoted_ids_are_stable() {
        let nodes = vec![text_with_images("t", 0.5, &["fig.png"])];
        assert_eq!(partition(&nodes).image_nodes[0].id, partition(&nodes).image_nodes[0].id);
    }

    #[test]
    fn test_custom_config() {
        let nodes = vec![
            image("a.png", 0.9),
            image("b.png", 0.8),
            text_with_images("t", 1.0, &["c.png"]),
        ];
        let config = PartitionConfig {
            image_max_pieces: 2,
            text_image_weight: 0.25,
        };

        let parts = partition_with(&nodes, &config);
        assert_eq!(urls(&parts.image_nodes), vec!["a.png", "b.png"]);

        let parts = partition_with(&nodes[2..], &config);
        assert!((parts.image_nodes[0].score.unwrap() - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_into_nodes_puts_images_first() {
        let nodes = vec![ScoredNode::text_with_id("t", "t"), image("a.png", 0.5)];
        let merged = partition(&nodes).into_nodes();
        assert_eq!(urls(&merged), vec!["a.png", "t"]);
    }

    #[test]
    fn test_nan_image_scores() {
        let nodes: Vec<ScoredNode> = (0..30)
            .map(|i| {
                let score = if i % 3 == 0 { f32::NAN } else { i as f32 / 30.0 };
                image(&format!("{}.png", i), score)
            })
            .collect();

        let parts = partition(&nodes);

        assert_eq!(urls(&parts.image_nodes), vec!["29.png", "28.png", "26.png", "25.png", "23.png"]);
    }
}
