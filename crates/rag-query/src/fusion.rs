//! Fusion strategies for merging per-(query, retriever) result lists.
//!
//! Every strategy is a pure function over [`FanOutResults`]. Nodes are
//! de-duplicated by exact content equality, and ties keep the order in which
//! nodes first appeared in task order, so output never depends on which
//! retrieval call finished first.

use std::collections::HashMap;

use rag_core::{Contribution, FanOutResults, FusionMode, RetrieverWeights, ScoredNode};

/// RRF constant (commonly 60).
/// Higher values give more weight to lower-ranked results.
pub const RRF_K: f32 = 60.0;

/// Merge result lists with the strategy selected by `mode`.
pub fn fuse(
    mode: FusionMode,
    results: &FanOutResults,
    weights: &RetrieverWeights,
    rrf_k: f32,
) -> Vec<ScoredNode> {
    match mode {
        FusionMode::ReciprocalRank => reciprocal_rank_fusion(results, rrf_k),
        FusionMode::DetailedReciprocalRank => detailed_reciprocal_rank_fusion(results, rrf_k),
        FusionMode::RelativeScore => relative_score_fusion(results, weights),
        FusionMode::DistanceBasedScore => distance_based_score_fusion(results, weights),
        FusionMode::Simple => simple_fusion(results),
        FusionMode::NoFusion => no_fusion(results),
    }
}

/// Fuse result lists using Reciprocal Rank Fusion.
///
/// RRF score = Σ 1 / (rank + k) over every list containing the node, with
/// zero-based ranks taken after a stable sort by score.
pub fn reciprocal_rank_fusion(results: &FanOutResults, k: f32) -> Vec<ScoredNode> {
    rrf(results, k, false)
}

/// Reciprocal Rank Fusion that also records each list's contribution.
pub fn detailed_reciprocal_rank_fusion(results: &FanOutResults, k: f32) -> Vec<ScoredNode> {
    rrf(results, k, true)
}

fn rrf(results: &FanOutResults, k: f32, detailed: bool) -> Vec<ScoredNode> {
    let mut merged = Merged::default();

    for (task, nodes) in results.iter() {
        for (rank, node) in ranked(nodes).into_iter().enumerate() {
            let contribution = 1.0 / (rank as f32 + k);
            let entry = merged.entry(node);
            entry.score = Some(entry.score_or_zero() + contribution);
            if detailed {
                entry.contributions.push(Contribution {
                    query: task.query.clone(),
                    retriever_index: task.retriever_index,
                    rank,
                    score: contribution,
                });
            }
        }
    }

    merged.into_sorted()
}

/// Min-max normalize each list, weight by retriever, and sum per node.
pub fn relative_score_fusion(results: &FanOutResults, weights: &RetrieverWeights) -> Vec<ScoredNode> {
    weighted_normalized(results, weights, min_max_bounds)
}

/// Like [`relative_score_fusion`], with bounds at mean ± 3 standard deviations.
pub fn distance_based_score_fusion(
    results: &FanOutResults,
    weights: &RetrieverWeights,
) -> Vec<ScoredNode> {
    weighted_normalized(results, weights, distance_bounds)
}

fn weighted_normalized(
    results: &FanOutResults,
    weights: &RetrieverWeights,
    bounds: fn(&[f32]) -> (f32, f32),
) -> Vec<ScoredNode> {
    let num_queries = results.num_queries().max(1) as f32;
    let mut merged = Merged::default();

    for (task, nodes) in results.iter() {
        let scores: Vec<f32> = nodes.iter().map(ScoredNode::score_or_zero).collect();
        let (min, max) = bounds(&scores);
        let weight = weights.get(task.retriever_index);

        for (node, score) in nodes.iter().zip(scores) {
            let scaled = normalize(score, min, max) * weight / num_queries;
            let entry = merged.entry(node);
            entry.score = Some(entry.score_or_zero() + scaled);
        }
    }

    merged.into_sorted()
}

/// Literal min and max of a list; `(0, 0)` when empty.
pub fn min_max_bounds(scores: &[f32]) -> (f32, f32) {
    if scores.is_empty() {
        return (0.0, 0.0);
    }
    let min = scores.iter().copied().fold(f32::INFINITY, f32::min);
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    (min, max)
}

/// Mean ± 3 population standard deviations; `(0, 0)` when empty.
pub fn distance_bounds(scores: &[f32]) -> (f32, f32) {
    if scores.is_empty() {
        return (0.0, 0.0);
    }
    let n = scores.len() as f32;
    let mean = scores.iter().sum::<f32>() / n;
    let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f32>() / n;
    let std_dev = variance.sqrt();
    (mean - 3.0 * std_dev, mean + 3.0 * std_dev)
}

/// Scale `score` into the `[min, max]` range.
///
/// A degenerate range maps to 1.0 when `max` is positive and 0.0 otherwise.
/// Non-finite results (from overflowing bounds) map to 0.0.
pub fn normalize(score: f32, min: f32, max: f32) -> f32 {
    if max == min {
        return if max > 0.0 { 1.0 } else { 0.0 };
    }
    let scaled = (score - min) / (max - min);
    if scaled.is_finite() {
        scaled
    } else {
        0.0
    }
}

/// Keep the highest score seen for each distinct content.
pub fn simple_fusion(results: &FanOutResults) -> Vec<ScoredNode> {
    let mut merged = Merged::default();

    for (_, nodes) in results.iter() {
        for node in nodes {
            match merged.get_mut(node.content()) {
                Some(existing) => {
                    let best = existing.score_or_zero().max(node.score_or_zero());
                    existing.score = Some(best);
                }
                None => merged.push(node.clone()),
            }
        }
    }

    merged.into_sorted()
}

/// Concatenate all lists in task order, untouched.
pub fn no_fusion(results: &FanOutResults) -> Vec<ScoredNode> {
    results
        .iter()
        .flat_map(|(_, nodes)| nodes.iter().cloned())
        .collect()
}

/// Nodes of one list ordered by score descending; equal scores keep list order.
fn ranked(nodes: &[ScoredNode]) -> Vec<&ScoredNode> {
    let mut ranked: Vec<&ScoredNode> = nodes.iter().collect();
    ranked.sort_by(|a, b| a.cmp_by_score_desc(b));
    ranked
}

/// Content-keyed accumulator that remembers first-appearance order.
#[derive(Default)]
struct Merged {
    positions: HashMap<String, usize>,
    nodes: Vec<ScoredNode>,
}

impl Merged {
    fn get_mut(&mut self, content: &str) -> Option<&mut ScoredNode> {
        let idx = *self.positions.get(content)?;
        Some(&mut self.nodes[idx])
    }

    fn push(&mut self, node: ScoredNode) {
        self.positions
            .insert(node.content().to_string(), self.nodes.len());
        self.nodes.push(node);
    }

    /// Accumulator slot for `node`, seeded with a zero score on first sight.
    fn entry(&mut self, node: &ScoredNode) -> &mut ScoredNode {
        let existing = self.positions.get(node.content()).copied();
        let idx = match existing {
            Some(idx) => idx,
            None => {
                let mut seed = node.clone();
                seed.score = Some(0.0);
                seed.contributions.clear();
                self.push(seed);
                self.nodes.len() - 1
            }
        };
        &mut self.nodes[idx]
    }

    fn into_sorted(self) -> Vec<ScoredNode> {
        let mut fused = self.nodes;
        fused.sort_by(ScoredNode::cmp_by_score_desc);
        fused
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rag_core::QueryTask;

    fn node(text: &str, score: f32) -> ScoredNode {
        ScoredNode::text_with_id(text, text).with_score(score)
    }

    fn lists(lists: Vec<Vec<ScoredNode>>) -> FanOutResults {
        lists
            .into_iter()
            .enumerate()
            .map(|(i, nodes)| (QueryTask::new("q", i), nodes))
            .collect()
    }

    fn texts(nodes: &[ScoredNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.content()).collect()
    }

    #[test]
    fn test_rrf_single_list() {
        let results = lists(vec![vec![node("a", 0.9), node("b", 0.8), node("c", 0.7)]]);

        let fused = reciprocal_rank_fusion(&results, RRF_K);

        assert_eq!(texts(&fused), vec!["a", "b", "c"]);
        assert!((fused[0].score.unwrap() - 1.0 / 60.0).abs() < 1e-6);
    }

    #[test]
    fn test_rrf_ranks_by_score_not_position() {
        let results = lists(vec![vec![node("low", 0.1), node("high", 0.9)]]);

        let fused = reciprocal_rank_fusion(&results, RRF_K);

        assert_eq!(texts(&fused), vec!["high", "low"]);
    }

    #[test]
    fn test_rrf_shared_node_wins() {
        let results = lists(vec![
            vec![node("a", 0.9), node("b", 0.5)],
            vec![node("b", 0.6), node("c", 0.3)],
        ]);

        let fused = reciprocal_rank_fusion(&results, RRF_K);

        assert_eq!(texts(&fused), vec!["b", "a", "c"]);
        let expected_b = 1.0 / 61.0 + 1.0 / 60.0;
        assert!((fused[0].score.unwrap() - expected_b).abs() < 1e-6);
    }

    #[test]
    fn test_rrf_monotonic() {
        let results = lists(vec![
            vec![node("top", 0.9), node("mid", 0.5), node("bottom", 0.1)],
            vec![node("top", 0.8), node("mid", 0.4), node("bottom", 0.2)],
        ]);

        let fused = reciprocal_rank_fusion(&results, RRF_K);

        let score = |t: &str| fused.iter().find(|n| n.content() == t).unwrap().score.unwrap();
        assert!(score("top") > score("bottom"));
    }

    #[test]
    fn test_detailed_rrf_records_contributions() {
        let results = lists(vec![
            vec![node("a", 0.9), node("b", 0.5)],
            vec![node("b", 0.6)],
        ]);

        let plain = reciprocal_rank_fusion(&results, RRF_K);
        let detailed = detailed_reciprocal_rank_fusion(&results, RRF_K);

        assert_eq!(texts(&plain), texts(&detailed));
        let b = &detailed[0];
        assert_eq!(b.content(), "b");
        assert_eq!(b.contributions.len(), 2);
        assert_eq!(b.contributions[0].retriever_index, 0);
        assert_eq!(b.contributions[0].rank, 1);
        assert_eq!(b.contributions[1].rank, 0);
        let total: f32 = b.contributions.iter().map(|c| c.score).sum();
        assert!((total - b.score.unwrap()).abs() < 1e-6);
        assert!(plain.iter().all(|n| n.contributions.is_empty()));
    }

    #[test]
    fn test_normalize_bounds() {
        let scores = [0.2, 0.8, 0.5];
        let (min, max) = min_max_bounds(&scores);
        let normalized: Vec<f32> = scores.iter().map(|s| normalize(*s, min, max)).collect();

        assert!((normalized[0] - 0.0).abs() < 1e-6);
        assert!((normalized[1] - 1.0).abs() < 1e-6);
        assert!((normalized[2] - 0.5).abs() < 1e-6);
        assert!(normalized.iter().all(|s| (0.0..=1.0).contains(s)));
    }

    #[test]
    fn test_normalize_degenerate_range() {
        assert_eq!(normalize(0.4, 0.4, 0.4), 1.0);
        assert_eq!(normalize(0.0, 0.0, 0.0), 0.0);
        assert_eq!(normalize(-1.0, -1.0, -1.0), 0.0);
        assert_eq!(min_max_bounds(&[]), (0.0, 0.0));
        assert_eq!(distance_bounds(&[]), (0.0, 0.0));
    }

    #[test]
    fn test_distance_bounds() {
        let (min, max) = distance_bounds(&[1.0, 3.0]);
        // mean 2, population std dev 1
        assert!((min - -1.0).abs() < 1e-6);
        assert!((max - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_relative_score_weights_and_sum() {
        let results = lists(vec![
            vec![node("a", 10.0), node("b", 0.0)],
            vec![node("b", 0.9), node("c", 0.1)],
        ]);
        let weights = RetrieverWeights::new(Some(&[3.0, 1.0]), 2).unwrap();

        let fused = relative_score_fusion(&results, &weights);

        let score = |t: &str| fused.iter().find(|n| n.content() == t).unwrap().score.unwrap();
        assert!((score("a") - 0.75).abs() < 1e-6);
        assert!((score("b") - 0.25).abs() < 1e-6);
        assert!(score("c").abs() < 1e-6);
        assert_eq!(fused[0].content(), "a");
    }

    #[test]
    fn test_relative_score_divides_by_query_count() {
        let results: FanOutResults = vec![
            (QueryTask::new("q1", 0), vec![node("a", 0.9), node("b", 0.1)]),
            (QueryTask::new("q2", 0), vec![node("a", 0.8), node("c", 0.2)]),
        ]
        .into_iter()
        .collect();
        let weights = RetrieverWeights::uniform(1);

        let fused = relative_score_fusion(&results, &weights);

        assert_eq!(fused[0].content(), "a");
        assert!((fused[0].score.unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_relative_score_empty_list() {
        let results = lists(vec![vec![], vec![node("a", 0.4), node("b", 0.2)]]);
        let weights = RetrieverWeights::uniform(2);

        let relative = relative_score_fusion(&results, &weights);
        let distance = distance_based_score_fusion(&results, &weights);

        assert_eq!(relative.len(), 2);
        assert_eq!(distance.len(), 2);
        assert!((relative[0].score.unwrap() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_distance_based_dampens_outlier() {
        let results = lists(vec![vec![
            node("outlier", 100.0),
            node("a", 1.0),
            node("b", 0.9),
            node("c", 0.8),
        ]]);
        let weights = RetrieverWeights::uniform(1);

        let relative = relative_score_fusion(&results, &weights);
        let distance = distance_based_score_fusion(&results, &weights);

        assert_eq!(relative[0].content(), "outlier");
        assert_eq!(distance[0].content(), "outlier");
        let score = |nodes: &[ScoredNode], t: &str| {
            nodes.iter().find(|n| n.content() == t).unwrap().score.unwrap()
        };
        assert!(score(&distance, "a") > score(&relative, "a"));
    }

    #[test]
    fn test_simple_keeps_max() {
        let results = lists(vec![vec![node("x", 0.3)], vec![node("x", 0.9)]]);

        let fused = simple_fusion(&results);

        assert_eq!(fused.len(), 1);
        assert!((fused[0].score.unwrap() - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_dedup_is_exact_content() {
        let results = lists(vec![vec![node("same text", 0.3)], vec![node("same  text", 0.9)]]);

        assert_eq!(simple_fusion(&results).len(), 2);
        assert_eq!(reciprocal_rank_fusion(&results, RRF_K).len(), 2);
    }

    #[test]
    fn test_no_fusion_passthrough() {
        let results = lists(vec![
            vec![node("a", 0.1), node("b", 0.2)],
            vec![node("a", 0.3)],
        ]);

        let fused = no_fusion(&results);

        assert_eq!(fused.len(), results.total_nodes());
        assert_eq!(texts(&fused), vec!["a", "b", "a"]);
        assert_eq!(fused[0].score, Some(0.1));
    }

    #[test]
    fn test_ties_keep_first_appearance() {
        let results = lists(vec![vec![node("first", 0.5), node("second", 0.5)]]);

        for mode in [
            FusionMode::ReciprocalRank,
            FusionMode::RelativeScore,
            FusionMode::Simple,
        ] {
            let fused = fuse(mode, &results, &RetrieverWeights::uniform(1), RRF_K);
            assert_eq!(fused[0].content(), "first", "mode {}", mode);
        }
    }

    #[test]
    fn test_unscored_nodes_rank_as_zero() {
        let results = lists(vec![vec![
            ScoredNode::text_with_id("u", "unscored"),
            node("s", 0.2),
        ]]);

        let fused = simple_fusion(&results);

        assert_eq!(fused[0].content(), "s");
        assert_eq!(fused[1].score, None);
    }

    #[test]
    fn test_nan_scores_rank_as_zero() {
        let nodes: Vec<ScoredNode> = (0..64)
            .map(|i| {
                let score = if i % 3 == 0 { f32::NAN } else { i as f32 / 64.0 };
                node(&format!("n{}", i), score)
            })
            .collect();
        let results = lists(vec![nodes.clone(), nodes]);

        for mode in [
            FusionMode::ReciprocalRank,
            FusionMode::DetailedReciprocalRank,
            FusionMode::RelativeScore,
            FusionMode::DistanceBasedScore,
            FusionMode::Simple,
        ] {
            let fused = fuse(mode, &results, &RetrieverWeights::uniform(2), RRF_K);
            assert_eq!(fused.len(), 64, "mode {}", mode);
            assert_eq!(fused[0].content(), "n62", "mode {}", mode);
        }
    }

    #[test]
    fn test_overflowing_distance_bounds() {
        let results = lists(vec![vec![node("big", f32::MAX), node("small", -f32::MAX)]]);

        let fused = distance_based_score_fusion(&results, &RetrieverWeights::uniform(1));

        assert_eq!(fused.len(), 2);
        assert!(fused.iter().all(|n| n.score.unwrap().is_finite()));
    }
}
