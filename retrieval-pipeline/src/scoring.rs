use std::{cmp::Ordering, collections::HashMap};

pub const DEFAULT_RRF_K: f32 = 60.0;

/// An article id with its fused score and the best rank it reached in each list.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedCandidate {
    pub id: String,
    pub score: f32,
    pub keyword_rank: Option<usize>,
    pub semantic_rank: Option<usize>,
}

impl FusedCandidate {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            score: 0.0,
            keyword_rank: None,
            semantic_rank: None,
        }
    }
}

fn rank_key(rank: Option<usize>) -> usize {
    rank.unwrap_or(usize::MAX)
}

/// Reciprocal rank fusion over two ranked id lists.
///
/// Each list contributes `1 / (k + rank)` with a 0-based rank; an id repeated within a list
/// only counts at its first position. Ties fall back to the keyword rank, then the semantic
/// rank, then the id.
pub fn reciprocal_rank_fusion(keyword: &[String], semantic: &[String], k: f32) -> Vec<FusedCandidate> {
    let k = if k.is_finite() && k > 0.0 { k } else { DEFAULT_RRF_K };
    let mut merged: HashMap<&str, FusedCandidate> = HashMap::new();

    for (rank, id) in keyword.iter().enumerate() {
        let entry = merged
            .entry(id.as_str())
            .or_insert_with(|| FusedCandidate::new(id));
        if entry.keyword_rank.is_none() {
            entry.keyword_rank = Some(rank);
            entry.score += 1.0 / (k + rank as f32);
        }
    }

    for (rank, id) in semantic.iter().enumerate() {
        let entry = merged
            .entry(id.as_str())
            .or_insert_with(|| FusedCandidate::new(id));
        if entry.semantic_rank.is_none() {
            entry.semantic_rank = Some(rank);
            entry.score += 1.0 / (k + rank as f32);
        }
    }

    let mut fused: Vec<FusedCandidate> = merged.into_values().collect();
    sort_by_fused_desc(&mut fused);
    fused
}

pub fn sort_by_fused_desc(items: &mut [FusedCandidate]) {
    items.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| rank_key(a.keyword_rank).cmp(&rank_key(b.keyword_rank)))
            .then_with(|| rank_key(a.semantic_rank).cmp(&rank_key(b.semantic_rank)))
            .then_with(|| a.id.cmp(&b.id))
    });
}
