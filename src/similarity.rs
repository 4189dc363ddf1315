use rayon::prelude::*;

use crate::embeddings::Embeddings;

/// Cosine similarity rescaled into `[0, 1]`.
///
/// Vectors with zero norm have no direction; they score the midpoint.
pub fn rescaled_cosine(query: &[f32], candidate: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut query_norm = 0.0f32;
    let mut candidate_norm = 0.0f32;
    for (q, c) in query.iter().zip(candidate) {
        dot += q * c;
        query_norm += q * q;
        candidate_norm += c * c;
    }

    let denominator = 2.0 * query_norm.sqrt() * candidate_norm.sqrt();
    if denominator == 0.0 || !denominator.is_finite() {
        return 0.5;
    }
    dot / denominator + 0.5
}

/// Score every row of `candidates` against `query`, in row order.
pub fn scores(query: &[f32], candidates: &Embeddings) -> Vec<f32> {
    if candidates.is_empty() {
        return Vec::new();
    }
    candidates
        .as_flat()
        .par_chunks(candidates.dimension())
        .map(|row| rescaled_cosine(query, row))
        .collect()
}

/// Row indices ordered by descending score. Equal scores keep row order.
pub fn rank(scores: &[f32]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
    order
}

/// Component-wise mean of equally sized vectors.
pub fn mean(vectors: &[Vec<f32>]) -> Option<Vec<f32>> {
    let first = vectors.first()?;
    let mut sum = vec![0.0f32; first.len()];
    for vector in vectors {
        if vector.len() != sum.len() {
            return None;
        }
        for (total, value) in sum.iter_mut().zip(vector) {
            *total += value;
        }
    }
    let count = vectors.len() as f32;
    sum.iter_mut().for_each(|total| *total /= count);
    Some(sum)
}
