//! Score computation under the library's sign convention: higher is better.
//!
//! Cosine and InnerProduct score with the raw dot product (Cosine assumes
//! the caller already L2-normalized both sides). L2 scores with the negated
//! squared Euclidean distance, so the nearest vector has the largest score.

use arrowdb_core::DistanceMetric;

/// Dot product of two equal-length vectors.
#[must_use]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Negated squared Euclidean distance: `-‖a - b‖²`.
#[must_use]
pub fn neg_l2_squared(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    -a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum::<f32>()
}

/// Scores a stored vector against a query under the given metric.
#[must_use]
pub fn score(metric: DistanceMetric, query: &[f32], stored: &[f32]) -> f32 {
    match metric {
        DistanceMetric::Cosine | DistanceMetric::InnerProduct => dot_product(query, stored),
        DistanceMetric::L2 => neg_l2_squared(query, stored),
    }
}
