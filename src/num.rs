//! Utilities for numerics.

use std::cmp::Ordering;

/// An `f32` that implements [`Ord`] according to the IEEE 754 totalOrder predicate.
#[derive(Clone, Copy)]
pub struct TotalF32(pub f32);

impl PartialEq for TotalF32 {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for TotalF32 {}

impl PartialOrd for TotalF32 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TotalF32 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Returns the `k`-th largest value in `values` (1-based, so `k = 1` is the maximum).
///
/// Reorders `values` in the process.
pub fn kth_largest(values: &mut [f32], k: usize) -> f32 {
    assert!(k >= 1 && k <= values.len());
    values.sort_unstable_by_key(|&v| TotalF32(v));
    values[values.len() - k]
}
