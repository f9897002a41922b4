//! # Class-balancing weight clamp
//!
//! Weights are bounded from above only. Negative or zero weights pass through unchanged.

use burn::prelude::*;

/// Upper bound applied to class-balancing weights.
pub const DEFAULT_WEIGHT_CLAMP: f64 = 100.0;

/// Element-wise `min(weight, max_weight)`.
pub fn clamp_weights<B: Backend, const D: usize>(
    weights: Tensor<B, D>,
    max_weight: f64,
) -> Tensor<B, D> {
    weights.clamp_max(max_weight)
}
