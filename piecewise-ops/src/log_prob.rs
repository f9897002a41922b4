//! # Clamped log-softmax
//!
//! `ln(clamp(softmax(x), floor, 1))` over the class axis. Burn's softmax subtracts the
//! row maximum before exponentiating, and the clamp keeps the logarithm finite when a
//! probability underflows, so both the values and their gradients stay bounded.

use burn::{prelude::*, tensor::activation};

/// Probability floor applied before the logarithm.
pub const DEFAULT_PROB_FLOOR: f64 = 1.0e-6;

/// A trait for computing clamped log-probabilities on `[sites, classes]` scores.
pub trait ClampedLogSoftmax {
    /// Applies softmax over the class axis, clamps into `[prob_floor, 1]` and takes
    /// the natural logarithm.
    fn clamped_log_softmax(self, prob_floor: f64) -> Self;
}

impl<B: Backend> ClampedLogSoftmax for Tensor<B, 2> {
    fn clamped_log_softmax(self, prob_floor: f64) -> Self {
        clamped_log_softmax(self, prob_floor)
    }
}

/// Clamped log-softmax over dimension 1.
pub fn clamped_log_softmax<B: Backend>(scores: Tensor<B, 2>, prob_floor: f64) -> Tensor<B, 2> {
    assert!(
        prob_floor > 0.0 && prob_floor <= 1.0,
        "Probability floor must lie in (0, 1], got {prob_floor}"
    );
    activation::softmax(scores, 1).clamp(prob_floor, 1.0).log()
}
