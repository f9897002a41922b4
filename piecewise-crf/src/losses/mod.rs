//! Loss functions for piecewise CRF training.
//!
//! [`PiecewiseLoss`] computes the composite unary + pairwise likelihood. The
//! [`LossRegistry`] collects it together with externally computed regularization
//! terms and produces the total that is optimized.

mod piecewise;
mod registry;

pub use piecewise::{
    NetworkShape, PiecewiseLoss, PiecewiseLossConfig, PiecewiseTargets, PiecewiseTerms,
    PotentialScores,
};
pub use registry::{LossRegistry, PIECEWISE_LOSS, TOTAL_LOSS};
