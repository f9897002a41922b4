//! Loss observability.
//!
//! Moving averages of each registered loss term and of the total. They are pure
//! bookkeeping and never feed back into the gradient.

mod averages;

pub use averages::{LossAverages, LossAveragesConfig, LossSummary};
