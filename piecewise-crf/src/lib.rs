//! Piecewise CRF training support for semantic segmentation.
//!
//! The crate covers the two pieces of a piecewise-trained CRF that sit around the
//! network itself:
//!
//! - **Records**: [`record::RecordDecoder`] turns one serialized `tf.train.Example`
//!   into an image, per-site labels and class-balancing weights. The TFRecord
//!   container around those messages is read and written by [`record::TfRecordReader`]
//!   and [`record::TfRecordWriter`].
//! - **Loss**: [`losses::PiecewiseLoss`] sums three independently normalized,
//!   weighted negative log-likelihoods, one per potential type (unary, surrounding
//!   pairwise, above/below pairwise).
//!
//! Around them sit a [`losses::LossRegistry`] collecting every scalar term of a step,
//! [`metrics::LossAverages`] reporting smoothed loss values, and a
//! [`training::LossStep`] tying both together for one optimization step.
//!
//! ## Usage Example
//!
//! ```rust
//! use piecewise_crf::{
//!     losses::{NetworkShape, PiecewiseLossConfig},
//!     CrfConfig,
//! };
//!
//! let config = CrfConfig::new(384, 1248, 3, 4, 19, 1, 10, 10);
//! let loss = PiecewiseLossConfig::new()
//!     .init(&config, &NetworkShape::expected_by(&config))
//!     .unwrap();
//! assert_eq!(loss.unary_sites, 96 * 312);
//! ```

mod config;
mod error;

#[cfg(feature = "dataset")]
pub mod dataset;
pub mod losses;
pub mod metrics;
pub mod record;
pub mod training;

pub use config::{CrfConfig, joint_label, split_joint_label};
pub use error::{PiecewiseError, PiecewiseResult};
