//! Piecewise CRF tools
//!
//! Command-line programs built on `piecewise-crf`.
//!
//! ## Available Tools
//!
//! - `synth_records`: Write a TFRecord file of synthetic examples for a configuration
//! - `inspect_records`: Decode a record directory and report shapes and label statistics
//! - `loss_smoke`: Run the piecewise loss on decoded batches with random scores
//!
//! ## Usage
//!
//! ```bash
//! # Write 8 synthetic examples
//! cargo run --bin synth_records -- --config crf.json --output data/train.tfrecords --count 8
//!
//! # Inspect every record below a directory
//! cargo run --bin inspect_records -- --config crf.json data
//!
//! # Run the loss for 20 steps
//! cargo run --bin loss_smoke -- --config crf.json data --steps 20
//! ```

pub mod backend;
pub mod synthetic;

pub use backend::{SelectedBackend, SelectedDevice, create_device, get_backend_name};

/// Installs the `tracing` subscriber shared by every tool. Filtering follows
/// `RUST_LOG` and defaults to `info`.
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();
}
