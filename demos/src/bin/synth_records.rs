//! Synthetic Record Writer
//!
//! Writes a TFRecord file of random but internally consistent examples for a CRF
//! configuration. Useful for exercising the decoder and the loss without a real
//! dataset.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin synth_records -- --config crf.json --output data/train.tfrecords --count 8
//! ```

use std::{
    fs::{self, File},
    io::BufWriter,
    path::PathBuf,
};

use anyhow::{Context, Result};
use clap::Parser;
use piecewise_crf::{CrfConfig, record::TfRecordWriter};
use piecewise_demos::{SelectedBackend, create_device, get_backend_name, init_tracing, synthetic};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// CRF configuration file (JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// Output TFRecord file
    #[arg(short, long)]
    output: PathBuf,

    /// Number of examples to write
    #[arg(long, default_value = "8")]
    count: usize,

    /// Prefix of the example names
    #[arg(long, default_value = "synthetic")]
    prefix: String,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = CrfConfig::load(&args.config)
        .with_context(|| format!("Failed to load config: {}", args.config.display()))?;
    config.validate()?;

    let device = create_device();
    tracing::info!(backend = get_backend_name(), "generating synthetic examples");

    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let file = File::create(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;
    let mut writer = TfRecordWriter::new(BufWriter::new(file));

    for index in 0..args.count {
        let name = format!("{}_{index:06}", args.prefix);
        let example = synthetic::example::<SelectedBackend>(&config, &name, &device)?;
        writer
            .write_record(&example.encode())
            .with_context(|| format!("Failed to write record {name}"))?;
    }

    let mut inner = writer.into_inner();
    std::io::Write::flush(&mut inner).context("Failed to flush record file")?;

    tracing::info!(
        path = %args.output.display(),
        records = args.count,
        "record file written"
    );
    Ok(())
}
