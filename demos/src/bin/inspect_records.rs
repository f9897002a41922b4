//! Record Inspection
//!
//! Decodes every record below a directory against a CRF configuration, reports
//! records that fail to decode, and prints label statistics. Finally batches the
//! records through the data loader to check the stacked shapes.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin inspect_records -- --config crf.json data
//!
//! # Emit the per-record report as JSON
//! cargo run --bin inspect_records -- --config crf.json data --json
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use burn::data::{dataloader::DataLoaderBuilder, dataset::Dataset};
use clap::Parser;
use piecewise_crf::{
    CrfConfig,
    dataset::{PiecewiseBatcher, PiecewiseDataset},
    record::DecodedExample,
    split_joint_label,
};
use piecewise_demos::{SelectedBackend, get_backend_name, init_tracing};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory containing .tfrecords files
    records: PathBuf,

    /// CRF configuration file (JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// Number of records to report individually
    #[arg(long, default_value = "5")]
    num_samples: usize,

    /// Number of workers for data loading
    #[arg(long, default_value = "2")]
    num_workers: usize,

    /// Print the per-record report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct RecordReport {
    index: usize,
    name: String,
    unary_histogram: Vec<usize>,
    /// Pairs whose two pixels share a class, per neighbourhood.
    same_class_surr: usize,
    same_class_ab: usize,
    max_weight: f32,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = CrfConfig::load(&args.config)
        .with_context(|| format!("Failed to load config: {}", args.config.display()))?;
    let dataset = PiecewiseDataset::from_dir(&config, &args.records)
        .with_context(|| format!("Failed to load records from {}", args.records.display()))?;

    println!("Using backend: {}", get_backend_name());
    println!("Records: {}", dataset.len());
    println!("Layout: {:?}", dataset.decoder().layout());

    let mut decoded = 0;
    let mut failed = Vec::new();
    let mut reports = Vec::new();
    for index in 0..dataset.len() {
        match dataset.get(index) {
            Some(example) => {
                decoded += 1;
                if reports.len() < args.num_samples {
                    reports.push(report(index, &example, &config)?);
                }
            }
            None => failed.push(index),
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            println!(
                "#{:<4} {:<32} unary {:?} same-class surr {} ab {} max weight {:.3}",
                report.index,
                report.name,
                report.unary_histogram,
                report.same_class_surr,
                report.same_class_ab,
                report.max_weight
            );
        }
    }
    println!("Decoded {decoded} of {} records", dataset.len());
    if !failed.is_empty() {
        println!("Undecodable records: {failed:?}");
        anyhow::bail!("{} records failed to decode", failed.len());
    }

    check_batches(dataset, &config, args.num_workers)
}

fn report(index: usize, example: &DecodedExample, config: &CrfConfig) -> Result<RecordReport> {
    let to_i32 = |data: &burn::tensor::TensorData| {
        data.to_vec::<i32>()
            .map_err(|e| anyhow::anyhow!("unexpected label dtype: {e:?}"))
    };
    let to_f32 = |data: &burn::tensor::TensorData| {
        data.to_vec::<f32>()
            .map_err(|e| anyhow::anyhow!("unexpected weight dtype: {e:?}"))
    };

    let mut unary_histogram = vec![0; config.num_classes];
    for label in to_i32(&example.labels_unary)? {
        if let Some(count) = usize::try_from(label)
            .ok()
            .and_then(|l| unary_histogram.get_mut(l))
        {
            *count += 1;
        }
    }

    let same_class = |labels: Vec<i32>| {
        labels
            .into_iter()
            .filter(|&id| {
                let (c1, c2) = split_joint_label(id as usize, config.num_classes);
                c1 == c2
            })
            .count()
    };

    let max_weight = [
        to_f32(&example.weights_unary)?,
        to_f32(&example.weights_surr)?,
        to_f32(&example.weights_ab)?,
    ]
    .into_iter()
    .flatten()
    .fold(f32::NEG_INFINITY, f32::max);

    Ok(RecordReport {
        index,
        name: example.name.clone(),
        unary_histogram,
        same_class_surr: same_class(to_i32(&example.labels_surr)?),
        same_class_ab: same_class(to_i32(&example.labels_ab)?),
        max_weight,
    })
}

fn check_batches(dataset: PiecewiseDataset, config: &CrfConfig, num_workers: usize) -> Result<()> {
    let loader = DataLoaderBuilder::new(PiecewiseBatcher::<SelectedBackend>::new())
        .batch_size(config.batch_size)
        .num_workers(num_workers)
        .build(dataset);

    for (index, batch) in loader.iter().enumerate() {
        let images = batch.images.dims();
        tracing::info!(
            batch = index,
            images = ?images,
            unary_sites = batch.labels_unary.dims()[0],
            surr_sites = batch.labels_surr.dims()[0],
            ab_sites = batch.labels_ab.dims()[0],
            "batch assembled"
        );
        if index == 0 {
            println!("First batch images: {images:?}, names: {:?}", batch.names);
        }
    }
    Ok(())
}
