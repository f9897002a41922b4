//! Loss Smoke Test
//!
//! Runs the piecewise loss over batches of decoded records with random potential
//! scores standing in for a network, backpropagates the total and prints the raw and
//! averaged loss values of every step as JSON lines.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin loss_smoke -- --config crf.json data --steps 20
//!
//! # Add an L2 penalty on the scores as a regularization term
//! cargo run --bin loss_smoke -- --config crf.json data --weight-decay 1e-4
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use burn::{
    backend::Autodiff,
    data::{dataloader::DataLoaderBuilder, dataset::Dataset},
    tensor::{Distribution, Tensor, backend::Backend, cast::ToElement},
};
use clap::Parser;
use piecewise_crf::{
    CrfConfig,
    dataset::{PiecewiseBatch, PiecewiseBatcher, PiecewiseDataset},
    losses::{NetworkShape, PiecewiseLossConfig, PotentialScores},
    metrics::LossAveragesConfig,
    training::LossStep,
};
use piecewise_demos::{SelectedBackend, create_device, get_backend_name, init_tracing};

type SmokeBackend = Autodiff<SelectedBackend>;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory containing .tfrecords files
    records: PathBuf,

    /// CRF configuration file (JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// Maximum number of steps to run
    #[arg(long, default_value = "10")]
    steps: usize,

    /// Upper bound applied to class-balancing weights
    #[arg(long, default_value = "100.0")]
    weight_clamp: f64,

    /// Scale of an L2 penalty on the scores, registered as regularization
    #[arg(long)]
    weight_decay: Option<f64>,

    /// Decay of the loss moving averages
    #[arg(long, default_value = "0.9")]
    decay: f64,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = CrfConfig::load(&args.config)
        .with_context(|| format!("Failed to load config: {}", args.config.display()))?;
    let dataset = PiecewiseDataset::from_dir(&config, &args.records)
        .with_context(|| format!("Failed to load records from {}", args.records.display()))?;

    let failed = dataset.undecodable_indices();
    if !failed.is_empty() {
        anyhow::bail!(
            "{} of {} records failed to decode: {failed:?}",
            failed.len(),
            dataset.len()
        );
    }

    let loss = PiecewiseLossConfig::new()
        .with_weight_clamp(args.weight_clamp)
        .init(&config, &NetworkShape::expected_by(&config))
        .context("Loss configuration does not match the records")?;
    tracing::info!(backend = get_backend_name(), %loss, "loss ready");

    let averages = LossAveragesConfig::new().with_decay(args.decay).init();
    let mut step = LossStep::new(loss, averages);

    let device = create_device();
    let loader = DataLoaderBuilder::new(PiecewiseBatcher::<SmokeBackend>::new())
        .batch_size(config.batch_size)
        .build(dataset);

    let mut steps_run = 0;
    for batch in loader.iter().take(args.steps) {
        let [unary_sites, _, _] = config.batch_site_counts();
        if batch.labels_unary.dims()[0] != unary_sites {
            tracing::warn!(examples = batch.names.len(), "skipping partial batch");
            continue;
        }

        let scores = random_scores(&config, &batch, &device);
        let regularization = args
            .weight_decay
            .map(|scale| vec![("score_l2".to_owned(), l2(&scores).mul_scalar(scale))])
            .unwrap_or_default();

        let report = step.run(scores.clone(), batch.targets(), regularization);
        steps_run += 1;
        let grads = report.total.backward();
        let unary_grad = scores
            .unary
            .grad(&grads)
            .context("Unary scores received no gradient")?;
        let grad_norm = unary_grad.powf_scalar(2.0).sum().sqrt().into_scalar().to_f64();

        println!(
            "{}",
            serde_json::json!({
                "step": report.step,
                "summaries": report.summaries,
                "unary_grad_norm": grad_norm,
            })
        );
    }

    if steps_run < args.steps {
        tracing::warn!(
            steps_run,
            requested = args.steps,
            "records ran out before the requested number of steps"
        );
    }
    tracing::info!(steps_run, "smoke run finished");

    Ok(())
}

/// Standard-normal scores shaped like the network output for `batch`.
fn random_scores<B: Backend>(
    config: &CrfConfig,
    batch: &PiecewiseBatch<Autodiff<B>>,
    device: &B::Device,
) -> PotentialScores<Autodiff<B>> {
    let scores = |sites: usize, alphabet: usize| {
        Tensor::<Autodiff<B>, 2>::random([sites, alphabet], Distribution::Normal(0.0, 1.0), device)
            .require_grad()
    };
    let joint = config.num_joint_classes();

    PotentialScores::new(
        scores(batch.labels_unary.dims()[0], config.num_classes),
        scores(batch.labels_surr.dims()[0], joint),
        scores(batch.labels_ab.dims()[0], joint),
    )
}

fn l2<B: Backend>(scores: &PotentialScores<B>) -> Tensor<B, 1> {
    scores.unary.clone().powf_scalar(2.0).sum()
        + scores.surrounding.clone().powf_scalar(2.0).sum()
        + scores.above_below.clone().powf_scalar(2.0).sum()
}
