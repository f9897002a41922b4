//! Dataset and batcher for piecewise CRF training records.
//!
//! Records are read from TFRecord files once and kept as raw bytes; each
//! [`Dataset::get`] decodes a single record. Following Burn's convention the dataset
//! returns raw arrays and the [`PiecewiseBatcher`] creates tensors on the device.

use std::{
    marker::PhantomData,
    path::{Path, PathBuf},
};

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    tensor::{Int, Tensor, backend::Backend},
};
use walkdir::WalkDir;

use crate::{
    config::CrfConfig,
    error::{PiecewiseError, PiecewiseResult},
    losses::PiecewiseTargets,
    record::{DecodedExample, RecordDecoder, TFRECORD_EXTENSION, read_tfrecord_file},
};

/// In-memory collection of serialized examples decoded on access.
#[derive(Debug, Clone)]
pub struct PiecewiseDataset {
    decoder: RecordDecoder,
    records: Vec<Vec<u8>>,
}

impl PiecewiseDataset {
    /// Wraps already-loaded serialized records.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration fails validation.
    pub fn from_records(config: &CrfConfig, records: Vec<Vec<u8>>) -> PiecewiseResult<Self> {
        Ok(Self {
            decoder: RecordDecoder::new(config)?,
            records,
        })
    }

    /// Reads every record of the given TFRecord files, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be read or has a corrupt frame.
    pub fn from_files<P: AsRef<Path>>(config: &CrfConfig, files: &[P]) -> PiecewiseResult<Self> {
        let decoder = RecordDecoder::new(config)?;
        let mut records = Vec::new();
        for file in files {
            let file_records = read_tfrecord_file(file)?;
            tracing::debug!(
                path = %file.as_ref().display(),
                records = file_records.len(),
                "loaded record file"
            );
            records.extend(file_records);
        }
        Ok(Self { decoder, records })
    }

    /// Reads every `.tfrecords` file below `root`, in sorted path order.
    ///
    /// # Errors
    ///
    /// Returns [`PiecewiseError::DatasetError`] when no record file is found, and
    /// propagates read errors otherwise.
    pub fn from_dir(config: &CrfConfig, root: impl AsRef<Path>) -> PiecewiseResult<Self> {
        let root = root.as_ref();
        let files = record_files(root)?;
        if files.is_empty() {
            return Err(PiecewiseError::DatasetError {
                message: format!(
                    "No .{TFRECORD_EXTENSION} files found in {}",
                    root.display()
                ),
            });
        }

        let dataset = Self::from_files(config, &files)?;
        tracing::info!(
            root = %root.display(),
            files = files.len(),
            records = dataset.len(),
            "piecewise dataset loaded"
        );
        Ok(dataset)
    }

    pub const fn decoder(&self) -> &RecordDecoder {
        &self.decoder
    }

    /// Indices of records that fail to decode.
    ///
    /// Burn's data loader ends an epoch at the first `None` from [`Dataset::get`], so
    /// callers that need every record should check this before batching.
    pub fn undecodable_indices(&self) -> Vec<usize> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, record)| self.decoder.decode(record).is_err())
            .map(|(index, _)| index)
            .collect()
    }
}

fn record_files(root: &Path) -> PiecewiseResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|e| PiecewiseError::DatasetError {
            message: format!("Failed to walk {}: {e}", root.display()),
        })?;
        let is_record = entry
            .path()
            .extension()
            .is_some_and(|ext| ext == TFRECORD_EXTENSION);
        if entry.file_type().is_file() && is_record {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

impl Dataset<DecodedExample> for PiecewiseDataset {
    fn get(&self, index: usize) -> Option<DecodedExample> {
        let record = self.records.get(index)?;
        match self.decoder.decode(record) {
            Ok(example) => Some(example),
            Err(e) => {
                tracing::warn!(index, error = %e, "skipping undecodable record");
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}

/// A batch of decoded examples, ready for the network and the loss.
#[derive(Debug, Clone)]
pub struct PiecewiseBatch<B: Backend> {
    /// `[B, H, W, D]`
    pub images: Tensor<B, 4>,
    /// `[B, H * W]` full-resolution labels
    pub labels_orig: Tensor<B, 2, Int>,
    /// `[B * N_unary]`
    pub labels_unary: Tensor<B, 1, Int>,
    /// `[B * K_surr]`
    pub labels_surr: Tensor<B, 1, Int>,
    /// `[B * K_ab]`
    pub labels_ab: Tensor<B, 1, Int>,
    /// `[B * N_unary]`
    pub weights_unary: Tensor<B, 1>,
    /// `[B * K_surr]`
    pub weights_surr: Tensor<B, 1>,
    /// `[B * K_ab]`
    pub weights_ab: Tensor<B, 1>,
    pub names: Vec<String>,
}

impl<B: Backend> PiecewiseBatch<B> {
    /// Labels and weights in the layout the loss expects.
    pub fn targets(&self) -> PiecewiseTargets<B> {
        PiecewiseTargets {
            labels_unary: self.labels_unary.clone(),
            labels_surr: self.labels_surr.clone(),
            labels_ab: self.labels_ab.clone(),
            weights_unary: self.weights_unary.clone(),
            weights_surr: self.weights_surr.clone(),
            weights_ab: self.weights_ab.clone(),
        }
    }
}

/// Stacks images and concatenates per-site arrays along the site axis.
///
/// Site `i` of example `b` ends up at row `b * N + i`, which is the order the network
/// flattens its `[B, N, alphabet]` outputs in.
#[derive(Clone, Default)]
pub struct PiecewiseBatcher<B: Backend> {
    _phantom: PhantomData<B>,
}

impl<B: Backend> PiecewiseBatcher<B> {
    pub const fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<B: Backend> Batcher<B, DecodedExample, PiecewiseBatch<B>> for PiecewiseBatcher<B> {
    fn batch(&self, items: Vec<DecodedExample>, device: &B::Device) -> PiecewiseBatch<B> {
        let batch_size = items.len();

        let mut images = Vec::with_capacity(batch_size);
        let mut labels_orig = Vec::with_capacity(batch_size);
        let mut labels_unary = Vec::with_capacity(batch_size);
        let mut labels_surr = Vec::with_capacity(batch_size);
        let mut labels_ab = Vec::with_capacity(batch_size);
        let mut weights_unary = Vec::with_capacity(batch_size);
        let mut weights_surr = Vec::with_capacity(batch_size);
        let mut weights_ab = Vec::with_capacity(batch_size);
        let mut names = Vec::with_capacity(batch_size);

        for item in items {
            images.push(Tensor::<B, 3>::from_data(item.image, device));
            labels_orig.push(Tensor::<B, 1, Int>::from_data(item.labels_orig, device));
            labels_unary.push(Tensor::<B, 1, Int>::from_data(item.labels_unary, device));
            labels_surr.push(Tensor::<B, 1, Int>::from_data(item.labels_surr, device));
            labels_ab.push(Tensor::<B, 1, Int>::from_data(item.labels_ab, device));
            weights_unary.push(Tensor::<B, 1>::from_data(item.weights_unary, device));
            weights_surr.push(Tensor::<B, 1>::from_data(item.weights_surr, device));
            weights_ab.push(Tensor::<B, 1>::from_data(item.weights_ab, device));
            names.push(item.name);
        }

        PiecewiseBatch {
            images: Tensor::stack(images, 0),
            labels_orig: Tensor::stack(labels_orig, 0),
            labels_unary: Tensor::cat(labels_unary, 0),
            labels_surr: Tensor::cat(labels_surr, 0),
            labels_ab: Tensor::cat(labels_ab, 0),
            weights_unary: Tensor::cat(weights_unary, 0),
            weights_surr: Tensor::cat(weights_surr, 0),
            weights_ab: Tensor::cat(weights_ab, 0),
            names,
        }
    }
}
