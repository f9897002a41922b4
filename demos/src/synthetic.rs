//! Synthetic training examples.
//!
//! Pixel labels are drawn at random on the selected backend; every derived array is
//! then computed from them, so the unary and pairwise labels of an example agree with
//! each other the way generated training data does.

use anyhow::{Result, anyhow};
use burn::tensor::{Distribution, Tensor, backend::Backend};
use piecewise_crf::{CrfConfig, joint_label, record::StoredExample};

/// Builds one random example named `name` for `config`.
///
/// # Errors
///
/// Returns an error if random data cannot be read back from the device.
pub fn example<B: Backend>(
    config: &CrfConfig,
    name: &str,
    device: &B::Device,
) -> Result<StoredExample> {
    let classes = config.num_classes;
    let pixels = config.num_pixels();

    let image = Tensor::<B, 1>::random([config.image_len()], Distribution::Default, device)
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow!("failed to read image data: {e:?}"))?;

    let labels_orig = Tensor::<B, 1>::random(
        [pixels],
        Distribution::Uniform(0.0, classes as f64),
        device,
    )
    .floor()
    .clamp(0.0, (classes - 1) as f64)
    .int()
    .into_data()
    .convert::<i32>()
    .to_vec::<i32>()
    .map_err(|e| anyhow!("failed to read label data: {e:?}"))?;

    let labels_unary = subsample(config, &labels_orig);
    let labels_surr = pair_labels(config, &labels_orig, config.neighbours_surr, 1);
    let labels_ab = pair_labels(config, &labels_orig, config.neighbours_ab, config.img_width);

    Ok(StoredExample {
        height: i64::try_from(config.img_height)?,
        width: i64::try_from(config.img_width)?,
        depth: i64::try_from(config.img_depth)?,
        name: name.to_owned(),
        image,
        weights_unary: balanced_weights(&labels_unary, classes),
        weights_surr: balanced_weights(&labels_surr, config.num_joint_classes()),
        weights_ab: balanced_weights(&labels_ab, config.num_joint_classes()),
        labels_unary,
        labels_orig,
        labels_surr,
        labels_ab,
    })
}

/// Labels of the top-left pixel of every subsampling cell.
fn subsample(config: &CrfConfig, labels_orig: &[i32]) -> Vec<i32> {
    let s = config.subsample_factor;
    let rows = config.img_height / s;
    let cols = config.img_width / s;
    (0..rows)
        .flat_map(|r| (0..cols).map(move |c| labels_orig[r * s * config.img_width + c * s]))
        .collect()
}

/// Joint labels of `count` pixel pairs, each pixel paired with the one `offset`
/// positions after it in row-major order.
fn pair_labels(config: &CrfConfig, labels_orig: &[i32], count: usize, offset: usize) -> Vec<i32> {
    let pixels = labels_orig.len();
    (0..count)
        .map(|k| {
            let first = k % pixels;
            let second = (first + offset) % pixels;
            let id = joint_label(
                labels_orig[first] as usize,
                labels_orig[second] as usize,
                config.num_classes,
            );
            id as i32
        })
        .collect()
}

/// Inverse-frequency weights, `n / (alphabet * count[label])`.
fn balanced_weights(labels: &[i32], alphabet: usize) -> Vec<f32> {
    let mut counts = vec![0usize; alphabet];
    for &label in labels {
        counts[label as usize] += 1;
    }
    let total = labels.len() as f32;
    labels
        .iter()
        .map(|&label| total / (alphabet as f32 * counts[label as usize] as f32))
        .collect()
}
