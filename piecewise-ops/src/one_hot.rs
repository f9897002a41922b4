//! # One-hot encoding
//!
//! Float one-hot rows for integer labels. Labels outside `[0, num_classes)` encode to
//! an all-zero row, so they contribute nothing to a selected log-likelihood.

use burn::prelude::*;

/// Encodes `[sites]` labels as a `[sites, num_classes]` float tensor of zeros and ones.
pub fn one_hot<B: Backend>(labels: Tensor<B, 1, Int>, num_classes: usize) -> Tensor<B, 2> {
    let [num_sites] = labels.dims();
    let device = labels.device();

    let classes = Tensor::<B, 1, Int>::arange(0..num_classes as i64, &device)
        .reshape([1, num_classes])
        .repeat_dim(0, num_sites);

    labels
        .reshape([num_sites, 1])
        .repeat_dim(1, num_classes)
        .equal(classes)
        .float()
}

/// Inner product of each one-hot row with its log-probability row.
///
/// # Shapes
///
/// - one_hot: `[sites, classes]`
/// - log_probs: `[sites, classes]`
/// - output: `[sites]`
pub fn select_log_likelihood<B: Backend>(
    one_hot: Tensor<B, 2>,
    log_probs: Tensor<B, 2>,
) -> Tensor<B, 1> {
    assert_eq!(
        one_hot.dims(),
        log_probs.dims(),
        "One-hot labels and log-probabilities must have the same shape"
    );
    (one_hot * log_probs).sum_dim(1).squeeze::<1>(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::TestBackend;
    use burn::tensor::TensorData;

    #[test]
    fn one_hot_sets_a_single_column_per_row() {
        let device = Default::default();
        let labels = Tensor::<TestBackend, 1, Int>::from_data(TensorData::from([0, 3, 2]), &device);

        let encoded = one_hot(labels, 4);

        assert_eq!(encoded.dims(), [3, 4]);
        assert_eq!(
            encoded.into_data().to_vec::<f32>().unwrap(),
            vec![
                1.0, 0.0, 0.0, 0.0, //
                0.0, 0.0, 0.0, 1.0, //
                0.0, 0.0, 1.0, 0.0,
            ]
        );
    }

    #[test]
    fn one_hot_out_of_range_label_is_all_zero() {
        let device = Default::default();
        let labels = Tensor::<TestBackend, 1, Int>::from_data(TensorData::from([5, -1]), &device);

        let encoded = one_hot(labels, 4);

        assert!(encoded
            .into_data()
            .to_vec::<f32>()
            .unwrap()
            .iter()
            .all(|v| *v == 0.0));
    }

    #[test]
    fn select_log_likelihood_sums_the_selected_column() {
        let device = Default::default();
        let one_hot = Tensor::<TestBackend, 2>::from_data(
            TensorData::from([[0.0f32, 1.0], [1.0, 0.0]]),
            &device,
        );
        let log_probs = Tensor::<TestBackend, 2>::from_data(
            TensorData::from([[-0.1f32, -2.5], [-0.7, -0.3]]),
            &device,
        );

        let selected = select_log_likelihood(one_hot, log_probs);

        assert_eq!(selected.into_data().to_vec::<f32>().unwrap(), vec![-2.5, -0.7]);
    }

    #[test]
    #[should_panic = "must have the same shape"]
    fn select_log_likelihood_rejects_mismatched_shapes() {
        let device = Default::default();
        let one_hot = Tensor::<TestBackend, 2>::zeros([2, 3], &device);
        let log_probs = Tensor::<TestBackend, 2>::zeros([2, 4], &device);
        let _ = select_log_likelihood(one_hot, log_probs);
    }
}
