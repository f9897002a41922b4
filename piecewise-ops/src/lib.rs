//! Tensor operations for piecewise CRF training.
//!
//! Burn ships a softmax and a generic clamp, but the piecewise likelihood needs a
//! handful of composed operations with fixed numerical guarantees: a float one-hot
//! encoding for joint label alphabets, a log-softmax whose probabilities are clamped
//! away from zero, and an upper-only clamp for class-balancing weights.

use burn::prelude::*;

mod log_prob;
mod one_hot;
mod weights;

pub use log_prob::{ClampedLogSoftmax, DEFAULT_PROB_FLOOR, clamped_log_softmax};
pub use one_hot::{one_hot, select_log_likelihood};
pub use weights::{DEFAULT_WEIGHT_CLAMP, clamp_weights};

/// Piecewise operations on per-site score tensors of shape `[sites, classes]`.
pub trait TensorPiecewiseOps<B: Backend> {
    /// Log-likelihood of each site's label under clamped softmax probabilities.
    ///
    /// Returns a `[sites]` tensor with values in `[ln(prob_floor), 0]`.
    fn site_log_likelihood(self, labels: Tensor<B, 1, Int>, prob_floor: f64) -> Tensor<B, 1>;
}

impl<B: Backend> TensorPiecewiseOps<B> for Tensor<B, 2> {
    fn site_log_likelihood(self, labels: Tensor<B, 1, Int>, prob_floor: f64) -> Tensor<B, 1> {
        let [_, num_classes] = self.dims();
        let log_probs = self.clamped_log_softmax(prob_floor);
        select_log_likelihood(one_hot(labels, num_classes), log_probs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{
        backend::{Autodiff, ndarray::NdArray},
        tensor::{TensorData, cast::ToElement},
    };

    pub type TestBackend = NdArray<f32>;
    pub type TestAutodiffBackend = Autodiff<NdArray<f32>>;

    #[test]
    fn site_log_likelihood_picks_true_class() {
        let device = Default::default();
        let scores = Tensor::<TestBackend, 2>::from_data(
            TensorData::from([[0.0f32, 0.0], [4.0, 0.0]]),
            &device,
        );
        let labels = Tensor::<TestBackend, 1, Int>::from_data(TensorData::from([1, 0]), &device);

        let values = scores
            .site_log_likelihood(labels, DEFAULT_PROB_FLOOR)
            .into_data()
            .to_vec::<f32>()
            .unwrap();

        let expected_first = 0.5f32.ln();
        let expected_second = (4.0f32.exp() / (4.0f32.exp() + 1.0)).ln();
        assert!((values[0] - expected_first).abs() < 1e-5);
        assert!((values[1] - expected_second).abs() < 1e-5);
    }

    #[test]
    fn site_log_likelihood_gradient_is_finite_for_saturated_scores() {
        let device = Default::default();
        let scores = Tensor::<TestAutodiffBackend, 2>::from_data(
            TensorData::from([[1000.0f32, -1000.0], [-1000.0, 1000.0]]),
            &device,
        )
        .require_grad();
        // Second site is labelled against its saturated winner.
        let labels =
            Tensor::<TestAutodiffBackend, 1, Int>::from_data(TensorData::from([0, 0]), &device);

        let loss = scores
            .clone()
            .site_log_likelihood(labels, DEFAULT_PROB_FLOOR)
            .sum()
            .neg();
        assert!(loss.clone().into_scalar().to_f64().is_finite());

        let grads = loss.backward();
        let grad = scores.grad(&grads).expect("scores require grad");
        let values = grad.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|g| g.is_finite()), "{values:?}");
    }
}
