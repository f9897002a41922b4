//! Explicit collection of the loss terms that make up one training step.

use burn::tensor::{Tensor, backend::Backend};

/// Name under which the piecewise likelihood is registered.
pub const PIECEWISE_LOSS: &str = "piecewise_nll";

/// Name of the summed objective.
pub const TOTAL_LOSS: &str = "total_loss";

/// Named loss terms and regularization terms for one step.
///
/// Built while the step is assembled and read once by [`LossRegistry::sum_all`].
#[derive(Debug, Clone)]
pub struct LossRegistry<B: Backend> {
    losses: Vec<(String, Tensor<B, 1>)>,
    regularization: Vec<(String, Tensor<B, 1>)>,
    device: B::Device,
}

impl<B: Backend> LossRegistry<B> {
    pub fn new(device: &B::Device) -> Self {
        Self {
            losses: Vec::new(),
            regularization: Vec::new(),
            device: device.clone(),
        }
    }

    /// Adds a loss term. Loss terms are tracked by the moving averages.
    pub fn register(&mut self, name: impl Into<String>, value: Tensor<B, 1>) {
        self.losses.push((name.into(), value));
    }

    /// Adds a regularization term such as weight decay.
    pub fn register_regularization(&mut self, name: impl Into<String>, value: Tensor<B, 1>) {
        self.regularization.push((name.into(), value));
    }

    pub fn losses(&self) -> &[(String, Tensor<B, 1>)] {
        &self.losses
    }

    pub fn regularization(&self) -> &[(String, Tensor<B, 1>)] {
        &self.regularization
    }

    pub fn len(&self) -> usize {
        self.losses.len() + self.regularization.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of every loss and regularization term, `[1]`. Zero when nothing is registered.
    pub fn sum_all(&self) -> Tensor<B, 1> {
        self.losses
            .iter()
            .chain(&self.regularization)
            .map(|(_, value)| value.clone())
            .reduce(|acc, value| acc + value)
            .unwrap_or_else(|| Tensor::zeros([1], &self.device))
    }
}
