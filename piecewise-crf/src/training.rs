//! One optimization step of the piecewise objective.
//!
//! [`LossStep`] computes the piecewise likelihood, registers it next to the caller's
//! regularization terms, sums the registry and updates the moving averages. The
//! returned total stays on the graph so the caller can run `backward` on it.

use burn::tensor::{Tensor, backend::Backend, cast::ToElement};

use crate::{
    losses::{
        LossRegistry, PIECEWISE_LOSS, PiecewiseLoss, PiecewiseTargets, PiecewiseTerms,
        PotentialScores, TOTAL_LOSS,
    },
    metrics::{LossAverages, LossSummary},
};

/// Output of one [`LossStep::run`].
#[derive(Debug, Clone)]
pub struct StepReport<B: Backend> {
    /// 1-based step counter.
    pub step: usize,
    /// Objective to differentiate, `[1]`.
    pub total: Tensor<B, 1>,
    /// The three normalized piecewise terms, `[1]` each.
    pub terms: PiecewiseTerms<B>,
    /// Raw and averaged value of every registered loss, followed by the total.
    pub summaries: Vec<LossSummary>,
}

impl<B: Backend> StepReport<B> {
    pub fn summary(&self, name: &str) -> Option<&LossSummary> {
        self.summaries.iter().find(|summary| summary.name == name)
    }
}

/// Drives the loss of consecutive training steps and owns their moving averages.
#[derive(Debug, Clone)]
pub struct LossStep {
    loss: PiecewiseLoss,
    averages: LossAverages,
    step: usize,
}

impl LossStep {
    pub const fn new(loss: PiecewiseLoss, averages: LossAverages) -> Self {
        Self {
            loss,
            averages,
            step: 0,
        }
    }

    pub const fn loss(&self) -> &PiecewiseLoss {
        &self.loss
    }

    pub const fn averages(&self) -> &LossAverages {
        &self.averages
    }

    /// Runs the loss for one batch.
    ///
    /// `regularization` holds externally computed terms (for example weight decay)
    /// that are added to the total but not averaged on their own.
    pub fn run<B: Backend>(
        &mut self,
        scores: PotentialScores<B>,
        targets: PiecewiseTargets<B>,
        regularization: Vec<(String, Tensor<B, 1>)>,
    ) -> StepReport<B> {
        self.step += 1;
        let device = scores.unary.device();

        let terms = self.loss.forward_terms(scores, targets);

        let mut registry = LossRegistry::new(&device);
        registry.register(PIECEWISE_LOSS, terms.clone().total());
        for (name, value) in regularization {
            registry.register_regularization(name, value);
        }
        let total = registry.sum_all();

        let mut summaries = Vec::with_capacity(registry.losses().len() + 1);
        for (name, value) in registry.losses() {
            let raw = value.clone().into_scalar().to_f64();
            summaries.push(self.averages.update(name, raw));
        }
        let total_summary = self
            .averages
            .update(TOTAL_LOSS, total.clone().into_scalar().to_f64());

        tracing::info!(
            step = self.step,
            loss = total_summary.raw,
            loss_avg = total_summary.average,
            regularization_terms = registry.regularization().len(),
            "loss step"
        );
        for summary in &summaries {
            tracing::debug!(
                step = self.step,
                name = %summary.name,
                raw = summary.raw,
                average = summary.average,
                "loss term"
            );
        }
        summaries.push(total_summary);

        StepReport {
            step: self.step,
            total,
            terms,
            summaries,
        }
    }
}

#[cfg(test)]
mod tests {
    use burn::tensor::{Int, TensorData};

    use super::*;
    use crate::{
        config::CrfConfig,
        losses::{NetworkShape, PiecewiseLossConfig},
        metrics::LossAveragesConfig,
        tests::{TestAutodiffBackend, TestBackend},
    };

    fn scenario_config() -> CrfConfig {
        CrfConfig::new(2, 2, 1, 1, 2, 1, 2, 1)
    }

    fn loss_step() -> LossStep {
        let config = scenario_config();
        let loss = PiecewiseLossConfig::new()
            .init(&config, &NetworkShape::expected_by(&config))
            .unwrap();
        LossStep::new(loss, LossAveragesConfig::new().init())
    }

    fn inputs<B: Backend>(
        device: &B::Device,
    ) -> (PotentialScores<B>, PiecewiseTargets<B>) {
        let ints = |values: Vec<i64>| {
            let len = values.len();
            Tensor::<B, 1, Int>::from_data(TensorData::new(values, [len]), device)
        };
        let floats = |values: Vec<f32>| {
            let len = values.len();
            Tensor::<B, 1>::from_data(TensorData::new(values, [len]), device)
        };

        let scores = PotentialScores::new(
            Tensor::from_data(
                TensorData::from([[2.0f32, 0.0], [0.0, 2.0], [2.0, 0.0], [0.0, 2.0]]),
                device,
            ),
            Tensor::from_data(
                TensorData::from([[3.0f32, 0.0, 0.0, 0.0], [0.0, 0.0, 0.0, 3.0]]),
                device,
            ),
            Tensor::from_data(TensorData::from([[1.0f32, 0.0, 0.0, 0.0]]), device),
        );
        let targets = PiecewiseTargets {
            labels_unary: ints(vec![0, 1, 0, 1]),
            labels_surr: ints(vec![0, 3]),
            labels_ab: ints(vec![0]),
            weights_unary: floats(vec![1.0; 4]),
            weights_surr: floats(vec![2.0, 2.0]),
            weights_ab: floats(vec![1.0]),
        };
        (scores, targets)
    }

    #[test]
    fn total_adds_regularization_to_piecewise_loss() {
        let device = Default::default();
        let mut step = loss_step();

        let (scores, targets) = inputs::<TestBackend>(&device);
        let plain = step.run(scores, targets, Vec::new());

        let (scores, targets) = inputs::<TestBackend>(&device);
        let decay = Tensor::from_floats([0.25], &device);
        let regularized = step.run(scores, targets, vec![("weight_decay".to_owned(), decay)]);

        let plain_total = plain.total.into_scalar().to_f64();
        let regularized_total = regularized.total.into_scalar().to_f64();
        assert!((regularized_total - plain_total - 0.25).abs() < 1e-6);
        assert_eq!(regularized.step, 2);
    }

    #[test]
    fn summaries_cover_piecewise_loss_and_total() {
        let device = Default::default();
        let mut step = loss_step();
        let (scores, targets) = inputs::<TestBackend>(&device);

        let report = step.run(scores, targets, Vec::new());

        let names: Vec<&str> = report.summaries.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec![PIECEWISE_LOSS, TOTAL_LOSS]);

        let total = report.summary(TOTAL_LOSS).unwrap();
        assert!(total.raw.is_finite() && total.raw > 0.0);
        assert!((total.average - total.raw).abs() < 1e-9);
        assert_eq!(step.averages().average(TOTAL_LOSS), Some(total.average));
    }

    #[test]
    fn backward_through_total_yields_finite_gradients() {
        let device = Default::default();
        let mut step = loss_step();
        let (scores, targets) = inputs::<TestAutodiffBackend>(&device);
        let unary = scores.unary.clone().require_grad();
        let scores = PotentialScores { unary: unary.clone(), ..scores };

        let report = step.run(scores, targets, Vec::new());
        let grads = report.total.backward();
        let grad = unary.grad(&grads).unwrap();

        assert_eq!(grad.dims(), [4, 2]);
        let values = grad.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| v.is_finite()));
        // Raising the score of the true class must lower the loss.
        assert!(values[0] < 0.0 && values[3] < 0.0, "{values:?}");
    }
}
