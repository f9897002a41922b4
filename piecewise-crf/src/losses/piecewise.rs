//! Piecewise negative log-likelihood.
//!
//! Full CRF likelihood needs a partition function over every labelling of the image.
//! Piecewise training replaces it with one independently normalized likelihood per
//! potential type:
//!
//! ```text
//! L = Σ_t  -1/N_t Σ_i min(w_i, w_max) · ln clamp(softmax(s_i)[y_i], p_min, 1)
//! ```
//!
//! where `t` ranges over unary, surrounding-pairwise and above/below-pairwise
//! potentials and `N_t` is that type's site count for the whole batch. Dividing each
//! term by its own count keeps the far more numerous pairwise sites from dominating
//! the unary term.

use burn::{
    config::Config,
    module::{Content, DisplaySettings, Module, ModuleDisplay},
    tensor::{Int, Tensor, backend::Backend},
};
use piecewise_ops::{DEFAULT_PROB_FLOOR, DEFAULT_WEIGHT_CLAMP, TensorPiecewiseOps, clamp_weights};

use crate::{
    config::CrfConfig,
    error::{PiecewiseError, PiecewiseResult},
};

/// Configuration for creating a [piecewise loss](PiecewiseLoss).
#[derive(Config, Debug)]
pub struct PiecewiseLossConfig {
    /// Upper bound applied to every class-balancing weight. Default: 100.0
    #[config(default = "DEFAULT_WEIGHT_CLAMP")]
    pub weight_clamp: f64,
    /// Probability floor applied before the logarithm. Default: 1e-6
    #[config(default = "DEFAULT_PROB_FLOOR")]
    pub prob_floor: f64,
}

/// Per-example output sizes declared by the network producing the potentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkShape {
    /// Unary sites per example.
    pub unary_sites: usize,
    /// Unary alphabet size.
    pub num_classes: usize,
    /// Surrounding-neighbourhood sites per example.
    pub surr_sites: usize,
    /// Above/below-neighbourhood sites per example.
    pub ab_sites: usize,
    /// Pairwise alphabet size.
    pub joint_classes: usize,
}

impl NetworkShape {
    /// The shape a network must produce to match records written with `config`.
    pub const fn expected_by(config: &CrfConfig) -> Self {
        Self {
            unary_sites: config.num_unary_sites(),
            num_classes: config.num_classes,
            surr_sites: config.neighbours_surr,
            ab_sites: config.neighbours_ab,
            joint_classes: config.num_joint_classes(),
        }
    }
}

impl PiecewiseLossConfig {
    /// Initialize a [piecewise loss](PiecewiseLoss) for a data pipeline and a network.
    ///
    /// # Errors
    ///
    /// Returns [`PiecewiseError::InvalidConfiguration`] for an unusable configuration
    /// and [`PiecewiseError::ConfigMismatch`] when the network output shape disagrees
    /// with the site counts the records are decoded into.
    pub fn init(
        &self,
        config: &CrfConfig,
        network: &NetworkShape,
    ) -> PiecewiseResult<PiecewiseLoss> {
        config.validate()?;
        self.validate()?;

        let expected = NetworkShape::expected_by(config);
        for (quantity, expected, actual) in [
            ("unary sites per example", expected.unary_sites, network.unary_sites),
            ("unary classes", expected.num_classes, network.num_classes),
            ("surrounding sites per example", expected.surr_sites, network.surr_sites),
            ("above/below sites per example", expected.ab_sites, network.ab_sites),
            ("joint classes", expected.joint_classes, network.joint_classes),
        ] {
            if expected != actual {
                return Err(PiecewiseError::ConfigMismatch {
                    quantity,
                    expected,
                    actual,
                });
            }
        }

        let [unary_sites, surr_sites, ab_sites] = config.batch_site_counts();
        tracing::debug!(
            unary_sites,
            surr_sites,
            ab_sites,
            num_classes = config.num_classes,
            "piecewise loss initialized"
        );

        Ok(PiecewiseLoss {
            weight_clamp: self.weight_clamp,
            prob_floor: self.prob_floor,
            num_classes: config.num_classes,
            unary_sites,
            surr_sites,
            ab_sites,
        })
    }

    fn validate(&self) -> PiecewiseResult<()> {
        if !(self.weight_clamp.is_finite() && self.weight_clamp > 0.0) {
            return Err(PiecewiseError::InvalidConfiguration {
                reason: format!("weight clamp must be positive, got {}", self.weight_clamp),
            });
        }
        if !(self.prob_floor > 0.0 && self.prob_floor <= 1.0) {
            return Err(PiecewiseError::InvalidConfiguration {
                reason: format!("probability floor must lie in (0, 1], got {}", self.prob_floor),
            });
        }
        Ok(())
    }
}

/// Raw, unnormalized potential scores for one batch.
#[derive(Debug, Clone)]
pub struct PotentialScores<B: Backend> {
    /// `[B * N_unary, C]`
    pub unary: Tensor<B, 2>,
    /// `[B * K_surr, C * C]`
    pub surrounding: Tensor<B, 2>,
    /// `[B * K_ab, C * C]`
    pub above_below: Tensor<B, 2>,
}

impl<B: Backend> PotentialScores<B> {
    pub fn new(unary: Tensor<B, 2>, surrounding: Tensor<B, 2>, above_below: Tensor<B, 2>) -> Self {
        Self {
            unary,
            surrounding,
            above_below,
        }
    }

    /// Flattens network outputs laid out as `[..., alphabet]` into `[sites, alphabet]`.
    pub fn from_grids<const DU: usize, const DP: usize>(
        unary: Tensor<B, DU>,
        surrounding: Tensor<B, DP>,
        above_below: Tensor<B, DP>,
    ) -> Self {
        Self::new(
            sites_by_class(unary),
            sites_by_class(surrounding),
            sites_by_class(above_below),
        )
    }
}

fn sites_by_class<B: Backend, const D: usize>(scores: Tensor<B, D>) -> Tensor<B, 2> {
    let alphabet = scores.dims()[D - 1];
    scores.reshape([-1, alphabet as i32])
}

/// Batched labels and class-balancing weights for the three potential types.
#[derive(Debug, Clone)]
pub struct PiecewiseTargets<B: Backend> {
    /// `[B * N_unary]` class ids
    pub labels_unary: Tensor<B, 1, Int>,
    /// `[B * K_surr]` joint class-pair ids
    pub labels_surr: Tensor<B, 1, Int>,
    /// `[B * K_ab]` joint class-pair ids
    pub labels_ab: Tensor<B, 1, Int>,
    /// `[B * N_unary]`
    pub weights_unary: Tensor<B, 1>,
    /// `[B * K_surr]`
    pub weights_surr: Tensor<B, 1>,
    /// `[B * K_ab]`
    pub weights_ab: Tensor<B, 1>,
}

/// The three normalized terms of the piecewise loss, each of shape `[1]`.
#[derive(Debug, Clone)]
pub struct PiecewiseTerms<B: Backend> {
    pub unary: Tensor<B, 1>,
    pub surrounding: Tensor<B, 1>,
    pub above_below: Tensor<B, 1>,
}

impl<B: Backend> PiecewiseTerms<B> {
    /// Sum of the three terms.
    pub fn total(self) -> Tensor<B, 1> {
        self.unary + self.surrounding + self.above_below
    }
}

/// Piecewise CRF negative log-likelihood.
///
/// Site counts are fixed at construction; `forward` asserts that every input matches
/// them.
#[derive(Module, Clone, Debug)]
#[module(custom_display)]
pub struct PiecewiseLoss {
    /// Upper bound applied to class-balancing weights.
    pub weight_clamp: f64,
    /// Probability floor applied before the logarithm.
    pub prob_floor: f64,
    /// Number of classes `C`.
    pub num_classes: usize,
    /// Unary sites in one batch.
    pub unary_sites: usize,
    /// Surrounding-neighbourhood sites in one batch.
    pub surr_sites: usize,
    /// Above/below-neighbourhood sites in one batch.
    pub ab_sites: usize,
}

impl ModuleDisplay for PiecewiseLoss {
    fn custom_settings(&self) -> Option<DisplaySettings> {
        DisplaySettings::new()
            .with_new_line_after_attribute(false)
            .optional()
    }

    fn custom_content(&self, content: Content) -> Option<Content> {
        content
            .add("weight_clamp", &self.weight_clamp)
            .add("prob_floor", &self.prob_floor)
            .add("num_classes", &self.num_classes)
            .optional()
    }
}

impl PiecewiseLoss {
    /// Compute the scalar piecewise loss.
    ///
    /// # Shapes
    ///
    /// - scores: see [`PotentialScores`]
    /// - targets: see [`PiecewiseTargets`]
    /// - output: `[1]`
    pub fn forward<B: Backend>(
        &self,
        scores: PotentialScores<B>,
        targets: PiecewiseTargets<B>,
    ) -> Tensor<B, 1> {
        self.forward_terms(scores, targets).total()
    }

    /// Compute the three normalized terms without summing them.
    pub fn forward_terms<B: Backend>(
        &self,
        scores: PotentialScores<B>,
        targets: PiecewiseTargets<B>,
    ) -> PiecewiseTerms<B> {
        let joint_classes = self.num_classes * self.num_classes;

        PiecewiseTerms {
            unary: self.term(
                "unary",
                scores.unary,
                targets.labels_unary,
                targets.weights_unary,
                self.unary_sites,
                self.num_classes,
            ),
            surrounding: self.term(
                "surrounding",
                scores.surrounding,
                targets.labels_surr,
                targets.weights_surr,
                self.surr_sites,
                joint_classes,
            ),
            above_below: self.term(
                "above/below",
                scores.above_below,
                targets.labels_ab,
                targets.weights_ab,
                self.ab_sites,
                joint_classes,
            ),
        }
    }

    /// Weighted negative log-likelihood of one potential type, averaged over its sites.
    ///
    /// # Shapes
    ///
    /// - scores: `[num_sites, alphabet]`
    /// - labels: `[num_sites]`
    /// - weights: `[num_sites]`
    /// - output: `[1]`
    pub fn term<B: Backend>(
        &self,
        potential: &str,
        scores: Tensor<B, 2>,
        labels: Tensor<B, 1, Int>,
        weights: Tensor<B, 1>,
        num_sites: usize,
        alphabet: usize,
    ) -> Tensor<B, 1> {
        Self::assertions(potential, &scores, &labels, &weights, num_sites, alphabet);

        let log_likelihood = scores.site_log_likelihood(labels, self.prob_floor);
        let weights = clamp_weights(weights, self.weight_clamp);

        (weights * log_likelihood)
            .sum()
            .neg()
            .div_scalar(num_sites as f64)
    }

    fn assertions<B: Backend>(
        potential: &str,
        scores: &Tensor<B, 2>,
        labels: &Tensor<B, 1, Int>,
        weights: &Tensor<B, 1>,
        num_sites: usize,
        alphabet: usize,
    ) {
        assert_eq!(
            scores.dims(),
            [num_sites, alphabet],
            "{potential} scores must have shape [{num_sites}, {alphabet}]"
        );
        assert_eq!(
            labels.dims(),
            [num_sites],
            "{potential} labels must have {num_sites} sites"
        );
        assert_eq!(
            weights.dims(),
            [num_sites],
            "{potential} weights must have {num_sites} sites"
        );
    }
}
