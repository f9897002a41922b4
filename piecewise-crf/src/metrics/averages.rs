//! Exponential moving averages of named loss values.
//!
//! Averages start from zero and are bias-corrected, so the first reported average of
//! a term equals its first raw value:
//!
//! ```text
//! s_t = decay * s_{t-1} + (1 - decay) * x_t
//! average_t = s_t / (1 - decay^t)
//! ```

use std::collections::BTreeMap;

use burn::config::Config;
use serde::Serialize;

/// Configuration for creating [loss averages](LossAverages).
#[derive(Config, Debug)]
pub struct LossAveragesConfig {
    /// Weight of the previous average at each update. Default: 0.9
    #[config(default = 0.9)]
    pub decay: f64,
}

impl LossAveragesConfig {
    /// Initialize empty [loss averages](LossAverages).
    pub fn init(&self) -> LossAverages {
        self.assertions();
        LossAverages {
            decay: self.decay,
            entries: BTreeMap::new(),
        }
    }

    fn assertions(&self) {
        assert!(
            (0.0..1.0).contains(&self.decay),
            "Decay for LossAverages must lie in [0, 1), got {}",
            self.decay
        );
    }
}

/// Raw and averaged value of one loss term after an update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LossSummary {
    pub name: String,
    pub raw: f64,
    pub average: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Ema {
    biased: f64,
    steps: i32,
}

/// Moving averages keyed by loss name.
#[derive(Debug, Clone)]
pub struct LossAverages {
    decay: f64,
    entries: BTreeMap<String, Ema>,
}

impl Default for LossAverages {
    fn default() -> Self {
        LossAveragesConfig::new().init()
    }
}

impl LossAverages {
    pub const fn decay(&self) -> f64 {
        self.decay
    }

    /// Folds `value` into the average for `name` and reports both.
    pub fn update(&mut self, name: &str, value: f64) -> LossSummary {
        let decay = self.decay;
        let ema = self.entries.entry(name.to_owned()).or_default();
        ema.biased = decay.mul_add(ema.biased, (1.0 - decay) * value);
        ema.steps = ema.steps.saturating_add(1);

        LossSummary {
            name: name.to_owned(),
            raw: value,
            average: Self::debiased(decay, ema),
        }
    }

    /// Current average for `name`, if it has been updated at least once.
    pub fn average(&self, name: &str) -> Option<f64> {
        self.entries
            .get(name)
            .map(|ema| Self::debiased(self.decay, ema))
    }

    /// Names of every tracked term, in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn reset(&mut self) {
        self.entries.clear();
    }

    fn debiased(decay: f64, ema: &Ema) -> f64 {
        ema.biased / (1.0 - decay.powi(ema.steps))
    }
}
