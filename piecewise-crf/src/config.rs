use std::{fs, path::Path};

use burn::prelude::*;

use crate::error::{PiecewiseError, PiecewiseResult};

/// Geometry and label-alphabet settings shared by the record decoder and the loss.
///
/// Every field is required; there is no geometry that is safe to assume. The two
/// neighbour counts are published by the generator that enumerated the pairwise
/// neighbourhoods when the records were written.
#[derive(Config, Debug, PartialEq, Eq)]
pub struct CrfConfig {
    /// Image height in pixels.
    pub img_height: usize,
    /// Image width in pixels.
    pub img_width: usize,
    /// Number of image channels.
    pub img_depth: usize,
    /// Ratio between the image resolution and the unary output grid.
    pub subsample_factor: usize,
    /// Number of semantic classes `C`.
    pub num_classes: usize,
    /// Examples per batch.
    pub batch_size: usize,
    /// Pixel pairs in the surrounding neighbourhood of one example.
    pub neighbours_surr: usize,
    /// Pixel pairs in the above/below neighbourhood of one example.
    pub neighbours_ab: usize,
}

impl CrfConfig {
    /// Checks that the configuration describes a usable geometry.
    ///
    /// # Errors
    ///
    /// Returns [`PiecewiseError::InvalidConfiguration`] when a size is zero, when the
    /// subsample factor does not divide the image, or when `C * C`, `H * W * D` or a
    /// batch site count overflows.
    pub fn validate(&self) -> PiecewiseResult<()> {
        let sizes = [
            ("img_height", self.img_height),
            ("img_width", self.img_width),
            ("img_depth", self.img_depth),
            ("subsample_factor", self.subsample_factor),
            ("num_classes", self.num_classes),
            ("batch_size", self.batch_size),
            ("neighbours_surr", self.neighbours_surr),
            ("neighbours_ab", self.neighbours_ab),
        ];
        if let Some((name, _)) = sizes.iter().find(|(_, value)| *value == 0) {
            return Err(PiecewiseError::InvalidConfiguration {
                reason: format!("{name} must be positive"),
            });
        }

        if self.img_height % self.subsample_factor != 0
            || self.img_width % self.subsample_factor != 0
        {
            return Err(PiecewiseError::InvalidConfiguration {
                reason: format!(
                    "subsample factor {} must divide the image size {}x{}",
                    self.subsample_factor, self.img_height, self.img_width
                ),
            });
        }

        if self.num_classes.checked_mul(self.num_classes).is_none() {
            return Err(PiecewiseError::InvalidConfiguration {
                reason: format!("joint alphabet of {} classes overflows", self.num_classes),
            });
        }

        let image_len = self
            .img_height
            .checked_mul(self.img_width)
            .and_then(|pixels| pixels.checked_mul(self.img_depth));
        if image_len.is_none() {
            return Err(PiecewiseError::InvalidConfiguration {
                reason: format!(
                    "image of {}x{}x{} elements overflows",
                    self.img_height, self.img_width, self.img_depth
                ),
            });
        }

        // Cannot overflow once H * W fits.
        let unary_sites =
            (self.img_height / self.subsample_factor) * (self.img_width / self.subsample_factor);
        let widest = unary_sites
            .max(self.neighbours_surr)
            .max(self.neighbours_ab);
        if self.batch_size.checked_mul(widest).is_none() {
            return Err(PiecewiseError::InvalidConfiguration {
                reason: format!(
                    "batch of {} examples with {widest} sites each overflows",
                    self.batch_size
                ),
            });
        }

        Ok(())
    }

    /// Pixels in one full-resolution image.
    pub const fn num_pixels(&self) -> usize {
        self.img_height * self.img_width
    }

    /// Elements in one decoded image, `H * W * D`.
    pub const fn image_len(&self) -> usize {
        self.img_height * self.img_width * self.img_depth
    }

    /// Unary sites per example on the subsampled grid.
    pub const fn num_unary_sites(&self) -> usize {
        (self.img_height / self.subsample_factor) * (self.img_width / self.subsample_factor)
    }

    /// Size of the joint class-pair alphabet, `C * C`.
    pub const fn num_joint_classes(&self) -> usize {
        self.num_classes * self.num_classes
    }

    /// Site counts for a whole batch, in unary, surrounding, above/below order.
    pub const fn batch_site_counts(&self) -> [usize; 3] {
        [
            self.batch_size * self.num_unary_sites(),
            self.batch_size * self.neighbours_surr,
            self.batch_size * self.neighbours_ab,
        ]
    }

    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> PiecewiseResult<Self> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path).map_err(|source| PiecewiseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&config_str).map_err(|e| PiecewiseError::InvalidConfiguration {
            reason: format!("{}: {e}", path.display()),
        })
    }

    /// Saves this configuration to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> PiecewiseResult<()> {
        let path = path.as_ref();
        let config_str =
            serde_json::to_string_pretty(self).map_err(|e| PiecewiseError::InvalidConfiguration {
                reason: e.to_string(),
            })?;
        fs::write(path, config_str).map_err(|source| PiecewiseError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Joint class-pair id of a reference pixel labelled `c1` and its neighbour labelled `c2`.
pub const fn joint_label(c1: usize, c2: usize, num_classes: usize) -> usize {
    c1 * num_classes + c2
}

/// Splits a joint class-pair id back into `(c1, c2)`.
pub const fn split_joint_label(id: usize, num_classes: usize) -> (usize, usize) {
    (id / num_classes, id % num_classes)
}
