// THEORY:
// The `preprocessor` turns one 8-bit channel into a clean binary mask: cells white,
// everything else black. It is a fixed, ordered chain of in-place transforms over a
// private working copy. The order matters and is never rearranged.
//
// Key architectural principles:
// 1.  **Resolved Up Front**: The threshold strategy is resolved and all parameters are
//     validated when the preprocessor is built. `preprocess` itself cannot fail.
// 2.  **Ordered Stages**: background subtraction, threshold, despeckle, blur, and a
//     final global Otsu that re-binarises whatever the blur softened.
// 3.  **Stateless**: The preprocessor holds only configuration, so one instance can be
//     shared by every worker.

use crate::config::PreprocessingParameters;
use crate::core_modules::background::subtract_background;
use crate::core_modules::rank_window::median_filter;
use crate::core_modules::threshold::{ThresholdStrategy, threshold_global};
use crate::error::Result;
use image::GrayImage;
use image::imageops;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ImagePreprocessor {
    params: PreprocessingParameters,
    strategy: ThresholdStrategy,
}

impl ImagePreprocessor {
    pub fn new(params: PreprocessingParameters) -> Result<Self> {
        params.validate()?;
        let strategy = params.threshold_strategy()?;
        Ok(Self { params, strategy })
    }

    pub fn params(&self) -> &PreprocessingParameters {
        &self.params
    }

    pub fn strategy(&self) -> ThresholdStrategy {
        self.strategy
    }

    /// Runs every enabled stage on `image`, leaving a 0/255 mask behind.
    pub fn preprocess(&self, image: &mut GrayImage) {
        // --- 1. Background ---
        if self.params.should_subtract_background {
            debug!(radius = self.params.largest_cell_diameter, "Subtracting rolling-ball background");
            subtract_background(image, self.params.largest_cell_diameter);
        }

        // --- 2. Threshold ---
        debug!(strategy = ?self.strategy, "Thresholding");
        self.strategy.apply(image);

        // --- 3. Despeckle ---
        if self.params.should_despeckle {
            debug!(radius = self.params.despeckle_radius, "Despeckling");
            *image = median_filter(image, self.params.despeckle_radius);
        }

        // --- 4. Blur ---
        if self.params.should_gaussian_blur {
            debug!(sigma = self.params.gaussian_blur_sigma, "Applying gaussian blur");
            *image = imageops::blur(&*image, self.params.gaussian_blur_sigma as f32);
        }

        // --- 5. Re-threshold ---
        threshold_global(image);
    }
}
