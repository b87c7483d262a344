// THEORY:
// The `config` module holds everything the engine needs to analyse an image, as one
// plain value. Nothing is read from ambient or global state: a worker gets a
// `TransductionConfig`, validates it once, and every stage reads its own section.
//
// Key architectural principles:
// 1.  **Serde Defaults**: Every struct deserialises with `#[serde(default)]`, so a JSON
//     file only names what it changes.
// 2.  **The Range Owns the Radii**: `cell_diameter_range.largest` is the rolling-ball
//     radius and the upper bound of the local threshold radius.
//     `resolved_preprocessing` applies that before any stage is built, so a config
//     that only changes the range still changes the analysis.
// 3.  **Validate Once**: `validate` rejects bad ranges, radii and sigmas up front with
//     `InvalidConfiguration`. Later stages assume a valid configuration.

use crate::core_modules::colocalizer::OverlapRule;
use crate::core_modules::threshold::{ThresholdAlgorithm, ThresholdLocality, ThresholdStrategy};
use crate::error::{ColocError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Everything needed to analyse one multi-channel image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransductionConfig {
    /// 0-based index of the morphology channel, whose cells are counted.
    pub target_channel: usize,
    /// 0-based index of the channel carrying the transduction signal.
    pub transduced_channel: usize,
    pub cell_diameter_range: CellDiameterRange,
    pub preprocessing: PreprocessingParameters,
    pub overlap_rule: OverlapRule,
}

/// Expected cell diameters in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CellDiameterRange {
    pub smallest: f64,
    pub largest: f64,
}

/// Options of the preprocessing stage, applied in a fixed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingParameters {
    pub should_subtract_background: bool,
    /// Drives the rolling-ball radius. Inside a `TransductionConfig` it follows
    /// `cell_diameter_range.largest`.
    pub largest_cell_diameter: f64,
    pub threshold_locality: ThresholdLocality,
    pub local_threshold_algorithm: ThresholdAlgorithm,
    pub local_threshold_radius: u32,
    pub should_despeckle: bool,
    pub despeckle_radius: f64,
    pub should_gaussian_blur: bool,
    pub gaussian_blur_sigma: f64,
}

impl Default for TransductionConfig {
    fn default() -> Self {
        let cell_diameter_range = CellDiameterRange::default();
        Self {
            target_channel: 0,
            transduced_channel: 1,
            cell_diameter_range,
            preprocessing: PreprocessingParameters::for_diameter_range(cell_diameter_range, 30, 3.0),
            overlap_rule: OverlapRule::default(),
        }
    }
}

impl Default for CellDiameterRange {
    fn default() -> Self {
        Self {
            smallest: 0.0,
            largest: 30.0,
        }
    }
}

impl Default for PreprocessingParameters {
    fn default() -> Self {
        Self::for_diameter_range(CellDiameterRange::default(), 30, 3.0)
    }
}

impl CellDiameterRange {
    pub fn new(smallest: f64, largest: f64) -> Result<Self> {
        let range = Self { smallest, largest };
        range.validate()?;
        Ok(range)
    }

    /// Parses `"smallest-largest"`, or a single number meaning `0-number`.
    pub fn parse_from_text(text: &str) -> Result<Self> {
        let parse = |part: &str| {
            part.trim().parse::<f64>().map_err(|_| {
                ColocError::InvalidConfiguration(format!("'{text}' is not a valid cell diameter range"))
            })
        };

        match text.split_once('-') {
            Some((smallest, largest)) => Self::new(parse(smallest)?, parse(largest)?),
            None => Self::new(0.0, parse(text)?),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.smallest.is_finite() || !self.largest.is_finite() {
            return Err(ColocError::InvalidConfiguration(
                "cell diameters must be finite".to_string(),
            ));
        }
        if self.smallest < 0.0 || self.largest < 0.0 {
            return Err(ColocError::InvalidConfiguration(
                "cell diameters must not be negative".to_string(),
            ));
        }
        if self.smallest > self.largest {
            return Err(ColocError::InvalidConfiguration(format!(
                "smallest cell diameter {} exceeds largest {}",
                self.smallest, self.largest
            )));
        }
        Ok(())
    }
}

impl fmt::Display for CellDiameterRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.smallest, self.largest)
    }
}

impl PreprocessingParameters {
    /// The parameter set used for batch transduction runs: background subtraction,
    /// global threshold, despeckle and blur all enabled.
    pub fn for_diameter_range(
        range: CellDiameterRange,
        local_threshold_radius: u32,
        gaussian_blur_sigma: f64,
    ) -> Self {
        Self {
            should_subtract_background: true,
            largest_cell_diameter: range.largest,
            threshold_locality: ThresholdLocality::Global,
            local_threshold_algorithm: ThresholdAlgorithm::Otsu,
            local_threshold_radius,
            should_despeckle: true,
            despeckle_radius: 1.0,
            should_gaussian_blur: true,
            gaussian_blur_sigma,
        }
    }

    /// Resolves the configured locality and algorithm into an applicable strategy.
    pub fn threshold_strategy(&self) -> Result<ThresholdStrategy> {
        ThresholdStrategy::resolve(
            self.threshold_locality,
            self.local_threshold_algorithm,
            self.local_threshold_radius,
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.should_subtract_background
            && !(self.largest_cell_diameter.is_finite() && self.largest_cell_diameter > 0.0)
        {
            return Err(ColocError::InvalidConfiguration(
                "background subtraction needs a positive largest cell diameter".to_string(),
            ));
        }
        if self.should_despeckle && !(self.despeckle_radius.is_finite() && self.despeckle_radius > 0.0) {
            return Err(ColocError::InvalidConfiguration(
                "despeckle radius must be positive".to_string(),
            ));
        }
        if self.should_gaussian_blur
            && !(self.gaussian_blur_sigma.is_finite() && self.gaussian_blur_sigma > 0.0)
        {
            return Err(ColocError::InvalidConfiguration(
                "gaussian blur sigma must be positive".to_string(),
            ));
        }
        self.threshold_strategy().map(|_| ())
    }
}

impl TransductionConfig {
    pub fn with_channels(mut self, target_channel: usize, transduced_channel: usize) -> Self {
        self.target_channel = target_channel;
        self.transduced_channel = transduced_channel;
        self
    }

    pub fn with_preprocessing(mut self, preprocessing: PreprocessingParameters) -> Self {
        self.preprocessing = preprocessing;
        self
    }

    pub fn with_overlap_rule(mut self, overlap_rule: OverlapRule) -> Self {
        self.overlap_rule = overlap_rule;
        self
    }

    /// The preprocessing parameters the engine runs with: the rolling-ball radius is
    /// the largest cell diameter, and the local threshold radius is capped by it.
    pub fn resolved_preprocessing(&self) -> PreprocessingParameters {
        let largest = self.cell_diameter_range.largest;
        let radius_bound = (largest.floor() as u32).max(1);
        PreprocessingParameters {
            largest_cell_diameter: largest,
            local_threshold_radius: self.preprocessing.local_threshold_radius.min(radius_bound),
            ..self.preprocessing.clone()
        }
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        self.cell_diameter_range.validate()?;
        self.resolved_preprocessing().validate()?;
        self.overlap_rule.validate()
    }
}
