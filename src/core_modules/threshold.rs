// THEORY:
// The `threshold` module turns an 8-bit intensity image into a binary mask in which
// 255 marks candidate cell pixels. It is the decision point of the preprocessing
// stage, and the only place where "bright enough to be a cell" is defined.
//
// Key architectural principles:
// 1.  **Closed Set of Algorithms**: The choice between global and local, and between
//     Otsu, Bernsen and Niblack, is a tagged enum resolved when configuration is
//     built. Unknown names fail there with `InvalidConfiguration`; nothing is
//     dispatched on strings at run time.
// 2.  **Clustering Threshold**: Otsu picks the split of the histogram with the
//     largest between-class variance. The whole-image level (global, and the final
//     re-binarisation after blur) comes from `imageproc`; every circular window
//     (local Otsu) runs the same criterion over its sliding histogram.
// 3.  **Idempotence**: A mask that is already binary thresholds to itself. A histogram
//     with a single occupied bin has no split: the level is 0 and pixels are kept iff
//     non-zero.

use crate::core_modules::rank_window::{CircularKernel, WindowStats, map_windows};
use crate::error::{ColocError, Result};
use image::GrayImage;
use imageproc::contrast;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const FOREGROUND: u8 = 255;
pub const BACKGROUND: u8 = 0;

pub const DEFAULT_BERNSEN_CONTRAST_THRESHOLD: f64 = 15.0;
pub const DEFAULT_NIBLACK_K: f64 = 0.2;
pub const DEFAULT_NIBLACK_C: f64 = 0.0;

/// Whether one threshold is computed for the whole image or one per pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ThresholdLocality {
    #[default]
    Global,
    Local,
}

impl FromStr for ThresholdLocality {
    type Err = ColocError;

    fn from_str(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "global" => Ok(ThresholdLocality::Global),
            "local" => Ok(ThresholdLocality::Local),
            _ => Err(ColocError::InvalidConfiguration(format!(
                "unknown threshold locality '{name}'"
            ))),
        }
    }
}

/// The neighbourhood algorithm used when thresholding locally.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum ThresholdAlgorithm {
    #[default]
    Otsu,
    /// Midpoint of the local range, trusted only where the range is at least
    /// `contrast_threshold` wide.
    Bernsen { contrast_threshold: f64 },
    /// `mean + k * stddev + c` of the local window.
    Niblack { k: f64, c: f64 },
}

impl ThresholdAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            ThresholdAlgorithm::Otsu => "Otsu",
            ThresholdAlgorithm::Bernsen { .. } => "Bernsen",
            ThresholdAlgorithm::Niblack { .. } => "Niblack",
        }
    }

    fn validate(&self) -> Result<()> {
        let finite = match *self {
            ThresholdAlgorithm::Otsu => true,
            ThresholdAlgorithm::Bernsen { contrast_threshold } => contrast_threshold.is_finite(),
            ThresholdAlgorithm::Niblack { k, c } => k.is_finite() && c.is_finite(),
        };
        if finite {
            Ok(())
        } else {
            Err(ColocError::InvalidConfiguration(format!(
                "{} parameters must be finite",
                self.name()
            )))
        }
    }
}

impl FromStr for ThresholdAlgorithm {
    type Err = ColocError;

    /// Resolves an algorithm by name with its default parameters.
    fn from_str(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "otsu" => Ok(ThresholdAlgorithm::Otsu),
            "bernsen" => Ok(ThresholdAlgorithm::Bernsen {
                contrast_threshold: DEFAULT_BERNSEN_CONTRAST_THRESHOLD,
            }),
            "niblack" => Ok(ThresholdAlgorithm::Niblack {
                k: DEFAULT_NIBLACK_K,
                c: DEFAULT_NIBLACK_C,
            }),
            _ => Err(ColocError::InvalidConfiguration(format!(
                "unknown local threshold algorithm '{name}'"
            ))),
        }
    }
}

impl fmt::Display for ThresholdAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A fully resolved binarisation strategy, ready to be applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdStrategy {
    Global,
    Local {
        algorithm: ThresholdAlgorithm,
        radius: u32,
    },
}

impl ThresholdStrategy {
    pub fn resolve(
        locality: ThresholdLocality,
        algorithm: ThresholdAlgorithm,
        radius: u32,
    ) -> Result<Self> {
        match locality {
            ThresholdLocality::Global => Ok(ThresholdStrategy::Global),
            ThresholdLocality::Local => {
                if radius == 0 {
                    return Err(ColocError::InvalidConfiguration(
                        "local threshold radius must be at least 1".to_string(),
                    ));
                }
                algorithm.validate()?;
                Ok(ThresholdStrategy::Local { algorithm, radius })
            }
        }
    }

    /// Binarises `image` in place.
    pub fn apply(&self, image: &mut GrayImage) {
        match *self {
            ThresholdStrategy::Global => threshold_global(image),
            ThresholdStrategy::Local { algorithm, radius } => {
                *image = threshold_local(image, algorithm, radius);
            }
        }
    }
}

/// Otsu's clustering threshold over a 256-bin window histogram.
///
/// Agrees with `imageproc::contrast::otsu_level` on the same pixels: the returned
/// level is the last intensity of the background class and the first maximum wins.
/// With fewer than two occupied bins there is no split and the level is 0.
pub fn histogram_otsu_level(histogram: &[u32; 256]) -> u8 {
    let total: f64 = histogram.iter().map(|&n| n as f64).sum();
    let total_moment: f64 = histogram
        .iter()
        .enumerate()
        .map(|(v, &n)| v as f64 * n as f64)
        .sum();

    let mut best_level = 0u8;
    let mut best_variance = 0.0f64;
    let mut background_count = 0.0f64;
    let mut background_moment = 0.0f64;

    for (level, &n) in histogram.iter().enumerate() {
        background_count += n as f64;
        if background_count == 0.0 {
            continue;
        }
        let foreground_count = total - background_count;
        if foreground_count == 0.0 {
            break;
        }
        background_moment += level as f64 * n as f64;
        let background_mean = background_moment / background_count;
        let foreground_mean = (total_moment - background_moment) / foreground_count;
        let between_variance =
            background_count * foreground_count * (background_mean - foreground_mean).powi(2);
        if between_variance > best_variance {
            best_variance = between_variance;
            best_level = level as u8;
        }
    }

    best_level
}

fn binarise(foreground: bool) -> u8 {
    if foreground { FOREGROUND } else { BACKGROUND }
}

/// Global Otsu binarisation in place.
pub fn threshold_global(image: &mut GrayImage) {
    let level = contrast::otsu_level(&*image);
    for pixel in image.pixels_mut() {
        pixel.0[0] = binarise(pixel.0[0] > level);
    }
}

/// Per-pixel threshold over a circular window of `radius`.
pub fn threshold_local(image: &GrayImage, algorithm: ThresholdAlgorithm, radius: u32) -> GrayImage {
    let kernel = CircularKernel::new(radius as f64);
    map_windows(image, &kernel, |value, window| {
        binarise(is_locally_foreground(algorithm, value, window))
    })
}

fn is_locally_foreground(algorithm: ThresholdAlgorithm, value: u8, window: &WindowStats) -> bool {
    match algorithm {
        ThresholdAlgorithm::Otsu => value > histogram_otsu_level(window.histogram()),
        ThresholdAlgorithm::Bernsen { contrast_threshold } => {
            let (min, max) = (window.min() as f64, window.max() as f64);
            if max - min >= contrast_threshold {
                value as f64 >= (max + min) / 2.0
            } else {
                false
            }
        }
        ThresholdAlgorithm::Niblack { k, c } => {
            let threshold = window.mean() + k * window.std_dev() + c;
            value as f64 > threshold
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn blocks_image() -> GrayImage {
        GrayImage::from_fn(12, 12, |x, y| {
            let inside = (2..6).contains(&x) && (2..6).contains(&y);
            let dim = (7..10).contains(&x) && (7..10).contains(&y);
            Luma([if inside {
                210
            } else if dim {
                90
            } else {
                12
            }])
        })
    }

    fn histogram_of(image: &GrayImage) -> [u32; 256] {
        let mut histogram = [0u32; 256];
        for pixel in image.pixels() {
            histogram[pixel.0[0] as usize] += 1;
        }
        histogram
    }

    #[test]
    fn otsu_splits_a_bimodal_histogram() {
        let mut histogram = [0u32; 256];
        histogram[10] = 100;
        histogram[200] = 100;
        assert_eq!(histogram_otsu_level(&histogram), 10);
    }

    #[test]
    fn otsu_has_no_split_for_a_single_bin() {
        let mut histogram = [0u32; 256];
        histogram[42] = 9;
        assert_eq!(histogram_otsu_level(&histogram), 0);
        assert_eq!(histogram_otsu_level(&[0u32; 256]), 0);
    }

    #[test]
    fn window_otsu_agrees_with_the_whole_image_level() {
        let image = blocks_image();
        let level = histogram_otsu_level(&histogram_of(&image));
        assert_eq!(level, 90);
        assert_eq!(level, contrast::otsu_level(&image));
    }

    #[test]
    fn single_valued_image_keeps_non_zero_pixels() {
        let mut image = GrayImage::from_pixel(4, 4, Luma([42]));
        threshold_global(&mut image);
        assert!(image.pixels().all(|p| p.0[0] == FOREGROUND));

        let mut black = GrayImage::new(4, 4);
        threshold_global(&mut black);
        assert!(black.pixels().all(|p| p.0[0] == BACKGROUND));
    }

    #[test]
    fn global_threshold_is_idempotent_on_a_binary_mask() {
        let mut mask = blocks_image();
        threshold_global(&mut mask);
        let once = mask.clone();
        threshold_global(&mut mask);
        assert_eq!(mask, once);
        assert!(mask.pixels().all(|p| p.0[0] == FOREGROUND || p.0[0] == BACKGROUND));
    }

    #[test]
    fn global_threshold_keeps_the_bright_block() {
        let mut image = blocks_image();
        threshold_global(&mut image);
        assert_eq!(image.get_pixel(3, 3).0[0], FOREGROUND);
        assert_eq!(image.get_pixel(0, 0).0[0], BACKGROUND);
    }

    #[test]
    fn niblack_without_k_and_c_thresholds_at_the_local_mean() {
        let image = blocks_image();
        let radius = 2;
        let mask = threshold_local(&image, ThresholdAlgorithm::Niblack { k: 0.0, c: 0.0 }, radius);

        let kernel = CircularKernel::new(radius as f64);
        let mut above_mean = Vec::new();
        map_windows(&image, &kernel, |value, window| {
            above_mean.push(value as f64 > window.mean());
            0
        });
        for (pixel, expected) in mask.pixels().zip(above_mean) {
            assert_eq!(pixel.0[0] == FOREGROUND, expected);
        }
    }

    #[test]
    fn bernsen_ignores_low_contrast_windows() {
        let flat = GrayImage::from_fn(8, 8, |x, _| Luma([100 + (x % 2) as u8 * 5]));
        let mask = threshold_local(
            &flat,
            ThresholdAlgorithm::Bernsen {
                contrast_threshold: DEFAULT_BERNSEN_CONTRAST_THRESHOLD,
            },
            3,
        );
        assert!(mask.pixels().all(|p| p.0[0] == BACKGROUND));

        let mask = threshold_local(
            &blocks_image(),
            ThresholdAlgorithm::Bernsen {
                contrast_threshold: DEFAULT_BERNSEN_CONTRAST_THRESHOLD,
            },
            3,
        );
        assert_eq!(mask.get_pixel(3, 3).0[0], FOREGROUND);
    }

    #[test]
    fn local_otsu_finds_the_dim_block_too() {
        let mask = threshold_local(&blocks_image(), ThresholdAlgorithm::Otsu, 4);
        assert_eq!(mask.get_pixel(8, 8).0[0], FOREGROUND);
        assert_eq!(mask.get_pixel(3, 3).0[0], FOREGROUND);
    }

    #[test]
    fn names_resolve_to_algorithms() {
        assert_eq!("Otsu".parse::<ThresholdAlgorithm>().unwrap(), ThresholdAlgorithm::Otsu);
        assert_eq!(
            "niblack".parse::<ThresholdAlgorithm>().unwrap(),
            ThresholdAlgorithm::Niblack {
                k: DEFAULT_NIBLACK_K,
                c: DEFAULT_NIBLACK_C
            }
        );
        assert_eq!("LOCAL".parse::<ThresholdLocality>().unwrap(), ThresholdLocality::Local);
    }

    #[test]
    fn unknown_names_are_invalid_configuration() {
        assert!(matches!(
            "Sauvola".parse::<ThresholdAlgorithm>(),
            Err(ColocError::InvalidConfiguration(_))
        ));
        assert!(matches!(
            "regional".parse::<ThresholdLocality>(),
            Err(ColocError::InvalidConfiguration(_))
        ));
        assert!(serde_json::from_str::<ThresholdAlgorithm>("\"Sauvola\"").is_err());
    }

    #[test]
    fn local_strategy_requires_a_radius() {
        assert!(matches!(
            ThresholdStrategy::resolve(ThresholdLocality::Local, ThresholdAlgorithm::Otsu, 0),
            Err(ColocError::InvalidConfiguration(_))
        ));
        assert_eq!(
            ThresholdStrategy::resolve(ThresholdLocality::Global, ThresholdAlgorithm::Otsu, 0).unwrap(),
            ThresholdStrategy::Global
        );
    }
}
