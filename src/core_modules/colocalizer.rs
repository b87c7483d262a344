// THEORY:
// The `ColocalizationMatcher` decides which morphology-channel cells are also
// positive in the transduction channel, and measures the positive ones.
//
// Key architectural principles & algorithm steps:
// 1.  **Closed Decision Rule**: `OverlapRule` is a tagged enum. The default asks for
//     at least one body pixel to land on foreground of the independently
//     preprocessed transduction mask. The alternative compares the cell's mean raw
//     transduction intensity against a fixed level.
// 2.  **Order Preserving**: Overlapping cells keep the order in which the extractor
//     produced them, and `overlapping_analyses[i]` always belongs to
//     `overlapping_cells[i]`.
// 3.  **Raw Measurements**: Statistics are taken from the 8-bit transduction channel
//     as acquired, not from the thresholded mask.

use crate::core_modules::cell::Cell;
use crate::core_modules::cell_analysis::{ChannelCellAnalysis, mean_intensity};
use crate::error::{ColocError, Result};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How a morphology cell is judged to be transduced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OverlapRule {
    /// At least `min_overlap_pixels` body pixels are foreground in the transduction mask.
    MaskIntersection { min_overlap_pixels: u32 },
    /// The mean raw transduction intensity over the body is at least `threshold`.
    MeanIntensity { threshold: f64 },
}

impl Default for OverlapRule {
    fn default() -> Self {
        OverlapRule::MaskIntersection {
            min_overlap_pixels: 1,
        }
    }
}

impl OverlapRule {
    pub fn validate(&self) -> Result<()> {
        match *self {
            OverlapRule::MaskIntersection { min_overlap_pixels } if min_overlap_pixels == 0 => Err(
                ColocError::InvalidConfiguration("min_overlap_pixels must be at least 1".to_string()),
            ),
            OverlapRule::MeanIntensity { threshold } if !(0.0..=255.0).contains(&threshold) => {
                Err(ColocError::InvalidConfiguration(format!(
                    "mean intensity threshold {threshold} is outside 0..=255"
                )))
            }
            _ => Ok(()),
        }
    }
}

/// The matcher's verdict for one image.
#[derive(Debug, Clone, PartialEq)]
pub struct ColocalizationOutcome {
    pub target_cell_count: usize,
    pub overlapping_cells: Vec<Cell>,
    pub overlapping_analyses: Vec<ChannelCellAnalysis>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ColocalizationMatcher {
    rule: OverlapRule,
}

impl ColocalizationMatcher {
    pub fn new(rule: OverlapRule) -> Self {
        Self { rule }
    }

    pub fn rule(&self) -> OverlapRule {
        self.rule
    }

    /// Classifies every morphology cell against the transduction channel.
    ///
    /// `transduction_mask` is the preprocessed (binary) transduction channel and
    /// `transduction_image` the raw 8-bit one.
    pub fn match_cells(
        &self,
        morphology_cells: &[Cell],
        transduction_mask: &GrayImage,
        transduction_image: &GrayImage,
    ) -> ColocalizationOutcome {
        let mut overlapping_cells = Vec::new();
        let mut overlapping_analyses = Vec::new();

        for cell in morphology_cells {
            if self.is_overlapping(cell, transduction_mask, transduction_image) {
                overlapping_analyses.push(ChannelCellAnalysis::analyze(cell, transduction_image));
                overlapping_cells.push(cell.clone());
            }
        }

        debug!(
            target_cells = morphology_cells.len(),
            overlapping = overlapping_cells.len(),
            "Matched morphology cells against transduction channel"
        );

        ColocalizationOutcome {
            target_cell_count: morphology_cells.len(),
            overlapping_cells,
            overlapping_analyses,
        }
    }

    fn is_overlapping(&self, cell: &Cell, transduction_mask: &GrayImage, transduction_image: &GrayImage) -> bool {
        match self.rule {
            OverlapRule::MaskIntersection { min_overlap_pixels } => {
                let overlap = cell
                    .body()
                    .iter()
                    .filter(|p| {
                        transduction_mask
                            .get_pixel_checked(p.x, p.y)
                            .is_some_and(|pixel| pixel.0[0] != 0)
                    })
                    .take(min_overlap_pixels as usize)
                    .count();
                overlap >= min_overlap_pixels as usize
            }
            OverlapRule::MeanIntensity { threshold } => mean_intensity(cell, transduction_image) >= threshold,
        }
    }
}

/// Percentage of target cells that are overlapping; 0 when there are no targets.
pub fn transduction_efficiency(overlapping: usize, target_cell_count: usize) -> f64 {
    if target_cell_count == 0 {
        return 0.0;
    }
    overlapping as f64 / target_cell_count as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::cell::Point;
    use image::Luma;

    fn block(x0: u32, y0: u32) -> Cell {
        Cell::from_points((y0..y0 + 2).flat_map(|y| (x0..x0 + 2).map(move |x| Point::new(x, y)))).unwrap()
    }

    #[test]
    fn efficiency_examples() {
        assert_eq!(transduction_efficiency(0, 5), 0.0);
        assert_eq!(transduction_efficiency(5, 5), 100.0);
        assert_eq!(transduction_efficiency(0, 0), 0.0);
        assert_eq!(transduction_efficiency(1, 4), 25.0);
    }

    #[test]
    fn mask_intersection_keeps_order_and_measures_raw_channel() {
        let cells = vec![block(0, 0), block(4, 0), block(0, 4)];
        let mut mask = GrayImage::new(8, 8);
        mask.put_pixel(1, 1, Luma([255]));
        mask.put_pixel(0, 5, Luma([255]));
        let raw = GrayImage::from_pixel(8, 8, Luma([60]));

        let outcome = ColocalizationMatcher::default().match_cells(&cells, &mask, &raw);
        assert_eq!(outcome.target_cell_count, 3);
        assert_eq!(outcome.overlapping_cells, vec![block(0, 0), block(0, 4)]);
        assert_eq!(outcome.overlapping_analyses.len(), 2);
        assert_eq!(outcome.overlapping_analyses[0].mean, 60);
        assert_eq!(outcome.overlapping_analyses[1].area, 4);
    }

    #[test]
    fn min_overlap_pixels_is_respected() {
        let cells = vec![block(0, 0)];
        let mut mask = GrayImage::new(4, 4);
        mask.put_pixel(0, 0, Luma([255]));
        let raw = GrayImage::new(4, 4);

        let strict = ColocalizationMatcher::new(OverlapRule::MaskIntersection {
            min_overlap_pixels: 2,
        });
        assert!(strict.match_cells(&cells, &mask, &raw).overlapping_cells.is_empty());

        mask.put_pixel(1, 1, Luma([255]));
        assert_eq!(strict.match_cells(&cells, &mask, &raw).overlapping_cells.len(), 1);
    }

    #[test]
    fn mean_intensity_rule_ignores_the_mask() {
        let cells = vec![block(0, 0), block(2, 0)];
        let mask = GrayImage::new(4, 2);
        let raw = GrayImage::from_fn(4, 2, |x, _| Luma([if x < 2 { 120 } else { 20 }]));

        let matcher = ColocalizationMatcher::new(OverlapRule::MeanIntensity { threshold: 100.0 });
        let outcome = matcher.match_cells(&cells, &mask, &raw);
        assert_eq!(outcome.overlapping_cells, vec![block(0, 0)]);
    }

    #[test]
    fn no_cells_is_not_an_error() {
        let image = GrayImage::new(3, 3);
        let outcome = ColocalizationMatcher::default().match_cells(&[], &image, &image);
        assert_eq!(outcome.target_cell_count, 0);
        assert!(outcome.overlapping_cells.is_empty());
    }

    #[test]
    fn degenerate_rules_are_rejected() {
        assert!(OverlapRule::MaskIntersection { min_overlap_pixels: 0 }.validate().is_err());
        assert!(OverlapRule::MeanIntensity { threshold: 300.0 }.validate().is_err());
        assert!(OverlapRule::default().validate().is_ok());
    }
}
