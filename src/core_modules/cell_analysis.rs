// THEORY:
// `ChannelCellAnalysis` is the per-cell measurement of one channel: how large the
// cell is and how bright it is inside. It is computed on demand from a `Cell` and an
// 8-bit intensity image and never stored on the cell itself, so one cell can be
// measured against any number of channels.
//
// Key architectural principles:
// 1.  **Integer Statistics**: Intensities are 8-bit, and so are the statistics. The
//     mean is truncated toward zero and the median is the upper median, taken from a
//     256-bin histogram of the body.
// 2.  **Raw Integrated Density**: The plain sum of body intensities, with no
//     calibration or background correction applied.

use crate::core_modules::cell::Cell;
use image::GrayImage;
use serde::Serialize;

/// Intensity statistics of one cell in one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ChannelCellAnalysis {
    /// Number of body pixels.
    pub area: u32,
    pub mean: u32,
    pub median: u32,
    pub min: u32,
    pub max: u32,
    /// Sum of all body intensities.
    pub raw_integrated_density: u64,
}

impl ChannelCellAnalysis {
    /// Measures `cell` against `image`. Body pixels outside the image are skipped.
    pub fn analyze(cell: &Cell, image: &GrayImage) -> Self {
        let mut histogram = [0u32; 256];
        let mut area = 0u32;
        let mut sum = 0u64;
        for point in cell.body() {
            if let Some(pixel) = image.get_pixel_checked(point.x, point.y) {
                let value = pixel.0[0];
                histogram[value as usize] += 1;
                area += 1;
                sum += value as u64;
            }
        }

        if area == 0 {
            return Self {
                area: 0,
                mean: 0,
                median: 0,
                min: 0,
                max: 0,
                raw_integrated_density: 0,
            };
        }

        let min = histogram.iter().position(|&n| n > 0).unwrap_or(0) as u32;
        let max = histogram.iter().rposition(|&n| n > 0).unwrap_or(0) as u32;
        let mut cumulative = 0u32;
        let mut median = 0u32;
        for (value, &n) in histogram.iter().enumerate() {
            cumulative += n;
            if 2 * cumulative > area {
                median = value as u32;
                break;
            }
        }

        Self {
            area,
            mean: (sum / area as u64) as u32,
            median,
            min,
            max,
            raw_integrated_density: sum,
        }
    }
}

/// Arithmetic mean intensity of the cell body in `image`.
pub fn mean_intensity(cell: &Cell, image: &GrayImage) -> f64 {
    let (sum, count) = cell
        .body()
        .iter()
        .filter_map(|p| image.get_pixel_checked(p.x, p.y))
        .fold((0u64, 0u64), |(sum, count), pixel| (sum + pixel.0[0] as u64, count + 1));
    if count == 0 {
        return 0.0;
    }
    sum as f64 / count as f64
}
