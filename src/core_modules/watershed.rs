// THEORY:
// The `watershed` module splits touching cells in a binary mask. Two round cells
// that touch form one blob with a "waist"; the distance of each pixel to the nearest
// background pixel peaks once per cell and dips at the waist. Flooding that distance
// map from the top down and cutting where two floods meet separates the cells.
//
// Key architectural principles:
// 1.  **Exact Distance Map**: The squared Euclidean distance transform comes from
//     `imageproc`, run on the inverted mask inside a one-pixel background frame.
//     Pixels outside the image count as background, so a blob touching the border is
//     still measured from its edge.
// 2.  **Deterministic Flooding**: Pixels are visited by descending distance, ties
//     broken by raster index. The same mask always yields the same cut.
// 3.  **Tolerance Merging**: Basins are tracked with union-find. When a flood reaches
//     a pixel touching several basins, every basin whose peak is less than the
//     tolerance above the current level is absorbed into the highest one. Plateaus
//     and shallow bumps never split a cell.
// 4.  **Ridges**: A pixel that still touches two or more surviving basins becomes a
//     ridge and is cleared, so distinct basins are never 8-adjacent afterwards.

use image::{GrayImage, Luma};
use imageproc::distance_transform::euclidean_squared_distance_transform;
use tracing::debug;

pub const DEFAULT_TOLERANCE: f32 = 0.5;

const UNVISITED: usize = usize::MAX;
const RIDGE: usize = usize::MAX - 1;

/// What a segmentation pass did to the mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatershedSummary {
    /// Basins that survived merging.
    pub basins: usize,
    /// Foreground pixels cleared as ridges.
    pub ridge_pixels: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct Segmenter {
    tolerance: f32,
}

impl Default for Segmenter {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

impl Segmenter {
    pub fn new(tolerance: f32) -> Self {
        Self { tolerance }
    }

    /// Cuts ridge lines into the binary `mask` in place.
    pub fn segment(&self, mask: &mut GrayImage) -> WatershedSummary {
        let width = mask.width() as usize;
        let height = mask.height() as usize;
        let distance = distance_transform(mask);

        // --- 1. Flood order ---
        let mut order: Vec<usize> = (0..width * height).filter(|&i| distance[i] > 0.0).collect();
        order.sort_by(|&a, &b| distance[b].total_cmp(&distance[a]).then(a.cmp(&b)));

        // --- 2. Flood ---
        let mut labels = vec![UNVISITED; width * height];
        let mut basins = Basins::default();
        let mut roots: Vec<usize> = Vec::with_capacity(8);

        for &index in &order {
            let level = distance[index];
            let (x, y) = ((index % width) as i64, (index / width) as i64);

            roots.clear();
            let mut touches_ridge = false;
            for dy in -1..=1i64 {
                for dx in -1..=1i64 {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    let (nx, ny) = (x + dx, y + dy);
                    if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                        continue;
                    }
                    match labels[ny as usize * width + nx as usize] {
                        UNVISITED => {}
                        RIDGE => touches_ridge = true,
                        basin => {
                            let root = basins.find(basin);
                            if !roots.contains(&root) {
                                roots.push(root);
                            }
                        }
                    }
                }
            }

            labels[index] = match roots.len() {
                0 if touches_ridge => RIDGE,
                0 => basins.create(level),
                1 => roots[0],
                _ => basins
                    .merge_shallow(&roots, level, self.tolerance)
                    .unwrap_or(RIDGE),
            };
        }

        // --- 3. Cut ---
        let mut ridge_pixels = 0;
        let mut surviving: Vec<usize> = Vec::new();
        for (index, pixel) in mask.pixels_mut().enumerate() {
            match labels[index] {
                UNVISITED => {}
                RIDGE => {
                    pixel.0[0] = 0;
                    ridge_pixels += 1;
                }
                basin => surviving.push(basins.find(basin)),
            }
        }
        surviving.sort_unstable();
        surviving.dedup();

        let summary = WatershedSummary {
            basins: surviving.len(),
            ridge_pixels,
        };
        debug!(basins = summary.basins, ridge_pixels, "Watershed segmentation finished");
        summary
    }
}

/// Union-find over flooding basins, each remembering the height of its peak.
#[derive(Debug, Default)]
struct Basins {
    parent: Vec<usize>,
    peak: Vec<f32>,
}

impl Basins {
    fn create(&mut self, peak: f32) -> usize {
        self.parent.push(self.parent.len());
        self.peak.push(peak);
        self.parent.len() - 1
    }

    fn find(&mut self, mut basin: usize) -> usize {
        while self.parent[basin] != basin {
            self.parent[basin] = self.parent[self.parent[basin]];
            basin = self.parent[basin];
        }
        basin
    }

    /// Folds every shallow root into the highest one. Returns the surviving root, or
    /// `None` if more than one deep basin remains.
    fn merge_shallow(&mut self, roots: &[usize], level: f32, tolerance: f32) -> Option<usize> {
        let dominant = *roots.iter().max_by(|&&a, &&b| {
            self.peak[a].total_cmp(&self.peak[b]).then(b.cmp(&a))
        })?;

        let mut deep_rivals = 0;
        for &root in roots {
            if root == dominant {
                continue;
            }
            if self.peak[root] - level < tolerance {
                self.parent[root] = dominant;
            } else {
                deep_rivals += 1;
            }
        }
        (deep_rivals == 0).then_some(dominant)
    }
}

/// Exact Euclidean distance from every foreground (non-zero) pixel to the nearest
/// background pixel, row-major. Background pixels are 0.
pub fn distance_transform(mask: &GrayImage) -> Vec<f32> {
    let (width, height) = mask.dimensions();
    // Background plus a one-pixel frame standing in for "outside" are the seeds the
    // transform measures to.
    let seeds = GrayImage::from_fn(width + 2, height + 2, |x, y| {
        let inside = x >= 1 && y >= 1 && x <= width && y <= height;
        let foreground = inside && mask.get_pixel(x - 1, y - 1).0[0] != 0;
        Luma([if foreground { 0 } else { 255 }])
    });
    let squared = euclidean_squared_distance_transform(&seeds);

    let mut distance = Vec::with_capacity(width as usize * height as usize);
    for y in 1..=height {
        for x in 1..=width {
            distance.push(squared.get_pixel(x, y).0[0].sqrt() as f32);
        }
    }
    distance
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::cell_extractor::cell_extractor::extract_cells;
    use image::Luma;

    fn disc_pair(separation: u32) -> GrayImage {
        GrayImage::from_fn(16 + separation + 8, 17, |x, y| {
            let inside = |cx: i64| {
                let (dx, dy) = (x as i64 - cx, y as i64 - 8);
                dx * dx + dy * dy <= 25
            };
            Luma([if inside(8) || inside(8 + separation as i64) { 255 } else { 0 }])
        })
    }

    #[test]
    fn distance_of_a_single_pixel_is_one() {
        let mut mask = GrayImage::new(3, 3);
        mask.put_pixel(1, 1, Luma([255]));
        let distance = distance_transform(&mask);
        assert_eq!(distance[4], 1.0);
        assert_eq!(distance[0], 0.0);
    }

    #[test]
    fn image_border_counts_as_background() {
        let mask = GrayImage::from_pixel(5, 5, Luma([255]));
        let distance = distance_transform(&mask);
        assert_eq!(distance[0], 1.0);
        assert_eq!(distance[2 * 5 + 2], 3.0);
        assert_eq!(distance[5 + 1], 2.0);
    }

    #[test]
    fn distance_is_euclidean_on_the_diagonal() {
        let mut mask = GrayImage::from_pixel(7, 7, Luma([255]));
        mask.put_pixel(0, 0, Luma([0]));
        let distance = distance_transform(&mask);
        // (3,3) sees the cleared corner at distance sqrt(18) but the border at 4.
        assert_eq!(distance[3 * 7 + 3], 4.0);
        // (1,1) sees the cleared corner diagonally.
        assert!((distance[7 + 1] - 2f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn distance_matches_brute_force_on_an_irregular_mask() {
        let (width, height) = (9i64, 7i64);
        let mask = GrayImage::from_fn(width as u32, height as u32, |x, y| {
            Luma([if (x * 3 + y * 5) % 7 != 0 { 255 } else { 0 }])
        });
        let distance = distance_transform(&mask);

        for (x, y, pixel) in mask.enumerate_pixels() {
            let (x, y) = (x as i64, y as i64);
            let mut nearest = i64::MAX;
            if pixel.0[0] != 0 {
                for by in -1..=height {
                    for bx in -1..=width {
                        let outside = bx < 0 || by < 0 || bx >= width || by >= height;
                        if outside || mask.get_pixel(bx as u32, by as u32).0[0] == 0 {
                            nearest = nearest.min((bx - x).pow(2) + (by - y).pow(2));
                        }
                    }
                }
            } else {
                nearest = 0;
            }
            let actual = distance[(y * width + x) as usize] as f64;
            assert!((actual - (nearest as f64).sqrt()).abs() < 1e-5, "at ({x}, {y})");
        }
    }

    #[test]
    fn single_blob_is_left_untouched() {
        let mut mask = GrayImage::from_fn(10, 10, |x, y| {
            Luma([if (3..5).contains(&x) && (3..5).contains(&y) { 255 } else { 0 }])
        });
        let before = mask.clone();
        let summary = Segmenter::default().segment(&mut mask);
        assert_eq!(mask, before);
        assert_eq!(summary, WatershedSummary { basins: 1, ridge_pixels: 0 });
    }

    #[test]
    fn touching_discs_are_split() {
        let mut mask = disc_pair(8);
        assert_eq!(extract_cells(&mask).len(), 1);

        let summary = Segmenter::default().segment(&mut mask);
        assert!(summary.ridge_pixels > 0);
        assert_eq!(summary.basins, 2);
        assert_eq!(extract_cells(&mask).len(), 2);
    }

    #[test]
    fn segmentation_is_deterministic() {
        let mut first = disc_pair(8);
        let mut second = disc_pair(8);
        Segmenter::default().segment(&mut first);
        Segmenter::default().segment(&mut second);
        assert_eq!(first, second);
    }

    #[test]
    fn empty_mask_has_no_basins() {
        let mut mask = GrayImage::new(4, 4);
        let summary = Segmenter::default().segment(&mut mask);
        assert_eq!(summary, WatershedSummary { basins: 0, ridge_pixels: 0 });
    }
}
