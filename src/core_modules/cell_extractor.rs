// THEORY:
// The `CellExtractor` turns a segmented binary mask into discrete `Cell` objects. It
// is the last step of the spatial analysis: after it runs, the rest of the engine
// only ever deals with cells, never with masks.
//
// Key architectural principles & algorithm steps:
// 1.  **8-Connected Components**: Foreground pixels that touch, including diagonally,
//     belong to the same cell. Labelling is done by `imageproc::region_labelling`.
//     The watershed guarantees that separated cells never touch, so no extra
//     bookkeeping is needed here.
// 2.  **Raster Discovery Order**: Cells are ordered by their first pixel in raster
//     order (the top-left pixel of the component). The same mask always produces the
//     same list.
// 3.  **Border Following**: Outlines come from `imageproc::contours`, which follows
//     each outer border from the component's top-left pixel and passes twice through
//     one-pixel-wide necks. Hole borders are not outlines.
// 4.  **No Size Filtering**: Every component becomes a cell, however small.

use crate::core_modules::cell::{Cell, Point};
use image::{GrayImage, Luma};
use imageproc::contours::{BorderType, find_contours};
use imageproc::region_labelling::{Connectivity, connected_components};

pub mod cell_extractor {
    use super::*; // Make structs from parent module available.
    use std::collections::BTreeSet;
    use tracing::debug;

    /// Finds every 8-connected foreground component of `mask` and returns it as a cell,
    /// in raster order of each component's top-left pixel.
    pub fn extract_cells(mask: &GrayImage) -> Vec<Cell> {
        // Components only join pixels of equal value, so normalise to 0/255 first.
        let binary = GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
            Luma([if mask.get_pixel(x, y).0[0] != 0 { 255 } else { 0 }])
        });
        let labels = connected_components(&binary, Connectivity::Eight, Luma([0u8]));

        // --- 1. Bodies ---
        let mut bodies: Vec<BTreeSet<Point>> = Vec::new();
        for (x, y, label) in labels.enumerate_pixels() {
            let label = label.0[0] as usize;
            if label == 0 {
                continue;
            }
            if bodies.len() < label {
                bodies.resize_with(label, BTreeSet::new);
            }
            bodies[label - 1].insert(Point::new(x, y));
        }

        // --- 2. Outlines ---
        let mut outlines: Vec<Option<Vec<Point>>> = vec![None; bodies.len()];
        for contour in find_contours::<i32>(&binary) {
            if contour.border_type != BorderType::Outer {
                continue;
            }
            let Some(start) = contour.points.first() else {
                continue;
            };
            let label = labels.get_pixel(start.x as u32, start.y as u32).0[0] as usize;
            if let Some(slot) = label.checked_sub(1).and_then(|i| outlines.get_mut(i)) {
                if slot.is_none() {
                    *slot = Some(
                        contour
                            .points
                            .iter()
                            .map(|p| Point::new(p.x as u32, p.y as u32))
                            .collect(),
                    );
                }
            }
        }

        // --- 3. Cells in raster order ---
        let mut cells: Vec<Cell> = bodies
            .into_iter()
            .zip(outlines)
            .filter_map(|(body, outline)| Cell::new(body, outline))
            .collect();
        cells.sort_by_key(|cell| cell.body().first().copied());

        debug!(cells = cells.len(), "Extracted cells from mask");
        cells
    }
}

#[cfg(test)]
mod tests {
    use super::cell_extractor::extract_cells;
    use super::*;
    use std::collections::BTreeSet;

    fn mask_from(rows: &[&str]) -> GrayImage {
        let height = rows.len() as u32;
        let width = rows[0].len() as u32;
        GrayImage::from_fn(width, height, |x, y| {
            let on = rows[y as usize].as_bytes()[x as usize] == b'#';
            Luma([if on { 255 } else { 0 }])
        })
    }

    #[test]
    fn separate_blocks_become_separate_cells_in_raster_order() {
        let mask = mask_from(&[
            "......", //
            "....##", //
            "##..##", //
            "##....", //
        ]);
        let cells = extract_cells(&mask);
        assert_eq!(cells.len(), 2);
        assert!(cells[0].contains(&Point::new(4, 1)));
        assert!(cells[1].contains(&Point::new(0, 2)));
        assert_eq!(cells[0].area(), 4);
        assert_eq!(cells[1].area(), 4);
    }

    #[test]
    fn diagonal_neighbours_are_connected() {
        let mask = mask_from(&[
            "#..", //
            ".#.", //
            "..#", //
        ]);
        let cells = extract_cells(&mask);
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].area(), 3);
    }

    #[test]
    fn square_outline_follows_the_border_from_the_top_left() {
        let mask = mask_from(&[
            ".....", //
            ".###.", //
            ".###.", //
            ".###.", //
            ".....", //
        ]);
        let cells = extract_cells(&mask);
        let outline = cells[0].outline().expect("outline is traced");
        assert_eq!(outline.len(), 8);
        assert_eq!(outline[0], Point::new(1, 1));

        let traced: BTreeSet<Point> = outline.iter().copied().collect();
        let border: BTreeSet<Point> = [(1, 1), (2, 1), (3, 1), (3, 2), (3, 3), (2, 3), (1, 3), (1, 2)]
            .into_iter()
            .map(|(x, y)| Point::new(x, y))
            .collect();
        assert_eq!(traced, border);
        assert!(!outline.contains(&Point::new(2, 2)));
    }

    #[test]
    fn single_pixel_outline_is_the_pixel() {
        let mask = mask_from(&["...", ".#.", "..."]);
        let cells = extract_cells(&mask);
        assert_eq!(cells[0].outline(), Some(&[Point::new(1, 1)][..]));
        assert_eq!(cells[0].centroid(), (1.0, 1.0));
    }

    #[test]
    fn outline_passes_twice_through_a_neck_at_the_start() {
        let mask = mask_from(&[
            "..#..", //
            ".#.#.", //
            "#...#", //
        ]);
        let cells = extract_cells(&mask);
        assert_eq!(cells.len(), 1);
        let outline = cells[0].outline().unwrap();
        assert!(outline.iter().all(|p| cells[0].contains(p)));
        assert!(outline.contains(&Point::new(0, 2)));
        assert!(outline.contains(&Point::new(4, 2)));
        assert_eq!(outline[0], Point::new(2, 0));
    }

    #[test]
    fn empty_mask_has_no_cells() {
        assert!(extract_cells(&GrayImage::new(4, 3)).is_empty());
    }

    #[test]
    fn ring_outline_ignores_the_hole() {
        let mask = mask_from(&[
            ".....", //
            ".###.", //
            ".#.#.", //
            ".###.", //
            ".....", //
        ]);
        let cells = extract_cells(&mask);
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].area(), 8);
        let outline = cells[0].outline().unwrap();
        assert_eq!(outline[0], Point::new(1, 1));
        assert_eq!(outline.len(), 8);
    }

    #[test]
    fn grey_levels_count_as_foreground() {
        let mask = GrayImage::from_fn(4, 1, |x, _| Luma([[0, 40, 255, 0][x as usize]]));
        let cells = extract_cells(&mask);
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0].area(), 2);
    }
}
