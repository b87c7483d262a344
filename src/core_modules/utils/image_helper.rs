pub mod image_helper {
    use crate::core_modules::cell::{Cell, Point};
    use crate::error::Result;
    use image::{GrayImage, ImageEncoder, Rgba, RgbaImage};
    use std::path::Path;

    /// Paints each cell's outline onto `canvas`. Cells without a traced outline are
    /// filled instead. Points outside the canvas are ignored.
    pub fn draw_outlines(canvas: &mut RgbaImage, cells: &[Cell], color: Rgba<u8>) {
        for cell in cells {
            match cell.outline() {
                Some(outline) => paint(canvas, outline.iter(), color),
                None => paint(canvas, cell.body().iter(), color),
            }
        }
    }

    fn paint<'a>(canvas: &mut RgbaImage, points: impl Iterator<Item = &'a Point>, color: Rgba<u8>) {
        for point in points {
            if let Some(pixel) = canvas.get_pixel_mut_checked(point.x, point.y) {
                *pixel = color;
            }
        }
    }

    /// An RGBA copy of an 8-bit channel with `cells` outlined on top.
    pub fn overlay_cells(channel: &GrayImage, cells: &[Cell], color: Rgba<u8>) -> RgbaImage {
        let mut canvas = RgbaImage::from_fn(channel.width(), channel.height(), |x, y| {
            let v = channel.get_pixel(x, y).0[0];
            Rgba([v, v, v, 255])
        });
        draw_outlines(&mut canvas, cells, color);
        canvas
    }

    pub fn save(path: impl AsRef<Path>, image: &RgbaImage) -> Result<()> {
        let output = std::fs::File::create(path).map_err(image::ImageError::IoError)?;
        let encoder = image::codecs::png::PngEncoder::new(output);

        encoder.write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgba8,
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {

    use super::image_helper::*;
    use crate::core_modules::cell::{Cell, Point};
    use image::{GrayImage, Luma, Rgba, RgbaImage};
    use std::collections::BTreeSet;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

    fn block_cell(outline: Option<Vec<Point>>) -> Cell {
        let body: BTreeSet<Point> = (1..4)
            .flat_map(|y| (1..4).map(move |x| Point::new(x, y)))
            .collect();
        Cell::new(body, outline).unwrap()
    }

    #[test]
    fn outline_is_drawn_and_interior_left_alone() {
        let outline = vec![
            Point::new(1, 1),
            Point::new(2, 1),
            Point::new(3, 1),
            Point::new(3, 2),
            Point::new(3, 3),
            Point::new(2, 3),
            Point::new(1, 3),
            Point::new(1, 2),
        ];
        let mut canvas = RgbaImage::new(5, 5);
        draw_outlines(&mut canvas, &[block_cell(Some(outline))], RED);
        assert_eq!(*canvas.get_pixel(1, 1), RED);
        assert_eq!(*canvas.get_pixel(2, 2), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn cells_without_outline_are_filled() {
        let mut canvas = RgbaImage::new(5, 5);
        draw_outlines(&mut canvas, &[block_cell(None)], RED);
        assert_eq!(*canvas.get_pixel(2, 2), RED);
        assert_eq!(*canvas.get_pixel(0, 0), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn overlay_keeps_the_channel_underneath() {
        let channel = GrayImage::from_pixel(5, 5, Luma([40]));
        let canvas = overlay_cells(&channel, &[block_cell(None)], RED);
        assert_eq!(*canvas.get_pixel(4, 4), Rgba([40, 40, 40, 255]));
        assert_eq!(*canvas.get_pixel(3, 3), RED);
    }

    #[test]
    fn save_overlay_file() {
        let channel = GrayImage::from_fn(16, 8, |x, _| Luma([(x * 16) as u8]));
        let canvas = overlay_cells(&channel, &[block_cell(None)], RED);
        let path = std::env::temp_dir().join("coloc_vision_overlay_test.png");

        save(&path, &canvas).expect("Error Saving File.");
        let reloaded = image::open(&path).expect("saved file decodes").to_rgba8();
        assert_eq!(reloaded, canvas);
        let _ = std::fs::remove_file(path);
    }
}
