// THEORY:
// The `background` module removes slowly varying illumination (uneven lamp fields,
// out-of-focus haze) before thresholding, using the rolling-ball model: the
// background is whatever a ball of the given radius can touch when rolled under the
// intensity surface.
//
// Key architectural principles:
// 1.  **Opening, not Filtering**: The background is a grayscale opening with a ball
//     as the structuring element: an erosion (`min` of pixel minus ball height)
//     followed by a dilation (`max` of eroded plus ball height). Features narrower
//     than the ball are removed from the background and survive the subtraction.
// 2.  **Shrink for Large Balls**: Large radii are computed on a block-minimum copy
//     shrunk by 2, 4 or 8, then re-enlarged bilinearly. The arc of the ball is
//     trimmed a little more for larger shrink factors.
// 3.  **Dark Background**: Cells are brighter than their surroundings. The background
//     is subtracted and the result clamped to 0..=255.

use image::GrayImage;

/// A precomputed ball profile together with the shrink factor it is meant for.
#[derive(Debug, Clone)]
pub struct RollingBall {
    /// Ball height at every offset of a `width * width` square, row-major.
    z_ball: Vec<f32>,
    /// Side of the square the ball is sampled on (always odd).
    width: usize,
    /// Images are shrunk by this factor before the ball is rolled.
    shrink_factor: u32,
}

impl RollingBall {
    pub fn new(radius: f64) -> Self {
        let (shrink_factor, arc_trim_percent) = if radius <= 10.0 {
            (1, 24)
        } else if radius <= 30.0 {
            (2, 24)
        } else if radius <= 100.0 {
            (4, 32)
        } else {
            (8, 40)
        };

        let small_radius = (radius / shrink_factor as f64).max(1.0);
        let r_square = small_radius * small_radius;
        let x_trim = (arc_trim_percent as f64 * small_radius) as i32 / 100;
        let half_width = (small_radius - x_trim as f64).round() as i32;
        let width = (2 * half_width + 1) as usize;

        let mut z_ball = Vec::with_capacity(width * width);
        for dy in -half_width..=half_width {
            for dx in -half_width..=half_width {
                let temp = r_square - (dx * dx) as f64 - (dy * dy) as f64;
                z_ball.push(if temp > 0.0 { temp.sqrt() as f32 } else { 0.0 });
            }
        }

        Self {
            z_ball,
            width,
            shrink_factor,
        }
    }

    pub fn shrink_factor(&self) -> u32 {
        self.shrink_factor
    }

    fn half_width(&self) -> i32 {
        (self.width / 2) as i32
    }
}

/// Subtracts the rolling-ball background of `radius` from `image` in place.
pub fn subtract_background(image: &mut GrayImage, radius: f64) {
    let (width, height) = (image.width() as usize, image.height() as usize);
    if width == 0 || height == 0 {
        return;
    }

    let ball = RollingBall::new(radius);
    let pixels: Vec<f32> = image.as_raw().iter().map(|&v| v as f32).collect();

    // --- 1. Shrink, roll, re-enlarge ---
    let background = if ball.shrink_factor > 1 {
        let (small, small_w, small_h) = shrink(&pixels, width, height, ball.shrink_factor as usize);
        let rolled = roll_ball(&ball, &small, small_w, small_h);
        enlarge(&rolled, small_w, small_h, width, height, ball.shrink_factor as usize)
    } else {
        roll_ball(&ball, &pixels, width, height)
    };

    // --- 2. Subtract ---
    for (pixel, bg) in image.pixels_mut().zip(background) {
        let value = pixel.0[0] as f32 - bg;
        pixel.0[0] = value.round().clamp(0.0, 255.0) as u8;
    }
}

/// Block-minimum downscale. Partial blocks at the right/bottom edge are kept.
fn shrink(pixels: &[f32], width: usize, height: usize, factor: usize) -> (Vec<f32>, usize, usize) {
    let small_w = width.div_ceil(factor);
    let small_h = height.div_ceil(factor);
    let mut small = vec![f32::MAX; small_w * small_h];
    for y in 0..height {
        for x in 0..width {
            let slot = &mut small[(y / factor) * small_w + x / factor];
            *slot = slot.min(pixels[y * width + x]);
        }
    }
    (small, small_w, small_h)
}

/// Grayscale opening of `pixels` with the ball profile.
fn roll_ball(ball: &RollingBall, pixels: &[f32], width: usize, height: usize) -> Vec<f32> {
    let hw = ball.half_width();
    let (w, h) = (width as i32, height as i32);
    let ball_at = |dx: i32, dy: i32| ball.z_ball[((dy + hw) as usize) * ball.width + (dx + hw) as usize];

    let mut eroded = vec![0.0f32; pixels.len()];
    for y in 0..h {
        for x in 0..w {
            let mut lowest = f32::MAX;
            for dy in -hw..=hw {
                let yy = y + dy;
                if yy < 0 || yy >= h {
                    continue;
                }
                for dx in -hw..=hw {
                    let xx = x + dx;
                    if xx < 0 || xx >= w {
                        continue;
                    }
                    lowest = lowest.min(pixels[(yy * w + xx) as usize] - ball_at(dx, dy));
                }
            }
            eroded[(y * w + x) as usize] = lowest;
        }
    }

    let mut opened = vec![0.0f32; pixels.len()];
    for y in 0..h {
        for x in 0..w {
            let mut highest = f32::MIN;
            for dy in -hw..=hw {
                let yy = y + dy;
                if yy < 0 || yy >= h {
                    continue;
                }
                for dx in -hw..=hw {
                    let xx = x + dx;
                    if xx < 0 || xx >= w {
                        continue;
                    }
                    highest = highest.max(eroded[(yy * w + xx) as usize] + ball_at(dx, dy));
                }
            }
            opened[(y * w + x) as usize] = highest;
        }
    }
    opened
}

/// Bilinear upscale from block centres back to the full grid.
fn enlarge(
    small: &[f32],
    small_w: usize,
    small_h: usize,
    width: usize,
    height: usize,
    factor: usize,
) -> Vec<f32> {
    let sample_axis = |i: usize, len: usize| -> (usize, usize, f32) {
        let pos = ((i as f32 + 0.5) / factor as f32 - 0.5).clamp(0.0, (len - 1) as f32);
        let lo = pos.floor() as usize;
        let hi = (lo + 1).min(len - 1);
        (lo, hi, pos - lo as f32)
    };

    let mut full = Vec::with_capacity(width * height);
    for y in 0..height {
        let (y0, y1, fy) = sample_axis(y, small_h);
        for x in 0..width {
            let (x0, x1, fx) = sample_axis(x, small_w);
            let top = small[y0 * small_w + x0] * (1.0 - fx) + small[y0 * small_w + x1] * fx;
            let bottom = small[y1 * small_w + x0] * (1.0 - fx) + small[y1 * small_w + x1] * fx;
            full.push(top * (1.0 - fy) + bottom * fy);
        }
    }
    full
}
