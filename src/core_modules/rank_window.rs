// THEORY:
// Every neighbourhood operation in the preprocessing stage (local thresholds and the
// despeckle median) needs the same thing: the intensity distribution of a circular
// window centred on each pixel. This module computes it once, in one place.
//
// Key architectural principles:
// 1.  **Circular Kernels**: A radius `r` covers every offset with dx² + dy² <= r² + 1,
//     so radius 1 is the full 3x3 block and larger radii approximate a disc.
// 2.  **Sliding Histogram**: Along a row the window moves one pixel at a time. Only the
//     left and right edge of each kernel line leave or enter, so a 256-bin histogram
//     plus running sums is updated in O(r) instead of rebuilt in O(r²).
// 3.  **Edge Exclusion**: Pixels outside the image are simply not part of the window.
//     The window near a border is smaller, never padded with invented values.

use image::{GrayImage, Luma};

/// Line-by-line description of a circular neighbourhood.
#[derive(Debug, Clone)]
pub struct CircularKernel {
    /// `(dy, half_width)` for every kernel line; the line spans dx in -half_width..=half_width.
    lines: Vec<(i32, i32)>,
}

impl CircularKernel {
    pub fn new(radius: f64) -> Self {
        let r2 = radius * radius + 1.0;
        let k_radius = (r2 + 1e-10).sqrt() as i32;
        let lines = (-k_radius..=k_radius)
            .map(|dy| {
                let half_width = (r2 - (dy * dy) as f64 + 1e-10).sqrt() as i32;
                (dy, half_width)
            })
            .collect();
        Self { lines }
    }

    pub fn lines(&self) -> &[(i32, i32)] {
        &self.lines
    }

    /// Total number of offsets in the kernel (the window size away from any border).
    pub fn area(&self) -> usize {
        self.lines.iter().map(|&(_, hw)| (2 * hw + 1) as usize).sum()
    }
}

/// Intensity statistics of the pixels currently inside a window.
#[derive(Debug, Clone)]
pub struct WindowStats {
    histogram: [u32; 256],
    count: u32,
    sum: u64,
    sum_sq: u64,
}

impl WindowStats {
    fn new() -> Self {
        Self {
            histogram: [0; 256],
            count: 0,
            sum: 0,
            sum_sq: 0,
        }
    }

    fn clear(&mut self) {
        self.histogram = [0; 256];
        self.count = 0;
        self.sum = 0;
        self.sum_sq = 0;
    }

    #[inline]
    fn add(&mut self, value: u8) {
        let v = value as u64;
        self.histogram[value as usize] += 1;
        self.count += 1;
        self.sum += v;
        self.sum_sq += v * v;
    }

    #[inline]
    fn remove(&mut self, value: u8) {
        let v = value as u64;
        self.histogram[value as usize] -= 1;
        self.count -= 1;
        self.sum -= v;
        self.sum_sq -= v * v;
    }

    pub fn histogram(&self) -> &[u32; 256] {
        &self.histogram
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn min(&self) -> u8 {
        self.histogram.iter().position(|&n| n > 0).unwrap_or(0) as u8
    }

    pub fn max(&self) -> u8 {
        self.histogram.iter().rposition(|&n| n > 0).unwrap_or(0) as u8
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum as f64 / self.count as f64
    }

    /// Population standard deviation of the window.
    pub fn std_dev(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let n = self.count as f64;
        let mean = self.sum as f64 / n;
        let variance = self.sum_sq as f64 / n - mean * mean;
        variance.max(0.0).sqrt()
    }

    /// The smallest intensity whose cumulative count exceeds half the window.
    pub fn median(&self) -> u8 {
        let mut cumulative = 0u32;
        for (value, &n) in self.histogram.iter().enumerate() {
            cumulative += n;
            if 2 * cumulative > self.count {
                return value as u8;
            }
        }
        0
    }
}

/// Applies `decide(pixel, window)` at every pixel and returns the resulting image.
/// The source is read only; all windows see the unmodified input.
pub fn map_windows<F>(image: &GrayImage, kernel: &CircularKernel, mut decide: F) -> GrayImage
where
    F: FnMut(u8, &WindowStats) -> u8,
{
    let (width, height) = (image.width() as i32, image.height() as i32);
    let mut output = GrayImage::new(image.width(), image.height());
    let mut stats = WindowStats::new();
    let sample = |x: i32, y: i32| image.get_pixel(x as u32, y as u32).0[0];

    for y in 0..height {
        // --- 1. Seed the window for x = 0 ---
        stats.clear();
        for &(dy, hw) in kernel.lines() {
            let yy = y + dy;
            if yy < 0 || yy >= height {
                continue;
            }
            for xx in 0..=hw.min(width - 1) {
                stats.add(sample(xx, yy));
            }
        }

        // --- 2. Slide along the row ---
        for x in 0..width {
            let value = sample(x, y);
            output.put_pixel(x as u32, y as u32, Luma([decide(value, &stats)]));

            for &(dy, hw) in kernel.lines() {
                let yy = y + dy;
                if yy < 0 || yy >= height {
                    continue;
                }
                let leaving = x - hw;
                if leaving >= 0 {
                    stats.remove(sample(leaving, yy));
                }
                let entering = x + 1 + hw;
                if entering < width {
                    stats.add(sample(entering, yy));
                }
            }
        }
    }

    output
}

/// Circular median filter, the "despeckle" operation.
pub fn median_filter(image: &GrayImage, radius: f64) -> GrayImage {
    let kernel = CircularKernel::new(radius);
    map_windows(image, &kernel, |_, window| window.median())
}
