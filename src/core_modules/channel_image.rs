// THEORY:
// The `channel_image` module is the entry point of raw acquisition data into the
// engine. It defines the narrow contract an external image source must satisfy and
// the one conversion every later stage depends on: turning a single channel into an
// 8-bit working buffer.
//
// Key architectural principles:
// 1.  **Contract, not format**: The engine never decodes files. Anything that can
//     answer `width`, `height`, `channel_count` and `intensity(channel, x, y)` can be
//     analysed. `ChannelStack` is the in-crate implementation, built from the `image`
//     crate's `DynamicImage` by splitting interleaved samples into planes.
// 2.  **Fail Fast**: Channel indices are validated before a single sample is read, so
//     a bad configuration aborts an image without side effects.
// 3.  **Private Working Copies**: `extract_gray8` always allocates a fresh
//     `GrayImage`. Preprocessing mutates that copy; the acquisition data is never
//     touched.

use crate::error::{ColocError, Result};
use image::{DynamicImage, GrayImage, Luma};

/// Read-only access to a multi-channel intensity image. Channel indices are 0-based.
pub trait MultiChannelImage {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn channel_count(&self) -> usize;
    /// The raw sample at `(x, y)` in `channel`. Callers guarantee the indices are valid.
    fn intensity(&self, channel: usize, x: u32, y: u32) -> f32;
}

/// A "dumb" data container holding one row-major plane of samples per channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelStack {
    /// The width of every plane in pixels.
    width: u32,
    /// The height of every plane in pixels.
    height: u32,
    /// One flattened plane per channel, each `width * height` samples long.
    planes: Vec<Vec<f32>>,
}

impl ChannelStack {
    /// Fails with `InvalidConfiguration` unless every plane holds `width * height` samples.
    pub fn new(width: u32, height: u32, planes: Vec<Vec<f32>>) -> Result<Self> {
        let plane_len = width as usize * height as usize;
        if let Some((channel, plane)) = planes.iter().enumerate().find(|(_, p)| p.len() != plane_len) {
            return Err(ColocError::InvalidConfiguration(format!(
                "channel {channel} holds {} samples, expected {width}x{height}",
                plane.len()
            )));
        }
        Ok(Self {
            width,
            height,
            planes,
        })
    }

    /// Splits a decoded image into planes, one per colour/alpha channel.
    /// Sample precision is preserved (8-bit, 16-bit and float images keep their range).
    pub fn from_dynamic_image(image: &DynamicImage) -> Result<Self> {
        let (width, height) = (image.width(), image.height());
        match image {
            DynamicImage::ImageLuma8(buf) => {
                Self::from_interleaved(width, height, 1, buf.as_raw().iter().map(|&v| v as f32))
            }
            DynamicImage::ImageLumaA8(buf) => {
                Self::from_interleaved(width, height, 2, buf.as_raw().iter().map(|&v| v as f32))
            }
            DynamicImage::ImageRgb8(buf) => {
                Self::from_interleaved(width, height, 3, buf.as_raw().iter().map(|&v| v as f32))
            }
            DynamicImage::ImageRgba8(buf) => {
                Self::from_interleaved(width, height, 4, buf.as_raw().iter().map(|&v| v as f32))
            }
            DynamicImage::ImageLuma16(buf) => {
                Self::from_interleaved(width, height, 1, buf.as_raw().iter().map(|&v| v as f32))
            }
            DynamicImage::ImageLumaA16(buf) => {
                Self::from_interleaved(width, height, 2, buf.as_raw().iter().map(|&v| v as f32))
            }
            DynamicImage::ImageRgb16(buf) => {
                Self::from_interleaved(width, height, 3, buf.as_raw().iter().map(|&v| v as f32))
            }
            DynamicImage::ImageRgba16(buf) => {
                Self::from_interleaved(width, height, 4, buf.as_raw().iter().map(|&v| v as f32))
            }
            DynamicImage::ImageRgb32F(buf) => {
                Self::from_interleaved(width, height, 3, buf.as_raw().iter().copied())
            }
            DynamicImage::ImageRgba32F(buf) => {
                Self::from_interleaved(width, height, 4, buf.as_raw().iter().copied())
            }
            other => {
                let rgba = other.to_rgba8();
                Self::from_interleaved(width, height, 4, rgba.as_raw().iter().map(|&v| v as f32))
            }
        }
    }

    /// Builds planes from pixel-interleaved samples (`c0 c1 .. cN c0 c1 ..`).
    pub fn from_interleaved(
        width: u32,
        height: u32,
        channels: usize,
        samples: impl Iterator<Item = f32>,
    ) -> Result<Self> {
        if channels == 0 {
            return Err(ColocError::InvalidConfiguration(
                "an image needs at least one channel".to_string(),
            ));
        }
        let plane_len = width as usize * height as usize;
        let mut planes = vec![Vec::with_capacity(plane_len); channels];
        for (i, sample) in samples.enumerate() {
            planes[i % channels].push(sample);
        }
        Self::new(width, height, planes)
    }

    pub fn plane(&self, channel: usize) -> Option<&[f32]> {
        self.planes.get(channel).map(Vec::as_slice)
    }
}

impl MultiChannelImage for ChannelStack {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn channel_count(&self) -> usize {
        self.planes.len()
    }

    fn intensity(&self, channel: usize, x: u32, y: u32) -> f32 {
        self.planes[channel][(y * self.width + x) as usize]
    }
}

/// Fails with `ChannelNotFound` if `channel` is not present. Reads no pixels.
pub fn validate_channel<I: MultiChannelImage + ?Sized>(image: &I, channel: usize) -> Result<()> {
    let channel_count = image.channel_count();
    if channel >= channel_count {
        return Err(ColocError::ChannelNotFound {
            channel,
            channel_count,
        });
    }
    Ok(())
}

/// Copies one channel into a fresh 8-bit grayscale buffer.
///
/// Samples already inside `0..=255` are rounded into place. Any other range is
/// linearly rescaled from its own min..max onto 0..255, the way 16-bit and float
/// acquisitions are usually brought into an 8-bit dynamic range.
pub fn extract_gray8<I: MultiChannelImage + ?Sized>(image: &I, channel: usize) -> Result<GrayImage> {
    validate_channel(image, channel)?;

    let (width, height) = (image.width(), image.height());
    let mut samples = Vec::with_capacity((width * height) as usize);
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for y in 0..height {
        for x in 0..width {
            let value = image.intensity(channel, x, y);
            min = min.min(value);
            max = max.max(value);
            samples.push(value);
        }
    }

    let fits_8bit = min >= 0.0 && max <= 255.0;
    let range = max - min;
    let mut gray = GrayImage::new(width, height);
    for (pixel, value) in gray.pixels_mut().zip(samples) {
        let scaled = if fits_8bit {
            value
        } else if range > 0.0 {
            (value - min) / range * 255.0
        } else {
            0.0
        };
        *pixel = Luma([scaled.round().clamp(0.0, 255.0) as u8]);
    }
    Ok(gray)
}
