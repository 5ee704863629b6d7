//! Pixel Buffer Data Model
//!
//! An owned 2-D pixel array (RGB or RGBA, 8-bit channels) that every
//! transform consumes and produces. Transforms never mutate their input:
//! the coordinator relies on that to keep history snapshots valid.

use std::collections::HashSet;

use image::{RgbImage, RgbaImage};
use serde::Serialize;

use crate::error::{Result, StudioError};

/// Channel counts accepted by the model.
pub const RGB_CHANNELS: u8 = 3;
pub const RGBA_CHANNELS: u8 = 4;

/// Owned image data plus its dimensions.
///
/// Invariants (checked at construction):
/// - `pixels.len() == width * height * channels`
/// - `channels` is 3 (RGB) or 4 (RGBA)
/// - `width >= 1` and `height >= 1`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    channels: u8,
    pixels: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32, channels: u8, pixels: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(StudioError::InvalidInput(
                "image dimensions must be greater than 0".to_string(),
            ));
        }
        if channels != RGB_CHANNELS && channels != RGBA_CHANNELS {
            return Err(StudioError::InvalidInput(format!(
                "expected 3 (RGB) or 4 (RGBA) channels, got {}",
                channels
            )));
        }
        let expected = width as usize * height as usize * channels as usize;
        if pixels.len() != expected {
            return Err(StudioError::InvalidInput(format!(
                "pixel data length {} does not match {}x{}x{}",
                pixels.len(),
                width,
                height,
                channels
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            pixels,
        })
    }

    /// Buffer of uniform color. `fill` length must equal the channel count.
    pub fn filled(width: u32, height: u32, fill: &[u8]) -> Result<Self> {
        let channels = fill.len() as u8;
        let pixels = fill
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * fill.len())
            .collect();
        Self::new(width, height, channels, pixels)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn has_alpha(&self) -> bool {
        self.channels == RGBA_CHANNELS
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Byte offset of pixel (x, y).
    #[inline]
    pub fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * self.channels as usize
    }

    /// Channel slice of pixel (x, y).
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let start = self.offset(x, y);
        &self.pixels[start..start + self.channels as usize]
    }

    /// Count of unique RGB colors; alpha is ignored.
    pub fn distinct_colors(&self) -> usize {
        let step = self.channels as usize;
        let mut seen: HashSet<[u8; 3]> = HashSet::new();
        for px in self.pixels.chunks_exact(step) {
            seen.insert([px[0], px[1], px[2]]);
        }
        seen.len()
    }

    pub fn to_rgba_image(&self) -> RgbaImage {
        let mut out = RgbaImage::new(self.width, self.height);
        let step = self.channels as usize;
        for (chunk, px) in self.pixels.chunks_exact(step).zip(out.pixels_mut()) {
            px.0 = [
                chunk[0],
                chunk[1],
                chunk[2],
                if step == 4 { chunk[3] } else { 255 },
            ];
        }
        out
    }

    pub fn to_rgb_image(&self) -> RgbImage {
        let mut out = RgbImage::new(self.width, self.height);
        let step = self.channels as usize;
        for (chunk, px) in self.pixels.chunks_exact(step).zip(out.pixels_mut()) {
            px.0 = [chunk[0], chunk[1], chunk[2]];
        }
        out
    }

    pub fn from_rgba_image(img: &RgbaImage) -> Result<Self> {
        Self::new(
            img.width(),
            img.height(),
            RGBA_CHANNELS,
            img.as_raw().clone(),
        )
    }

    pub fn from_rgb_image(img: &RgbImage) -> Result<Self> {
        Self::new(img.width(), img.height(), RGB_CHANNELS, img.as_raw().clone())
    }
}

/// Computed information about the displayed image, surfaced to the status bar.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ImageStatistics {
    pub distinct_color_count: usize,
    pub width: u32,
    pub height: u32,
}

impl ImageStatistics {
    pub fn of(buffer: &PixelBuffer) -> Self {
        Self {
            distinct_color_count: buffer.distinct_colors(),
            width: buffer.width(),
            height: buffer.height(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_validates_length() {
        assert!(PixelBuffer::new(2, 2, 3, vec![0; 12]).is_ok());
        assert!(PixelBuffer::new(2, 2, 3, vec![0; 11]).is_err());
        assert!(PixelBuffer::new(2, 2, 2, vec![0; 8]).is_err());
        assert!(PixelBuffer::new(0, 2, 3, vec![]).is_err());
    }

    #[test]
    fn test_alpha_flag_follows_channels() {
        let rgb = PixelBuffer::filled(4, 4, &[1, 2, 3]).unwrap();
        let rgba = PixelBuffer::filled(4, 4, &[1, 2, 3, 4]).unwrap();
        assert!(!rgb.has_alpha());
        assert!(rgba.has_alpha());
    }

    #[test]
    fn test_distinct_colors_ignores_alpha() {
        let pixels = vec![
            10, 20, 30, 255, //
            10, 20, 30, 0, //
            40, 50, 60, 255, //
            10, 20, 30, 128,
        ];
        let buf = PixelBuffer::new(2, 2, 4, pixels).unwrap();
        assert_eq!(buf.distinct_colors(), 2);
    }

    #[test]
    fn test_rgba_round_trip() {
        let pixels: Vec<u8> = (0..2 * 2 * 4).map(|i| i as u8).collect();
        let buf = PixelBuffer::new(2, 2, 4, pixels.clone()).unwrap();
        let img = buf.to_rgba_image();
        let back = PixelBuffer::from_rgba_image(&img).unwrap();
        assert_eq!(back.pixels(), pixels.as_slice());
    }

    #[test]
    fn test_statistics() {
        let buf = PixelBuffer::filled(8, 4, &[9, 9, 9]).unwrap();
        let stats = ImageStatistics::of(&buf);
        assert_eq!(stats.distinct_color_count, 1);
        assert_eq!(stats.width, 8);
        assert_eq!(stats.height, 4);
    }
}
