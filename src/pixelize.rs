//! Block-Average Pixelization
//!
//! Reduces visual resolution by replacing every `block_size` x `block_size`
//! tile with its per-channel arithmetic mean. Blocks are aligned to the
//! top-left corner; edge blocks are truncated to the remaining pixels.

use rayon::prelude::*;

use crate::buffer::PixelBuffer;
use crate::error::Result;
use crate::settings::validate_block_size;

/// Apply the pixelization effect, returning a new buffer.
///
/// `block_size == 1` returns a bit-exact copy: the pipeline relies on this
/// being a true identity, not an approximation. The alpha channel, when
/// present, is averaged like any other channel.
pub fn pixelize(buffer: &PixelBuffer, block_size: u32) -> Result<PixelBuffer> {
    validate_block_size(block_size)?;

    if block_size == 1 {
        return Ok(buffer.clone());
    }

    let width = buffer.width() as usize;
    let height = buffer.height() as usize;
    let channels = buffer.channels() as usize;
    let bs = block_size as usize;
    let input = buffer.pixels();

    let mut output = vec![0u8; input.len()];
    let band_len = bs * width * channels;

    // Each band of `block_size` output rows is independent.
    output
        .par_chunks_mut(band_len)
        .enumerate()
        .for_each(|(band_idx, band)| {
            let y_start = band_idx * bs;
            let y_end = (y_start + bs).min(height);

            let mut x_start = 0;
            while x_start < width {
                let x_end = (x_start + bs).min(width);
                let count = ((y_end - y_start) * (x_end - x_start)) as u32;

                let mut sums = [0u32; 4];
                for y in y_start..y_end {
                    let row = y * width * channels;
                    for x in x_start..x_end {
                        let px = row + x * channels;
                        for (c, sum) in sums.iter_mut().enumerate().take(channels) {
                            *sum += input[px + c] as u32;
                        }
                    }
                }

                let mut mean = [0u8; 4];
                for c in 0..channels {
                    mean[c] = ((sums[c] + count / 2) / count) as u8;
                }

                for y in y_start..y_end {
                    let row = (y - y_start) * width * channels;
                    for x in x_start..x_end {
                        let px = row + x * channels;
                        band[px..px + channels].copy_from_slice(&mean[..channels]);
                    }
                }

                x_start = x_end;
            }
        });

    PixelBuffer::new(
        buffer.width(),
        buffer.height(),
        buffer.channels(),
        output,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_rgb(width: u32, height: u32) -> PixelBuffer {
        let mut pixels = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                pixels.push((x * 7 % 256) as u8);
                pixels.push((y * 13 % 256) as u8);
                pixels.push(((x + y) * 5 % 256) as u8);
            }
        }
        PixelBuffer::new(width, height, 3, pixels).unwrap()
    }

    #[test]
    fn test_block_size_one_is_identity() {
        let buf = gradient_rgb(17, 11);
        let out = pixelize(&buf, 1).unwrap();
        assert_eq!(out, buf);
    }

    #[test]
    fn test_invalid_block_size() {
        let buf = gradient_rgb(4, 4);
        assert!(pixelize(&buf, 0).is_err());
        assert!(pixelize(&buf, 51).is_err());
    }

    #[test]
    fn test_uniform_image_unchanged() {
        // Uniform mid-gray RGBA: the block average of a uniform region is
        // the original value, so the output must be bit-identical.
        let buf = PixelBuffer::filled(100, 100, &[128, 128, 128, 255]).unwrap();
        let out = pixelize(&buf, 10).unwrap();
        assert_eq!(out, buf);
    }

    #[test]
    fn test_block_averages_with_truncated_edges() {
        // 3x3 single-channel-per-color image, block size 2:
        // top-left block is 2x2, right edge 1x2, bottom edge 2x1, corner 1x1.
        let pixels = vec![
            0, 0, 0, /**/ 10, 0, 0, /**/ 100, 0, 0, //
            20, 0, 0, /**/ 30, 0, 0, /**/ 110, 0, 0, //
            40, 0, 0, /**/ 50, 0, 0, /**/ 120, 0, 0,
        ];
        let buf = PixelBuffer::new(3, 3, 3, pixels).unwrap();
        let out = pixelize(&buf, 2).unwrap();

        // 2x2 block mean: (0+10+20+30)/4 = 15
        assert_eq!(out.pixel(0, 0)[0], 15);
        assert_eq!(out.pixel(1, 1)[0], 15);
        // right edge 1x2: (100+110)/2 = 105
        assert_eq!(out.pixel(2, 0)[0], 105);
        assert_eq!(out.pixel(2, 1)[0], 105);
        // bottom edge 2x1: (40+50)/2 = 45
        assert_eq!(out.pixel(0, 2)[0], 45);
        assert_eq!(out.pixel(1, 2)[0], 45);
        // corner 1x1 stays as-is
        assert_eq!(out.pixel(2, 2)[0], 120);
    }

    #[test]
    fn test_mean_rounds_to_nearest() {
        // (0 + 0 + 0 + 1)/4 = 0.25 -> 0, (1 + 1 + 1 + 2)/4 = 1.25 -> 1,
        // (0 + 1 + 1 + 1)/4 = 0.75 -> 1
        let pixels = vec![
            0, 1, 0, /**/ 0, 1, 1, //
            0, 1, 1, /**/ 1, 2, 1,
        ];
        let buf = PixelBuffer::new(2, 2, 3, pixels).unwrap();
        let out = pixelize(&buf, 2).unwrap();
        assert_eq!(out.pixel(0, 0), &[0, 1, 1]);
    }

    #[test]
    fn test_degenerate_block_covers_whole_image() {
        let buf = gradient_rgb(6, 4);
        let out = pixelize(&buf, 50).unwrap();
        let first = out.pixel(0, 0).to_vec();
        for y in 0..4 {
            for x in 0..6 {
                assert_eq!(out.pixel(x, y), first.as_slice());
            }
        }
    }

    #[test]
    fn test_alpha_is_averaged() {
        let pixels = vec![
            0, 0, 0, 0, /**/ 0, 0, 0, 100, //
            0, 0, 0, 100, /**/ 0, 0, 0, 100,
        ];
        let buf = PixelBuffer::new(2, 2, 4, pixels).unwrap();
        let out = pixelize(&buf, 2).unwrap();
        // (0 + 100 + 100 + 100)/4 = 75
        assert_eq!(out.pixel(0, 0)[3], 75);
    }

    #[test]
    fn test_input_is_not_mutated() {
        let buf = gradient_rgb(9, 9);
        let before = buf.clone();
        let _ = pixelize(&buf, 3).unwrap();
        assert_eq!(buf, before);
    }
}
