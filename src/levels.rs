//! Tonal Levels Adjustment
//!
//! Histogram-based clipping of shadows and highlights. Shares the stateless
//! transform-over-buffer contract with the pixelizer and color reducer; in
//! the pipeline it participates as a complex (history-tracked) operation,
//! not a slider transform.

use rayon::prelude::*;

use crate::buffer::PixelBuffer;
use crate::error::{Result, StudioError};

/// Rec. 601 luma weights, matching the histogram the UI displays.
#[inline]
fn luminance(px: &[u8]) -> f32 {
    0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32
}

/// Frequency count per tone level (0-255) over RGB luminance.
pub fn histogram(buffer: &PixelBuffer) -> Result<[u32; 256]> {
    if buffer.pixels().is_empty() {
        return Err(StudioError::InvalidInput(
            "cannot calculate histogram for an empty image".to_string(),
        ));
    }
    let mut bins = [0u32; 256];
    let channels = buffer.channels() as usize;
    for px in buffer.pixels().chunks_exact(channels) {
        bins[(luminance(px) as usize).min(255)] += 1;
    }
    Ok(bins)
}

/// Clip the darkest `darks_cutoff` percent of pixels to black and the
/// lightest `lights_cutoff` percent to white. Cutoffs are percentages in
/// [0, 100]; both zero is an exact pass-through. Alpha is preserved.
pub fn apply_levels(
    buffer: &PixelBuffer,
    darks_cutoff: f32,
    lights_cutoff: f32,
) -> Result<PixelBuffer> {
    for (name, value) in [("darks_cutoff", darks_cutoff), ("lights_cutoff", lights_cutoff)] {
        if !(0.0..=100.0).contains(&value) {
            return Err(StudioError::InvalidParameter(format!(
                "{} must be between 0.0 and 100.0, got {}",
                name, value
            )));
        }
    }

    if darks_cutoff == 0.0 && lights_cutoff == 0.0 {
        return Ok(buffer.clone());
    }

    let bins = histogram(buffer)?;
    let mut cumulative = [0u64; 256];
    let mut running = 0u64;
    for (slot, &count) in cumulative.iter_mut().zip(bins.iter()) {
        running += count as u64;
        *slot = running;
    }
    let total = running as f64;

    // Percentile thresholds on the cumulative distribution.
    let darks_threshold = if darks_cutoff > 0.0 {
        let target = total * (darks_cutoff as f64 / 100.0);
        cumulative
            .partition_point(|&c| c as f64 <= target)
            .min(255) as f32
    } else {
        -1.0
    };
    let lights_threshold = if lights_cutoff > 0.0 {
        let target = total * (1.0 - lights_cutoff as f64 / 100.0);
        cumulative.partition_point(|&c| (c as f64) < target) as f32
    } else {
        256.0
    };

    let channels = buffer.channels() as usize;
    let mut pixels = buffer.pixels().to_vec();
    pixels.par_chunks_mut(channels).for_each(|px| {
        let lum = luminance(px);
        if darks_cutoff > 0.0 && lum <= darks_threshold {
            px[..3].copy_from_slice(&[0, 0, 0]);
        }
        if lights_cutoff > 0.0 && lum >= lights_threshold {
            px[..3].copy_from_slice(&[255, 255, 255]);
        }
    });

    PixelBuffer::new(buffer.width(), buffer.height(), buffer.channels(), pixels)
}
