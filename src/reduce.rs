//! Two-Stage Color Reduction
//!
//! Stage 1 quantizes each RGB channel to a step derived from the intensity
//! slider, collapsing near-duplicate colors cheaply. Stage 2 clusters the
//! remaining distinct colors globally: greedy grouping in descending
//! frequency order, absorbing colors within a Euclidean RGB distance of the
//! group seed, then rewriting every member to the group's frequency-weighted
//! mean. Both stages leave the alpha channel untouched per pixel.
//!
//! Determinism contract: the pipeline is re-run after every undo and must
//! reproduce bit-identical output for identical input and parameters. Ties
//! in frequency are broken toward the lower packed RGB value.

use std::collections::HashMap;

use rayon::prelude::*;

use crate::buffer::PixelBuffer;
use crate::error::{Result, StudioError};
use crate::settings::{PaletteParameter, ACCEPTED_PALETTE_SIZES};

/// Largest possible squared Euclidean distance between two RGB colors.
const MAX_DISTANCE_SQ: u64 = 3 * 255 * 255;

/// When only a target palette size is given, images with more distinct
/// colors than this are pre-collapsed with a mild quantization step so the
/// global clustering stays interactive.
const PRECOLLAPSE_LIMIT: usize = 4096;
const PRECOLLAPSE_STEP: u32 = 4;

/// Reduce the buffer's palette according to the slider parameter.
pub fn reduce_colors(buffer: &PixelBuffer, palette: &PaletteParameter) -> Result<PixelBuffer> {
    palette.validate()?;
    match *palette {
        PaletteParameter::Disabled => Ok(buffer.clone()),
        PaletteParameter::Intensity(intensity) => reduce_colors_raw(buffer, intensity, None),
        PaletteParameter::TargetK(k) => reduce_colors_raw(buffer, 0.0, Some(k)),
    }
}

/// Flexible entry point: a continuous intensity, an optional direct target
/// palette size, or both. A supplied `target_k` fully overrides
/// intensity-derived thresholding for Stage 2; intensity is still honored
/// by Stage 1 quantization.
pub fn reduce_colors_raw(
    buffer: &PixelBuffer,
    intensity: f32,
    target_k: Option<u16>,
) -> Result<PixelBuffer> {
    if !(0.0..=1.0).contains(&intensity) {
        return Err(StudioError::InvalidParameter(format!(
            "intensity must be between 0.0 and 1.0, got {}",
            intensity
        )));
    }
    if let Some(k) = target_k {
        if !ACCEPTED_PALETTE_SIZES.contains(&k) {
            return Err(StudioError::InvalidParameter(format!(
                "palette size {} is not one of {:?}",
                k, ACCEPTED_PALETTE_SIZES
            )));
        }
    }
    if buffer.pixels().is_empty() {
        return Err(StudioError::InvalidInput(
            "cannot reduce colors of an empty image".to_string(),
        ));
    }

    if intensity == 0.0 && target_k.is_none() {
        return Ok(buffer.clone());
    }

    let channels = buffer.channels() as usize;

    // Stage 1: per-channel quantization.
    let mut pixels = buffer.pixels().to_vec();
    let step = quantization_step(intensity);
    quantize(&mut pixels, channels, step);

    if target_k.is_some() && step == 1 && count_colors(&pixels, channels) > PRECOLLAPSE_LIMIT {
        quantize(&mut pixels, channels, PRECOLLAPSE_STEP);
    }

    // Stage 2: global palette clustering.
    if intensity > 0.0 || target_k.is_some() {
        let histogram = color_histogram(&pixels, channels);
        let colors = sorted_by_frequency(histogram);

        let threshold_sq = match target_k {
            Some(k) => search_threshold(&colors, k as usize),
            None => {
                let t = merge_threshold(intensity);
                (t * t) as u64
            }
        };

        let groups = cluster(&colors, threshold_sq);
        let mapping = group_mapping(&colors, &groups);

        pixels.par_chunks_mut(channels).for_each(|px| {
            if let Some(mean) = mapping.get(&[px[0], px[1], px[2]]) {
                px[..3].copy_from_slice(mean);
            }
        });
    }

    PixelBuffer::new(buffer.width(), buffer.height(), buffer.channels(), pixels)
}

/// Intensity 0.0 maps to step 1 (no change), 1.0 to step 64.
fn quantization_step(intensity: f32) -> u32 {
    1 + (intensity * 63.0) as u32
}

/// Intensity-derived Stage-2 merge distance, monotonically increasing.
fn merge_threshold(intensity: f32) -> f64 {
    160.0 * intensity as f64
}

/// Round each RGB channel to the nearest multiple of `step`, clamped to 255.
fn quantize(pixels: &mut [u8], channels: usize, step: u32) {
    if step <= 1 {
        return;
    }
    pixels.par_chunks_mut(channels).for_each(|px| {
        for v in px.iter_mut().take(3) {
            let q = ((*v as u32 + step / 2) / step) * step;
            *v = q.min(255) as u8;
        }
    });
}

fn count_colors(pixels: &[u8], channels: usize) -> usize {
    color_histogram(pixels, channels).len()
}

fn color_histogram(pixels: &[u8], channels: usize) -> HashMap<[u8; 3], u64> {
    let mut counts: HashMap<[u8; 3], u64> = HashMap::new();
    for px in pixels.chunks_exact(channels) {
        *counts.entry([px[0], px[1], px[2]]).or_insert(0) += 1;
    }
    counts
}

#[inline]
fn pack(rgb: [u8; 3]) -> u32 {
    ((rgb[0] as u32) << 16) | ((rgb[1] as u32) << 8) | rgb[2] as u32
}

#[inline]
fn distance_sq(a: [u8; 3], b: [u8; 3]) -> u64 {
    let dr = a[0] as i64 - b[0] as i64;
    let dg = a[1] as i64 - b[1] as i64;
    let db = a[2] as i64 - b[2] as i64;
    (dr * dr + dg * dg + db * db) as u64
}

/// Descending frequency; equal frequencies order by lower packed RGB first.
fn sorted_by_frequency(histogram: HashMap<[u8; 3], u64>) -> Vec<([u8; 3], u64)> {
    let mut colors: Vec<_> = histogram.into_iter().collect();
    colors.sort_by(|a, b| b.1.cmp(&a.1).then(pack(a.0).cmp(&pack(b.0))));
    colors
}

/// A cluster of near-duplicate colors, seeded by its most frequent member.
struct ColorGroup {
    /// Indices into the frequency-sorted color list.
    members: Vec<usize>,
}

/// Greedy grouping: each ungrouped color in frequency order opens a group
/// and absorbs every later ungrouped color within `threshold_sq` of it.
fn cluster(colors: &[([u8; 3], u64)], threshold_sq: u64) -> Vec<ColorGroup> {
    let mut grouped = vec![false; colors.len()];
    let mut groups = Vec::new();

    for i in 0..colors.len() {
        if grouped[i] {
            continue;
        }
        grouped[i] = true;
        let seed = colors[i].0;
        let mut members = vec![i];

        if threshold_sq > 0 {
            for (j, slot) in grouped.iter_mut().enumerate().skip(i + 1) {
                if !*slot && distance_sq(seed, colors[j].0) <= threshold_sq {
                    *slot = true;
                    members.push(j);
                }
            }
        }

        groups.push(ColorGroup { members });
    }

    groups
}

fn group_count(colors: &[([u8; 3], u64)], threshold_sq: u64) -> usize {
    cluster(colors, threshold_sq).len()
}

/// Smallest squared threshold whose greedy grouping yields at most
/// `target_k` groups. The count is non-increasing in the threshold, so a
/// binary search over the integer range is exact and deterministic.
fn search_threshold(colors: &[([u8; 3], u64)], target_k: usize) -> u64 {
    if colors.len() <= target_k {
        return 0;
    }
    let mut lo = 0u64;
    let mut hi = MAX_DISTANCE_SQ;
    while lo < hi {
        let mid = (lo + hi) / 2;
        if group_count(colors, mid) <= target_k {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    lo
}

/// Map every member color to its group's frequency-weighted mean.
fn group_mapping(
    colors: &[([u8; 3], u64)],
    groups: &[ColorGroup],
) -> HashMap<[u8; 3], [u8; 3]> {
    let mut mapping = HashMap::with_capacity(colors.len());
    for group in groups {
        let mut sums = [0u64; 3];
        let mut total = 0u64;
        for &idx in &group.members {
            let (rgb, count) = colors[idx];
            for c in 0..3 {
                sums[c] += rgb[c] as u64 * count;
            }
            total += count;
        }
        let mean = [
            ((sums[0] + total / 2) / total) as u8,
            ((sums[1] + total / 2) / total) as u8,
            ((sums[2] + total / 2) / total) as u8,
        ];
        for &idx in &group.members {
            mapping.insert(colors[idx].0, mean);
        }
    }
    mapping
}
