//! Background Mask Model and Providers
//!
//! A mask provider inspects an image (optionally guided by user-selected
//! points) and returns a single-channel alpha mask of the same dimensions.
//! Two providers exist behind one trait: an offline edge-color segmentation
//! heuristic and a hosted vision-analysis service. Applying the mask is the
//! background-removal complex operation.

use std::collections::HashMap;
use std::io::Cursor;
use std::time::Duration;

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::buffer::PixelBuffer;
use crate::error::{Result, StudioError};

// ============================================================================
// MASK DATA MODEL
// ============================================================================

/// Single-channel alpha mask; 0 = fully transparent, 255 = fully opaque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlphaMask {
    width: u32,
    height: u32,
    values: Vec<u8>,
}

impl AlphaMask {
    pub fn new(width: u32, height: u32, values: Vec<u8>) -> Result<Self> {
        if values.len() != width as usize * height as usize {
            return Err(StudioError::InvalidInput(format!(
                "mask length {} does not match {}x{}",
                values.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            values,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn value(&self, x: u32, y: u32) -> u8 {
        self.values[y as usize * self.width as usize + x as usize]
    }
}

/// Point selected by the user to steer mask generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskHint {
    pub x: u32,
    pub y: u32,
    pub polarity: HintPolarity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HintPolarity {
    /// Foreground: the hinted region must survive.
    Keep,
    /// Background: the hinted region must go.
    Remove,
}

fn validate_hints(buffer: &PixelBuffer, hints: &[MaskHint]) -> Result<()> {
    for hint in hints {
        if hint.x >= buffer.width() || hint.y >= buffer.height() {
            return Err(StudioError::InvalidInput(format!(
                "hint ({}, {}) outside {}x{} image",
                hint.x,
                hint.y,
                buffer.width(),
                buffer.height()
            )));
        }
    }
    Ok(())
}

/// Apply a mask to a buffer, producing an RGBA result.
///
/// Output alpha is the minimum of the input alpha and the mask value, so a
/// mask can only remove coverage, never resurrect pixels an earlier cutout
/// already cleared. RGB channels pass through unchanged.
pub fn apply_mask(buffer: &PixelBuffer, mask: &AlphaMask) -> Result<PixelBuffer> {
    if mask.width() != buffer.width() || mask.height() != buffer.height() {
        return Err(StudioError::InvalidInput(format!(
            "mask dimensions {}x{} do not match image {}x{}",
            mask.width(),
            mask.height(),
            buffer.width(),
            buffer.height()
        )));
    }

    let channels = buffer.channels() as usize;
    let mut out = Vec::with_capacity(buffer.pixels().len() / channels * 4);
    for (i, px) in buffer.pixels().chunks_exact(channels).enumerate() {
        let source_alpha = if channels == 4 { px[3] } else { 255 };
        out.extend_from_slice(&[px[0], px[1], px[2], source_alpha.min(mask.values[i])]);
    }

    PixelBuffer::new(buffer.width(), buffer.height(), 4, out)
}

// ============================================================================
// PROVIDER SEAM
// ============================================================================

/// Closed seam over the concrete segmentation backends, chosen at
/// construction time by the surrounding application.
pub trait MaskProvider: Send + Sync {
    fn label(&self) -> &str;

    fn produce_mask(&self, buffer: &PixelBuffer, hints: &[MaskHint]) -> Result<AlphaMask>;
}

// ============================================================================
// OFFLINE PROVIDER: EDGE-COLOR SEGMENTATION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeSegmentationSettings {
    /// Per-pixel color distance (sum of absolute RGB differences) below
    /// which a pixel counts as background.
    pub tolerance: u8,
    /// Width of the border band sampled for background colors.
    pub edge_band: u32,
    /// How many dominant border colors to treat as background.
    pub max_background_colors: usize,
}

impl Default for EdgeSegmentationSettings {
    fn default() -> Self {
        Self {
            tolerance: 15,
            edge_band: 5,
            max_background_colors: 3,
        }
    }
}

/// Offline heuristic segmentation: the dominant colors along the image
/// border are assumed to be background, and every pixel close to one of
/// them is masked out. `Remove` hints contribute additional background
/// colors; `Keep` hints protect everything close to the hinted color.
pub struct EdgeSegmentationProvider {
    settings: EdgeSegmentationSettings,
}

impl EdgeSegmentationProvider {
    pub fn new(settings: EdgeSegmentationSettings) -> Self {
        Self { settings }
    }
}

impl Default for EdgeSegmentationProvider {
    fn default() -> Self {
        Self::new(EdgeSegmentationSettings::default())
    }
}

fn rgb_of(px: &[u8]) -> [u8; 3] {
    [px[0], px[1], px[2]]
}

/// Sum of absolute channel differences.
fn rgb_color_distance(a: [u8; 3], b: [u8; 3]) -> i32 {
    (a[0] as i32 - b[0] as i32).abs()
        + (a[1] as i32 - b[1] as i32).abs()
        + (a[2] as i32 - b[2] as i32).abs()
}

/// Collect colors along the border band of the image.
fn sample_edge_colors(buffer: &PixelBuffer, band: u32) -> Vec<[u8; 3]> {
    let (width, height) = (buffer.width(), buffer.height());
    let mut colors = Vec::new();

    for y in 0..height {
        for x in 0..width {
            let on_band = x < band
                || y < band
                || x >= width.saturating_sub(band)
                || y >= height.saturating_sub(band);
            if on_band {
                colors.push(rgb_of(buffer.pixel(x, y)));
            }
        }
    }

    colors
}

/// Most common border colors, ties broken toward the lower RGB value. The
/// tolerance comparison downstream absorbs jitter around each dominant
/// color, so exact counting is enough here.
fn find_background_colors(edge_colors: &[[u8; 3]], max_colors: usize) -> Vec<[u8; 3]> {
    let mut color_counts: HashMap<[u8; 3], usize> = HashMap::new();
    for color in edge_colors {
        *color_counts.entry(*color).or_insert(0) += 1;
    }

    let mut counts: Vec<_> = color_counts.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    counts.into_iter().take(max_colors).map(|(c, _)| c).collect()
}

impl MaskProvider for EdgeSegmentationProvider {
    fn label(&self) -> &str {
        "edge-segmentation"
    }

    fn produce_mask(&self, buffer: &PixelBuffer, hints: &[MaskHint]) -> Result<AlphaMask> {
        validate_hints(buffer, hints)?;

        let tolerance = self.settings.tolerance as i32;
        let edge_colors = sample_edge_colors(buffer, self.settings.edge_band);
        let mut background =
            find_background_colors(&edge_colors, self.settings.max_background_colors);

        let mut protected: Vec<[u8; 3]> = Vec::new();
        for hint in hints {
            let color = rgb_of(buffer.pixel(hint.x, hint.y));
            match hint.polarity {
                HintPolarity::Remove => background.push(color),
                HintPolarity::Keep => protected.push(color),
            }
        }

        let (width, height) = (buffer.width(), buffer.height());
        let mut values = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                let rgb = rgb_of(buffer.pixel(x, y));
                let kept = protected
                    .iter()
                    .any(|&p| rgb_color_distance(rgb, p) <= tolerance);
                let is_background = !kept
                    && background
                        .iter()
                        .any(|&b| rgb_color_distance(rgb, b) <= tolerance);
                values.push(if is_background { 0 } else { 255 });
            }
        }

        AlphaMask::new(width, height, values)
    }
}

// ============================================================================
// HOSTED PROVIDER: VISION-ANALYSIS SERVICE
// ============================================================================

#[derive(Debug, Clone)]
pub struct HostedVisionConfig {
    pub endpoint: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

impl HostedVisionConfig {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            timeout_secs: 30,
        }
    }
}

#[derive(Serialize)]
struct MaskRequest<'a> {
    image: String,
    width: u32,
    height: u32,
    hints: &'a [MaskHint],
}

#[derive(Deserialize)]
struct MaskResponse {
    mask: String,
}

/// Mask provider backed by a hosted vision-analysis endpoint. The image is
/// shipped as base64 PNG; the service answers with a base64 raw mask of
/// width*height bytes. Every transport, status, or payload failure surfaces
/// as a provider error and leaves the pipeline untouched.
pub struct HostedVisionProvider {
    config: HostedVisionConfig,
    client: reqwest::blocking::Client,
}

impl HostedVisionProvider {
    pub fn new(config: HostedVisionConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StudioError::Provider(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { config, client })
    }
}

/// PNG-encode a buffer for transport.
pub(crate) fn encode_png(buffer: &PixelBuffer) -> Result<Vec<u8>> {
    let mut bytes = Cursor::new(Vec::new());
    if buffer.has_alpha() {
        buffer
            .to_rgba_image()
            .write_to(&mut bytes, image::ImageFormat::Png)?;
    } else {
        buffer
            .to_rgb_image()
            .write_to(&mut bytes, image::ImageFormat::Png)?;
    }
    Ok(bytes.into_inner())
}

impl MaskProvider for HostedVisionProvider {
    fn label(&self) -> &str {
        "hosted-vision"
    }

    fn produce_mask(&self, buffer: &PixelBuffer, hints: &[MaskHint]) -> Result<AlphaMask> {
        validate_hints(buffer, hints)?;

        let png = encode_png(buffer)?;
        let request = MaskRequest {
            image: base64::engine::general_purpose::STANDARD.encode(png),
            width: buffer.width(),
            height: buffer.height(),
            hints,
        };

        log::info!(
            "requesting mask from {} for {}x{} image",
            self.config.endpoint,
            buffer.width(),
            buffer.height()
        );

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .map_err(|e| StudioError::Provider(format!("mask request failed: {}", e)))?
            .error_for_status()
            .map_err(|e| StudioError::Provider(format!("mask service rejected request: {}", e)))?;

        let payload: MaskResponse = response
            .json()
            .map_err(|e| StudioError::Provider(format!("malformed mask response: {}", e)))?;

        let values = base64::engine::general_purpose::STANDARD
            .decode(payload.mask.as_bytes())
            .map_err(|e| StudioError::Provider(format!("mask payload is not base64: {}", e)))?;

        AlphaMask::new(buffer.width(), buffer.height(), values).map_err(|e| {
            StudioError::Provider(format!("mask payload has wrong dimensions: {}", e))
        })
    }
}
