//! Slider Settings Model
//!
//! Continuously adjusted controls: pixel block size and the palette
//! parameter. These are deliberately NOT part of the operation history —
//! undo restores the base image and re-applies whatever is configured here.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StudioError};

/// UI bound for the block size slider.
pub const MAX_BLOCK_SIZE: u32 = 50;

/// Palette sizes offered by the UI selector.
pub const ACCEPTED_PALETTE_SIZES: [u16; 7] = [4, 8, 16, 32, 64, 128, 256];

/// Palette reduction control.
///
/// The UI exposes the enumerated `TargetK` selector; `Intensity` is the
/// continuous control kept for API flexibility. When a target palette size
/// is set it fully overrides intensity-derived thresholding.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaletteParameter {
    Disabled,
    Intensity(f32),
    TargetK(u16),
}

impl Default for PaletteParameter {
    fn default() -> Self {
        Self::Disabled
    }
}

impl PaletteParameter {
    pub fn validate(&self) -> Result<()> {
        match *self {
            Self::Disabled => Ok(()),
            Self::Intensity(v) => {
                if !(0.0..=1.0).contains(&v) {
                    return Err(StudioError::InvalidParameter(format!(
                        "intensity must be between 0.0 and 1.0, got {}",
                        v
                    )));
                }
                Ok(())
            }
            Self::TargetK(k) => {
                if !ACCEPTED_PALETTE_SIZES.contains(&k) {
                    return Err(StudioError::InvalidParameter(format!(
                        "palette size {} is not one of {:?}",
                        k, ACCEPTED_PALETTE_SIZES
                    )));
                }
                Ok(())
            }
        }
    }

    /// True when the reducer is a guaranteed pass-through.
    pub fn is_disabled(&self) -> bool {
        match *self {
            Self::Disabled => true,
            Self::Intensity(v) => v == 0.0,
            Self::TargetK(_) => false,
        }
    }
}

pub fn validate_block_size(block_size: u32) -> Result<()> {
    if block_size == 0 {
        return Err(StudioError::InvalidParameter(
            "pixel block size must be >= 1".to_string(),
        ));
    }
    if block_size > MAX_BLOCK_SIZE {
        return Err(StudioError::InvalidParameter(format!(
            "pixel block size should not exceed {}",
            MAX_BLOCK_SIZE
        )));
    }
    Ok(())
}

/// Active slider positions, applied on top of the base image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SliderSettings {
    /// Pixel block size (1-50). 1 means no pixelization.
    pub block_size: u32,
    /// Palette reduction control.
    pub palette: PaletteParameter,
}

impl Default for SliderSettings {
    fn default() -> Self {
        Self {
            block_size: 1,
            palette: PaletteParameter::Disabled,
        }
    }
}

impl SliderSettings {
    pub fn validate(&self) -> Result<()> {
        validate_block_size(self.block_size)?;
        self.palette.validate()
    }
}
