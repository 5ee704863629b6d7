//! Image Load/Save Boundary
//!
//! Collaborator seam around the core: decoding into a `PixelBuffer` and
//! writing the processed result back out. Output is always PNG so channel
//! data round-trips losslessly, alpha included.

use std::fs;
use std::path::{Path, PathBuf};

use log::info;

use crate::buffer::PixelBuffer;
use crate::error::{Result, StudioError};

pub const SUPPORTED_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "gif", "bmp", "webp"];

/// Externally enforced dimension ceiling for loaded images.
pub const MAX_DIMENSION: u32 = 2000;

fn validate_extension(path: &Path) -> Result<()> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    if !SUPPORTED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(StudioError::InvalidInput(format!(
            "unsupported image format '{}'; use one of {:?}",
            extension, SUPPORTED_EXTENSIONS
        )));
    }
    Ok(())
}

/// Load and validate an image file.
///
/// Alpha is preserved exactly when the source carries it; every other mode
/// is normalized to RGB8. Dimensions are checked from the header before the
/// full decode runs.
pub fn load_image(path: &Path) -> Result<PixelBuffer> {
    validate_extension(path)?;

    let (width, height) = image::image_dimensions(path)?;
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(StudioError::InvalidInput(format!(
            "image dimensions {}x{} exceed maximum of {}x{}",
            width, height, MAX_DIMENSION, MAX_DIMENSION
        )));
    }

    let decoded = image::open(path)?;
    let buffer = if decoded.color().has_alpha() {
        PixelBuffer::from_rgba_image(&decoded.to_rgba8())?
    } else {
        PixelBuffer::from_rgb_image(&decoded.to_rgb8())?
    };

    info!(
        "loaded {} ({}x{}, alpha: {})",
        path.display(),
        buffer.width(),
        buffer.height(),
        buffer.has_alpha()
    );
    Ok(buffer)
}

/// Save a buffer as PNG, appending the extension when missing and creating
/// parent directories as needed.
pub fn save_image(buffer: &PixelBuffer, path: &Path) -> Result<PathBuf> {
    let mut target = path.to_path_buf();
    let needs_extension = target
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| !e.eq_ignore_ascii_case("png"))
        .unwrap_or(true);
    if needs_extension {
        target.set_extension("png");
    }

    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    if buffer.has_alpha() {
        buffer
            .to_rgba_image()
            .save_with_format(&target, image::ImageFormat::Png)?;
    } else {
        buffer
            .to_rgb_image()
            .save_with_format(&target, image::ImageFormat::Png)?;
    }

    info!("saved {}", target.display());
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_extension_rejected() {
        assert!(load_image(Path::new("picture.tiff")).is_err());
        assert!(load_image(Path::new("picture")).is_err());
    }

    #[test]
    fn test_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.png");
        assert!(load_image(&path).is_err());
    }

    #[test]
    fn test_save_load_round_trips_alpha() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");

        let mut pixels = Vec::new();
        for i in 0..16u32 {
            pixels.extend_from_slice(&[(i * 13) as u8, (i * 7) as u8, i as u8, (i * 16) as u8]);
        }
        let buffer = PixelBuffer::new(4, 4, 4, pixels).unwrap();

        let written = save_image(&buffer, &path).unwrap();
        let loaded = load_image(&written).unwrap();
        assert_eq!(loaded, buffer);
    }

    #[test]
    fn test_save_appends_png_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result");

        let buffer = PixelBuffer::filled(2, 2, &[1, 2, 3]).unwrap();
        let written = save_image(&buffer, &path).unwrap();
        assert_eq!(written.extension().unwrap(), "png");
        assert!(written.exists());
    }

    #[test]
    fn test_oversized_image_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.png");

        let buffer = PixelBuffer::filled(MAX_DIMENSION + 1, 1, &[0, 0, 0]).unwrap();
        save_image(&buffer, &path).unwrap();
        let result = load_image(&path);
        assert!(matches!(result, Err(StudioError::InvalidInput(_))));
    }

    #[test]
    fn test_rgb_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rgb.png");

        let buffer = PixelBuffer::filled(3, 5, &[10, 200, 30]).unwrap();
        let written = save_image(&buffer, &path).unwrap();
        let loaded = load_image(&written).unwrap();
        assert_eq!(loaded, buffer);
    }
}
