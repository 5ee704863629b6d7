//! Pipeline Coordinator
//!
//! Owns the base image (state after the last complex operation), the
//! displayed current image, the slider settings, and the operation history.
//! The ordering contract that makes undo correct:
//!
//!   current == reduce_colors(pixelize(base, block_size), palette)
//!
//! No code path writes `current` outside the recompute rule. Complex
//! operations snapshot the base before committing; undo restores the
//! snapshot and recomputes with the sliders as they are configured *now*.

use log::{debug, info};

use crate::buffer::{ImageStatistics, PixelBuffer};
use crate::error::{Result, StudioError};
use crate::history::{OperationHistory, OperationKind};
use crate::levels;
use crate::mask::{self, MaskHint, MaskProvider};
use crate::pixelize::pixelize;
use crate::reduce::reduce_colors;
use crate::settings::{validate_block_size, PaletteParameter, SliderSettings};

struct PipelineState {
    base: PixelBuffer,
    current: PixelBuffer,
}

/// Single-owner, single-writer orchestration of the transform pipeline.
/// All mutation flows through the slider setters, the complex-operation
/// methods, `undo`, and `load`.
pub struct PipelineCoordinator {
    state: Option<PipelineState>,
    settings: SliderSettings,
    history: OperationHistory,
}

impl Default for PipelineCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineCoordinator {
    pub fn new() -> Self {
        Self {
            state: None,
            settings: SliderSettings::default(),
            history: OperationHistory::new(),
        }
    }

    /// Install a freshly loaded image: history is discarded and the sliders
    /// return to their disabled defaults, so the new image starts untouched.
    pub fn load(&mut self, buffer: PixelBuffer) {
        info!(
            "loaded {}x{} image ({} channels)",
            buffer.width(),
            buffer.height(),
            buffer.channels()
        );
        self.history.clear();
        self.settings = SliderSettings::default();
        self.state = Some(PipelineState {
            current: buffer.clone(),
            base: buffer,
        });
    }

    pub fn is_loaded(&self) -> bool {
        self.state.is_some()
    }

    /// The image state after the last complex operation, before sliders.
    pub fn base(&self) -> Option<&PixelBuffer> {
        self.state.as_ref().map(|s| &s.base)
    }

    /// The displayed image.
    pub fn current(&self) -> Option<&PixelBuffer> {
        self.state.as_ref().map(|s| &s.current)
    }

    pub fn settings(&self) -> SliderSettings {
        self.settings
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn statistics(&self) -> Option<ImageStatistics> {
        self.state.as_ref().map(|s| ImageStatistics::of(&s.current))
    }

    /// `current` as derived from an arbitrary base under given sliders.
    fn derive(base: &PixelBuffer, settings: &SliderSettings) -> Result<PixelBuffer> {
        reduce_colors(&pixelize(base, settings.block_size)?, &settings.palette)
    }

    /// Swap in new settings and recompute, or fail without touching state.
    fn apply_settings(&mut self, settings: SliderSettings) -> Result<()> {
        if let Some(state) = self.state.as_mut() {
            let current = Self::derive(&state.base, &settings)?;
            debug!(
                "recomputed current: block_size={} palette={:?}",
                settings.block_size, settings.palette
            );
            state.current = current;
        }
        self.settings = settings;
        Ok(())
    }

    pub fn set_block_size(&mut self, block_size: u32) -> Result<()> {
        validate_block_size(block_size)?;
        let mut settings = self.settings;
        settings.block_size = block_size;
        self.apply_settings(settings)
    }

    pub fn set_palette(&mut self, palette: PaletteParameter) -> Result<()> {
        palette.validate()?;
        let mut settings = self.settings;
        settings.palette = palette;
        self.apply_settings(settings)
    }

    /// Commit a complex operation: history entry and new base are installed
    /// only after the whole result (including the derived current) exists,
    /// so a failure anywhere leaves base, current, and history untouched.
    fn commit_operation(&mut self, kind: OperationKind, new_base: PixelBuffer) -> Result<()> {
        let current = Self::derive(&new_base, &self.settings)?;
        let state = self
            .state
            .as_mut()
            .ok_or_else(|| StudioError::InvalidInput("no image loaded".to_string()))?;

        let snapshot = std::mem::replace(&mut state.base, new_base);
        self.history.push(kind, snapshot);
        state.current = current;
        info!("committed {} (history depth {})", kind.as_str(), self.history.len());
        Ok(())
    }

    /// Remove the background using the given mask provider. Each invocation
    /// operates on the then-current base, so repeated removals stack as
    /// independent history entries.
    pub fn remove_background(
        &mut self,
        provider: &dyn MaskProvider,
        hints: &[MaskHint],
    ) -> Result<()> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| StudioError::InvalidInput("no image loaded".to_string()))?;

        info!("removing background via {} provider", provider.label());
        let alpha_mask = provider.produce_mask(&state.base, hints)?;
        let new_base = mask::apply_mask(&state.base, &alpha_mask)?;
        self.commit_operation(OperationKind::RemoveBackground, new_base)
    }

    /// Clip shadow and highlight bands as a history-tracked edit.
    pub fn adjust_levels(&mut self, darks_cutoff: f32, lights_cutoff: f32) -> Result<()> {
        let state = self
            .state
            .as_ref()
            .ok_or_else(|| StudioError::InvalidInput("no image loaded".to_string()))?;

        let new_base = levels::apply_levels(&state.base, darks_cutoff, lights_cutoff)?;
        self.commit_operation(OperationKind::AdjustLevels, new_base)
    }

    /// Roll back the most recent complex operation. Slider settings are
    /// intentionally left alone; the restored base is re-rendered through
    /// whatever the sliders say right now. Returns false when there is
    /// nothing to undo.
    pub fn undo(&mut self) -> Result<bool> {
        if self.state.is_none() {
            return Ok(false);
        }
        // Derive against the snapshot before popping so a failure leaves the
        // history intact.
        let current = match self.history.peek() {
            Some(entry) => Self::derive(&entry.snapshot, &self.settings)?,
            None => return Ok(false),
        };
        let entry = match self.history.pop() {
            Some(entry) => entry,
            None => return Ok(false),
        };
        info!("undo {} (history depth {})", entry.kind.as_str(), self.history.len());
        if let Some(state) = self.state.as_mut() {
            state.base = entry.snapshot;
            state.current = current;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mask::{AlphaMask, EdgeSegmentationProvider};

    fn gradient(width: u32, height: u32) -> PixelBuffer {
        let mut pixels = Vec::new();
        for y in 0..height {
            for x in 0..width {
                pixels.extend_from_slice(&[
                    (x * 15 % 256) as u8,
                    (y * 9 % 256) as u8,
                    ((x * y) % 256) as u8,
                ]);
            }
        }
        PixelBuffer::new(width, height, 3, pixels).unwrap()
    }

    struct FailingProvider;

    impl MaskProvider for FailingProvider {
        fn label(&self) -> &str {
            "failing"
        }

        fn produce_mask(&self, _buffer: &PixelBuffer, _hints: &[MaskHint]) -> Result<AlphaMask> {
            Err(StudioError::Provider("service unavailable".to_string()))
        }
    }

    struct ClearCornerProvider;

    impl MaskProvider for ClearCornerProvider {
        fn label(&self) -> &str {
            "clear-corner"
        }

        /// Masks out the single top-left pixel.
        fn produce_mask(&self, buffer: &PixelBuffer, _hints: &[MaskHint]) -> Result<AlphaMask> {
            let mut values = vec![255u8; (buffer.width() * buffer.height()) as usize];
            values[0] = 0;
            AlphaMask::new(buffer.width(), buffer.height(), values)
        }
    }

    #[test]
    fn test_operations_require_loaded_image() {
        let mut coordinator = PipelineCoordinator::new();
        assert!(coordinator.adjust_levels(10.0, 0.0).is_err());
        assert!(coordinator
            .remove_background(&EdgeSegmentationProvider::default(), &[])
            .is_err());
        assert!(!coordinator.is_loaded());
    }

    #[test]
    fn test_slider_change_recomputes_current_only() {
        let mut coordinator = PipelineCoordinator::new();
        let base = gradient(16, 16);
        coordinator.load(base.clone());

        coordinator.set_block_size(4).unwrap();
        assert_eq!(coordinator.base().unwrap(), &base);
        let expected = PipelineCoordinator::derive(
            &base,
            &SliderSettings {
                block_size: 4,
                palette: PaletteParameter::Disabled,
            },
        )
        .unwrap();
        assert_eq!(coordinator.current().unwrap(), &expected);
        assert_eq!(coordinator.history_len(), 0);
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let mut coordinator = PipelineCoordinator::new();
        coordinator.load(gradient(20, 20));
        coordinator.set_block_size(5).unwrap();
        coordinator.set_palette(PaletteParameter::TargetK(16)).unwrap();
        let first = coordinator.current().unwrap().clone();

        coordinator.set_palette(PaletteParameter::TargetK(16)).unwrap();
        assert_eq!(coordinator.current().unwrap(), &first);
    }

    #[test]
    fn test_complex_operation_commits_and_records() {
        let mut coordinator = PipelineCoordinator::new();
        let base0 = gradient(8, 8);
        coordinator.load(base0.clone());

        coordinator.adjust_levels(25.0, 0.0).unwrap();
        assert_eq!(coordinator.history_len(), 1);
        assert_ne!(coordinator.base().unwrap(), &base0);

        // The operation ran against the base, and current was re-derived.
        let expected = levels::apply_levels(&base0, 25.0, 0.0).unwrap();
        assert_eq!(coordinator.base().unwrap(), &expected);
        assert_eq!(coordinator.current().unwrap(), &expected);
    }

    #[test]
    fn test_repeated_operations_stack() {
        let mut coordinator = PipelineCoordinator::new();
        coordinator.load(gradient(8, 8));

        coordinator
            .remove_background(&ClearCornerProvider, &[])
            .unwrap();
        let after_first = coordinator.base().unwrap().clone();
        coordinator
            .remove_background(&ClearCornerProvider, &[])
            .unwrap();

        assert_eq!(coordinator.history_len(), 2);

        // Undo peels back to the first removal's output, not the original.
        assert!(coordinator.undo().unwrap());
        assert_eq!(coordinator.base().unwrap(), &after_first);
        assert!(coordinator.undo().unwrap());
        assert_eq!(coordinator.history_len(), 0);
    }

    #[test]
    fn test_provider_failure_leaves_state_untouched() {
        let mut coordinator = PipelineCoordinator::new();
        let base = gradient(8, 8);
        coordinator.load(base.clone());
        coordinator.set_block_size(2).unwrap();
        let current_before = coordinator.current().unwrap().clone();

        let result = coordinator.remove_background(&FailingProvider, &[]);
        assert!(matches!(result, Err(StudioError::Provider(_))));
        assert_eq!(coordinator.base().unwrap(), &base);
        assert_eq!(coordinator.current().unwrap(), &current_before);
        assert_eq!(coordinator.history_len(), 0);
    }

    #[test]
    fn test_undo_restores_base_and_preserves_sliders() {
        let mut coordinator = PipelineCoordinator::new();
        let base0 = gradient(16, 16);
        coordinator.load(base0.clone());

        coordinator.set_block_size(4).unwrap();
        coordinator.set_palette(PaletteParameter::TargetK(16)).unwrap();

        coordinator.adjust_levels(30.0, 10.0).unwrap();
        assert_ne!(coordinator.base().unwrap(), &base0);

        coordinator.set_block_size(8).unwrap();
        coordinator.set_palette(PaletteParameter::TargetK(32)).unwrap();

        assert!(coordinator.undo().unwrap());

        // Base is back to the pre-operation snapshot...
        assert_eq!(coordinator.base().unwrap(), &base0);
        // ...and current reflects the *new* slider positions, not the ones
        // active when the operation was recorded.
        let expected = PipelineCoordinator::derive(
            &base0,
            &SliderSettings {
                block_size: 8,
                palette: PaletteParameter::TargetK(32),
            },
        )
        .unwrap();
        assert_eq!(coordinator.current().unwrap(), &expected);
        assert_eq!(coordinator.settings().block_size, 8);
        assert_eq!(
            coordinator.settings().palette,
            PaletteParameter::TargetK(32)
        );
    }

    #[test]
    fn test_undo_with_empty_history_is_noop() {
        let mut coordinator = PipelineCoordinator::new();
        coordinator.load(gradient(4, 4));
        assert!(!coordinator.undo().unwrap());
    }

    #[test]
    fn test_load_resets_history_and_sliders() {
        let mut coordinator = PipelineCoordinator::new();
        coordinator.load(gradient(8, 8));
        coordinator.set_block_size(6).unwrap();
        coordinator.adjust_levels(10.0, 10.0).unwrap();
        assert!(coordinator.can_undo());

        let fresh = gradient(12, 12);
        coordinator.load(fresh.clone());
        assert!(!coordinator.can_undo());
        assert_eq!(coordinator.settings(), SliderSettings::default());
        assert_eq!(coordinator.base().unwrap(), &fresh);
        assert_eq!(coordinator.current().unwrap(), &fresh);
    }

    #[test]
    fn test_statistics_follow_current() {
        let mut coordinator = PipelineCoordinator::new();
        coordinator.load(gradient(16, 16));
        let before = coordinator.statistics().unwrap();

        coordinator.set_palette(PaletteParameter::TargetK(8)).unwrap();
        let after = coordinator.statistics().unwrap();
        assert!(after.distinct_color_count <= 8);
        assert!(after.distinct_color_count <= before.distinct_color_count);
    }
}
