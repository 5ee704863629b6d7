//! Editor Service
//!
//! Async facade over the pipeline coordinator. Long-running complex
//! operations execute on a blocking worker (never the event thread), and a
//! processing started/finished event pair tells the UI layer when to lock
//! and unlock its controls. A second complex-operation request while one is
//! in flight is rejected; slider changes and undo serialize on the
//! coordinator mutex like every other mutation.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::warn;
use tokio::sync::broadcast;

use crate::buffer::{ImageStatistics, PixelBuffer};
use crate::error::{Result, StudioError};
use crate::io;
use crate::mask::{MaskHint, MaskProvider};
use crate::pipeline::PipelineCoordinator;
use crate::settings::{PaletteParameter, SliderSettings};

/// Signals bracketing every complex operation, for the UI to lock and
/// unlock its controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingEvent {
    Started,
    Finished { success: bool },
}

#[derive(Clone)]
pub struct EditorService {
    coordinator: Arc<Mutex<PipelineCoordinator>>,
    busy: Arc<AtomicBool>,
    events: broadcast::Sender<ProcessingEvent>,
}

impl Default for EditorService {
    fn default() -> Self {
        Self::new()
    }
}

impl EditorService {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            coordinator: Arc::new(Mutex::new(PipelineCoordinator::new())),
            busy: Arc::new(AtomicBool::new(false)),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProcessingEvent> {
        self.events.subscribe()
    }

    /// Run a closure against the coordinator under the mutex.
    pub fn with_coordinator<R>(&self, f: impl FnOnce(&mut PipelineCoordinator) -> R) -> R {
        let mut guard = self
            .coordinator
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    pub async fn load_from_path(&self, path: PathBuf) -> Result<()> {
        let buffer = tokio::task::spawn_blocking(move || io::load_image(&path))
            .await
            .map_err(|e| StudioError::Processing(format!("task join error: {}", e)))??;
        self.with_coordinator(|c| c.load(buffer));
        Ok(())
    }

    pub fn load_buffer(&self, buffer: PixelBuffer) {
        self.with_coordinator(|c| c.load(buffer));
    }

    pub async fn save_to_path(&self, path: PathBuf) -> Result<PathBuf> {
        let buffer = self
            .with_coordinator(|c| c.current().cloned())
            .ok_or_else(|| StudioError::InvalidInput("no image loaded".to_string()))?;
        tokio::task::spawn_blocking(move || io::save_image(&buffer, &path))
            .await
            .map_err(|e| StudioError::Processing(format!("task join error: {}", e)))?
    }

    pub fn set_block_size(&self, block_size: u32) -> Result<()> {
        self.with_coordinator(|c| c.set_block_size(block_size))
    }

    pub fn set_palette(&self, palette: PaletteParameter) -> Result<()> {
        self.with_coordinator(|c| c.set_palette(palette))
    }

    pub fn settings(&self) -> SliderSettings {
        self.with_coordinator(|c| c.settings())
    }

    pub fn statistics(&self) -> Option<ImageStatistics> {
        self.with_coordinator(|c| c.statistics())
    }

    pub fn can_undo(&self) -> bool {
        self.with_coordinator(|c| c.can_undo())
    }

    pub fn undo(&self) -> Result<bool> {
        self.with_coordinator(|c| c.undo())
    }

    /// Remove the background off-thread, bracketed by processing events.
    pub async fn remove_background(
        &self,
        provider: Arc<dyn MaskProvider>,
        hints: Vec<MaskHint>,
    ) -> Result<()> {
        self.run_complex(move |coordinator| {
            coordinator.remove_background(provider.as_ref(), &hints)
        })
        .await
    }

    /// Apply a levels adjustment off-thread, bracketed by processing events.
    pub async fn adjust_levels(&self, darks_cutoff: f32, lights_cutoff: f32) -> Result<()> {
        self.run_complex(move |coordinator| coordinator.adjust_levels(darks_cutoff, lights_cutoff))
            .await
    }

    async fn run_complex<F>(&self, operation: F) -> Result<()>
    where
        F: FnOnce(&mut PipelineCoordinator) -> Result<()> + Send + 'static,
    {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("rejected complex operation: another one is in flight");
            return Err(StudioError::Processing(
                "a complex operation is already in progress".to_string(),
            ));
        }

        let _ = self.events.send(ProcessingEvent::Started);

        let coordinator = Arc::clone(&self.coordinator);
        let result = tokio::task::spawn_blocking(move || {
            let mut guard = coordinator
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            operation(&mut guard)
        })
        .await
        .map_err(|e| StudioError::Processing(format!("task join error: {}", e)))
        .and_then(|r| r);

        self.busy.store(false, Ordering::SeqCst);
        let _ = self.events.send(ProcessingEvent::Finished {
            success: result.is_ok(),
        });
        result
    }
}
