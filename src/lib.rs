//! Image pixelization and palette reduction studio.
//!
//! The core is a stateless transform pipeline (block-average pixelization,
//! two-stage color reduction, tonal levels, background masking) orchestrated
//! by a coordinator that owns the base/current image pair and a rolling
//! operation history. The displayed image is always derived as
//! `reduce_colors(pixelize(base, block_size), palette)`; undo restores a
//! base snapshot and re-derives under the live slider settings.

pub mod buffer;
pub mod error;
pub mod history;
pub mod io;
pub mod levels;
pub mod mask;
pub mod pipeline;
pub mod pixelize;
pub mod reduce;
pub mod service;
pub mod settings;

pub use buffer::{ImageStatistics, PixelBuffer};
pub use error::{Result, StudioError};
pub use pipeline::PipelineCoordinator;
pub use service::{EditorService, ProcessingEvent};
