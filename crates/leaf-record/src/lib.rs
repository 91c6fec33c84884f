//! Recorded leaf observations and their export formats.

mod export;
mod recording;

pub use export::{ExportError, CSV_HEADER};
pub use recording::{GpsFix, Recording, RecordingLog};
