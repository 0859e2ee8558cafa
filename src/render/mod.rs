//! Rendering of source documents into PDF bytes, merging of rendered PDFs,
//! and listing the sheets a selection can name.
//!
//! The pipeline only depends on the [`Renderer`] trait. [`CommandRenderer`]
//! is the bundled binding that drives a headless office converter.

mod command;
mod merge;
mod sheets;

use std::path::{Path, PathBuf};

use thiserror::Error;

pub use command::{CommandRenderer, OFFICE_EXTENSIONS, SELECTION_PLACEHOLDER};
pub use merge::{MergeError, merge_pdfs};
pub use sheets::{SPREADSHEET_EXTENSIONS, SheetInfo, SheetsError, list_sheets};

/// Errors produced by a renderer. Messages are surfaced to the user as-is.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Unsupported file type: {extension}")]
    Unsupported { extension: String },

    #[error("Source file not found: {}", path.display())]
    SourceMissing { path: PathBuf },

    #[error("Conversion failed: {reason}")]
    Failed { reason: String },

    #[error(
        "{program} cannot receive a sheet selection; add a {{selection}} argument to renderer.args"
    )]
    SelectionUnsupported { program: String },

    #[error("Conversion timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Turns one source document into PDF bytes.
///
/// Implementations must be idempotent for identical inputs. `selection`
/// restricts output to the named sub-documents (sheets); empty means all.
pub trait Renderer: Send + Sync {
    /// Short name for logging.
    fn name(&self) -> &str;

    fn render(&self, source: &Path, selection: &[String]) -> Result<Vec<u8>, RenderError>;
}
