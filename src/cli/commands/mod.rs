//! Command implementations for the CLI.
//!
//! Each command is implemented in its own module.

pub mod convert;
pub mod init;
pub mod sheets;
pub mod state;
pub mod sweep;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use crate::cache::ArtifactCache;
use crate::cli::args::SelectionArg;
use crate::config::Settings;
use crate::render::CommandRenderer;
use crate::utils::canonical_path;

/// Opens the artifact cache configured in `settings`.
pub fn open_cache(settings: &Settings) -> anyhow::Result<Arc<ArtifactCache>> {
    let dir = settings.cache.artifact_dir();
    let renderer = Arc::new(CommandRenderer::new(&settings.renderer));
    let cache = ArtifactCache::open(&dir, renderer)
        .with_context(|| format!("failed to open artifact cache at {}", dir.display()))?;
    Ok(Arc::new(cache))
}

/// Selections keyed by canonical file path.
pub fn selection_map(selections: &[SelectionArg]) -> HashMap<PathBuf, Vec<String>> {
    selections
        .iter()
        .map(|s| (canonical_path(&s.file), s.labels.clone()))
        .collect()
}
