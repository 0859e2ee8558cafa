//! Sweep command - age-based cleanup of artifacts and records.

use std::time::Duration;

use crate::config::Settings;
use crate::store::{SelectionStore, SessionStore};

use super::open_cache;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Run sweep command.
pub fn run(max_age_days: Option<u64>, settings: &Settings) -> anyhow::Result<()> {
    let artifact_age = max_age_days
        .map(|days| Duration::from_secs(days * SECS_PER_DAY))
        .unwrap_or_else(|| settings.cache.artifact_max_age());

    let cache = open_cache(settings)?;
    let stats = cache.sweep(artifact_age)?;
    println!(
        "Artifacts: removed {} ({} KiB), forgot {} manifest entries",
        stats.removed,
        stats.bytes_freed / 1024,
        stats.forgotten
    );

    let state_dir = settings.cache.state_dir();
    let selections = SelectionStore::new(&state_dir, settings.cache.selection_expiry_months)
        .sweep(months_as_duration(settings.cache.selection_expiry_months))?;
    let sessions = SessionStore::new(&state_dir, settings.cache.session_expiry_months)
        .sweep(months_as_duration(settings.cache.session_expiry_months))?;
    println!("Records: removed {selections} selection and {sessions} session files");

    Ok(())
}

/// Upper bound of `months` calendar months, used as a file-age limit.
fn months_as_duration(months: u32) -> Duration {
    Duration::from_secs(u64::from(months) * 31 * SECS_PER_DAY)
}
