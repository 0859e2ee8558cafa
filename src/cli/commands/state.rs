//! History, selection and session commands.

use std::path::PathBuf;

use console::style;

use crate::cli::args::{SelectionAction, SelectionArg, SessionAction};
use crate::config::Settings;
use crate::store::{HistoryLog, SelectionRecord, SelectionStore, SessionStore};
use crate::utils::{canonical_path, common_parent};

/// Run history command.
pub fn run_history(clear: bool, settings: &Settings) -> anyhow::Result<()> {
    let history = HistoryLog::new(settings.cache.state_dir(), settings.cache.history_limit);
    if clear {
        history.clear()?;
        println!("History cleared.");
        return Ok(());
    }

    let entries = history.list();
    if entries.is_empty() {
        println!("No directories in history.");
        return Ok(());
    }
    for entry in entries {
        println!(
            "{:<24} {:>4}x  {}  {}",
            style(&entry.display_name).bold(),
            entry.usage_count,
            entry.last_used.format("%Y-%m-%d %H:%M"),
            style(entry.path.display()).dim()
        );
    }
    Ok(())
}

/// Run selection subcommands.
pub fn run_selection(action: SelectionAction, settings: &Settings) -> anyhow::Result<()> {
    let store = SelectionStore::new(
        settings.cache.state_dir(),
        settings.cache.selection_expiry_months,
    );

    match action {
        SelectionAction::Show { directory } => {
            let record = store.load(&directory)?;
            if record.selections.is_empty() {
                println!("No selections stored for {}", directory.display());
            }
            for (file, labels) in &record.selections {
                println!("{}: {}", file.display(), labels.join(", "));
            }
        }
        SelectionAction::Set { selections } => {
            let directory = selection_directory(&selections)?;
            let mut record = store.load(&directory)?;
            for selection in selections {
                record
                    .selections
                    .insert(canonical_path(&selection.file), selection.labels);
            }
            let path = store.save(&directory, SelectionRecord::new(record.selections))?;
            println!("Saved selections to {}", path.display());
        }
    }
    Ok(())
}

/// Run session subcommands.
pub fn run_session(action: SessionAction, settings: &Settings) -> anyhow::Result<()> {
    let store = SessionStore::new(
        settings.cache.state_dir(),
        settings.cache.session_expiry_months,
    );

    match action {
        SessionAction::Show { directory } => {
            let record = store.load(&directory)?;
            if record.selected_files.is_empty() && record.current_file.is_none() {
                println!("No session stored for {}", directory.display());
                return Ok(());
            }
            if let Some(current) = &record.current_file {
                println!("{} {}", style("current:").bold(), current.display());
            }
            for file in &record.selected_files {
                let labels = record
                    .sheet_selections
                    .get(file)
                    .map(|l| format!(" [{}]", l.join(", ")))
                    .unwrap_or_default();
                println!("  {}{labels}", file.display());
            }
            println!(
                "{} {}",
                style("expires:").dim(),
                record.header.expiry_time.format("%Y-%m-%d")
            );
        }
        SessionAction::Reset { directory } => {
            let path = store.record_path(&directory);
            match std::fs::remove_file(&path) {
                Ok(()) => println!("Removed {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    println!("No session stored for {}", directory.display());
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
    Ok(())
}

/// Directory that owns the selected files.
fn selection_directory(selections: &[SelectionArg]) -> anyhow::Result<PathBuf> {
    let files: Vec<PathBuf> = selections.iter().map(|s| canonical_path(&s.file)).collect();
    let directory = common_parent(&files)
        .ok_or_else(|| anyhow::anyhow!("selected files do not share a directory"))?;
    Ok(directory)
}

