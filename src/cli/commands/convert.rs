//! Convert and Watch commands.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use console::style;
use tokio::sync::{broadcast, mpsc};

use crate::cli::args::SelectionArg;
use crate::config::Settings;
use crate::coordinator::{ConversionOutcome, RegenerationCoordinator, default_save_path};
use crate::events::{EventBroadcaster, PreviewEvent};
use crate::store::{HistoryLog, SelectionRecord, SelectionStore, SessionRecord, SessionStore};
use crate::utils::{canonical_path, common_parent};
use crate::watcher::{ChangeWatcher, PollingFallback, WatchLoop};

use super::{open_cache, selection_map};

/// Arguments shared by convert and watch.
pub struct ConvertArgs {
    pub paths: Vec<PathBuf>,
    pub selections: Vec<SelectionArg>,
    pub output: Option<PathBuf>,
}

/// Run the convert command.
pub async fn run_convert(args: ConvertArgs, settings: &Settings) -> anyhow::Result<()> {
    let cache = open_cache(settings)?;
    let coordinator = RegenerationCoordinator::new(
        cache,
        ChangeWatcher::detached(),
        EventBroadcaster::default(),
        false,
    );

    let directory = remember_directory(settings, &args.paths);
    let selections = resolve_selections(settings, directory.as_deref(), &args.selections);

    let outcome = coordinator.convert(&args.paths, &selections).await?;
    print_outcome(&outcome);

    if let Some(output) = args.output {
        let saved = coordinator.save_as(&output).await?;
        println!("Saved to {}", saved.display());
    }
    Ok(())
}

/// Run the watch command until Ctrl-C.
pub async fn run_watch(
    args: ConvertArgs,
    no_auto_update: bool,
    settings: &Settings,
) -> anyhow::Result<()> {
    let cache = open_cache(settings)?;
    let broadcaster = EventBroadcaster::default();
    let auto_update = settings.watch.auto_update && !no_auto_update;

    let (watcher, notify_events) = match ChangeWatcher::new() {
        Ok((watcher, events)) => (watcher, Some(events)),
        Err(e) => {
            eprintln!(
                "{} {e}; falling back to polling",
                style("Watcher unavailable:").yellow()
            );
            (ChangeWatcher::detached(), None)
        }
    };
    let coordinator =
        RegenerationCoordinator::new(cache, watcher, broadcaster.clone(), auto_update);
    let mut events = coordinator.subscribe();

    let directory = remember_directory(settings, &args.paths);
    let selections = resolve_selections(settings, directory.as_deref(), &args.selections);

    let outcome = coordinator.convert(&args.paths, &selections).await?;
    print_outcome(&outcome);

    let (signals_tx, signals_rx) = mpsc::channel(16);
    if let Some(notify_events) = notify_events {
        let watch_loop = WatchLoop::new(
            notify_events,
            coordinator.watch_snapshot(),
            signals_tx.clone(),
            broadcaster,
            settings.watch.debounce(),
            settings.watch.error_threshold,
        );
        tokio::spawn(watch_loop.run());
    }
    tokio::spawn(
        PollingFallback::new(
            coordinator.watch_snapshot(),
            signals_tx,
            settings.watch.poll_interval(),
        )
        .run(),
    );
    let signal_coordinator = coordinator.clone();
    tokio::spawn(async move { signal_coordinator.run_signals(signals_rx).await });

    println!(
        "Watching {} file(s){}. Press Ctrl-C to stop.",
        args.paths.len(),
        if auto_update { "" } else { " (auto-update off)" }
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            received = events.recv() => match received {
                Ok(event) => print_event(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("[watch] skipped {skipped} events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    if let Some(dir) = &directory {
        save_session(settings, dir, &coordinator).await;
    }

    match args.output {
        Some(output) => {
            let saved = coordinator.save_as(&output).await?;
            println!("Saved to {}", saved.display());
        }
        None if coordinator.has_unsaved_changes().await => {
            let suggestion = args
                .paths
                .first()
                .map(|p| default_save_path(p))
                .unwrap_or_else(|| PathBuf::from("preview.pdf"));
            println!(
                "Preview not saved. Re-run with --output {} to keep it.",
                suggestion.display()
            );
        }
        None => {}
    }
    Ok(())
}

/// Records the inputs' directory in the history and returns it.
fn remember_directory(settings: &Settings, paths: &[PathBuf]) -> Option<PathBuf> {
    let canonical: Vec<PathBuf> = paths.iter().map(|p| canonical_path(p)).collect();
    let directory = common_parent(&canonical)?;

    let history = HistoryLog::new(settings.cache.state_dir(), settings.cache.history_limit);
    if let Err(e) = history.touch(&directory) {
        tracing::warn!("[history] failed to record {}: {e}", directory.display());
    }
    Some(directory)
}

/// Explicit selections are merged over the stored ones and remembered.
fn resolve_selections(
    settings: &Settings,
    directory: Option<&Path>,
    explicit: &[SelectionArg],
) -> HashMap<PathBuf, Vec<String>> {
    let Some(directory) = directory else {
        return selection_map(explicit);
    };
    let store = SelectionStore::new(
        settings.cache.state_dir(),
        settings.cache.selection_expiry_months,
    );

    if explicit.is_empty() {
        return match store.load(directory) {
            Ok(record) => record.selections.into_iter().collect(),
            Err(e) => {
                tracing::debug!("[store] no selections for {}: {e}", directory.display());
                HashMap::new()
            }
        };
    }

    let mut record = store.load(directory).unwrap_or_default();
    record.selections.extend(selection_map(explicit));
    if let Err(e) = store.save(directory, SelectionRecord::new(record.selections.clone())) {
        tracing::warn!("[store] failed to remember selections: {e}");
    }
    record.selections.into_iter().collect()
}

async fn save_session(
    settings: &Settings,
    directory: &Path,
    coordinator: &RegenerationCoordinator,
) {
    let watched = coordinator.watched_set().await;
    let store = SessionStore::new(
        settings.cache.state_dir(),
        settings.cache.session_expiry_months,
    );
    let record = SessionRecord {
        current_file: watched.files.first().cloned(),
        selected_files: watched.files,
        sheet_selections: watched.selections.into_iter().collect::<BTreeMap<_, _>>(),
        ..SessionRecord::default()
    };
    if let Err(e) = store.save(directory, record) {
        tracing::warn!("[store] failed to save session: {e}");
    }
}

fn print_outcome(outcome: &ConversionOutcome) {
    println!(
        "{} {} (v{})",
        style("Preview:").green().bold(),
        outcome.artifact.display(),
        outcome.version
    );
    for failure in &outcome.failures {
        eprintln!(
            "  {} {}: {}",
            style("skipped").yellow(),
            failure.path.display(),
            failure.message
        );
    }
}

fn print_event(event: &PreviewEvent) {
    match event {
        PreviewEvent::FileChanged { paths, origin } => {
            for path in paths {
                println!(
                    "{} {} ({origin:?})",
                    style("changed").cyan(),
                    path.display()
                );
            }
        }
        PreviewEvent::Regenerated { artifact, version } => {
            println!(
                "{} {} (v{version})",
                style("regenerated").green(),
                artifact.display()
            );
        }
        PreviewEvent::RegenerationFailed { message } => {
            eprintln!("{} {message}", style("failed").red().bold());
        }
        PreviewEvent::WatcherDegraded { reason } => {
            eprintln!(
                "{} {reason}; polling continues",
                style("watcher degraded").yellow()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn settings_in(dir: &Path) -> Settings {
        let mut settings = Settings::default();
        settings.cache.dir = dir.join("cache");
        settings
    }

    #[test]
    fn test_explicit_selections_are_remembered() {
        let temp = TempDir::new().unwrap();
        let settings = settings_in(temp.path());
        let docs = temp.path().join("docs");
        std::fs::create_dir(&docs).unwrap();
        let book = docs.join("book.xlsx");
        std::fs::write(&book, b"cells").unwrap();

        let explicit = vec![SelectionArg {
            file: book.clone(),
            labels: vec!["Summary".to_string()],
        }];
        let directory = remember_directory(&settings, std::slice::from_ref(&book)).unwrap();
        let chosen = resolve_selections(&settings, Some(&directory), &explicit);
        let canonical = book.canonicalize().unwrap();
        assert_eq!(chosen.get(&canonical), Some(&vec!["Summary".to_string()]));

        let recalled = resolve_selections(&settings, Some(&directory), &[]);
        assert_eq!(recalled, chosen);

        let history = HistoryLog::new(settings.cache.state_dir(), settings.cache.history_limit);
        assert_eq!(history.list()[0].path, directory);
    }

    #[test]
    fn test_explicit_selections_merge_with_stored_ones() {
        let temp = TempDir::new().unwrap();
        let settings = settings_in(temp.path());
        let docs = temp.path().join("docs");
        std::fs::create_dir(&docs).unwrap();
        let budget = docs.join("budget.xlsx");
        let forecast = docs.join("forecast.xlsx");
        std::fs::write(&budget, b"cells").unwrap();
        std::fs::write(&forecast, b"more cells").unwrap();
        let directory = remember_directory(&settings, &[budget.clone(), forecast.clone()]).unwrap();

        let pick = |file: &Path, label: &str| SelectionArg {
            file: file.to_path_buf(),
            labels: vec![label.to_string()],
        };
        resolve_selections(&settings, Some(&directory), &[pick(&budget, "Q1")]);
        let chosen = resolve_selections(&settings, Some(&directory), &[pick(&forecast, "2027")]);

        assert_eq!(chosen.len(), 2);
        assert_eq!(
            chosen.get(&budget.canonicalize().unwrap()),
            Some(&vec!["Q1".to_string()])
        );
        assert_eq!(
            chosen.get(&forecast.canonicalize().unwrap()),
            Some(&vec!["2027".to_string()])
        );
    }

    #[tokio::test]
    async fn test_convert_pdf_source_and_save() {
        let temp = TempDir::new().unwrap();
        let settings = settings_in(temp.path());
        let source = temp.path().join("ready.pdf");
        std::fs::write(&source, b"%PDF-1.4 already").unwrap();
        let output = temp.path().join("out").join("copy.pdf");

        run_convert(
            ConvertArgs {
                paths: vec![source],
                selections: Vec::new(),
                output: Some(output.clone()),
            },
            &settings,
        )
        .await
        .unwrap();

        assert_eq!(std::fs::read(output).unwrap(), b"%PDF-1.4 already");
    }
}
