//! CLI argument parsing using clap.
//!
//! Contains the Cli struct, Commands enum, and all subcommand enums.

use clap::{
    Parser, Subcommand,
    builder::styling::{AnsiColor, Effects, Styles},
};
use std::path::PathBuf;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Live PDF preview of office documents
#[derive(Parser)]
#[command(
    name = "livepdf",
    version = env!("CARGO_PKG_VERSION"),
    about = "Live PDF preview of office documents",
    long_about = "Convert spreadsheets and documents to PDF, merge them, and keep the preview current while the sources change.",
    next_line_help = true,
    styles = clap_cargo_style(),
    after_help = "Quick Start:\n  $ livepdf convert report.xlsx\n  $ livepdf watch budget.xlsx notes.docx --select budget.xlsx=Q1,Q2\n  $ livepdf history\n  $ livepdf sweep"
)]
pub struct Cli {
    /// Path to custom livepdf.toml file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log regeneration activity to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Sub-document selection given as `FILE=LABEL[,LABEL...]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionArg {
    pub file: PathBuf,
    pub labels: Vec<String>,
}

/// Parses `report.xlsx=Sheet1,Sheet2`.
pub fn parse_selection(raw: &str) -> Result<SelectionArg, String> {
    let (file, labels) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected FILE=LABEL[,LABEL...], got '{raw}'"))?;
    if file.is_empty() {
        return Err("selection is missing the file".to_string());
    }

    let labels: Vec<String> = labels
        .split(',')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect();
    if labels.is_empty() {
        return Err(format!("selection for '{file}' has no labels"));
    }

    Ok(SelectionArg {
        file: PathBuf::from(file),
        labels,
    })
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Create a configuration file with default settings
    #[command(about = "Write a default livepdf.toml")]
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Show current configuration settings
    #[command(about = "Display active settings")]
    Config,

    /// Convert files once and print the artifact location
    #[command(
        about = "Convert and merge files into one PDF",
        after_help = "Examples:\n  livepdf convert report.xlsx\n  livepdf convert a.docx b.xlsx -o combined.pdf\n  livepdf convert book.xlsx --select book.xlsx=Summary"
    )]
    Convert {
        /// Files to convert, merged in the given order
        #[arg(value_name = "FILE", required = true)]
        paths: Vec<PathBuf>,

        /// Restrict a file to some sub-documents: FILE=LABEL[,LABEL...]
        #[arg(short, long = "select", value_name = "SELECTION", value_parser = parse_selection)]
        selections: Vec<SelectionArg>,

        /// Copy the resulting PDF here
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Convert files and regenerate whenever they change
    #[command(
        about = "Keep a preview current while its sources change",
        after_help = "Press Ctrl-C to stop. With --output the latest preview is saved on exit."
    )]
    Watch {
        /// Files to convert, merged in the given order
        #[arg(value_name = "FILE", required = true)]
        paths: Vec<PathBuf>,

        /// Restrict a file to some sub-documents: FILE=LABEL[,LABEL...]
        #[arg(short, long = "select", value_name = "SELECTION", value_parser = parse_selection)]
        selections: Vec<SelectionArg>,

        /// Save the latest preview here on exit
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Report changes without regenerating
        #[arg(long)]
        no_auto_update: bool,
    },

    /// List the sheets of a workbook
    #[command(
        about = "List the sheets a selection can name",
        after_help = "Pass sheet names to convert or watch with --select FILE=SHEET[,SHEET...]"
    )]
    Sheets {
        /// Workbook to inspect (.xlsx, .xls, .xlsm)
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// List recently used directories
    #[command(about = "Show the directory history")]
    History {
        /// Forget every entry
        #[arg(long)]
        clear: bool,
    },

    /// Inspect or edit remembered sub-document selections
    #[command(about = "Manage per-directory selections")]
    Selection {
        #[command(subcommand)]
        action: SelectionAction,
    },

    /// Inspect remembered session state
    #[command(about = "Manage per-directory session state")]
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Remove old artifacts and expired records
    #[command(about = "Clean up the artifact cache and persisted state")]
    Sweep {
        /// Override the artifact age limit in days
        #[arg(long)]
        max_age_days: Option<u64>,
    },
}

#[derive(Subcommand)]
pub enum SelectionAction {
    /// Print the selections stored for a directory
    Show {
        #[arg(default_value = ".")]
        directory: PathBuf,
    },
    /// Replace the selections stored for the files' directory
    Set {
        /// FILE=LABEL[,LABEL...]
        #[arg(required = true, value_parser = parse_selection)]
        selections: Vec<SelectionArg>,
    },
}

#[derive(Subcommand)]
pub enum SessionAction {
    /// Print the session stored for a directory
    Show {
        #[arg(default_value = ".")]
        directory: PathBuf,
    },
    /// Forget the session stored for a directory
    Reset {
        #[arg(default_value = ".")]
        directory: PathBuf,
    },
}
