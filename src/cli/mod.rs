//! CLI module for the live preview tool.
//!
//! Provides command-line interface parsing and command dispatch.

pub mod args;
pub mod commands;

pub use args::{Cli, Commands, SelectionAction, SessionAction};
