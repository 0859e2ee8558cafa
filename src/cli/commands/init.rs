//! Init and Config commands.

use std::path::PathBuf;

use anyhow::anyhow;

use crate::config::{CONFIG_FILE_NAME, Settings};

/// Run init command - create configuration file.
pub fn run_init(path: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let config_path = path
        .or_else(Settings::config_path)
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));

    let created = Settings::init_config_file(&config_path, force).map_err(|e| anyhow!("{e}"))?;
    println!("Created configuration file at: {}", created.display());
    println!("Edit this file to customize your settings.");
    Ok(())
}

/// Run config command - display current configuration.
pub fn run_config(config: &Settings) -> anyhow::Result<()> {
    println!("Current Configuration:");
    println!("{}", "=".repeat(50));
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
