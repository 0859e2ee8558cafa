//! Sheets command - lists the sheets of a workbook.

use std::path::Path;

use anyhow::Context;
use console::style;

use crate::render::list_sheets;

/// Run sheets command.
pub fn run(file: &Path) -> anyhow::Result<()> {
    let sheets =
        list_sheets(file).with_context(|| format!("cannot list sheets of {}", file.display()))?;

    if sheets.is_empty() {
        println!("No sheets in {}", file.display());
        return Ok(());
    }
    for sheet in sheets {
        let visibility = if sheet.visible {
            style("visible").green()
        } else {
            style("hidden").dim()
        };
        println!("{:>3}  {:<32} {visibility}", sheet.index, sheet.name);
    }
    Ok(())
}
