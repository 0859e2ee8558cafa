//! Sheet listing for spreadsheet sources.

use std::path::{Path, PathBuf};

use calamine::{Reader, SheetVisible, open_workbook_auto};
use thiserror::Error;

use super::command::extension_of;

/// Extensions whose sheets can be listed.
pub const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xls", "xlsm"];

/// One sheet of a workbook, in workbook order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetInfo {
    pub name: String,
    pub visible: bool,
    /// Zero-based position in the workbook
    pub index: usize,
}

#[derive(Error, Debug)]
pub enum SheetsError {
    #[error("Not a spreadsheet: {}", path.display())]
    NotSpreadsheet { path: PathBuf },

    #[error("Failed to open workbook {}: {reason}", path.display())]
    Open { path: PathBuf, reason: String },
}

/// Lists the sheets of the workbook at `path`.
///
/// Hidden and very hidden sheets are reported with `visible: false`.
pub fn list_sheets(path: &Path) -> Result<Vec<SheetInfo>, SheetsError> {
    if !SPREADSHEET_EXTENSIONS.contains(&extension_of(path).as_str()) {
        return Err(SheetsError::NotSpreadsheet {
            path: path.to_path_buf(),
        });
    }

    let workbook = open_workbook_auto(path).map_err(|e| SheetsError::Open {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let sheets: Vec<SheetInfo> = workbook
        .sheets_metadata()
        .iter()
        .enumerate()
        .map(|(index, sheet)| SheetInfo {
            name: sheet.name.clone(),
            visible: matches!(sheet.visible, SheetVisible::Visible),
            index,
        })
        .collect();

    tracing::debug!("[sheets] {} sheets in {}", sheets.len(), path.display());
    Ok(sheets)
}
