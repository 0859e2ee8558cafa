//! Renderer backed by an external converter process.
//!
//! Defaults to LibreOffice in headless mode. The command line is taken from
//! [`RendererConfig`]; `{input}`, `{outdir}` and `{selection}` placeholders
//! are substituted per call and the converter is expected to write
//! `<outdir>/<stem>.pdf`. A selection is only honored when the command line
//! carries `{selection}`; otherwise rendering a selection is refused.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::config::RendererConfig;

use super::{RenderError, Renderer};

/// Extensions handed to the converter. `.pdf` sources are passed through.
pub const OFFICE_EXTENSIONS: &[&str] = &["xlsx", "xls", "xlsm", "docx", "doc"];

/// Argument placeholder replaced by the comma-joined selection.
pub const SELECTION_PLACEHOLDER: &str = "{selection}";

const WAIT_STEP: Duration = Duration::from_millis(50);

/// Spawns the configured converter once per render call.
#[derive(Debug, Clone)]
pub struct CommandRenderer {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandRenderer {
    pub fn new(config: &RendererConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn carries_selection(&self) -> bool {
        self.args.iter().any(|arg| arg.contains(SELECTION_PLACEHOLDER))
    }

    fn command_args(&self, input: &Path, outdir: &Path, selection: &[String]) -> Vec<String> {
        let input = input.to_string_lossy();
        let outdir = outdir.to_string_lossy();
        let selection = selection.join(",");
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{input}", &input)
                    .replace("{outdir}", &outdir)
                    .replace(SELECTION_PLACEHOLDER, &selection)
            })
            .collect()
    }

    fn run_converter(&self, source: &Path, selection: &[String]) -> Result<Vec<u8>, RenderError> {
        let outdir = tempfile::tempdir()?;
        let log_path = outdir.path().join("converter.log");
        let log = File::create(&log_path)?;

        let mut child = Command::new(&self.program)
            .args(self.command_args(source, outdir.path(), selection))
            .stdin(Stdio::null())
            .stdout(log.try_clone()?)
            .stderr(log)
            .spawn()
            .map_err(|e| RenderError::Failed {
                reason: format!("failed to start {}: {e}", self.program),
            })?;

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(RenderError::Timeout {
                    secs: self.timeout.as_secs(),
                });
            }
            std::thread::sleep(WAIT_STEP);
        };

        if !status.success() {
            let output = std::fs::read_to_string(&log_path).unwrap_or_default();
            return Err(RenderError::Failed {
                reason: format!("{} exited with {status}: {}", self.program, output.trim()),
            });
        }

        let produced = expected_output(source, outdir.path());
        std::fs::read(&produced).map_err(|_| RenderError::Failed {
            reason: format!("converter produced no {}", produced.display()),
        })
    }
}

impl Renderer for CommandRenderer {
    fn name(&self) -> &str {
        &self.program
    }

    fn render(&self, source: &Path, selection: &[String]) -> Result<Vec<u8>, RenderError> {
        if !source.is_file() {
            return Err(RenderError::SourceMissing {
                path: source.to_path_buf(),
            });
        }

        let ext = extension_of(source);
        if ext == "pdf" {
            return Ok(std::fs::read(source)?);
        }
        if !OFFICE_EXTENSIONS.contains(&ext.as_str()) {
            return Err(RenderError::Unsupported { extension: ext });
        }
        if !selection.is_empty() && !self.carries_selection() {
            return Err(RenderError::SelectionUnsupported {
                program: self.program.clone(),
            });
        }

        crate::debug_event!(
            "renderer",
            "converting",
            "{} (selection: {:?})",
            source.display(),
            selection
        );
        self.run_converter(source, selection)
    }
}

pub(super) fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn expected_output(source: &Path, outdir: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    outdir.join(format!("{stem}.pdf"))
}
