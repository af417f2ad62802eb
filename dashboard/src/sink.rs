//! Tabular storage: a workbook of named sheets, kept on disk as one JSON file.
//!
//! Writes are best-effort. An I/O error that looks like the file being held
//! by someone else is retried a few times, then reported as
//! [`Error::SinkUnavailable`] for the caller to log and move past.

use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const MAX_WRITE_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Number(f64),
    Text(String),
}

impl Cell {
    pub fn text(s: impl Into<String>) -> Self {
        Cell::Text(s.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s.trim()),
            Cell::Number(_) => None,
        }
    }

    /// Numbers stored as text are accepted too, spreadsheets are sloppy about it.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            Cell::Text(s) => s.trim().parse().ok(),
        }
    }
}

pub type Row = Vec<Cell>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sheet {
    pub rows: Vec<Row>,
}

pub trait TabularSink {
    /// Writes every given sheet, replacing sheets of the same name.
    fn write_sheets(&mut self, sheets: Vec<(String, Sheet)>) -> Result<()>;

    fn write_sheet(&mut self, name: &str, sheet: Sheet) -> Result<()> {
        self.write_sheets(vec![(name.to_string(), sheet)])
    }
}

pub trait TabularSource {
    fn exists(&self) -> bool;

    fn read_sheets(&self) -> Result<Vec<(String, Sheet)>>;
}

/// In-memory workbook, also the on-disk document shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workbook {
    sheets: BTreeMap<String, Sheet>,
}

impl Workbook {
    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.sheets.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, sheet: Sheet) {
        self.sheets.insert(name.into(), sheet);
    }

    pub fn len(&self) -> usize {
        self.sheets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }
}

impl TabularSink for Workbook {
    fn write_sheets(&mut self, sheets: Vec<(String, Sheet)>) -> Result<()> {
        self.sheets.extend(sheets);
        Ok(())
    }
}

impl TabularSource for Workbook {
    fn exists(&self) -> bool {
        true
    }

    fn read_sheets(&self) -> Result<Vec<(String, Sheet)>> {
        Ok(self
            .sheets
            .iter()
            .map(|(name, sheet)| (name.clone(), sheet.clone()))
            .collect())
    }
}

/// Workbook persisted at `path`.
#[derive(Debug, Clone)]
pub struct WorkbookFile {
    path: PathBuf,
}

impl WorkbookFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Workbook> {
        let data = fs::read(&self.path)?;
        let workbook = serde_json::from_slice(&data)?;
        Ok(workbook)
    }

    fn save(&self, workbook: &Workbook) -> Result<()> {
        let data = serde_json::to_vec_pretty(workbook)?;

        let mut attempts = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            attempts += 1;
            match self.replace_contents(&data) {
                Ok(()) => {
                    debug!("Wrote {} sheets to {}", workbook.len(), self.path.display());
                    return Ok(());
                }
                Err(e) => {
                    if attempts >= MAX_WRITE_ATTEMPTS || !is_transient_error(&e) {
                        error!(
                            "Writing {} failed after {} attempts: {}",
                            self.path.display(),
                            attempts,
                            e
                        );
                        return Err(Error::SinkUnavailable(e));
                    }

                    warn!(
                        "Writing {} failed (attempt {}/{}), retrying in {}ms: {}",
                        self.path.display(),
                        attempts,
                        MAX_WRITE_ATTEMPTS,
                        backoff_ms,
                        e
                    );
                    std::thread::sleep(Duration::from_millis(backoff_ms));
                    backoff_ms *= 2;
                }
            }
        }
    }

    /// One temp file per write; the dashboard and the simulator share the path.
    fn replace_contents(&self, data: &[u8]) -> io::Result<()> {
        let tmp = self.path.with_extension(format!("{}.tmp", Uuid::new_v4()));
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &self.path).inspect_err(|_| {
            let _ = fs::remove_file(&tmp);
        })
    }
}

impl TabularSink for WorkbookFile {
    fn write_sheets(&mut self, sheets: Vec<(String, Sheet)>) -> Result<()> {
        let mut workbook = if self.path.exists() {
            self.load().map_err(|e| match e {
                Error::Io(io) => Error::SinkUnavailable(io),
                other => other,
            })?
        } else {
            info!("Creating workbook {}", self.path.display());
            Workbook::default()
        };
        workbook.write_sheets(sheets)?;
        self.save(&workbook)
    }
}

impl TabularSource for WorkbookFile {
    fn exists(&self) -> bool {
        self.path.exists()
    }

    fn read_sheets(&self) -> Result<Vec<(String, Sheet)>> {
        self.load()?.read_sheets()
    }
}

fn is_transient_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::PermissionDenied | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}
