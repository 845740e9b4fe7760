//! # Session Ledger
//!
//! Remembers, per output directory, which images earlier runs corrupted.
//! Each committed run writes two files into the log directory:
//!
//! * `fi_image_list_<YYYYmmddHHMMSS>.txt`, the plain text log with a fixed
//!   line layout (creation time, fault value, corrupted list, remaining list)
//! * a JSON record with the same stem holding the structured entry
//!
//! A second run against one output directory continues from the remaining
//! names of the first; a third run is refused.

use crate::error::{InjectionError, Result};
use crate::selector::InjectionMode;
use chrono::{DateTime, Local};
use itertools::Itertools;
use log::{debug, info};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Default directory for ledger logs
pub const DEFAULT_LOG_DIR: &str = "fi_image_list_logs";
/// Runs allowed against one output directory
pub const MAX_RUNS_PER_DIRECTORY: usize = 2;

const LOG_PREFIX: &str = "fi_image_list_";
const FORMAT_VERSION: u32 = 1;

const FAULTY_HEADER: &str = "Faulty Image Name List:";
const REMAIN_HEADER: &str = "Remain Normal Image Name List:";
// Line numbers of the text log
const FAULTY_HEADER_LINE: usize = 2;
const FAULTY_LIST_LINE: usize = 3;
const REMAIN_HEADER_LINE: usize = 4;
const REMAIN_LIST_LINE: usize = 5;

/// One committed run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub format_version: u32,
    pub output_directory: PathBuf,
    /// Mode the run was made with
    pub mode: InjectionMode,
    pub corrupted_names: Vec<String>,
    pub remaining_names: Vec<String>,
    pub total_in_catalog: usize,
    pub created_at: DateTime<Local>,
    /// Plain text log written for this run
    pub log_file: PathBuf,
}

/// State of an output directory before a run.
#[derive(Clone, Debug, PartialEq)]
pub enum SessionState {
    /// No earlier run
    Fresh,
    /// One earlier run; candidates are its remaining names
    Continuing {
        corrupted_names: Vec<String>,
        remaining_names: Vec<String>,
        source_log: PathBuf,
    },
    /// The run limit is reached
    Exhausted,
}

/// Ledger of committed runs, owned by the caller and passed along between runs.
#[derive(Clone, Debug)]
pub struct SessionLedger {
    log_dir: PathBuf,
    entries: Vec<LedgerEntry>,
}

/// Key under which an output directory is tracked
fn directory_key(dir: &Path) -> PathBuf {
    fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf())
}

/// Render names the way the text log stores them: `['a', 'b']`
pub fn render_list(names: &[String]) -> String {
    let items = names
        .iter()
        .map(|name| format!("'{}'", name.replace('\\', "\\\\").replace('\'', "\\'")))
        .join(", ");
    format!("[{}]", items)
}

/// Parse a list rendered by `render_list`.
pub fn parse_list(line: &str) -> Option<Vec<String>> {
    static ITEM: OnceLock<Regex> = OnceLock::new();
    let item = ITEM.get_or_init(|| Regex::new(r"'((?:[^'\\]|\\.)*)'").expect("valid regex"));

    let line = line.trim();
    let inner = line.strip_prefix('[')?.strip_suffix(']')?;
    let names = item
        .captures_iter(inner)
        .map(|cap| cap[1].replace("\\'", "'").replace("\\\\", "\\"))
        .collect();
    Some(names)
}

/// Read the corrupted and remaining names from a text log by line position.
pub fn read_log(path: &Path) -> Result<(Vec<String>, Vec<String>)> {
    let content = fs::read_to_string(path).map_err(|e| InjectionError::io(path, e))?;
    let lines: Vec<&str> = content.lines().collect();
    let malformed = |reason: &str| InjectionError::LedgerFormat {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    let header = |index: usize, expected: &str| match lines.get(index) {
        Some(line) if line.trim_start().starts_with(expected) => Ok(()),
        _ => Err(malformed(&format!("line {} is not {:?}", index + 1, expected))),
    };
    header(FAULTY_HEADER_LINE, FAULTY_HEADER)?;
    header(REMAIN_HEADER_LINE, REMAIN_HEADER)?;

    let list = |index: usize| {
        lines
            .get(index)
            .and_then(|line| parse_list(line))
            .ok_or_else(|| malformed(&format!("line {} is not a name list", index + 1)))
    };
    Ok((list(FAULTY_LIST_LINE)?, list(REMAIN_LIST_LINE)?))
}

impl SessionLedger {
    /// Empty ledger writing into `log_dir`
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            entries: Vec::new(),
        }
    }

    /// Ledger with every JSON record found in `log_dir`. A missing directory
    /// gives an empty ledger.
    pub fn load(log_dir: impl Into<PathBuf>) -> Result<Self> {
        let log_dir = log_dir.into();
        let mut ledger = Self::new(&log_dir);
        if !log_dir.exists() {
            return Ok(ledger);
        }

        let entries = fs::read_dir(&log_dir).map_err(|e| InjectionError::io(&log_dir, e))?;
        for entry in entries {
            let path = entry.map_err(|e| InjectionError::io(&log_dir, e))?.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            let content = fs::read_to_string(&path).map_err(|e| InjectionError::io(&path, e))?;
            let record: LedgerEntry =
                serde_json::from_str(&content).map_err(|e| InjectionError::LedgerFormat {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
            ledger.entries.push(record);
        }
        ledger
            .entries
            .sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.log_file.cmp(&b.log_file)));
        debug!("Loaded {} ledger entries from {}", ledger.entries.len(), log_dir.display());
        Ok(ledger)
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Committed runs against `output_directory`, oldest first
    pub fn entries_for(&self, output_directory: &Path) -> Vec<&LedgerEntry> {
        let key = directory_key(output_directory);
        self.entries
            .iter()
            .filter(|entry| entry.output_directory == key)
            .collect()
    }

    /// Latest committed run against `output_directory`
    pub fn latest(&self, output_directory: &Path) -> Option<&LedgerEntry> {
        self.entries_for(output_directory).into_iter().last()
    }

    /// State of `output_directory`. A continuing session re-reads the name
    /// lists from the text log of the earlier run.
    ///
    /// # Errors
    ///
    /// * `IOFailure` if that text log is gone.
    /// * `LedgerFormat` if it no longer has the expected layout.
    pub fn open_or_start(&self, output_directory: &Path) -> Result<SessionState> {
        let runs = self.entries_for(output_directory);
        let state = match runs.as_slice() {
            [] => SessionState::Fresh,
            [entry] => {
                let (corrupted_names, remaining_names) = read_log(&entry.log_file)?;
                SessionState::Continuing {
                    corrupted_names,
                    remaining_names,
                    source_log: entry.log_file.clone(),
                }
            }
            _ => SessionState::Exhausted,
        };
        info!(
            "Session for {}: {}",
            output_directory.display(),
            match &state {
                SessionState::Fresh => "fresh",
                SessionState::Continuing { .. } => "continuing",
                SessionState::Exhausted => "exhausted",
            }
        );
        Ok(state)
    }

    fn next_log_stem(&self, created_at: &DateTime<Local>) -> String {
        let base = format!("{}{}", LOG_PREFIX, created_at.format("%Y%m%d%H%M%S"));
        let taken = |stem: &str| {
            self.log_dir.join(format!("{stem}.txt")).exists()
                || self.log_dir.join(format!("{stem}.json")).exists()
        };
        let mut stem = base.clone();
        let mut n = 0;
        while taken(&stem) {
            n += 1;
            stem = format!("{base}_{n}");
        }
        stem
    }

    /// Persist a completed run and make it the latest entry for `output_directory`.
    ///
    /// # Arguments
    ///
    /// * `output_directory` - Directory the run wrote into.
    /// * `mode` - Mode of the run, kept in the JSON record.
    /// * `corrupted_names` - Names that received the fault.
    /// * `remaining_names` - Candidates left unmodified.
    /// * `total_in_catalog` - Number of effective candidates.
    ///
    /// # Returns
    ///
    /// * `Ok(&LedgerEntry)` - The new entry.
    /// * `Err(InjectionError)` - If the text log or the JSON record cannot be written.
    pub fn commit(
        &mut self,
        output_directory: &Path,
        mode: InjectionMode,
        corrupted_names: &[String],
        remaining_names: &[String],
        total_in_catalog: usize,
    ) -> Result<&LedgerEntry> {
        fs::create_dir_all(&self.log_dir).map_err(|e| InjectionError::io(&self.log_dir, e))?;

        let created_at = Local::now();
        let stem = self.next_log_stem(&created_at);
        let log_file = self.log_dir.join(format!("{stem}.txt"));
        let record_file = self.log_dir.join(format!("{stem}.json"));

        let text = format!(
            "Created: {}\nFault Value: {}/{}\n{} \n{}\n{} \n{}\n",
            created_at.format("%Y-%m-%d %H:%M:%S%.6f"),
            corrupted_names.len(),
            total_in_catalog,
            FAULTY_HEADER,
            render_list(corrupted_names),
            REMAIN_HEADER,
            render_list(remaining_names),
        );
        fs::write(&log_file, text).map_err(|e| InjectionError::io(&log_file, e))?;

        let entry = LedgerEntry {
            format_version: FORMAT_VERSION,
            output_directory: directory_key(output_directory),
            mode,
            corrupted_names: corrupted_names.to_vec(),
            remaining_names: remaining_names.to_vec(),
            total_in_catalog,
            created_at,
            log_file: log_file.clone(),
        };
        let record = serde_json::to_string_pretty(&entry).map_err(|e| InjectionError::LedgerFormat {
            path: record_file.clone(),
            reason: e.to_string(),
        })?;
        if let Err(e) = fs::write(&record_file, record) {
            let _ = fs::remove_file(&log_file);
            return Err(InjectionError::io(&record_file, e));
        }

        info!(
            "Ledger entry {} for {}: {}/{} corrupted",
            log_file.display(),
            entry.output_directory.display(),
            corrupted_names.len(),
            total_in_catalog
        );
        self.entries.push(entry);
        Ok(&self.entries[self.entries.len() - 1])
    }
}
