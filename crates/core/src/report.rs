//! Per-file outcomes of an anonymization run.
//!
//! Every file under the storage tree ends up in exactly one of three states,
//! so partial anonymization is always visible in the summary.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happened to one input file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    /// Loaded, substituted, and written.
    Anonymized {
        rows: usize,
        rows_filtered: usize,
        cells_changed: usize,
        missing_columns: Vec<String>,
    },
    /// Copied byte-for-byte.
    Copied,
    /// Not written to the target tree.
    Skipped { reason: String },
}

/// One file's entry in the run summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReport {
    /// Repository identifier (storage sub-path), empty for single-repo runs.
    pub repository: String,
    /// Path relative to the repository's storage directory.
    pub file: PathBuf,
    pub outcome: FileOutcome,
}

/// Summary of a whole run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub files: Vec<FileReport>,
}

impl Default for RunSummary {
    fn default() -> Self {
        Self::new()
    }
}

impl RunSummary {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            files: Vec::new(),
        }
    }

    pub fn record(&mut self, repository: &str, file: impl Into<PathBuf>, outcome: FileOutcome) {
        self.files.push(FileReport {
            repository: repository.to_string(),
            file: file.into(),
            outcome,
        });
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn anonymized(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Anonymized { .. }))
    }

    pub fn copied(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Copied))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Skipped { .. }))
    }

    /// True when nothing was skipped.
    pub fn is_complete(&self) -> bool {
        self.skipped() == 0
    }

    fn count<F: Fn(&FileOutcome) -> bool>(&self, pred: F) -> usize {
        self.files.iter().filter(|f| pred(&f.outcome)).count()
    }
}
