//! Persisted per-session decision log.
//!
//! One JSON array per session:
//! ```text
//! {log_dir}/gameplay_session_{YYYYmmdd_HHMMSS}.json
//! ```
//! The whole array is rewritten after every append.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::scenario::Decision;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub decision: Decision,
    pub execution_success: bool,
    /// 1-based position in the session.
    pub sequence_number: u64,
}

pub struct SessionLog {
    path: PathBuf,
    entries: Vec<LogEntry>,
}

impl SessionLog {
    /// Create the log directory if needed and name this session's file
    /// after the current local time.
    pub fn create(log_dir: impl AsRef<Path>) -> Result<Self> {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        Self::at(log_dir.as_ref().join(format!("gameplay_session_{stamp}.json")))
    }

    /// Use an explicit file path.
    pub fn at(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            path,
            entries: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Append an entry and flush the full log to disk.
    pub fn record(&mut self, decision: Decision, execution_success: bool) -> Result<&LogEntry> {
        let entry = LogEntry {
            timestamp: Utc::now(),
            decision,
            execution_success,
            sequence_number: self.entries.len() as u64 + 1,
        };
        self.entries.push(entry);
        self.flush()?;
        Ok(&self.entries[self.entries.len() - 1])
    }

    pub fn flush(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.entries)?;
        fs::write(&self.path, json)?;
        Ok(())
    }

    /// The most recent `count` entries, oldest first.
    pub fn recent(&self, count: usize) -> &[LogEntry] {
        let start = self.entries.len().saturating_sub(count);
        &self.entries[start..]
    }

    pub fn successes(&self) -> usize {
        self.entries.iter().filter(|e| e.execution_success).count()
    }
}
