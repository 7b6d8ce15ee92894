//! Process-wide notice journal
//!
//! An in-memory, level-filtered record of notices such as deprecation
//! warnings. There is exactly one process-wide journal:
//!
//! * it is created on first use of [`global`] (or explicitly by [`init`],
//!   which also sets the starting level),
//! * it lives until the process exits, and nothing is written to disk,
//! * it keeps at most [`DEFAULT_CAPACITY`] entries, dropping the oldest.
//!
//! The free functions in this module (`info`, `warning`, ...) are the
//! intended interface. Separate [`Journal`] values can still be created for
//! isolated use, e.g. in tests.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Entries a journal keeps before discarding the oldest
pub const DEFAULT_CAPACITY: usize = 1024;

static GLOBAL_JOURNAL: Lazy<Arc<Journal>> = Lazy::new(|| Arc::new(Journal::new()));

/// Severity of a journal entry, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
        }
    }
}

impl FromStr for Level {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "DEBUG" => Ok(Level::Debug),
            "INFO" => Ok(Level::Info),
            "WARNING" | "WARN" => Ok(Level::Warning),
            "ERROR" => Ok(Level::Error),
            "CRITICAL" => Ok(Level::Critical),
            other => bail!(
                "Invalid log level {other}. Choose from: DEBUG, INFO, WARNING, ERROR, CRITICAL"
            ),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub level: Level,
    pub message: String,
    pub recorded_at: DateTime<Utc>,
}

impl fmt::Display for JournalEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level, self.message)
    }
}

pub struct Journal {
    level: RwLock<Level>,
    entries: RwLock<VecDeque<JournalEntry>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl Journal {
    pub fn new() -> Self {
        Self::with_level(Level::Info)
    }

    pub fn with_level(level: Level) -> Self {
        Self::with_capacity(level, DEFAULT_CAPACITY)
    }

    /// Journal holding at most `capacity` entries (at least one)
    pub fn with_capacity(level: Level, capacity: usize) -> Self {
        Self {
            level: RwLock::new(level),
            entries: RwLock::new(VecDeque::new()),
            capacity: capacity.max(1),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries discarded to stay within capacity
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn level(&self) -> Level {
        *self.level.read()
    }

    pub fn set_level(&self, level: Level) {
        *self.level.write() = level;
        debug!("Journal level set to {}", level);
    }

    /// Record `message` if `level` passes the current threshold.
    /// Returns whether the entry was kept.
    pub fn log(&self, level: Level, message: impl Into<String>) -> bool {
        if level < self.level() {
            return false;
        }
        let mut entries = self.entries.write();
        if entries.len() >= self.capacity {
            entries.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        entries.push_back(JournalEntry {
            level,
            message: message.into(),
            recorded_at: Utc::now(),
        });
        true
    }

    pub fn debug(&self, message: impl Into<String>) -> bool {
        self.log(Level::Debug, message)
    }

    pub fn info(&self, message: impl Into<String>) -> bool {
        self.log(Level::Info, message)
    }

    pub fn warning(&self, message: impl Into<String>) -> bool {
        self.log(Level::Warning, message)
    }

    pub fn error(&self, message: impl Into<String>) -> bool {
        self.log(Level::Error, message)
    }

    pub fn critical(&self, message: impl Into<String>) -> bool {
        self.log(Level::Critical, message)
    }

    /// Snapshot of everything recorded so far, oldest first
    pub fn entries(&self) -> Vec<JournalEntry> {
        self.entries.read().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl Default for Journal {
    fn default() -> Self {
        Self::new()
    }
}

/// Initialize the process-wide journal with a starting level.
/// Calling it again only changes the level; entries are kept.
pub fn init(level: Level) -> Arc<Journal> {
    let journal = global();
    journal.set_level(level);
    journal
}

/// Handle to the process-wide journal
pub fn global() -> Arc<Journal> {
    Arc::clone(&GLOBAL_JOURNAL)
}

pub fn set_level(level: Level) {
    GLOBAL_JOURNAL.set_level(level);
}

pub fn debug(message: impl Into<String>) -> bool {
    GLOBAL_JOURNAL.debug(message)
}

pub fn info(message: impl Into<String>) -> bool {
    GLOBAL_JOURNAL.info(message)
}

pub fn warning(message: impl Into<String>) -> bool {
    GLOBAL_JOURNAL.warning(message)
}

pub fn error(message: impl Into<String>) -> bool {
    GLOBAL_JOURNAL.error(message)
}

pub fn critical(message: impl Into<String>) -> bool {
    GLOBAL_JOURNAL.critical(message)
}

pub fn entries() -> Vec<JournalEntry> {
    GLOBAL_JOURNAL.entries()
}
