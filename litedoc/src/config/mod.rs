use crate::error::Result;
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Open-time tuning applied to every connection.
///
/// The defaults are the profile used for a single-file store shared by
/// concurrent request handlers: block up to ten seconds on a busy lock,
/// write-ahead logging, NORMAL sync and an in-memory temp store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// How long a statement waits on a lock held elsewhere, in milliseconds.
    pub busy_timeout_ms: u64,
    pub journal_mode: JournalMode,
    /// Upper bound in bytes the WAL file is truncated to after a checkpoint.
    pub journal_size_limit: i64,
    pub synchronous: Synchronous,
    pub foreign_keys: bool,
    pub temp_store: TempStore,
    /// Page cache size. Negative values are a budget in KiB, positive
    /// values a page count.
    pub cache_size: i64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            busy_timeout_ms: 10_000,
            journal_mode: JournalMode::Wal,
            journal_size_limit: 200_000_000,
            synchronous: Synchronous::Normal,
            foreign_keys: true,
            temp_store: TempStore::Memory,
            cache_size: -16_000,
        }
    }
}

impl ConnectionConfig {
    /// Parse a YAML profile. Missing keys keep their defaults.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: ConnectionConfig = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Read and parse a YAML profile from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// The pragmas applied after the busy timeout, in application order.
    /// The busy timeout itself is set through the driver before any of these
    /// run so that switching the journal mode can wait on other connections.
    pub(crate) fn pragmas(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("journal_mode", Value::Text(self.journal_mode.as_str().into())),
            ("journal_size_limit", Value::Integer(self.journal_size_limit)),
            ("synchronous", Value::Text(self.synchronous.as_str().into())),
            ("foreign_keys", Value::Integer(i64::from(self.foreign_keys))),
            ("temp_store", Value::Text(self.temp_store.as_str().into())),
            ("cache_size", Value::Integer(self.cache_size)),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JournalMode {
    Delete,
    Truncate,
    Persist,
    Memory,
    Wal,
    Off,
}

impl JournalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            JournalMode::Delete => "DELETE",
            JournalMode::Truncate => "TRUNCATE",
            JournalMode::Persist => "PERSIST",
            JournalMode::Memory => "MEMORY",
            JournalMode::Wal => "WAL",
            JournalMode::Off => "OFF",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Synchronous {
    Off,
    Normal,
    Full,
    Extra,
}

impl Synchronous {
    pub fn as_str(&self) -> &'static str {
        match self {
            Synchronous::Off => "OFF",
            Synchronous::Normal => "NORMAL",
            Synchronous::Full => "FULL",
            Synchronous::Extra => "EXTRA",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TempStore {
    Default,
    File,
    Memory,
}

impl TempStore {
    pub fn as_str(&self) -> &'static str {
        match self {
            TempStore::Default => "DEFAULT",
            TempStore::File => "FILE",
            TempStore::Memory => "MEMORY",
        }
    }
}
