use crate::collection::Collection;
use crate::config::ConnectionConfig;
use crate::context::Context;
use crate::error::{is_busy_failure, is_interrupt, LitedocError, Result};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::types::Value;
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

/// Virtual machine instructions between cancellation checks while a
/// statement runs.
const PROGRESS_OPS: i32 = 1_000;

/// How long one attempt at the connection lock blocks before the context is
/// checked again.
const LOCK_POLL: Duration = Duration::from_millis(5);

/// The document database: one SQLite handle shared by every collection and
/// document reached through it.
///
/// Access to the handle is serialized internally, so a `&Database` can be
/// shared freely between threads.
pub struct Database {
    conn: Mutex<Connection>,
    path: String,
    busy_timeout: Duration,
}

impl Database {
    /// Open or create the store at `path` with the default connection profile.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(path, &ConnectionConfig::default())
    }

    /// Open or create the store at `path` with an explicit profile.
    pub fn open_with_config(path: impl AsRef<Path>, config: &ConnectionConfig) -> Result<Self> {
        let display = path.as_ref().display().to_string();
        let conn = Connection::open(path.as_ref()).map_err(|source| LitedocError::Connection {
            path: display.clone(),
            source,
        })?;
        Self::configure(conn, display, config)
    }

    /// Open a private in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|source| LitedocError::Connection {
            path: ":memory:".into(),
            source,
        })?;
        Self::configure(conn, ":memory:".into(), &ConnectionConfig::default())
    }

    fn configure(conn: Connection, path: String, config: &ConnectionConfig) -> Result<Self> {
        let rejected = |source: rusqlite::Error| LitedocError::Connection {
            path: path.clone(),
            source,
        };

        // Must precede journal_mode: switching to WAL takes a lock that may be
        // held by another connection, and we want to wait for it.
        conn.busy_timeout(config.busy_timeout()).map_err(rejected)?;

        for (name, value) in config.pragmas() {
            match name {
                // These report their new value as a row.
                "journal_mode" | "journal_size_limit" => {
                    let applied = conn
                        .pragma_update_and_check(None, name, &value, |row| row.get::<_, Value>(0))
                        .map_err(rejected)?;
                    log::debug!("pragma {name} = {applied:?}");
                    if name == "journal_mode" && !journal_mode_matches(&applied, &value) {
                        log::warn!("{path}: requested journal_mode {value:?}, engine reports {applied:?}");
                    }
                }
                _ => {
                    conn.pragma_update(None, name, &value).map_err(rejected)?;
                    log::debug!("pragma {name} = {value:?}");
                }
            }
        }

        log::info!("opened database {path}");
        Ok(Database {
            conn: Mutex::new(conn),
            path,
            busy_timeout: config.busy_timeout(),
        })
    }

    /// Release the connection. Dropping the handle has the same effect but
    /// swallows any failure.
    pub fn close(self) -> Result<()> {
        let Database { conn, path, .. } = self;
        conn.into_inner()
            .close()
            .map_err(|(_, source)| LitedocError::Connection {
                path: path.clone(),
                source,
            })?;
        log::info!("closed database {path}");
        Ok(())
    }

    /// The location this store was opened from.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Get a handle to a collection. No I/O happens until an operation runs.
    pub fn collection(&self, name: &str) -> Collection<'_> {
        Collection::new(self, name)
    }

    /// Names of the collection tables that currently exist, sorted.
    pub fn collections(&self, ctx: &Context) -> Result<Vec<String>> {
        self.with_conn(ctx, |conn| {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master
                 WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\'
                 ORDER BY name",
            )?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

            let mut names = Vec::new();
            for row in rows {
                names.push(row?);
            }
            Ok(names)
        })
    }

    /// The journal mode the engine is currently using, lowercased.
    pub fn journal_mode(&self) -> Result<String> {
        self.with_conn(&Context::background(), |conn| {
            conn.query_row("PRAGMA journal_mode", [], |row| row.get::<_, String>(0))
        })
        .map(|mode| mode.to_ascii_lowercase())
    }

    /// Run `f` against the shared connection under `ctx`.
    ///
    /// The context is polled while waiting for the connection, and by a
    /// progress handler while `f` runs. A context with a deadline also caps
    /// the engine's busy wait on locks held by other connections. An
    /// interrupted statement, or a busy failure once the context is done,
    /// surfaces as the context's error rather than a storage failure.
    pub(crate) fn with_conn<T, F>(&self, ctx: &Context, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        ctx.check()?;
        let conn = self.lock(ctx)?;
        ctx.check()?;

        let capped = ctx.deadline().map(|deadline| self.busy_wait_until(deadline));
        if let Some(wait) = capped {
            conn.busy_timeout(wait)?;
        }

        let watched = ctx.clone();
        conn.progress_handler(PROGRESS_OPS, Some(move || watched.is_done()));
        let result = f(&conn);
        conn.progress_handler(0, None::<fn() -> bool>);

        if capped.is_some() {
            if let Err(e) = conn.busy_timeout(self.busy_timeout) {
                log::warn!("{}: failed to restore busy timeout: {e}", self.path);
            }
        }

        result.map_err(|e| {
            if is_interrupt(&e) || (is_busy_failure(&e) && ctx.is_done()) {
                ctx.err().unwrap_or(LitedocError::Cancelled)
            } else {
                LitedocError::Storage(e)
            }
        })
    }

    /// Wait for the connection, giving up as soon as `ctx` is done.
    fn lock(&self, ctx: &Context) -> Result<MutexGuard<'_, Connection>> {
        loop {
            if let Some(guard) = self.conn.try_lock_for(LOCK_POLL) {
                return Ok(guard);
            }
            ctx.check()?;
        }
    }

    /// The busy timeout to use until `deadline`: the configured one, or the
    /// time left rounded up to the next millisecond if that is shorter. The
    /// engine counts whole milliseconds, and rounding up makes a busy failure
    /// land at or after the deadline.
    fn busy_wait_until(&self, deadline: Instant) -> Duration {
        let left = deadline.saturating_duration_since(Instant::now());
        let left_ms = u64::try_from(left.as_micros().div_ceil(1_000)).unwrap_or(u64::MAX);
        self.busy_timeout.min(Duration::from_millis(left_ms))
    }
}

fn journal_mode_matches(applied: &Value, requested: &Value) -> bool {
    match (applied, requested) {
        (Value::Text(a), Value::Text(r)) => a.eq_ignore_ascii_case(r),
        _ => false,
    }
}
