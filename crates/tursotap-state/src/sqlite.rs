//! Bookmarks and table run history in a `SQLite` database.
//!
//! Bookmark values keep their type: the value column holds the text
//! rendering and `value_type` the [`ReplicationValue`] tag needed to
//! rebuild it. Timestamps are stored in `SQLite`'s `datetime()` format.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use tursotap_types::cursor::ReplicationValue;
use tursotap_types::state::{Bookmark, BookmarkState, RunStats, RunStatus, TableName, TapId};

use crate::backend::StateBackend;
use crate::error::{self, StateError};

const STORED_TIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS bookmarks (
    tap TEXT NOT NULL,
    table_name TEXT NOT NULL,
    replication_key TEXT NOT NULL,
    value_type TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (tap, table_name)
);
CREATE TABLE IF NOT EXISTS sync_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    tap TEXT NOT NULL,
    table_name TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL DEFAULT (datetime('now')),
    finished_at TEXT,
    records_read INTEGER NOT NULL DEFAULT 0,
    batches_read INTEGER NOT NULL DEFAULT 0,
    error_message TEXT
);
";

/// Tap state in one `SQLite` database, shared behind a mutex.
pub struct SqliteStateBackend {
    conn: Mutex<Connection>,
}

impl SqliteStateBackend {
    /// Open the state database at `path`, creating it and any missing
    /// parent directories.
    ///
    /// # Errors
    ///
    /// [`StateError::Io`] when a directory can't be created and
    /// [`StateError::Sqlite`] when the database can't be opened or migrated.
    pub fn open(path: &Path) -> error::Result<Self> {
        match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir)?,
            _ => {}
        }
        Self::with_connection(Connection::open(path)?)
    }

    /// A throwaway database, for tests and one-off runs.
    ///
    /// # Errors
    ///
    /// [`StateError::Sqlite`] when the schema can't be created.
    pub fn in_memory() -> error::Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> error::Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> error::Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StateError::LockPoisoned)
    }

    /// Stored `datetime()` text as RFC 3339; unparsable text passes through.
    fn to_rfc3339(stored: &str) -> String {
        match NaiveDateTime::parse_from_str(stored, STORED_TIME_FMT) {
            Ok(naive) => naive.and_utc().to_rfc3339_opts(SecondsFormat::Secs, true),
            Err(_) => stored.to_string(),
        }
    }

    /// RFC 3339 as stored `datetime()` text; unparsable input means now.
    fn to_stored(rfc3339: &str) -> String {
        DateTime::parse_from_rfc3339(rfc3339)
            .map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
            .format(STORED_TIME_FMT)
            .to_string()
    }

    #[cfg(test)]
    fn run_row(&self, run_id: i64) -> error::Result<(String, i64, Option<String>, Option<String>)> {
        Ok(self.conn()?.query_row(
            "SELECT status, records_read, finished_at, error_message FROM sync_runs WHERE id = ?1",
            [run_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?)
    }
}

impl StateBackend for SqliteStateBackend {
    fn get_bookmark(
        &self,
        tap: &TapId,
        table: &TableName,
    ) -> error::Result<Option<BookmarkState>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT replication_key, value_type, value, updated_at \
             FROM bookmarks WHERE tap = ?1 AND table_name = ?2",
        )?;

        let result = stmt.query_row(rusqlite::params![tap.as_str(), table.as_str()], |row| {
            let replication_key: String = row.get(0)?;
            let value_type: String = row.get(1)?;
            let value: String = row.get(2)?;
            let updated_at: String = row.get(3)?;
            Ok((replication_key, value_type, value, updated_at))
        });

        match result {
            Ok((replication_key, value_type, value, updated_at)) => {
                let value = ReplicationValue::from_tagged(&value_type, &value).ok_or_else(|| {
                    StateError::CorruptBookmark {
                        table: table.to_string(),
                        reason: format!("cannot decode {value_type} value '{value}'"),
                    }
                })?;
                Ok(Some(BookmarkState {
                    bookmark: Bookmark::new(replication_key, value),
                    updated_at: Self::to_rfc3339(&updated_at),
                }))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StateError::Sqlite(e)),
        }
    }

    fn set_bookmark(
        &self,
        tap: &TapId,
        table: &TableName,
        state: &BookmarkState,
    ) -> error::Result<()> {
        let conn = self.conn()?;
        let updated_at = Self::to_stored(&state.updated_at);
        let value = &state.bookmark.replication_key_value;
        conn.execute(
            "INSERT INTO bookmarks (tap, table_name, replication_key, value_type, value, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT(tap, table_name) \
             DO UPDATE SET replication_key = ?3, value_type = ?4, value = ?5, updated_at = ?6",
            rusqlite::params![
                tap.as_str(),
                table.as_str(),
                state.bookmark.replication_key,
                value.type_tag(),
                value.to_string(),
                updated_at,
            ],
        )?;
        Ok(())
    }

    fn start_run(&self, tap: &TapId, table: &TableName) -> error::Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sync_runs (tap, table_name, status) VALUES (?1, ?2, ?3)",
            rusqlite::params![tap.as_str(), table.as_str(), RunStatus::Running.as_str()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    #[allow(clippy::cast_possible_wrap)]
    fn complete_run(&self, run_id: i64, status: RunStatus, stats: &RunStats) -> error::Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "UPDATE sync_runs SET status = ?1, finished_at = datetime('now'), \
             records_read = ?2, batches_read = ?3, error_message = ?4 \
             WHERE id = ?5",
            rusqlite::params![
                status.as_str(),
                stats.records_read as i64,
                stats.batches_read as i64,
                stats.error_message,
                run_id,
            ],
        )?;
        Ok(())
    }
}
