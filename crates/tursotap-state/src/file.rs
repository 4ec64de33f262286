//! Singer-style JSON state file backend.
//!
//! The file holds `{"bookmarks": {"<table>": {"replication_key": ..,
//! "replication_key_value": ..}}}`, the same shape the engine emits in
//! STATE messages, so a captured final STATE line can seed the next run.
//! Every save rewrites the file through a temp file and rename. Run
//! history is kept in memory only.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use tursotap_types::state::{BookmarkState, Bookmarks, RunStats, RunStatus, TableName, TapId};

use crate::backend::StateBackend;
use crate::error::{self, StateError};

/// JSON state file storage. The tap id is not part of the file format.
pub struct FileStateBackend {
    path: PathBuf,
    bookmarks: Mutex<Bookmarks>,
    next_run_id: AtomicI64,
}

impl FileStateBackend {
    /// Open a state file, starting empty when it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Io`] when the file can't be read and
    /// [`StateError::Json`] when it is not a valid state document.
    pub fn open(path: &Path) -> error::Result<Self> {
        let bookmarks = match std::fs::read_to_string(path) {
            Ok(content) if content.trim().is_empty() => Bookmarks::new(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Bookmarks::new(),
            Err(e) => return Err(StateError::Io(e)),
        };
        tracing::debug!(
            path = %path.display(),
            tables = bookmarks.len(),
            "Loaded state file"
        );
        Ok(Self {
            path: path.to_path_buf(),
            bookmarks: Mutex::new(bookmarks),
            next_run_id: AtomicI64::new(1),
        })
    }

    fn lock(&self) -> error::Result<MutexGuard<'_, Bookmarks>> {
        self.bookmarks.lock().map_err(|_| StateError::LockPoisoned)
    }

    fn persist(&self, bookmarks: &Bookmarks) -> error::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, serde_json::to_vec_pretty(bookmarks)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl StateBackend for FileStateBackend {
    fn get_bookmark(
        &self,
        _tap: &TapId,
        table: &TableName,
    ) -> error::Result<Option<BookmarkState>> {
        let guard = self.lock()?;
        Ok(guard.get(table).map(|bookmark| BookmarkState {
            bookmark: bookmark.clone(),
            updated_at: String::new(),
        }))
    }

    fn set_bookmark(
        &self,
        _tap: &TapId,
        table: &TableName,
        state: &BookmarkState,
    ) -> error::Result<()> {
        let mut guard = self.lock()?;
        if !guard.advance(table.clone(), state.bookmark.clone()) {
            tracing::warn!(
                table = table.as_str(),
                value = %state.bookmark.replication_key_value,
                "Ignoring bookmark lower than the stored value"
            );
            return Ok(());
        }
        self.persist(&guard)
    }

    fn start_run(&self, tap: &TapId, table: &TableName) -> error::Result<i64> {
        let run_id = self.next_run_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            tap = tap.as_str(),
            table = table.as_str(),
            run_id,
            started_at = %Utc::now().to_rfc3339(),
            "Run started"
        );
        Ok(run_id)
    }

    fn complete_run(&self, run_id: i64, status: RunStatus, stats: &RunStats) -> error::Result<()> {
        tracing::debug!(
            run_id,
            status = status.as_str(),
            records = stats.records_read,
            batches = stats.batches_read,
            "Run completed"
        );
        Ok(())
    }
}
