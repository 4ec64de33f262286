//! The storage contract shared by the SQLite and JSON file backends.

use tursotap_types::state::{BookmarkState, RunStats, RunStatus, TableName, TapId};

use crate::error;

/// Where a tap keeps its bookmarks and table run history.
///
/// Backends are shared across table workers as `Arc<dyn StateBackend>`.
/// Calls are blocking; async callers go through `spawn_blocking`.
pub trait StateBackend: Send + Sync {
    /// The last committed bookmark of `table`, or `None` before its first
    /// incremental run.
    ///
    /// # Errors
    ///
    /// Fails when the store can't be read or holds an undecodable bookmark.
    fn get_bookmark(&self, tap: &TapId, table: &TableName)
        -> error::Result<Option<BookmarkState>>;

    /// Store `bookmark` as the committed position of `table`.
    ///
    /// # Errors
    ///
    /// Fails when the store can't be written.
    fn set_bookmark(
        &self,
        tap: &TapId,
        table: &TableName,
        bookmark: &BookmarkState,
    ) -> error::Result<()>;

    /// Record that replication of `table` started; returns the run id.
    ///
    /// # Errors
    ///
    /// Fails when the run can't be recorded.
    fn start_run(&self, tap: &TapId, table: &TableName) -> error::Result<i64>;

    /// Close run `run_id` with its terminal status and counters.
    ///
    /// # Errors
    ///
    /// Fails when the run can't be updated.
    fn complete_run(&self, run_id: i64, status: RunStatus, stats: &RunStats) -> error::Result<()>;
}
