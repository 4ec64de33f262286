//! Embedded replica synchronization.
//!
//! A replica is a local database file refreshed from the remote primary
//! once per run, before any table is read. The remote's SQL dump is
//! replayed into a scratch file that then replaces the replica, so readers
//! never observe a half-applied sync.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::Connection;
use tursotap_types::error::ExtractError;

use crate::config::http_base_url;

const SYNC_TIMEOUT: Duration = Duration::from_secs(600);

fn scratch_path(path: &Path) -> PathBuf {
    let mut scratch = path.as_os_str().to_owned();
    scratch.push(".sync");
    PathBuf::from(scratch)
}

/// Replace the database at `path` with one built from `dump`.
pub(crate) fn apply_dump(path: &Path, dump: &str) -> Result<(), ExtractError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ExtractError::Connection(format!(
                    "cannot create replica directory '{}': {e}",
                    parent.display()
                ))
            })?;
        }
    }

    let scratch = scratch_path(path);
    if scratch.exists() {
        std::fs::remove_file(&scratch).map_err(|e| {
            ExtractError::Connection(format!("cannot remove stale '{}': {e}", scratch.display()))
        })?;
    }

    let result = write_scratch(&scratch, dump).and_then(|()| {
        std::fs::rename(&scratch, path).map_err(|e| {
            ExtractError::Connection(format!("cannot replace replica '{}': {e}", path.display()))
        })
    });
    if result.is_err() {
        if let Err(e) = std::fs::remove_file(&scratch) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    scratch = %scratch.display(),
                    error = %e,
                    "Failed to remove replica scratch file"
                );
            }
        }
    }
    result
}

fn write_scratch(scratch: &Path, dump: &str) -> Result<(), ExtractError> {
    let conn = Connection::open(scratch)
        .map_err(|e| ExtractError::Connection(format!("cannot create replica: {e}")))?;
    conn.execute_batch(dump)
        .map_err(|e| ExtractError::Connection(format!("replaying remote dump failed: {e}")))?;
    conn.close()
        .map_err(|(_, e)| ExtractError::Connection(format!("closing replica failed: {e}")))
}

/// [`apply_dump`] on the blocking pool, off the async workers.
async fn install_dump(path: &Path, dump: String) -> Result<(), ExtractError> {
    let target = path.to_path_buf();
    tokio::task::spawn_blocking(move || apply_dump(&target, &dump))
        .await
        .map_err(|e| ExtractError::Connection(format!("replica install task failed: {e}")))?
}

/// Pull the remote primary's contents into the replica at `path`.
pub(crate) async fn sync_replica(
    path: &Path,
    sync_url: &str,
    auth_token: &str,
) -> Result<(), ExtractError> {
    let url = format!("{}/dump", http_base_url(sync_url));
    tracing::info!(replica = %path.display(), %url, "Syncing embedded replica");

    let client = reqwest::Client::builder()
        .timeout(SYNC_TIMEOUT)
        .build()
        .map_err(|e| ExtractError::Connection(format!("cannot build HTTP client: {e}")))?;
    let response = client
        .get(&url)
        .bearer_auth(auth_token)
        .send()
        .await
        .map_err(|e| ExtractError::Connection(format!("replica sync from {url} failed: {e}")))?;
    let status = response.status();
    if !status.is_success() {
        return Err(ExtractError::Connection(format!(
            "replica sync from {url} rejected: {status}"
        )));
    }
    let dump = response
        .text()
        .await
        .map_err(|e| ExtractError::Connection(format!("reading replica dump failed: {e}")))?;

    let bytes = dump.len();
    install_dump(path, dump).await?;
    tracing::info!(replica = %path.display(), bytes, "Replica synced");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = "PRAGMA foreign_keys=OFF;
BEGIN TRANSACTION;
CREATE TABLE events (id INTEGER PRIMARY KEY, name TEXT);
INSERT INTO events VALUES(1,'a');
INSERT INTO events VALUES(2,'b');
COMMIT;";

    fn count(path: &Path) -> i64 {
        Connection::open(path)
            .unwrap()
            .query_row("SELECT count(*) FROM events", [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn dump_creates_replica() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("replica.db");
        apply_dump(&path, DUMP).unwrap();
        assert_eq!(count(&path), 2);
        assert!(!scratch_path(&path).exists());
    }

    #[test]
    fn dump_replaces_existing_replica() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replica.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE events (id INTEGER); INSERT INTO events VALUES (9);")
            .unwrap();
        apply_dump(&path, DUMP).unwrap();
        assert_eq!(count(&path), 2);
    }

    #[test]
    fn broken_dump_leaves_replica_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replica.db");
        apply_dump(&path, DUMP).unwrap();
        let err = apply_dump(&path, "CREATE TABLE oops (").unwrap_err();
        assert!(matches!(err, ExtractError::Connection(_)));
        assert_eq!(count(&path), 2);
    }

    #[test]
    fn failed_dump_removes_scratch_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replica.db");
        apply_dump(&path, "CREATE TABLE oops (").unwrap_err();
        assert!(!scratch_path(&path).exists());
        assert!(!path.exists());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn install_keeps_runtime_responsive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replica.db");
        let (installed, ticked) = tokio::join!(install_dump(&path, DUMP.to_string()), async {
            tokio::task::yield_now().await;
            true
        });
        installed.unwrap();
        assert!(ticked);
        assert_eq!(count(&path), 2);

        let err = install_dump(&path, "CREATE TABLE oops (".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Connection(_)));
        assert!(!scratch_path(&path).exists());
        assert_eq!(count(&path), 2);
    }
}
