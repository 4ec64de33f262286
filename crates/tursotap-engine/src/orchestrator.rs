//! Run orchestrator: validates configuration, restores bookmarks, schedules
//! one worker per table and collects their outcomes.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use source_turso::discovery::{discover_catalog, DiscoveredTable};
use source_turso::Connector;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tursotap_state::{FileStateBackend, SqliteStateBackend, StateBackend};
use tursotap_types::error::Phase;
use tursotap_types::state::{Bookmarks, TableName, TapId};

use crate::checkpoint::{Writer, EVENT_CHANNEL_CAPACITY};
use crate::config::types::{StateBackendKind, StateConfig, TapConfig};
use crate::config::validator::validate_config;
use crate::emit::MessageSink;
use crate::errors::TableFailure;
use crate::replication::{replicate_table, TableJob};
use crate::result::{RunResult, TableOutcome};

/// Run every configured table once.
///
/// Per-table failures are reported in the returned [`RunResult`] and never
/// stop sibling tables.
///
/// # Errors
///
/// Fails before any table starts on an invalid configuration or when the
/// stored bookmarks cannot be read, and after the run when the message
/// sink failed or a worker task panicked.
pub async fn run_tap(
    config: &TapConfig,
    state: Arc<dyn StateBackend>,
    sink: Box<dyn MessageSink>,
    cancel: CancellationToken,
) -> Result<RunResult> {
    let started = Instant::now();
    validate_config(config)?;
    let connector = Connector::new(&config.connection)?;
    let tap = config.tap_id();

    tracing::info!(
        tap = %tap,
        mode = connector.mode().name(),
        tables = config.tables.len(),
        parallelism = config.parallelism,
        batch_size = config.batch_size,
        "Starting tap run"
    );

    let bookmarks = load_bookmarks(config, &state, &tap).await?;

    if let Err(error) = connector.prepare().await {
        tracing::error!(error = %error, "Source preparation failed; no table can be read");
        let tables = config
            .tables
            .iter()
            .map(|table| {
                TableOutcome::failed(
                    TableFailure {
                        table: table.name.clone(),
                        phase: Phase::Discovering,
                        error: error.clone(),
                    },
                    0,
                    0,
                )
            })
            .collect();
        return Ok(RunResult {
            tables,
            bookmarks,
            duration_secs: started.elapsed().as_secs_f64(),
        });
    }

    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let writer = Writer::new(
        sink,
        bookmarks.clone(),
        state.clone(),
        tap.clone(),
        cancel.clone(),
    );
    let writer_handle = tokio::spawn(writer.run(rx));

    let semaphore = Arc::new(Semaphore::new(config.parallelism));
    let mut workers: JoinSet<(usize, TableOutcome)> = JoinSet::new();
    for (index, table) in config.tables.iter().enumerate() {
        // Acquired before spawning so tables start in configuration order.
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .context("table worker semaphore closed")?;
        let job = TableJob {
            config: table.clone(),
            connector: connector.clone(),
            batch_size: config.batch_size,
            start: bookmarks.get(&TableName::new(table.name.clone())).cloned(),
            events: tx.clone(),
            cancel: cancel.clone(),
            state: state.clone(),
            tap: tap.clone(),
        };
        workers.spawn(async move {
            let outcome = replicate_table(job).await;
            drop(permit);
            (index, outcome)
        });
    }
    drop(tx);

    let mut outcomes: Vec<Option<TableOutcome>> = config.tables.iter().map(|_| None).collect();
    while let Some(joined) = workers.join_next().await {
        let (index, outcome) = joined.context("table worker panicked")?;
        outcomes[index] = Some(outcome);
    }

    let bookmarks = writer_handle
        .await
        .context("output writer task panicked")?
        .context("writing output failed")?;

    let result = RunResult {
        tables: outcomes.into_iter().flatten().collect(),
        bookmarks,
        duration_secs: started.elapsed().as_secs_f64(),
    };
    tracing::info!(
        tap = %tap,
        tables = result.tables.len(),
        failed = result.failures().count(),
        records = result.total_records(),
        duration_secs = result.duration_secs,
        "Tap run finished"
    );
    Ok(result)
}

/// Restore the bookmark of every INCREMENTAL table.
///
/// A stored bookmark for a different replication key is ignored so the
/// table is backfilled from the start.
async fn load_bookmarks(
    config: &TapConfig,
    state: &Arc<dyn StateBackend>,
    tap: &TapId,
) -> Result<Bookmarks> {
    let state = state.clone();
    let tap = tap.clone();
    let tables: Vec<(TableName, String)> = config
        .tables
        .iter()
        .filter_map(|t| {
            t.effective_replication_key()
                .map(|key| (TableName::new(t.name.clone()), key.to_string()))
        })
        .collect();

    tokio::task::spawn_blocking(move || -> Result<Bookmarks> {
        let mut bookmarks = Bookmarks::new();
        for (table, key) in tables {
            let Some(stored) = state
                .get_bookmark(&tap, &table)
                .with_context(|| format!("failed to load bookmark for table '{table}'"))?
            else {
                continue;
            };
            if stored.bookmark.replication_key == key {
                tracing::debug!(
                    table = %table,
                    value = %stored.bookmark.replication_key_value,
                    "Restored bookmark"
                );
                bookmarks.advance(table, stored.bookmark);
            } else {
                tracing::warn!(
                    table = %table,
                    stored_key = %stored.bookmark.replication_key,
                    configured_key = %key,
                    "Stored bookmark is for a different replication key; ignoring it"
                );
            }
        }
        Ok(bookmarks)
    })
    .await
    .context("state backend task panicked")?
}

/// List every user table in the source with its schema and declared key.
///
/// # Errors
///
/// Fails on an invalid connection configuration or when the source cannot
/// be reached or read.
pub async fn discover_tables(config: &TapConfig) -> Result<Vec<DiscoveredTable>> {
    let connector = Connector::new(&config.connection)?;
    connector.prepare().await?;
    let mut conn = connector.open().await?;
    let tables = discover_catalog(conn.as_mut())
        .await
        .context("catalog discovery failed")?;
    tracing::info!(tables = tables.len(), "Discovered source catalog");
    Ok(tables)
}

/// Verify the source is reachable, returning a human-readable description.
///
/// # Errors
///
/// Fails on an invalid connection configuration or a failed probe query.
pub async fn check_connection(config: &TapConfig) -> Result<String> {
    let connector = Connector::new(&config.connection)?;
    connector.prepare().await?;
    let message = connector.check().await?;
    tracing::info!(mode = connector.mode().name(), "Source connection: OK");
    Ok(message)
}

/// Open the configured state backend.
///
/// # Errors
///
/// Fails when the state database or file cannot be opened.
pub fn open_state_backend(config: &StateConfig) -> Result<Arc<dyn StateBackend>> {
    let backend: Arc<dyn StateBackend> = match config.backend {
        StateBackendKind::Sqlite => Arc::new(
            SqliteStateBackend::open(&config.path).with_context(|| {
                format!("failed to open state database {}", config.path.display())
            })?,
        ),
        StateBackendKind::File => Arc::new(FileStateBackend::open(&config.path).with_context(
            || format!("failed to open state file {}", config.path.display()),
        )?),
    };
    tracing::debug!(
        backend = ?config.backend,
        path = %config.path.display(),
        "Opened state backend"
    );
    Ok(backend)
}
