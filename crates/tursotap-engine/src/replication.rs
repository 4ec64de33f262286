//! Per-table replication state machine.
//!
//! ```text
//! DISCOVERING -> EXTRACTING -> FINALIZING -> DONE
//!      \______________\_____________\______> FAILED
//! ```
//!
//! Each table runs on its own connection. Batches are strictly sequential:
//! the next page is not queried until the previous page's records have
//! been emitted and its checkpoint acknowledged by the writer.

use std::fmt;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use source_turso::cursor::ExtractionCursor;
use source_turso::discovery::discover_table;
use source_turso::primary_key::{resolve, validate_replication_key};
use source_turso::{BatchReader, Connector, ReadStrategy, SourceConnection};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tursotap_state::StateBackend;
use tursotap_types::catalog::{PrimaryKey, TableSchema, EXTRACTED_AT_COLUMN};
use tursotap_types::error::{ExtractError, Phase};
use tursotap_types::message::{Message, RecordMessage, SchemaMessage};
use tursotap_types::record::FieldValue;
use tursotap_types::state::{Bookmark, RunStats, RunStatus, TableName, TapId};
use tursotap_types::table::TableConfig;

use crate::checkpoint::Event;
use crate::errors::TableFailure;
use crate::result::TableOutcome;

/// Everything one table worker needs; owned exclusively by that worker.
pub(crate) struct TableJob {
    pub(crate) config: TableConfig,
    pub(crate) connector: Connector,
    pub(crate) batch_size: usize,
    /// Bookmark restored at run start, already matched to the configured key.
    pub(crate) start: Option<Bookmark>,
    pub(crate) events: mpsc::Sender<Event>,
    pub(crate) cancel: CancellationToken,
    pub(crate) state: Arc<dyn StateBackend>,
    pub(crate) tap: TapId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableState {
    Discovering,
    Extracting,
    Finalizing,
    Done,
    Failed,
}

impl fmt::Display for TableState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Discovering => "DISCOVERING",
            Self::Extracting => "EXTRACTING",
            Self::Finalizing => "FINALIZING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        })
    }
}

/// Discovered shape of the table being replicated.
struct Discovered {
    schema: TableSchema,
    primary_key: PrimaryKey,
    replication_key: Option<String>,
}

struct TableRun {
    job: TableJob,
    state: TableState,
    records: u64,
    batches: u64,
}

/// Replicate one table to completion or failure.
pub(crate) async fn replicate_table(job: TableJob) -> TableOutcome {
    let run_id = start_run(&job).await;
    let mut run = TableRun {
        job,
        state: TableState::Discovering,
        records: 0,
        batches: 0,
    };
    tracing::debug!(table = %run.job.config.name, state = %run.state, "Table started");

    let result = run.execute().await;
    let outcome = match result {
        Ok(()) => {
            run.transition(TableState::Done);
            tracing::info!(
                table = %run.job.config.name,
                records = run.records,
                batches = run.batches,
                "Table complete"
            );
            TableOutcome::done(run.job.config.name.clone(), run.records, run.batches)
        }
        Err(error) => {
            let failure = TableFailure {
                table: run.job.config.name.clone(),
                phase: run.phase(),
                error,
            };
            run.transition(TableState::Failed);
            tracing::error!(
                table = %failure.table,
                phase = %failure.phase,
                code = failure.error.code(),
                retryable = failure.error.is_retryable(),
                "{failure}"
            );
            TableOutcome::failed(failure, run.records, run.batches)
        }
    };

    if let Some(run_id) = run_id {
        complete_run(&run.job, run_id, &outcome).await;
    }
    outcome
}

impl TableRun {
    fn transition(&mut self, next: TableState) {
        tracing::debug!(
            table = %self.job.config.name,
            from = %self.state,
            to = %next,
            "Table state transition"
        );
        self.state = next;
    }

    /// Phase to blame for an error raised in the current state.
    fn phase(&self) -> Phase {
        match self.state {
            TableState::Discovering => Phase::Discovering,
            TableState::Extracting => Phase::Extracting,
            TableState::Finalizing | TableState::Done | TableState::Failed => Phase::Finalizing,
        }
    }

    fn ensure_not_cancelled(&self) -> Result<(), ExtractError> {
        if self.job.cancel.is_cancelled() {
            return Err(ExtractError::Cancelled);
        }
        Ok(())
    }

    async fn send(&self, event: Event) -> Result<(), ExtractError> {
        // The writer only goes away when the run is being torn down.
        self.job
            .events
            .send(event)
            .await
            .map_err(|_| ExtractError::Cancelled)
    }

    async fn checkpoint(&self, bookmark: Option<Bookmark>) -> Result<(), ExtractError> {
        let (ack, done) = oneshot::channel();
        self.send(Event::Checkpoint {
            table: TableName::new(self.job.config.name.clone()),
            bookmark,
            ack,
        })
        .await?;
        done.await.map_err(|_| ExtractError::Cancelled)?
    }

    async fn execute(&mut self) -> Result<(), ExtractError> {
        self.ensure_not_cancelled()?;
        let mut conn = self.job.connector.open().await?;
        let discovered = self.discover(conn.as_mut()).await?;

        self.transition(TableState::Extracting);
        let cursor = self.extract(conn.as_mut(), &discovered).await?;

        self.transition(TableState::Finalizing);
        self.finalize(cursor).await
    }

    async fn discover(
        &mut self,
        conn: &mut dyn SourceConnection,
    ) -> Result<Discovered, ExtractError> {
        let config = &self.job.config;
        let schema = discover_table(conn, &config.name).await?;
        let primary_key = resolve(config, &schema)?;
        let replication_key = validate_replication_key(config, &schema)?.map(str::to_string);

        if primary_key.is_empty() {
            tracing::warn!(
                table = %config.name,
                "No primary key declared or configured; records are append-only downstream"
            );
        }

        self.send(Event::Message(Message::Schema(SchemaMessage::new(
            &schema,
            &primary_key,
            replication_key.as_deref(),
        ))))
        .await?;

        Ok(Discovered {
            schema,
            primary_key,
            replication_key,
        })
    }

    async fn extract(
        &mut self,
        conn: &mut dyn SourceConnection,
        discovered: &Discovered,
    ) -> Result<Option<ExtractionCursor>, ExtractError> {
        let table = self.job.config.name.clone();
        let start = self
            .job
            .start
            .as_ref()
            .map(|b| b.replication_key_value.clone());

        let (strategy, mut cursor) = match &discovered.replication_key {
            Some(key) => (
                ReadStrategy::Incremental {
                    replication_key: key.clone(),
                    start: start.clone(),
                },
                Some(ExtractionCursor::new(key.clone(), start)),
            ),
            None => (ReadStrategy::FullTable, None),
        };
        tracing::info!(
            table = %table,
            method = %self.job.config.replication_method,
            bookmark = ?cursor.as_ref().and_then(ExtractionCursor::start).map(ToString::to_string),
            "Extracting"
        );

        let stamp = discovered.schema.stamps_extracted_at();
        let mut reader = BatchReader::new(
            conn,
            &discovered.schema,
            &discovered.primary_key,
            &strategy,
            self.job.batch_size,
        )?;

        loop {
            self.ensure_not_cancelled()?;
            let Some(batch) = reader.next_batch().await? else {
                break;
            };

            let count = batch.len() as u64;
            let high_water = batch.high_water().cloned();
            let time_extracted = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
            for mut record in batch.into_records() {
                if stamp {
                    record.push(EXTRACTED_AT_COLUMN, FieldValue::String(time_extracted.clone()));
                }
                self.send(Event::Message(Message::Record(RecordMessage {
                    stream: table.clone(),
                    record,
                    time_extracted: time_extracted.clone(),
                })))
                .await?;
            }

            if let (Some(cursor), Some(value)) = (cursor.as_mut(), high_water.as_ref()) {
                cursor.observe(value);
            }
            self.records += count;
            self.batches += 1;

            self.checkpoint(committable(cursor.as_ref())).await?;
            tracing::info!(
                table = %table,
                records = count,
                total = self.records,
                "Fetched {count} records from {table}"
            );
        }

        Ok(cursor)
    }

    async fn finalize(&mut self, cursor: Option<ExtractionCursor>) -> Result<(), ExtractError> {
        let bookmark = committable(cursor.as_ref());
        match (&cursor, &bookmark) {
            (Some(_), Some(bookmark)) => tracing::info!(
                table = %self.job.config.name,
                value = %bookmark.replication_key_value,
                "Committing bookmark"
            ),
            (Some(_), None) => tracing::debug!(
                table = %self.job.config.name,
                "No rows beyond the bookmark; bookmark unchanged"
            ),
            (None, _) => {}
        }
        self.checkpoint(bookmark).await
    }
}

/// The cursor's value as a bookmark, if it moved beyond the run-start value.
fn committable(cursor: Option<&ExtractionCursor>) -> Option<Bookmark> {
    let cursor = cursor?;
    cursor
        .committable()
        .map(|value| Bookmark::new(cursor.replication_key(), value.clone()))
}

async fn start_run(job: &TableJob) -> Option<i64> {
    let state = job.state.clone();
    let tap = job.tap.clone();
    let table = TableName::new(job.config.name.clone());
    match tokio::task::spawn_blocking(move || state.start_run(&tap, &table)).await {
        Ok(Ok(run_id)) => Some(run_id),
        Ok(Err(e)) => {
            tracing::warn!(table = %job.config.name, error = %e, "Failed to record run start");
            None
        }
        Err(e) => {
            tracing::warn!(table = %job.config.name, error = %e, "Run tracking task failed");
            None
        }
    }
}

async fn complete_run(job: &TableJob, run_id: i64, outcome: &TableOutcome) {
    let state = job.state.clone();
    let status = match outcome.failure {
        None => RunStatus::Completed,
        Some(_) => RunStatus::Failed,
    };
    let stats = RunStats {
        records_read: outcome.records,
        batches_read: outcome.batches,
        error_message: outcome.failure.as_ref().map(ToString::to_string),
    };
    let result =
        tokio::task::spawn_blocking(move || state.complete_run(run_id, status, &stats)).await;
    if !matches!(result, Ok(Ok(()))) {
        tracing::warn!(table = %job.config.name, run_id, "Failed to record run completion");
    }
}
