//! Ordered output writer and bookmark checkpointing.
//!
//! Table workers never touch the sink or the state backend directly. They
//! send [`Event`]s over one channel to the writer task, which owns the run's
//! bookmark map. A checkpoint is applied only after every record sent
//! before it has been emitted: the writer emits and flushes a STATE
//! message carrying the full map, then persists the table's bookmark, then
//! acknowledges. A worker waits for the acknowledgement before querying its
//! next batch.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tursotap_state::StateBackend;
use tursotap_types::error::ExtractError;
use tursotap_types::message::{Message, StateMessage};
use tursotap_types::state::{Bookmark, BookmarkState, Bookmarks, TableName, TapId};

use crate::emit::MessageSink;

/// Capacity of the worker-to-writer channel, in events.
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 1024;

pub(crate) type Ack = oneshot::Sender<Result<(), ExtractError>>;

/// Work item for the writer task.
pub(crate) enum Event {
    /// Emit as-is.
    Message(Message),
    /// Emit a STATE message and, when `bookmark` is set, advance and
    /// persist the table's bookmark.
    Checkpoint {
        table: TableName,
        bookmark: Option<Bookmark>,
        ack: Ack,
    },
}

pub(crate) struct Writer {
    sink: Box<dyn MessageSink>,
    bookmarks: Bookmarks,
    state: Arc<dyn StateBackend>,
    tap: TapId,
    cancel: CancellationToken,
    failure: Option<anyhow::Error>,
}

impl Writer {
    pub(crate) fn new(
        sink: Box<dyn MessageSink>,
        bookmarks: Bookmarks,
        state: Arc<dyn StateBackend>,
        tap: TapId,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            sink,
            bookmarks,
            state,
            tap,
            cancel,
            failure: None,
        }
    }

    /// Drain `rx` until every sender is dropped.
    ///
    /// Returns the final bookmark map, or the output error that stopped the
    /// run. An output failure cancels every worker, since nothing further
    /// can be delivered.
    pub(crate) async fn run(mut self, mut rx: mpsc::Receiver<Event>) -> Result<Bookmarks> {
        while let Some(event) = rx.recv().await {
            match event {
                Event::Message(message) => {
                    if self.failure.is_none() {
                        if let Err(e) = self.sink.emit(&message) {
                            self.fail(e);
                        }
                    }
                }
                Event::Checkpoint {
                    table,
                    bookmark,
                    ack,
                } => {
                    let outcome = self.checkpoint(table, bookmark).await;
                    // The worker may already be gone; nothing to report then.
                    let _ = ack.send(outcome);
                }
            }
        }

        if self.failure.is_none() {
            if let Err(e) = self.sink.flush() {
                self.fail(e);
            }
        }
        match self.failure {
            Some(e) => Err(e),
            None => Ok(self.bookmarks),
        }
    }

    fn fail(&mut self, error: anyhow::Error) {
        tracing::error!(error = %error, "Writing output failed, cancelling run");
        self.failure = Some(error);
        self.cancel.cancel();
    }

    async fn checkpoint(
        &mut self,
        table: TableName,
        bookmark: Option<Bookmark>,
    ) -> Result<(), ExtractError> {
        if self.failure.is_some() {
            return Err(ExtractError::Cancelled);
        }

        // Stage the advanced map; it is only kept once downstream has it.
        let mut staged = self.bookmarks.clone();
        let advanced = match &bookmark {
            Some(bm) => staged.advance(table.clone(), bm.clone()),
            None => false,
        };

        let message = Message::State(StateMessage {
            value: staged.clone(),
        });
        if let Err(e) = self
            .sink
            .emit(&message)
            .and_then(|()| self.sink.flush())
        {
            self.fail(e);
            return Err(ExtractError::Cancelled);
        }
        self.bookmarks = staged;

        if let (true, Some(bookmark)) = (advanced, bookmark) {
            self.persist(table, bookmark).await?;
        }
        Ok(())
    }

    fn persist(
        &self,
        table: TableName,
        bookmark: Bookmark,
    ) -> impl std::future::Future<Output = Result<(), ExtractError>> + Send + 'static {
        let state = self.state.clone();
        let tap = self.tap.clone();
        async move {
            let value = bookmark.replication_key_value.to_string();
            let snapshot = BookmarkState {
                bookmark,
                updated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            };
            let table_for_log = table.clone();
            tokio::task::spawn_blocking(move || state.set_bookmark(&tap, &table, &snapshot))
                .await
                .context("state backend task panicked")
                .and_then(|r| r.map_err(anyhow::Error::from))
                .map_err(|e| ExtractError::State(format!("{e:#}")))?;
            tracing::debug!(table = %table_for_log, value, "Bookmark persisted");
            Ok(())
        }
    }
}
