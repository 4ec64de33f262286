//! Output message sinks.

use std::io::{self, BufWriter, Write};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tursotap_types::message::Message;

/// Destination of the ordered message stream.
///
/// Only the engine's writer task calls into a sink, so implementations
/// never see concurrent calls.
pub trait MessageSink: Send {
    /// Write one message.
    ///
    /// # Errors
    ///
    /// Returns an error if the message can't be serialized or written.
    fn emit(&mut self, message: &Message) -> Result<()>;

    /// Make everything emitted so far visible downstream.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying writer fails to flush.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writes one JSON document per line.
pub struct JsonLinesSink<W: Write + Send> {
    out: BufWriter<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: BufWriter::new(out),
        }
    }

    /// Recover the underlying writer after flushing.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails.
    pub fn into_inner(self) -> Result<W> {
        self.out
            .into_inner()
            .map_err(|e| anyhow::anyhow!("flushing output failed: {}", e.error()))
    }
}

impl JsonLinesSink<io::Stdout> {
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> MessageSink for JsonLinesSink<W> {
    fn emit(&mut self, message: &Message) -> Result<()> {
        serde_json::to_writer(&mut self.out, message).context("serializing message failed")?;
        self.out.write_all(b"\n").context("writing message failed")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.out.flush().context("flushing output failed")
    }
}

/// Collects messages in memory; clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    messages: Arc<Mutex<Vec<Message>>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every message emitted so far.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.messages
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl MessageSink for MemorySink {
    fn emit(&mut self, message: &Message) -> Result<()> {
        self.messages
            .lock()
            .map_err(|_| anyhow::anyhow!("memory sink lock poisoned"))?
            .push(message.clone());
        Ok(())
    }
}
