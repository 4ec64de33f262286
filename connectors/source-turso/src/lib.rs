//! Source connector for Turso, libSQL and plain SQLite databases.
//!
//! Implements connection handling (local file, remote over Hrana HTTP,
//! embedded replica), schema discovery, primary key resolution and the
//! batched extractor that turns table rows into canonical records.

pub mod client;
pub mod config;
pub mod connection;
pub mod cursor;
pub mod discovery;
pub mod identifier;
pub mod primary_key;
pub mod reader;
pub mod types;

pub use client::Connector;
pub use config::{ConnectionConfig, ConnectionMode};
pub use connection::{QueryRows, SourceConnection, SqlValue};
pub use reader::{BatchReader, ReadStrategy};
