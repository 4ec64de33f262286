//! Shared tursotap schema, record, bookmark and error model types.
//!
//! This crate performs no I/O; it is shared by the source connector, the
//! state backends and the replication engine.

pub mod catalog;
pub mod cursor;
pub mod error;
pub mod message;
pub mod record;
pub mod state;
pub mod table;
