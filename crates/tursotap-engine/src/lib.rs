//! Replication engine for tursotap.
//!
//! Validates the tap configuration, then drives one state machine per
//! configured table (`DISCOVERING -> EXTRACTING -> FINALIZING -> DONE`,
//! or `FAILED`) over the source connector, emitting SCHEMA, RECORD and
//! STATE messages through a single ordered writer.

pub(crate) mod checkpoint;
pub mod config;
pub mod emit;
pub mod errors;
pub mod orchestrator;
pub(crate) mod replication;
pub mod result;

pub use config::parser::{parse_config, parse_config_str};
pub use config::types::{StateBackendKind, StateConfig, TapConfig};
pub use config::validator::validate_config;
pub use emit::{JsonLinesSink, MemorySink, MessageSink};
pub use errors::{ConfigurationError, TableFailure};
pub use orchestrator::{check_connection, discover_tables, open_state_backend, run_tap};
pub use result::{RunResult, TableOutcome, TableStatus};
