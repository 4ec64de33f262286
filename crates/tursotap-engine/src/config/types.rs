//! Tap configuration types (deserialized from YAML).

use std::path::PathBuf;

use serde::Deserialize;
use source_turso::reader::DEFAULT_BATCH_SIZE;
use source_turso::ConnectionConfig;
use tursotap_types::state::TapId;
use tursotap_types::table::TableConfig;

const DEFAULT_TAP_ID: &str = "tursotap";
const DEFAULT_STATE_PATH: &str = "tursotap_state.db";

/// Top-level tap configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TapConfig {
    /// Namespace for persisted bookmarks.
    #[serde(default = "default_tap")]
    pub tap: String,
    #[serde(flatten)]
    pub connection: ConnectionConfig,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum number of tables extracted concurrently.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub tables: Vec<TableConfig>,
}

impl TapConfig {
    #[must_use]
    pub fn tap_id(&self) -> TapId {
        TapId::new(self.tap.clone())
    }
}

fn default_tap() -> String {
    DEFAULT_TAP_ID.to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_parallelism() -> usize {
    1
}

/// Where bookmarks are persisted between runs.
#[derive(Debug, Clone, Deserialize)]
pub struct StateConfig {
    #[serde(default)]
    pub backend: StateBackendKind,
    #[serde(default = "default_state_path")]
    pub path: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            backend: StateBackendKind::default(),
            path: default_state_path(),
        }
    }
}

fn default_state_path() -> PathBuf {
    PathBuf::from(DEFAULT_STATE_PATH)
}

/// State storage implementation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateBackendKind {
    /// `SQLite` database with bookmarks and run history.
    #[default]
    Sqlite,
    /// Singer-style JSON state file.
    File,
}
