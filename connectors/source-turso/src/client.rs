//! Connection factory for the configured mode.

use anyhow::anyhow;
use tursotap_types::error::ExtractError;

use crate::config::{ConnectionConfig, ConnectionMode};
use crate::connection::{sync_replica, LocalConnection, RemoteConnection, SourceConnection};

/// Opens connections in one resolved [`ConnectionMode`].
///
/// Call [`Connector::prepare`] once per run before opening connections;
/// each table worker then opens and owns its own connection.
#[derive(Debug, Clone)]
pub struct Connector {
    mode: ConnectionMode,
}

impl Connector {
    /// Resolve the connection mode from settings.
    ///
    /// # Errors
    ///
    /// Fails when the settings do not describe exactly one valid mode.
    pub fn new(config: &ConnectionConfig) -> anyhow::Result<Self> {
        let mode = config.mode().map_err(|errors| anyhow!(errors.join("; ")))?;
        Ok(Self { mode })
    }

    #[must_use]
    pub fn from_mode(mode: ConnectionMode) -> Self {
        Self { mode }
    }

    #[must_use]
    pub fn mode(&self) -> &ConnectionMode {
        &self.mode
    }

    /// One-time setup before any table is read: syncs an embedded replica.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Connection`] when the sync fails.
    pub async fn prepare(&self) -> Result<(), ExtractError> {
        match &self.mode {
            ConnectionMode::EmbeddedReplica {
                path,
                sync_url,
                auth_token,
            } => sync_replica(path, sync_url, auth_token).await,
            ConnectionMode::Local { .. } | ConnectionMode::Remote { .. } => Ok(()),
        }
    }

    /// Open a new connection.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Connection`] when the database can't be opened.
    pub async fn open(&self) -> Result<Box<dyn SourceConnection>, ExtractError> {
        let conn: Box<dyn SourceConnection> = match &self.mode {
            ConnectionMode::Local { path } | ConnectionMode::EmbeddedReplica { path, .. } => {
                Box::new(LocalConnection::open(path)?)
            }
            ConnectionMode::Remote { url, auth_token } => {
                Box::new(RemoteConnection::new(url, auth_token)?)
            }
        };
        tracing::debug!(connection = %conn.describe(), "Opened source connection");
        Ok(conn)
    }

    /// Verify connectivity with `SELECT 1`.
    ///
    /// # Errors
    ///
    /// Returns the connection or query error that prevented the probe.
    pub async fn check(&self) -> Result<String, ExtractError> {
        let mut conn = self.open().await?;
        let rows = conn.query("SELECT 1", &[]).await?;
        if rows.is_empty() {
            return Err(ExtractError::Query("SELECT 1 returned no rows".to_string()));
        }
        Ok(format!("Connected to {} ({})", conn.describe(), self.mode.name()))
    }
}
