//! Source connection configuration.

use std::path::PathBuf;

use serde::Deserialize;

/// Connection settings from the tap config file.
///
/// Exactly one of three combinations is valid; see [`ConnectionConfig::mode`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConnectionConfig {
    /// Remote database URL (`libsql://`, `https://` or `http://`).
    #[serde(default)]
    pub database_url: Option<String>,
    /// Bearer token for remote access.
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Local database file.
    #[serde(default)]
    pub local_path: Option<PathBuf>,
    /// Remote URL an embedded replica at `local_path` syncs from.
    #[serde(default)]
    pub sync_url: Option<String>,
}

/// Resolved connection mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Read a local database file directly.
    Local { path: PathBuf },
    /// Query a remote database over HTTP.
    Remote { url: String, auth_token: String },
    /// Sync a local replica from the remote once, then read it locally.
    EmbeddedReplica {
        path: PathBuf,
        sync_url: String,
        auth_token: String,
    },
}

impl ConnectionMode {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Local { .. } => "local",
            Self::Remote { .. } => "remote",
            Self::EmbeddedReplica { .. } => "embedded_replica",
        }
    }
}

fn present(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.trim().is_empty())
}

impl ConnectionConfig {
    /// Resolve which connection mode the settings describe.
    ///
    /// # Errors
    ///
    /// Returns every problem found, one message per entry, when the
    /// combination of settings is invalid.
    pub fn mode(&self) -> Result<ConnectionMode, Vec<String>> {
        let database_url = present(self.database_url.as_ref());
        let sync_url = present(self.sync_url.as_ref());
        let auth_token = present(self.auth_token.as_ref());
        let local_path = self
            .local_path
            .as_ref()
            .filter(|p| !p.as_os_str().is_empty());

        let mut errors = Vec::new();
        if (database_url.is_some() || sync_url.is_some()) && auth_token.is_none() {
            errors.push(
                "'auth_token' is required when using 'database_url' or 'sync_url'".to_string(),
            );
        }

        let mode = match (local_path, database_url, sync_url) {
            // A replica pair wins; a `database_url` next to it is unused.
            (Some(path), _, Some(sync_url)) => Some(ConnectionMode::EmbeddedReplica {
                path: path.clone(),
                sync_url: sync_url.to_string(),
                auth_token: auth_token.unwrap_or_default().to_string(),
            }),
            (None, Some(url), None) => Some(ConnectionMode::Remote {
                url: url.to_string(),
                auth_token: auth_token.unwrap_or_default().to_string(),
            }),
            (Some(path), None, None) => Some(ConnectionMode::Local { path: path.clone() }),
            _ => {
                errors.push(
                    "must provide one of: 1) 'local_path' + 'sync_url' (embedded replica), \
                     2) 'database_url' (remote only), or 3) 'local_path' (local only)"
                        .to_string(),
                );
                None
            }
        };

        match mode {
            Some(mode) if errors.is_empty() => Ok(mode),
            _ => Err(errors),
        }
    }
}

/// Rewrite `libsql://` URLs to the HTTPS endpoint serving them.
#[must_use]
pub fn http_base_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    match trimmed.strip_prefix("libsql://") {
        Some(rest) => format!("https://{rest}"),
        None => trimmed.to_string(),
    }
}
