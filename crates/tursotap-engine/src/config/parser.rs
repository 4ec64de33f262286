//! Tap YAML parsing with environment variable substitution.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::config::types::TapConfig;

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

/// Substitute `${VAR_NAME}` patterns with environment variable values.
///
/// # Errors
///
/// Returns an error naming every referenced variable that is not set.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut missing = Vec::new();
    let result = ENV_VAR_RE.replace_all(input, |cap: &regex::Captures<'_>| {
        std::env::var(&cap[1]).unwrap_or_else(|_| {
            if !missing.iter().any(|m| m == &cap[1]) {
                missing.push(cap[1].to_string());
            }
            String::new()
        })
    });

    if !missing.is_empty() {
        anyhow::bail!("Missing environment variable(s): {}", missing.join(", "));
    }
    Ok(result.into_owned())
}

/// Parse a tap config string (after env var substitution).
///
/// # Errors
///
/// Returns an error if substitution fails or the YAML is invalid.
pub fn parse_config_str(yaml_str: &str) -> Result<TapConfig> {
    let substituted = substitute_env_vars(yaml_str)?;
    let config: TapConfig =
        serde_yaml::from_str(&substituted).context("Failed to parse tap config YAML")?;
    Ok(config)
}

/// Parse a tap config file. JSON files parse too, as YAML is a superset.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is invalid.
pub fn parse_config(path: &Path) -> Result<TapConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::StateBackendKind;
    use tursotap_types::table::ReplicationMethod;

    #[test]
    fn env_var_substitution() {
        std::env::set_var("TT_TEST_TOKEN", "secret-token");
        let result = substitute_env_vars("auth_token: ${TT_TEST_TOKEN}").unwrap();
        assert_eq!(result, "auth_token: secret-token");
        std::env::remove_var("TT_TEST_TOKEN");
    }

    #[test]
    fn no_env_vars_passthrough() {
        let input = "local_path: ./data.db";
        assert_eq!(substitute_env_vars(input).unwrap(), input);
    }

    #[test]
    fn every_missing_env_var_reported_once() {
        let err = substitute_env_vars("${TT_MISSING_X} ${TT_MISSING_Y} ${TT_MISSING_X}")
            .unwrap_err()
            .to_string();
        assert!(err.contains("TT_MISSING_X, TT_MISSING_Y"), "{err}");
    }

    #[test]
    fn parse_full_config() {
        std::env::set_var("TT_TEST_AUTH", "tok");
        let yaml = r"
tap: analytics
database_url: libsql://db.turso.io
auth_token: ${TT_TEST_AUTH}
batch_size: 500
parallelism: 4
state:
  backend: file
  path: ./state.json
tables:
  - name: events
    replication_method: INCREMENTAL
    replication_key: created_at
    primary_key: [id]
  - name: products
";
        let config = parse_config_str(yaml).unwrap();
        std::env::remove_var("TT_TEST_AUTH");

        assert_eq!(config.tap, "analytics");
        assert_eq!(config.connection.auth_token.as_deref(), Some("tok"));
        assert_eq!(config.batch_size, 500);
        assert_eq!(config.parallelism, 4);
        assert_eq!(config.state.backend, StateBackendKind::File);
        assert_eq!(config.tables.len(), 2);
        assert_eq!(config.tables[0].replication_method, ReplicationMethod::Incremental);
        assert_eq!(config.tables[0].primary_key, ["id"]);
        assert_eq!(config.tables[1].replication_method, ReplicationMethod::FullTable);
    }

    #[test]
    fn defaults_apply() {
        let config = parse_config_str("local_path: ./data.db\ntables:\n  - name: t\n").unwrap();
        assert_eq!(config.tap, "tursotap");
        assert_eq!(config.batch_size, 1000);
        assert_eq!(config.parallelism, 1);
        assert_eq!(config.state.backend, StateBackendKind::Sqlite);
        assert_eq!(config.state.path, Path::new("tursotap_state.db"));
    }

    #[test]
    fn json_config_is_accepted() {
        let config =
            parse_config_str(r#"{"local_path": "a.db", "tables": [{"name": "t"}]}"#).unwrap();
        assert_eq!(config.tables[0].name, "t");
    }

    #[test]
    fn unknown_replication_method_is_rejected() {
        let err = parse_config_str(
            "local_path: a.db\ntables:\n  - name: t\n    replication_method: LOG_BASED\n",
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("LOG_BASED"), "{err:#}");
    }
}
