//! Semantic validation for parsed tap configuration values.

use std::collections::HashSet;

use tursotap_types::table::ReplicationMethod;

use crate::config::types::TapConfig;
use crate::errors::ConfigurationError;

/// Validate a parsed tap configuration.
///
/// Every problem is collected; nothing is extracted unless the whole
/// configuration is valid.
///
/// # Errors
///
/// Returns a [`ConfigurationError`] listing all validation failures.
pub fn validate_config(config: &TapConfig) -> Result<(), ConfigurationError> {
    let mut errors = Vec::new();

    if config.tap.trim().is_empty() {
        errors.push("'tap' must not be empty".to_string());
    }

    if let Err(mode_errors) = config.connection.mode() {
        errors.extend(mode_errors);
    }

    if config.batch_size == 0 {
        errors.push("batch_size must be at least 1".to_string());
    }
    if config.parallelism == 0 {
        errors.push("parallelism must be at least 1".to_string());
    }

    if config.tables.is_empty() {
        errors.push("at least one table must be configured".to_string());
    }

    let mut seen = HashSet::new();
    for (i, table) in config.tables.iter().enumerate() {
        if table.name.trim().is_empty() {
            errors.push(format!("table {i} has an empty name"));
            continue;
        }
        if !seen.insert(table.name.as_str()) {
            errors.push(format!("table '{}' is configured more than once", table.name));
        }

        let key = table
            .replication_key
            .as_deref()
            .filter(|k| !k.trim().is_empty());
        match (table.replication_method, key) {
            (ReplicationMethod::Incremental, None) => errors.push(format!(
                "table '{}' uses INCREMENTAL replication but has no replication_key",
                table.name
            )),
            (ReplicationMethod::FullTable, Some(key)) => tracing::warn!(
                table = %table.name,
                replication_key = key,
                "replication_key is ignored for FULL_TABLE replication"
            ),
            _ => {}
        }

        if table.primary_key.iter().any(|c| c.trim().is_empty()) {
            errors.push(format!(
                "table '{}' has an empty primary_key column name",
                table.name
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigurationError { errors })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parser::parse_config_str;
    use proptest::prelude::*;
    use tursotap_types::table::TableConfig;

    fn local(tables: &str) -> TapConfig {
        parse_config_str(&format!("local_path: ./data.db\ntables:\n{tables}")).unwrap()
    }

    #[test]
    fn valid_config_passes() {
        let config = local(
            "  - name: events\n    replication_method: INCREMENTAL\n    replication_key: created_at\n  - name: products\n",
        );
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn incremental_without_key_fails() {
        let config = local("  - name: events\n    replication_method: INCREMENTAL\n");
        let err = validate_config(&config).unwrap_err();
        assert_eq!(err.errors.len(), 1);
        assert!(err.errors[0].contains("events"));
        assert!(err.to_string().contains("replication_key"));
    }

    #[test]
    fn all_errors_collected() {
        let mut config = local("  - name: a\n  - name: a\n  - name: ''\n");
        config.batch_size = 0;
        config.parallelism = 0;
        config.tables[0].primary_key = vec![" ".into()];
        let err = validate_config(&config).unwrap_err();
        let joined = err.errors.join("\n");
        assert!(joined.contains("batch_size"), "{joined}");
        assert!(joined.contains("parallelism"), "{joined}");
        assert!(joined.contains("more than once"), "{joined}");
        assert!(joined.contains("empty name"), "{joined}");
        assert!(joined.contains("empty primary_key"), "{joined}");
    }

    #[test]
    fn no_tables_fails() {
        let config = parse_config_str("local_path: ./data.db\n").unwrap();
        let err = validate_config(&config).unwrap_err();
        assert!(err.errors[0].contains("at least one table"));
    }

    #[test]
    fn connection_mode_errors_are_included() {
        let config =
            parse_config_str("database_url: libsql://x.turso.io\ntables:\n  - name: t\n").unwrap();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("auth_token"), "{err}");
    }

    #[test]
    fn full_table_with_key_is_accepted() {
        let config = local("  - name: t\n    replication_key: updated_at\n");
        assert!(validate_config(&config).is_ok());
    }

    proptest! {
        #[test]
        fn incremental_with_blank_key_always_fails(name in "[a-z][a-z0-9_]{0,12}", blank in " {0,3}") {
            let mut config = local("  - name: placeholder\n");
            let mut table = TableConfig::incremental(name, blank.clone());
            if blank.is_empty() {
                table.replication_key = None;
            }
            config.tables = vec![table];
            prop_assert!(validate_config(&config).is_err());
        }
    }
}
