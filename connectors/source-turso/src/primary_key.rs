//! Effective primary key and replication key resolution.

use tursotap_types::catalog::{PrimaryKey, TableSchema};
use tursotap_types::error::ExtractError;
use tursotap_types::table::TableConfig;

/// Resolve the primary key used for ordering and downstream dedup.
///
/// A configured key wins and keeps its configured order; otherwise the
/// declared key is used. No key at all is an empty [`PrimaryKey`].
///
/// # Errors
///
/// Returns [`ExtractError::InvalidPrimaryKey`] listing every configured
/// column that is not in the table.
pub fn resolve(config: &TableConfig, schema: &TableSchema) -> Result<PrimaryKey, ExtractError> {
    if config.primary_key.is_empty() {
        return Ok(schema.declared_primary_key());
    }

    let missing: Vec<String> = config
        .primary_key
        .iter()
        .filter(|name| schema.column(name).is_none())
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(ExtractError::InvalidPrimaryKey {
            table: config.name.clone(),
            missing,
        });
    }
    Ok(PrimaryKey::new(config.primary_key.clone()))
}

/// Check that the configured replication key, if any, is a real column.
///
/// # Errors
///
/// Returns [`ExtractError::InvalidReplicationKey`] when it is not.
pub fn validate_replication_key<'a>(
    config: &'a TableConfig,
    schema: &TableSchema,
) -> Result<Option<&'a str>, ExtractError> {
    match config.effective_replication_key() {
        Some(key) if schema.column(key).is_none() => Err(ExtractError::InvalidReplicationKey {
            table: config.name.clone(),
            column: key.to_string(),
        }),
        other => Ok(other),
    }
}
