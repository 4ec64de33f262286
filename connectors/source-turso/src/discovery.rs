//! Schema discovery from the database catalog.
//!
//! Table existence is checked against `sqlite_master` before column
//! metadata is read, so a misconfigured table name fails during discovery
//! instead of surfacing as an empty result set during extraction.

use serde::Serialize;
use tursotap_types::catalog::{ColumnSchema, PrimaryKey, TableKind, TableSchema};
use tursotap_types::error::ExtractError;

use crate::connection::{SourceConnection, SqlValue};
use crate::types::map_source_type;

const TABLE_LOOKUP_SQL: &str =
    "SELECT type, sql FROM sqlite_master WHERE name = ? AND type IN ('table', 'view')";

const TABLE_INFO_SQL: &str =
    "SELECT cid, name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?) ORDER BY cid";

const LIST_TABLES_SQL: &str =
    "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name";

/// One table found by [`discover_catalog`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveredTable {
    pub schema: TableSchema,
    /// Declared primary key; empty when the table has none.
    pub primary_key: PrimaryKey,
}

fn text(value: &SqlValue) -> Option<&str> {
    match value {
        SqlValue::Text(s) => Some(s),
        _ => None,
    }
}

fn integer(value: &SqlValue) -> Option<i64> {
    match value {
        SqlValue::Integer(v) => Some(*v),
        #[allow(clippy::cast_possible_truncation)]
        SqlValue::Real(v) => Some(*v as i64),
        SqlValue::Text(s) => s.parse().ok(),
        _ => None,
    }
}

fn metadata_error(table: &str, what: &str) -> ExtractError {
    ExtractError::Query(format!("unexpected catalog metadata for '{table}': {what}"))
}

fn is_without_rowid(create_sql: &str) -> bool {
    let compact: String = create_sql
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase();
    compact.contains("WITHOUTROWID")
}

/// Discover the schema of `table`.
///
/// # Errors
///
/// Returns [`ExtractError::TableNotFound`] if no table or view has exactly
/// this name, or the connection's error if a metadata query fails.
pub async fn discover_table(
    conn: &mut dyn SourceConnection,
    table: &str,
) -> Result<TableSchema, ExtractError> {
    let lookup = conn
        .query(TABLE_LOOKUP_SQL, &[SqlValue::from(table)])
        .await?;
    let Some(row) = lookup.rows.first() else {
        return Err(ExtractError::TableNotFound {
            table: table.to_string(),
        });
    };

    let kind = match row.first().and_then(text) {
        Some("view") => TableKind::View,
        _ => TableKind::Table,
    };
    let create_sql = row.get(1).and_then(text).unwrap_or_default();
    let has_rowid = kind == TableKind::Table && !is_without_rowid(create_sql);

    let info = conn.query(TABLE_INFO_SQL, &[SqlValue::from(table)]).await?;
    let mut columns = Vec::with_capacity(info.len());
    for row in &info.rows {
        let name = row
            .get(1)
            .and_then(text)
            .ok_or_else(|| metadata_error(table, "column without a name"))?;
        let source_type = row.get(2).and_then(text).unwrap_or_default();
        let not_null = row.get(3).and_then(integer).unwrap_or(0) != 0;
        let pk = row.get(5).and_then(integer).unwrap_or(0);

        let mapped = map_source_type(source_type);
        columns.push(ColumnSchema {
            name: name.to_string(),
            source_type: source_type.to_string(),
            canonical_type: mapped.canonical_type,
            is_base64_encoded: mapped.is_base64_encoded,
            is_temporal: mapped.is_temporal,
            nullable: !not_null,
            primary_key_ordinal: u32::try_from(pk).ok().filter(|ord| *ord > 0),
        });
    }

    if columns.is_empty() {
        return Err(metadata_error(table, "no columns reported"));
    }

    // An INTEGER PRIMARY KEY aliases the rowid and can never hold NULL.
    if has_rowid {
        let key_columns: Vec<usize> = columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.primary_key_ordinal.is_some())
            .map(|(i, _)| i)
            .collect();
        if let [only] = key_columns.as_slice() {
            let column = &mut columns[*only];
            if column.source_type.eq_ignore_ascii_case("INTEGER") {
                column.nullable = false;
            }
        }
    }

    tracing::debug!(
        table,
        columns = columns.len(),
        has_rowid,
        "Discovered table schema"
    );

    Ok(TableSchema {
        table: table.to_string(),
        kind,
        columns,
        has_rowid,
    })
}

/// Discover every user table in the database, ordered by name.
///
/// # Errors
///
/// Returns the first metadata query failure.
pub async fn discover_catalog(
    conn: &mut dyn SourceConnection,
) -> Result<Vec<DiscoveredTable>, ExtractError> {
    let listing = conn.query(LIST_TABLES_SQL, &[]).await?;
    let names: Vec<String> = listing
        .rows
        .iter()
        .filter_map(|row| row.first().and_then(text).map(str::to_string))
        .collect();

    let mut tables = Vec::with_capacity(names.len());
    for name in names {
        let schema = discover_table(conn, &name).await?;
        let primary_key = schema.declared_primary_key();
        tables.push(DiscoveredTable {
            schema,
            primary_key,
        });
    }
    tracing::info!(tables = tables.len(), "Discovered catalog");
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::LocalConnection;
    use tursotap_types::catalog::CanonicalType;

    fn fixture(ddl: &str) -> (tempfile::TempDir, LocalConnection) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("source.db");
        rusqlite::Connection::open(&path)
            .unwrap()
            .execute_batch(ddl)
            .unwrap();
        let conn = LocalConnection::open(&path).unwrap();
        (dir, conn)
    }

    #[tokio::test]
    async fn columns_keep_declaration_order_and_types() {
        let (_dir, mut conn) = fixture(
            "CREATE TABLE test_types (
                id INTEGER PRIMARY KEY,
                text_col TEXT NOT NULL,
                int_col INTEGER,
                real_col REAL,
                blob_col BLOB,
                bool_col BOOLEAN,
                datetime_col DATETIME,
                amount DECIMAL(10,2),
                untyped
            );",
        );
        let schema = discover_table(&mut conn, "test_types").await.unwrap();
        let names: Vec<&str> = schema.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "id", "text_col", "int_col", "real_col", "blob_col", "bool_col",
                "datetime_col", "amount", "untyped"
            ]
        );
        let col = |n: &str| schema.column(n).unwrap();
        assert_eq!(col("id").canonical_type, CanonicalType::Integer);
        assert!(!col("id").nullable);
        assert!(!col("text_col").nullable);
        assert!(col("int_col").nullable);
        assert_eq!(col("real_col").canonical_type, CanonicalType::Number);
        assert!(col("blob_col").is_base64_encoded);
        assert_eq!(col("bool_col").canonical_type, CanonicalType::Boolean);
        assert!(col("datetime_col").is_temporal);
        assert_eq!(col("amount").canonical_type, CanonicalType::Number);
        assert_eq!(col("untyped").canonical_type, CanonicalType::String);
        assert_eq!(col("untyped").source_type, "");
        assert!(schema.has_rowid);
        assert_eq!(schema.kind, TableKind::Table);
    }

    #[tokio::test]
    async fn missing_table_is_table_not_found() {
        let (_dir, mut conn) = fixture("CREATE TABLE a (id INTEGER);");
        let err = discover_table(&mut conn, "orders").await.unwrap_err();
        assert_eq!(
            err,
            ExtractError::TableNotFound {
                table: "orders".into()
            }
        );
    }

    #[tokio::test]
    async fn composite_primary_key_ordinals() {
        let (_dir, mut conn) = fixture(
            "CREATE TABLE lines (note TEXT, line INTEGER, order_id INTEGER,
                PRIMARY KEY (order_id, line)) WITHOUT ROWID;",
        );
        let schema = discover_table(&mut conn, "lines").await.unwrap();
        assert_eq!(schema.declared_primary_key().columns(), ["order_id", "line"]);
        assert!(!schema.has_rowid);
    }

    #[tokio::test]
    async fn views_are_discoverable_without_rowid() {
        let (_dir, mut conn) = fixture(
            "CREATE TABLE a (id INTEGER, name TEXT);
             CREATE VIEW a_names AS SELECT name FROM a;",
        );
        let schema = discover_table(&mut conn, "a_names").await.unwrap();
        assert_eq!(schema.kind, TableKind::View);
        assert!(!schema.has_rowid);
        assert_eq!(schema.columns.len(), 1);
    }

    #[tokio::test]
    async fn quoted_table_names_are_supported() {
        let (_dir, mut conn) = fixture("CREATE TABLE \"Order Items\" (\"Qty\" INTEGER);");
        let schema = discover_table(&mut conn, "Order Items").await.unwrap();
        assert_eq!(schema.columns[0].name, "Qty");
    }

    #[tokio::test]
    async fn catalog_lists_user_tables_by_name() {
        let (_dir, mut conn) = fixture(
            "CREATE TABLE zeta (id INTEGER PRIMARY KEY);
             CREATE TABLE alpha (k TEXT, v TEXT);
             CREATE TABLE seq (id INTEGER PRIMARY KEY AUTOINCREMENT);
             CREATE VIEW v AS SELECT * FROM alpha;",
        );
        let tables = discover_catalog(&mut conn).await.unwrap();
        let names: Vec<&str> = tables.iter().map(|t| t.schema.table.as_str()).collect();
        assert_eq!(names, ["alpha", "seq", "zeta"]);
        assert!(tables[0].primary_key.is_empty());
        assert_eq!(tables[2].primary_key.columns(), ["id"]);
    }

    #[test]
    fn without_rowid_detection_ignores_spacing_and_case() {
        assert!(is_without_rowid("CREATE TABLE t (a PRIMARY KEY) without   rowid"));
        assert!(!is_without_rowid("CREATE TABLE t (a INTEGER)"));
    }
}
