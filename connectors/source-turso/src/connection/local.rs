//! Local database file access through rusqlite.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusqlite::types::{Value, ValueRef};
use rusqlite::{Connection, OpenFlags};
use tursotap_types::error::ExtractError;

use super::{QueryRows, SourceConnection, SqlValue};

/// Read-only connection to a database file on disk.
pub struct LocalConnection {
    path: PathBuf,
    conn: Connection,
}

impl LocalConnection {
    /// Open `path` read-only. The file must already exist.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::Connection`] when the file is missing or
    /// is not a database.
    pub fn open(path: &Path) -> Result<Self, ExtractError> {
        if !path.is_file() {
            return Err(ExtractError::Connection(format!(
                "database file '{}' does not exist",
                path.display()
            )));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| {
            ExtractError::Connection(format!("cannot open '{}': {e}", path.display()))
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            conn,
        })
    }

    fn run(&self, sql: &str, params: &[SqlValue]) -> rusqlite::Result<QueryRows> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
        let width = columns.len();
        let mut rows = stmt.query(rusqlite::params_from_iter(params.iter().map(to_sql_value)))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(from_value_ref(row.get_ref(i)?));
            }
            out.push(values);
        }
        Ok(QueryRows { columns, rows: out })
    }
}

fn to_sql_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(v) => Value::Integer(*v),
        SqlValue::Real(v) => Value::Real(*v),
        SqlValue::Text(v) => Value::Text(v.clone()),
        SqlValue::MalformedText(v) | SqlValue::Blob(v) => Value::Blob(v.clone()),
    }
}

fn from_value_ref(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(v) => SqlValue::Integer(v),
        ValueRef::Real(v) => SqlValue::Real(v),
        ValueRef::Text(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => SqlValue::Text(text.to_string()),
            Err(_) => SqlValue::MalformedText(bytes.to_vec()),
        },
        ValueRef::Blob(bytes) => SqlValue::Blob(bytes.to_vec()),
    }
}

#[async_trait]
impl SourceConnection for LocalConnection {
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<QueryRows, ExtractError> {
        self.run(sql, params).map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::CannotOpen
                    || err.code == rusqlite::ErrorCode::NotADatabase =>
            {
                ExtractError::Connection(e.to_string())
            }
            other => ExtractError::Query(other.to_string()),
        })
    }

    fn describe(&self) -> String {
        format!("local:{}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("source.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT, score REAL, data BLOB);
             INSERT INTO t VALUES (1, 'a', 1.5, x'0102'), (2, NULL, NULL, NULL);",
        )
        .unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn query_returns_raw_storage_values() {
        let (_dir, path) = fixture();
        let mut conn = LocalConnection::open(&path).unwrap();
        let rows = conn
            .query("SELECT id, name, score, data FROM t ORDER BY id", &[])
            .await
            .unwrap();
        assert_eq!(rows.columns, ["id", "name", "score", "data"]);
        assert_eq!(
            rows.rows[0],
            vec![
                SqlValue::Integer(1),
                SqlValue::Text("a".into()),
                SqlValue::Real(1.5),
                SqlValue::Blob(vec![1, 2]),
            ]
        );
        assert!(rows.rows[1][1].is_null());
    }

    #[tokio::test]
    async fn positional_parameters_are_bound() {
        let (_dir, path) = fixture();
        let mut conn = LocalConnection::open(&path).unwrap();
        let rows = conn
            .query("SELECT id FROM t WHERE id > ?", &[SqlValue::Integer(1)])
            .await
            .unwrap();
        assert_eq!(rows.rows, vec![vec![SqlValue::Integer(2)]]);
    }

    #[tokio::test]
    async fn connection_is_read_only() {
        let (_dir, path) = fixture();
        let mut conn = LocalConnection::open(&path).unwrap();
        let err = conn.query("DELETE FROM t", &[]).await.unwrap_err();
        assert!(matches!(err, ExtractError::Query(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn bad_sql_is_query_error() {
        let (_dir, path) = fixture();
        let mut conn = LocalConnection::open(&path).unwrap();
        let err = conn.query("SELECT nope FROM t", &[]).await.unwrap_err();
        assert!(matches!(err, ExtractError::Query(_)));
    }

    #[tokio::test]
    async fn invalid_utf8_text_is_kept_verbatim() {
        let (_dir, path) = fixture();
        let mut conn = LocalConnection::open(&path).unwrap();
        let rows = conn
            .query("SELECT CAST(x'61ff62' AS TEXT), typeof(CAST(x'61ff62' AS TEXT))", &[])
            .await
            .unwrap();
        assert_eq!(
            rows.rows[0],
            vec![
                SqlValue::MalformedText(vec![0x61, 0xff, 0x62]),
                SqlValue::Text("text".into()),
            ]
        );
    }

    #[test]
    fn missing_file_is_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = LocalConnection::open(&dir.path().join("absent.db")).err().unwrap();
        assert!(matches!(err, ExtractError::Connection(_)));
    }
}
