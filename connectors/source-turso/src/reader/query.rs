//! Page query construction for both read strategies.
//!
//! A [`ReadPlan`] is built once per table read. Each page is a pure step:
//! `(plan, page state) -> SQL + params`, then `(page state, rows) -> next
//! page state`.

use tursotap_types::catalog::{PrimaryKey, TableKind, TableSchema};
use tursotap_types::cursor::ReplicationValue;
use tursotap_types::error::ExtractError;

use super::ReadStrategy;
use crate::connection::SqlValue;
use crate::identifier::{quote_identifier, quote_list};

/// Names SQLite accepts for the implicit rowid, in preference order.
const ROWID_ALIASES: [&str; 3] = ["rowid", "_rowid_", "oid"];

/// A rowid alias not shadowed by a real column of the table.
pub(crate) fn rowid_alias(schema: &TableSchema) -> Option<&'static str> {
    if !schema.has_rowid {
        return None;
    }
    ROWID_ALIASES
        .into_iter()
        .find(|alias| !schema.columns.iter().any(|c| c.name.eq_ignore_ascii_case(alias)))
}

/// Columns that identify a row uniquely and are never NULL.
#[derive(Debug, Clone, PartialEq)]
enum RowIdentity {
    Rowid(&'static str),
    /// Declared key of a `WITHOUT ROWID` table, which SQLite keeps unique
    /// and NOT NULL.
    DeclaredKey(Vec<String>),
}

fn row_identity(schema: &TableSchema) -> Option<RowIdentity> {
    if let Some(alias) = rowid_alias(schema) {
        return Some(RowIdentity::Rowid(alias));
    }
    if schema.has_rowid || schema.kind != TableKind::Table {
        return None;
    }
    let declared = schema.declared_primary_key();
    (!declared.is_empty()).then(|| RowIdentity::DeclaredKey(declared.columns().to_vec()))
}

pub(crate) fn bind_value(value: &ReplicationValue) -> SqlValue {
    match value {
        ReplicationValue::Integer(v) => SqlValue::Integer(*v),
        ReplicationValue::Number(v) => SqlValue::Real(*v),
        ReplicationValue::Text(v) => SqlValue::Text(v.clone()),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Pagination {
    /// `ORDER BY <order_by> LIMIT ? OFFSET ?`
    Offset { order_by: String },
    /// `WHERE (<keys>) > (<last row keys>) ORDER BY <keys> LIMIT ?`
    Keyset {
        keys: Vec<String>,
        /// Positions of the key values within each result row.
        positions: Vec<usize>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PageState {
    Offset(u64),
    /// Key values of the last row read; `None` before the first page.
    After(Option<Vec<SqlValue>>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ReadPlan {
    select: String,
    filters: Vec<String>,
    filter_params: Vec<SqlValue>,
    pagination: Pagination,
    /// Number of leading result columns that belong to the record.
    pub(crate) width: usize,
    /// Position of the replication key in each result row.
    pub(crate) replication_position: Option<usize>,
}

impl ReadPlan {
    /// Plan the read of `schema` with `strategy`.
    pub(crate) fn new(
        schema: &TableSchema,
        primary_key: &PrimaryKey,
        strategy: &ReadStrategy,
    ) -> Result<Self, ExtractError> {
        let table = quote_identifier(&schema.table);
        let columns: Vec<&str> = schema.columns.iter().map(|c| c.name.as_str()).collect();
        let width = columns.len();
        let identity = row_identity(schema);

        match strategy {
            ReadStrategy::FullTable => {
                let mut order: Vec<String> =
                    primary_key.columns().iter().map(|c| quote_identifier(c)).collect();
                let suffix = match &identity {
                    Some(RowIdentity::Rowid(alias)) => vec![(*alias).to_string()],
                    Some(RowIdentity::DeclaredKey(names)) => {
                        names.iter().map(|c| quote_identifier(c)).collect()
                    }
                    None => columns.iter().map(|c| quote_identifier(c)).collect(),
                };
                for key in suffix {
                    if !order.contains(&key) {
                        order.push(key);
                    }
                }
                Ok(Self {
                    select: format!("SELECT {} FROM {table}", quote_list(&columns)),
                    filters: Vec::new(),
                    filter_params: Vec::new(),
                    pagination: Pagination::Offset {
                        order_by: order.join(", "),
                    },
                    width,
                    replication_position: None,
                })
            }
            ReadStrategy::Incremental {
                replication_key,
                start,
            } => {
                let rk_position = schema.column_index(replication_key).ok_or_else(|| {
                    ExtractError::InvalidReplicationKey {
                        table: schema.table.clone(),
                        column: replication_key.clone(),
                    }
                })?;
                let rk = quote_identifier(replication_key);

                let mut filters = vec![format!("{rk} IS NOT NULL")];
                let mut filter_params = Vec::new();
                if let Some(start) = start {
                    filters.push(format!("{rk} > ?"));
                    filter_params.push(bind_value(start));
                }

                // The tiebreak must be unique and never NULL, so a configured
                // primary key is not used here: it may be neither.
                let mut select_list = quote_list(&columns);
                let pagination = match identity {
                    Some(RowIdentity::Rowid(alias)) => {
                        select_list.push_str(", ");
                        select_list.push_str(alias);
                        Pagination::Keyset {
                            keys: vec![rk, alias.to_string()],
                            positions: vec![rk_position, width],
                        }
                    }
                    Some(RowIdentity::DeclaredKey(names)) => {
                        let mut keys = vec![rk];
                        let mut positions = vec![rk_position];
                        for name in &names {
                            if let Some(pos) = schema.column_index(name) {
                                keys.push(quote_identifier(name));
                                positions.push(pos);
                            }
                        }
                        Pagination::Keyset { keys, positions }
                    }
                    None => {
                        let mut order = vec![rk.clone()];
                        order.extend(
                            columns
                                .iter()
                                .map(|c| quote_identifier(c))
                                .filter(|c| *c != rk),
                        );
                        Pagination::Offset {
                            order_by: order.join(", "),
                        }
                    }
                };

                Ok(Self {
                    select: format!("SELECT {select_list} FROM {table}"),
                    filters,
                    filter_params,
                    pagination,
                    width,
                    replication_position: Some(rk_position),
                })
            }
        }
    }

    pub(crate) fn initial_state(&self) -> PageState {
        match self.pagination {
            Pagination::Offset { .. } => PageState::Offset(0),
            Pagination::Keyset { .. } => PageState::After(None),
        }
    }

    /// SQL and parameters for the page at `state`.
    pub(crate) fn page_query(&self, state: &PageState, batch_size: usize) -> (String, Vec<SqlValue>) {
        let mut filters = self.filters.clone();
        let mut params = self.filter_params.clone();
        let limit = i64::try_from(batch_size).unwrap_or(i64::MAX);

        let tail = match (&self.pagination, state) {
            (Pagination::Keyset { keys, .. }, PageState::After(after)) => {
                if let Some(after) = after {
                    let placeholders = vec!["?"; after.len()].join(", ");
                    filters.push(format!("({}) > ({placeholders})", keys.join(", ")));
                    params.extend(after.iter().cloned());
                }
                params.push(SqlValue::Integer(limit));
                format!(" ORDER BY {} LIMIT ?", keys.join(", "))
            }
            (Pagination::Offset { order_by }, PageState::Offset(offset)) => {
                params.push(SqlValue::Integer(limit));
                params.push(SqlValue::Integer(i64::try_from(*offset).unwrap_or(i64::MAX)));
                format!(" ORDER BY {order_by} LIMIT ? OFFSET ?")
            }
            (Pagination::Keyset { keys, .. }, PageState::Offset(_)) => {
                params.push(SqlValue::Integer(limit));
                format!(" ORDER BY {} LIMIT ?", keys.join(", "))
            }
            (Pagination::Offset { order_by }, PageState::After(_)) => {
                params.push(SqlValue::Integer(limit));
                params.push(SqlValue::Integer(0));
                format!(" ORDER BY {order_by} LIMIT ? OFFSET ?")
            }
        };

        let mut sql = self.select.clone();
        if !filters.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&filters.join(" AND "));
        }
        sql.push_str(&tail);
        (sql, params)
    }

    /// Page state following a page that returned `rows`.
    pub(crate) fn next_state(&self, state: &PageState, rows: &[Vec<SqlValue>]) -> PageState {
        match (&self.pagination, state) {
            (Pagination::Keyset { positions, .. }, _) => match rows.last() {
                Some(last) => PageState::After(Some(
                    positions
                        .iter()
                        .map(|&p| last.get(p).cloned().unwrap_or(SqlValue::Null))
                        .collect(),
                )),
                None => state.clone(),
            },
            (Pagination::Offset { .. }, PageState::Offset(offset)) => {
                PageState::Offset(offset + rows.len() as u64)
            }
            (Pagination::Offset { .. }, PageState::After(_)) => {
                PageState::Offset(rows.len() as u64)
            }
        }
    }
}
