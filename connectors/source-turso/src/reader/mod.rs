//! Batched table reads.
//!
//! A [`BatchReader`] issues one page query per [`BatchReader::next_batch`]
//! call and converts the page into an immutable [`RecordBatch`] of
//! canonical records. It is a single forward pass: once exhausted it stays
//! exhausted, and a new reader starts again from the beginning or from the
//! bookmark it is given.

mod coerce;
mod query;

use std::time::Instant;

use tursotap_types::catalog::{PrimaryKey, TableSchema};
use tursotap_types::cursor::ReplicationValue;
use tursotap_types::error::ExtractError;
use tursotap_types::record::{Record, RecordBatch};

use self::coerce::{coerce, replication_value};
use self::query::{PageState, ReadPlan};
use crate::connection::{SourceConnection, SqlValue};

/// Default rows per batch.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// How a table is read.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadStrategy {
    /// Every row, paged by offset in a stable order.
    FullTable,
    /// Rows with `replication_key > start`, ascending by key.
    Incremental {
        replication_key: String,
        start: Option<ReplicationValue>,
    },
}

/// Lazily reads a table in fixed-size batches.
pub struct BatchReader<'a> {
    conn: &'a mut dyn SourceConnection,
    schema: &'a TableSchema,
    plan: ReadPlan,
    state: PageState,
    batch_size: usize,
    rows_read: u64,
    exhausted: bool,
}

impl<'a> BatchReader<'a> {
    /// Plan a read of `schema` over `conn`.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractError::InvalidReplicationKey`] when an incremental
    /// strategy names a column the table does not have.
    pub fn new(
        conn: &'a mut dyn SourceConnection,
        schema: &'a TableSchema,
        primary_key: &PrimaryKey,
        strategy: &ReadStrategy,
        batch_size: usize,
    ) -> Result<Self, ExtractError> {
        let plan = ReadPlan::new(schema, primary_key, strategy)?;
        let state = plan.initial_state();
        Ok(Self {
            conn,
            schema,
            plan,
            state,
            batch_size: batch_size.max(1),
            rows_read: 0,
            exhausted: false,
        })
    }

    /// Rows returned so far.
    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    /// Fetch the next batch, or `None` once the table is exhausted.
    ///
    /// A page shorter than the batch size ends the read; empty batches are
    /// never returned.
    ///
    /// # Errors
    ///
    /// Propagates query failures, and fails the whole batch with
    /// [`ExtractError::TypeCoercion`] if any cell does not coerce.
    pub async fn next_batch(&mut self) -> Result<Option<RecordBatch>, ExtractError> {
        if self.exhausted {
            return Ok(None);
        }

        let (sql, params) = self.plan.page_query(&self.state, self.batch_size);
        tracing::debug!(table = %self.schema.table, %sql, "Fetching page");
        let started = Instant::now();
        let page = self.conn.query(&sql, &params).await?;
        let fetch_ms = started.elapsed().as_millis();

        if page.rows.len() < self.batch_size {
            self.exhausted = true;
        }
        if page.rows.is_empty() {
            return Ok(None);
        }

        let first_row = self.rows_read;
        let (records, high_water) = self.convert(first_row, &page.rows)?;

        self.state = self.plan.next_state(&self.state, &page.rows);
        self.rows_read += records.len() as u64;
        tracing::debug!(
            table = %self.schema.table,
            rows = records.len(),
            fetch_ms,
            "Page converted"
        );
        Ok(Some(RecordBatch::new(
            self.schema.table.clone(),
            first_row,
            records,
            high_water,
        )))
    }

    fn convert(
        &self,
        first_row: u64,
        rows: &[Vec<SqlValue>],
    ) -> Result<(Vec<Record>, Option<ReplicationValue>), ExtractError> {
        let table = &self.schema.table;
        let mut records = Vec::with_capacity(rows.len());
        let mut high_water: Option<ReplicationValue> = None;

        for (i, row) in rows.iter().enumerate() {
            let position = first_row + i as u64;
            if row.len() < self.plan.width {
                return Err(ExtractError::Query(format!(
                    "row {position} of '{table}' has {} columns, expected {}",
                    row.len(),
                    self.plan.width
                )));
            }

            let mut record = Record::with_capacity(self.plan.width);
            for (column, value) in self.schema.columns.iter().zip(row) {
                let field = coerce(value, column).map_err(|reason| ExtractError::TypeCoercion {
                    table: table.clone(),
                    column: column.name.clone(),
                    row: position,
                    reason,
                })?;
                record.push(column.name.clone(), field);
            }

            if let Some(pos) = self.plan.replication_position {
                let column = &self.schema.columns[pos];
                let raw = replication_value(&row[pos]).map_err(|reason| {
                    ExtractError::TypeCoercion {
                        table: table.clone(),
                        column: column.name.clone(),
                        row: position,
                        reason,
                    }
                })?;
                if let Some(value) = raw {
                    if high_water.as_ref().map_or(true, |hw| value > *hw) {
                        high_water = Some(value);
                    }
                }
            }
            records.push(record);
        }
        Ok((records, high_water))
    }
}
