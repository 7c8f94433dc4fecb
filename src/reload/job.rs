//! Reload Jobs
//!
//! A job is the unit handed to the bulk replace: a table, the rows that
//! will become its entire contents, and the validator that must accept
//! every row before the database is touched.

use std::sync::Arc;

use crate::error::Result;
use crate::reload::table::{Row, TableSchema};

/// Per-row validator. Receives the 1-based row number.
pub type RowValidator = Arc<dyn Fn(usize, &Row) -> Result<()> + Send + Sync>;

/// One table replacement, built fresh for every attempt
pub struct ReloadJob {
    table: TableSchema,
    rows: Vec<Row>,
    validator: RowValidator,
}

impl ReloadJob {
    /// Create a job validated against the table's own schema
    pub fn new(table: TableSchema, rows: Vec<Row>) -> Self {
        let schema = table.clone();
        Self {
            table,
            rows,
            validator: Arc::new(move |n, row| schema.validate_row(n, row)),
        }
    }

    /// Replace the schema validator
    pub fn with_validator(mut self, validator: RowValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Parse a header-less CSV payload into a job for `table`
    pub fn from_csv(table: TableSchema, payload: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(payload.as_bytes());

        let mut rows = Vec::new();
        for (idx, record) in reader.records().enumerate() {
            let record = record?;
            rows.push(table.row_from_record(idx + 1, record.iter())?);
        }

        tracing::debug!("Parsed {} rows for {}", rows.len(), table);
        Ok(Self::new(table, rows))
    }

    pub fn table(&self) -> &TableSchema {
        &self.table
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Run the validator over every row, stopping at the first rejection
    pub fn validate(&self) -> Result<()> {
        for (idx, row) in self.rows.iter().enumerate() {
            (self.validator)(idx + 1, row)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for ReloadJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReloadJob")
            .field("table", &self.table.name)
            .field("rows", &self.rows.len())
            .finish()
    }
}
