//! Reload Table Schemas
//!
//! Typed description of the tables that can be replaced, and the row values
//! loaded into them.

use serde::{Deserialize, Serialize};

/// Column value type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Integer,
}

/// A column of a reload table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub kind: ColumnKind,
    /// Rows with this column empty are rejected
    pub required: bool,
}

impl Column {
    const fn text(name: &'static str) -> Self {
        Self { name, kind: ColumnKind::Text, required: false }
    }

    const fn required(name: &'static str) -> Self {
        Self { name, kind: ColumnKind::Text, required: true }
    }

    const fn integer(name: &'static str) -> Self {
        Self { name, kind: ColumnKind::Integer, required: false }
    }
}

/// Scalar value of one field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Field {
    Null,
    Text(String),
    Integer(i64),
}

impl Field {
    /// Empty text and NULL both count as empty
    pub fn is_empty(&self) -> bool {
        match self {
            Field::Null => true,
            Field::Text(s) => s.is_empty(),
            Field::Integer(_) => false,
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Field::Null => write!(f, "NULL"),
            Field::Text(s) => write!(f, "{}", s),
            Field::Integer(i) => write!(f, "{}", i),
        }
    }
}

/// Ordered sequence of fields, one per schema column
pub type Row = Vec<Field>;

/// Schema of a table whose contents are replaced wholesale
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: &'static [Column],
}

const LINK_MASTER_COLUMNS: &[Column] = &[
    Column::required("link_interface_ip"),
    Column::required("source_crs_name"),
    Column::required("destination_crs_name"),
    Column::integer("link_speed"),
    Column::integer("default_cost"),
    Column::text("bundle_name"),
    Column::text("shutdown"),
];

const ROUTER_MASTER_COLUMNS: &[Column] = &[
    Column::required("crs_name"),
    Column::text("loopback_ip"),
];

impl TableSchema {
    /// Inventory of links between core routers
    pub const LINK_MASTER: TableSchema = TableSchema {
        name: "LINK_MASTER",
        columns: LINK_MASTER_COLUMNS,
    };

    /// Inventory of core routers and their loopbacks
    pub const ROUTER_MASTER: TableSchema = TableSchema {
        name: "ROUTER_MASTER",
        columns: ROUTER_MASTER_COLUMNS,
    };

    /// Comma separated column list for SQL
    pub fn column_list(&self) -> String {
        self.columns
            .iter()
            .map(|c| format!("`{}`", c.name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Convert one raw record into a typed row.
    ///
    /// Missing trailing cells become empty; integer cells that do not parse
    /// are reported with the 1-based row number.
    pub fn row_from_record<'a, I>(&self, row_number: usize, record: I) -> crate::Result<Row>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut cells = record.into_iter();
        let mut row = Vec::with_capacity(self.columns.len());

        for column in self.columns {
            let cell = cells.next().unwrap_or("").trim();
            let field = match column.kind {
                ColumnKind::Text => Field::Text(cell.to_string()),
                ColumnKind::Integer if cell.is_empty() => Field::Null,
                ColumnKind::Integer => match cell.parse::<i64>() {
                    Ok(v) => Field::Integer(v),
                    Err(_) => {
                        return Err(crate::Error::RowValidationFailed {
                            row: row_number,
                            reason: format!("field [{}] is not an integer: {:?}", column.name, cell),
                        })
                    }
                },
            };
            row.push(field);
        }

        Ok(row)
    }

    /// Check required columns and arity of a row
    pub fn validate_row(&self, row_number: usize, row: &Row) -> crate::Result<()> {
        if row.len() != self.columns.len() {
            return Err(crate::Error::RowValidationFailed {
                row: row_number,
                reason: format!(
                    "expected {} fields for {}, got {}",
                    self.columns.len(),
                    self.name,
                    row.len()
                ),
            });
        }

        for (column, field) in self.columns.iter().zip(row) {
            if column.required && field.is_empty() {
                return Err(crate::Error::RowValidationFailed {
                    row: row_number,
                    reason: format!("required field [{}] is null", column.name),
                });
            }
        }

        Ok(())
    }
}

impl std::fmt::Display for TableSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}
