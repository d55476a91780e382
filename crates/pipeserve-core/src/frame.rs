//! Minimal column-ordered table used as pipeline input and output.
//!
//! A [`Frame`] is a list of named columns plus rows of JSON values. It is
//! deliberately small: pipelines that need real dataframe semantics live
//! behind the [`Pipeline`](crate::Pipeline) trait and only see this type at
//! the boundary.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// One row rendered as an ordered column-name to value mapping.
pub type Record = Map<String, JsonValue>;

/// A row whose length differs from the number of columns.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("row {row} has {found} cells, expected {expected}")]
pub struct RaggedRow {
    pub row: usize,
    pub expected: usize,
    pub found: usize,
}

/// Row-major table with named, ordered columns.
///
/// Every row has exactly `columns.len()` cells. Cells that were absent in the
/// source records are `null`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "RawFrame")]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<JsonValue>>,
}

#[derive(Deserialize)]
struct RawFrame {
    columns: Vec<String>,
    rows: Vec<Vec<JsonValue>>,
}

impl TryFrom<RawFrame> for Frame {
    type Error = RaggedRow;

    fn try_from(raw: RawFrame) -> Result<Self, Self::Error> {
        Self::new(raw.columns, raw.rows)
    }
}

impl Frame {
    /// Creates a frame from columns and rows.
    ///
    /// # Errors
    ///
    /// Returns [`RaggedRow`] for the first row whose length is not
    /// `columns.len()`.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<JsonValue>>) -> Result<Self, RaggedRow> {
        if let Some((row, cells)) = rows
            .iter()
            .enumerate()
            .find(|(_, cells)| cells.len() != columns.len())
        {
            return Err(RaggedRow {
                row,
                expected: columns.len(),
                found: cells.len(),
            });
        }
        Ok(Self { columns, rows })
    }

    /// Creates an empty frame with the given columns and no rows.
    #[must_use]
    pub fn with_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Builds a frame from records.
    ///
    /// Columns are the union of record keys in first-seen order.
    #[must_use]
    pub fn from_records(records: &[Record]) -> Self {
        let mut frame = Self::default();
        for record in records {
            for key in record.keys() {
                if frame.column_index(key).is_none() {
                    frame.columns.push(key.clone());
                }
            }
        }
        frame.rows = records
            .iter()
            .map(|record| {
                frame
                    .columns
                    .iter()
                    .map(|column| record.get(column).cloned().unwrap_or(JsonValue::Null))
                    .collect()
            })
            .collect();
        frame
    }

    /// Builds a one-row frame from ordered `(column, value)` pairs.
    #[must_use]
    pub fn single_row<I, S>(cells: I) -> Self
    where
        I: IntoIterator<Item = (S, JsonValue)>,
        S: Into<String>,
    {
        let (columns, row): (Vec<String>, Vec<JsonValue>) = cells
            .into_iter()
            .map(|(column, value)| (column.into(), value))
            .unzip();
        Self {
            columns,
            rows: vec![row],
        }
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<JsonValue>] {
        &self.rows
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of `name` among the columns.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// Returns `true` if the frame has a column called `name`.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Values of one column, top to bottom.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<Vec<&JsonValue>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[index]).collect())
    }

    /// Sets `name` to `value` on every row, appending the column if needed.
    #[must_use]
    pub fn with_column(mut self, name: &str, value: &JsonValue) -> Self {
        match self.column_index(name) {
            Some(index) => {
                for row in &mut self.rows {
                    row[index] = value.clone();
                }
            }
            None => {
                self.columns.push(name.to_string());
                for row in &mut self.rows {
                    row.push(value.clone());
                }
            }
        }
        self
    }

    /// Renames column `from` to `to`. Returns `None` if `from` is absent.
    ///
    /// An existing column called `to` is replaced.
    #[must_use]
    pub fn rename(mut self, from: &str, to: &str) -> Option<Self> {
        self.column_index(from)?;
        if from == to {
            return Some(self);
        }
        if let Some(existing) = self.column_index(to) {
            self.columns.remove(existing);
            for row in &mut self.rows {
                row.remove(existing);
            }
        }
        let index = self.column_index(from)?;
        self.columns[index] = to.to_string();
        Some(self)
    }

    /// Keeps only `names`, in the given order.
    ///
    /// # Errors
    ///
    /// Returns the first requested column that the frame does not have.
    pub fn select(&self, names: &[String]) -> Result<Self, String> {
        let indices = names
            .iter()
            .map(|name| self.column_index(name).ok_or_else(|| name.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            columns: names.to_vec(),
            rows: self
                .rows
                .iter()
                .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
                .collect(),
        })
    }

    /// Converts the frame into one record per row, preserving column order.
    #[must_use]
    pub fn into_records(self) -> Vec<Record> {
        let Self { columns, rows } = self;
        rows.into_iter()
            .map(|row| columns.iter().cloned().zip(row).collect())
            .collect()
    }
}
