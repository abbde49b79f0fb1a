//! Ordered numeric table backing the forecasting pipeline.
//!
//! Rows are keyed by an ascending-timestamp axis, columns are named `f64`
//! vectors. `NaN` marks a missing value; cleaning removes every `NaN` before
//! a table reaches model fitting.

use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq)]
struct Column {
    name: String,
    values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureTable {
    timestamps: Vec<OffsetDateTime>,
    columns: Vec<Column>,
}

impl FeatureTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from a timestamp axis and named columns.
    ///
    /// Every column must have the same length as the timestamp axis.
    pub fn from_columns(
        timestamps: Vec<OffsetDateTime>,
        columns: Vec<(String, Vec<f64>)>,
    ) -> Self {
        for (name, values) in &columns {
            assert_eq!(
                values.len(),
                timestamps.len(),
                "column '{name}' length does not match timestamp axis"
            );
        }
        Self {
            timestamps,
            columns: columns
                .into_iter()
                .map(|(name, values)| Column { name, values })
                .collect(),
        }
    }

    pub fn num_rows(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[OffsetDateTime] {
        &self.timestamps
    }

    pub fn timestamp(&self, row: usize) -> OffsetDateTime {
        self.timestamps[row]
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// Column names in insertion order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    pub fn value(&self, row: usize, name: &str) -> Option<f64> {
        self.column(name).and_then(|v| v.get(row).copied())
    }

    /// Adds a column, replacing any existing column with the same name
    /// without changing its position.
    pub fn set_column(&mut self, name: &str, values: Vec<f64>) {
        assert_eq!(
            values.len(),
            self.num_rows(),
            "column '{name}' length does not match timestamp axis"
        );
        match self.columns.iter_mut().find(|c| c.name == name) {
            Some(column) => column.values = values,
            None => self.columns.push(Column {
                name: name.to_string(),
                values,
            }),
        }
    }

    /// One row as `(column name, value)` pairs in column order.
    pub fn row(&self, row: usize) -> Vec<(String, f64)> {
        self.columns
            .iter()
            .map(|c| (c.name.clone(), c.values[row]))
            .collect()
    }

    /// Stable ascending sort of all rows by timestamp.
    pub fn sort_by_timestamp(&mut self) {
        let mut order: Vec<usize> = (0..self.num_rows()).collect();
        order.sort_by_key(|&i| self.timestamps[i]);

        self.timestamps = order.iter().map(|&i| self.timestamps[i]).collect();
        for column in &mut self.columns {
            column.values = order.iter().map(|&i| column.values[i]).collect();
        }
    }

    /// Keeps only the rows whose mask entry is true.
    pub fn retain_rows(&mut self, keep: &[bool]) {
        assert_eq!(keep.len(), self.num_rows());
        let mut i = 0;
        self.timestamps.retain(|_| {
            let kept = keep[i];
            i += 1;
            kept
        });
        for column in &mut self.columns {
            let mut i = 0;
            column.values.retain(|_| {
                let kept = keep[i];
                i += 1;
                kept
            });
        }
    }

    /// Drops every row containing at least one missing (`NaN`) value.
    pub fn drop_incomplete_rows(&mut self) {
        let keep: Vec<bool> = (0..self.num_rows())
            .map(|row| self.columns.iter().all(|c| !c.values[row].is_nan()))
            .collect();
        if keep.iter().any(|k| !k) {
            self.retain_rows(&keep);
        }
    }
}
