//! Column-oriented tables with CSV loading and saving
//!
//! A column is numeric when every non-empty cell parses as `f64` (empty cells
//! become NaN), otherwise it is kept as text. Column order is preserved by
//! every operation.

use crate::errors::{PipelineError, Result, ResultExt, Stage};
use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::Path;

/// One named column of a [`DataFrame`]
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Numeric(Vec<f64>),
    Text(Vec<String>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Column::Numeric(_))
    }

    pub fn as_numeric(&self) -> Option<&[f64]> {
        match self {
            Column::Numeric(v) => Some(v),
            Column::Text(_) => None,
        }
    }

    /// Canonical string form of a cell, used for equality and encoding
    pub fn cell_key(&self, row: usize) -> String {
        match self {
            Column::Numeric(v) => format_number(v[row]),
            Column::Text(v) => v[row].clone(),
        }
    }

    fn take(&self, rows: &[usize]) -> Column {
        match self {
            Column::Numeric(v) => Column::Numeric(rows.iter().map(|&i| v[i]).collect()),
            Column::Text(v) => Column::Text(rows.iter().map(|&i| v[i].clone()).collect()),
        }
    }

    fn from_cells(cells: Vec<String>) -> Column {
        let numeric: Option<Vec<f64>> = cells
            .iter()
            .map(|c| {
                let c = c.trim();
                if c.is_empty() {
                    Some(f64::NAN)
                } else {
                    c.parse::<f64>().ok()
                }
            })
            .collect();

        match numeric {
            Some(values) => Column::Numeric(values),
            None => Column::Text(cells),
        }
    }
}

/// Formats a number the way it is written to CSV; NaN becomes an empty cell
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        value.to_string()
    }
}

/// Named, ordered columns of equal length
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataFrame {
    names: Vec<String>,
    columns: Vec<Column>,
}

fn table_error(operation: &'static str, message: impl Into<String>) -> PipelineError {
    PipelineError::new(Stage::Data, operation, message)
}

impl DataFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from named columns
    pub fn from_columns(columns: Vec<(String, Column)>) -> Result<Self> {
        let mut frame = DataFrame::new();
        for (name, column) in columns {
            frame.push_column(name, column)?;
        }
        Ok(frame)
    }

    /// Build an all-numeric table from row-major values
    pub fn from_numeric_rows(names: Vec<String>, rows: &[Vec<f64>]) -> Result<Self> {
        let mut columns: Vec<Vec<f64>> = vec![Vec::with_capacity(rows.len()); names.len()];
        for (i, row) in rows.iter().enumerate() {
            if row.len() != names.len() {
                return Err(table_error(
                    "build table",
                    format!("row {i} has {} values, expected {}", row.len(), names.len()),
                ));
            }
            for (col, &value) in columns.iter_mut().zip(row) {
                col.push(value);
            }
        }
        Self::from_columns(
            names
                .into_iter()
                .zip(columns.into_iter().map(Column::Numeric))
                .collect(),
        )
    }

    /// Load a CSV file with a header row
    pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .op(Stage::Data, "load data")
            .map_err(|e| e.with_context("path", path.display()))?;
        Self::from_csv_reader(std::io::BufReader::new(file))
            .map_err(|e| e.with_context("path", path.display()))
    }

    /// Parse CSV from any reader
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(reader);

        let headers: Vec<String> = reader
            .headers()
            .op(Stage::Data, "load data")?
            .iter()
            .map(|h| h.to_string())
            .collect();

        let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
        for (line, record) in reader.records().enumerate() {
            let record = record.op(Stage::Data, "load data")?;
            if record.len() != headers.len() {
                return Err(table_error(
                    "load data",
                    format!(
                        "record {} has {} fields, expected {}",
                        line + 1,
                        record.len(),
                        headers.len()
                    ),
                ));
            }
            for (col, field) in cells.iter_mut().zip(record.iter()) {
                col.push(field.to_string());
            }
        }

        Self::from_columns(
            headers
                .into_iter()
                .zip(cells.into_iter().map(Column::from_cells))
                .collect(),
        )
    }

    /// Write the table as CSV with a header row, creating parent directories
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .op(Stage::Data, "save data")
                .map_err(|e| e.with_context("path", parent.display()))?;
        }
        let file = std::fs::File::create(path)
            .op(Stage::Data, "save data")
            .map_err(|e| e.with_context("path", path.display()))?;
        self.to_csv_writer(std::io::BufWriter::new(file))
            .map_err(|e| e.with_context("path", path.display()))
    }

    /// Serialize as CSV into any writer
    pub fn to_csv_writer<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        writer
            .write_record(&self.names)
            .op(Stage::Data, "save data")?;
        for row in 0..self.height() {
            let record: Vec<String> = self.columns.iter().map(|c| c.cell_key(row)).collect();
            writer
                .write_record(&record)
                .op(Stage::Data, "save data")?;
        }
        writer.flush().op(Stage::Data, "save data")?;
        Ok(())
    }

    /// Number of rows
    pub fn height(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    /// Number of columns
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.index_of(name).map(|i| &self.columns[i])
    }

    /// Numeric view of a column; text columns are an error
    pub fn numeric_column(&self, name: &str) -> Result<&[f64]> {
        match self.column(name) {
            Some(Column::Numeric(v)) => Ok(v),
            Some(Column::Text(_)) => Err(table_error(
                "read column",
                format!("column {name} is not numeric"),
            )
            .with_context("column", name)),
            None => Err(table_error("read column", format!("column {name} not found"))
                .with_context("column", name)),
        }
    }

    /// Fail listing every name in `required` that is absent
    pub fn require_columns(&self, required: &[String]) -> Result<()> {
        let missing: Vec<&str> = required
            .iter()
            .filter(|name| self.index_of(name).is_none())
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(table_error(
                "check schema",
                format!("missing columns: {}", missing.join(", ")),
            ))
        }
    }

    /// Append a column; its length must match the table
    pub fn push_column(&mut self, name: impl Into<String>, column: Column) -> Result<()> {
        let name = name.into();
        if self.index_of(&name).is_some() {
            return Err(table_error("add column", format!("duplicate column {name}")));
        }
        if !self.columns.is_empty() && column.len() != self.height() {
            return Err(table_error(
                "add column",
                format!(
                    "column {name} has {} rows, expected {}",
                    column.len(),
                    self.height()
                ),
            ));
        }
        self.names.push(name);
        self.columns.push(column);
        Ok(())
    }

    /// Replace an existing column in place
    pub fn replace_column(&mut self, name: &str, column: Column) -> Result<()> {
        let idx = self.index_of(name).ok_or_else(|| {
            table_error("replace column", format!("column {name} not found"))
        })?;
        if column.len() != self.height() {
            return Err(table_error(
                "replace column",
                format!(
                    "column {name} has {} rows, expected {}",
                    column.len(),
                    self.height()
                ),
            ));
        }
        self.columns[idx] = column;
        Ok(())
    }

    /// Drop the named columns that exist; returns how many were removed
    pub fn drop_columns(&mut self, names: &[String]) -> usize {
        let before = self.columns.len();
        let mut kept_names = Vec::with_capacity(before);
        let mut kept_columns = Vec::with_capacity(before);
        for (name, column) in self.names.drain(..).zip(self.columns.drain(..)) {
            if !names.contains(&name) {
                kept_names.push(name);
                kept_columns.push(column);
            }
        }
        self.names = kept_names;
        self.columns = kept_columns;
        before - self.columns.len()
    }

    /// Remove exact-duplicate rows keeping first occurrences; returns removed count
    pub fn drop_duplicates(&mut self) -> usize {
        let mut seen = HashSet::with_capacity(self.height());
        let keep: Vec<usize> = (0..self.height())
            .filter(|&row| {
                let key: Vec<String> = self.columns.iter().map(|c| c.cell_key(row)).collect();
                seen.insert(key)
            })
            .collect();
        let removed = self.height() - keep.len();
        if removed > 0 {
            *self = self.take_rows(&keep);
        }
        removed
    }

    /// Rows at the given indices, in that order
    pub fn take_rows(&self, rows: &[usize]) -> DataFrame {
        DataFrame {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c.take(rows)).collect(),
        }
    }

    /// Project onto `names`, in that order
    pub fn select(&self, names: &[String]) -> Result<DataFrame> {
        self.require_columns(names)?;
        let columns = names
            .iter()
            .filter_map(|n| self.index_of(n).map(|i| self.columns[i].clone()))
            .collect();
        Ok(DataFrame {
            names: names.to_vec(),
            columns,
        })
    }

    /// Row-major numeric matrix of the named columns
    pub fn numeric_rows(&self, names: &[String]) -> Result<Vec<Vec<f64>>> {
        let columns: Vec<&[f64]> = names
            .iter()
            .map(|n| self.numeric_column(n))
            .collect::<Result<_>>()?;
        Ok((0..self.height())
            .map(|row| columns.iter().map(|c| c[row]).collect())
            .collect())
    }

    /// Canonical key of every cell in a row
    pub fn row_key(&self, row: usize) -> Vec<String> {
        self.columns.iter().map(|c| c.cell_key(row)).collect()
    }
}
