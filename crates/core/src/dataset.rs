//! In-memory tabular datasets read from extracted CSV and JSON files.
//!
//! A cell is a [`serde_json::Value`]: CSV cells are always strings, JSON
//! tables keep nested arrays and objects as-is.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde_json::{Map, Value};
use tracing::debug;

use crate::errors::DatasetError;

/// On-disk format of a tabular file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    /// UTF-8, comma-delimited, header row.
    Csv,
    /// Array of objects.
    Json,
}

impl TableFormat {
    /// Infer the format from the file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        if ext.eq_ignore_ascii_case("csv") {
            Some(TableFormat::Csv)
        } else if ext.eq_ignore_ascii_case("json") {
            Some(TableFormat::Json)
        } else {
            None
        }
    }
}

/// Rows × named columns.
///
/// JSON objects that lack some column keep that key absent on write; the
/// in-memory cell reads as `null`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TabularDataset {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    /// Per row, indices of columns absent from the source object.
    absent: Vec<Vec<usize>>,
}

impl TabularDataset {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
            absent: Vec::new(),
        }
    }

    /// Append a row; short rows are padded with `null`, long rows truncated.
    pub fn push_row(&mut self, row: Vec<Value>) {
        self.push_row_with_absent(row, Vec::new());
    }

    fn push_row_with_absent(&mut self, mut row: Vec<Value>, absent: Vec<usize>) {
        row.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
        self.absent.push(absent);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn rows_mut(&mut self) -> &mut [Vec<Value>] {
        &mut self.rows
    }

    pub fn cell(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Keep only rows for which `keep` returns true.
    pub fn retain_rows<F>(&mut self, mut keep: F)
    where
        F: FnMut(&[Value]) -> bool,
    {
        let rows = std::mem::take(&mut self.rows);
        let absent = std::mem::take(&mut self.absent);
        (self.rows, self.absent) = rows
            .into_iter()
            .zip(absent)
            .filter(|(row, _)| keep(row))
            .unzip();
    }

    /// Load a file, choosing the reader by extension.
    pub fn load(path: &Path) -> Result<Self, DatasetError> {
        match TableFormat::from_path(path) {
            Some(TableFormat::Csv) => Self::read_csv(path),
            Some(TableFormat::Json) => Self::read_json(path),
            None => Err(DatasetError::UnsupportedFormat(path.display().to_string())),
        }
    }

    /// Write a file, choosing the writer by extension.
    pub fn save(&self, path: &Path) -> Result<(), DatasetError> {
        match TableFormat::from_path(path) {
            Some(TableFormat::Csv) => self.write_csv(path),
            Some(TableFormat::Json) => self.write_json(path),
            None => Err(DatasetError::UnsupportedFormat(path.display().to_string())),
        }
    }

    pub fn read_csv(path: &Path) -> Result<Self, DatasetError> {
        let csv_err = |source| DatasetError::Csv {
            path: path.display().to_string(),
            source,
        };
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)
            .map_err(csv_err)?;

        let headers = reader.headers().map_err(csv_err)?.clone();
        if headers.is_empty() {
            return Err(DatasetError::Empty(path.display().to_string()));
        }

        let mut dataset = Self::new(headers.iter().map(str::to_string).collect());
        for record in reader.records() {
            let record = record.map_err(csv_err)?;
            dataset.push_row(
                record
                    .iter()
                    .map(|field| Value::String(field.to_string()))
                    .collect(),
            );
        }
        debug!(path = %path.display(), rows = dataset.len(), "read csv");
        Ok(dataset)
    }

    pub fn write_csv(&self, path: &Path) -> Result<(), DatasetError> {
        let csv_err = |source| DatasetError::Csv {
            path: path.display().to_string(),
            source,
        };
        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_path(path)
            .map_err(csv_err)?;
        writer.write_record(&self.columns).map_err(csv_err)?;
        for row in &self.rows {
            writer
                .write_record(row.iter().map(csv_field))
                .map_err(csv_err)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn read_json(path: &Path) -> Result<Self, DatasetError> {
        let reader = BufReader::new(File::open(path)?);
        let document: Value =
            serde_json::from_reader(reader).map_err(|source| DatasetError::Json {
                path: path.display().to_string(),
                source,
            })?;
        let not_a_table = |detail: &str| DatasetError::NotATable {
            path: path.display().to_string(),
            detail: detail.to_string(),
        };

        let Value::Array(items) = document else {
            return Err(not_a_table("top-level value is not an array"));
        };
        if items.is_empty() {
            return Err(DatasetError::Empty(path.display().to_string()));
        }

        let mut objects = Vec::with_capacity(items.len());
        let mut columns: Vec<String> = Vec::new();
        for item in items {
            let Value::Object(object) = item else {
                return Err(not_a_table("array element is not an object"));
            };
            for key in object.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
            objects.push(object);
        }

        let mut dataset = Self::new(columns);
        for mut object in objects {
            let mut absent = Vec::new();
            let row = dataset
                .columns
                .iter()
                .enumerate()
                .map(|(idx, c)| {
                    object.remove(c).unwrap_or_else(|| {
                        absent.push(idx);
                        Value::Null
                    })
                })
                .collect();
            dataset.push_row_with_absent(row, absent);
        }
        debug!(path = %path.display(), rows = dataset.len(), "read json table");
        Ok(dataset)
    }

    pub fn write_json(&self, path: &Path) -> Result<(), DatasetError> {
        let items: Vec<Value> = self
            .rows
            .iter()
            .zip(&self.absent)
            .map(|(row, absent)| {
                let object: Map<String, Value> = self
                    .columns
                    .iter()
                    .zip(row)
                    .enumerate()
                    .filter(|(idx, _)| !absent.contains(idx))
                    .map(|(_, (column, value))| (column.clone(), value.clone()))
                    .collect();
                Value::Object(object)
            })
            .collect();
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, &items).map_err(|source| DatasetError::Json {
            path: path.display().to_string(),
            source,
        })?;
        writer.flush()?;
        Ok(())
    }
}

fn csv_field(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
