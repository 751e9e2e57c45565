use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use csv::{ReaderBuilder, WriterBuilder};

use crate::error::ReconcileError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn from_rows(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let mut table = Self::new(headers);
        for row in rows {
            table.push_row(row);
        }
        table
    }

    pub fn read(path: &Path) -> Result<Self, ReconcileError> {
        if !path.exists() {
            return Err(ReconcileError::MissingSource(path.to_path_buf()));
        }
        let file = File::open(path).map_err(|err| table_read(path, err.to_string()))?;
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(file);

        let headers = reader
            .headers()
            .map_err(|err| table_read(path, err.to_string()))?
            .iter()
            .map(|name| name.trim_start_matches('\u{feff}').trim().to_string())
            .collect::<Vec<_>>();

        let mut table = Self::new(headers);
        for record in reader.records() {
            let record = record.map_err(|err| table_read(path, err.to_string()))?;
            table.push_row(record.iter().map(str::to_string).collect());
        }
        Ok(table)
    }

    pub fn to_csv_bytes(&self) -> Result<Vec<u8>, ReconcileError> {
        let mut writer = WriterBuilder::new().from_writer(Vec::new());
        writer
            .write_record(&self.headers)
            .map_err(|err| ReconcileError::Filesystem(err.to_string()))?;
        for row in &self.rows {
            writer
                .write_record(row)
                .map_err(|err| ReconcileError::Filesystem(err.to_string()))?;
        }
        writer
            .into_inner()
            .map_err(|err| ReconcileError::Filesystem(err.to_string()))
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push_row(&mut self, mut row: Vec<String>) {
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    pub fn require_column(&self, table: &str, name: &str) -> Result<usize, ReconcileError> {
        self.column_index(name)
            .ok_or_else(|| ReconcileError::MissingColumn {
                table: table.to_string(),
                column: name.to_string(),
            })
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column_values(&self, name: &str) -> Vec<String> {
        match self.column_index(name) {
            Some(index) => self.rows.iter().map(|row| row[index].clone()).collect(),
            None => Vec::new(),
        }
    }

    pub fn ensure_column(&mut self, name: &str, fill: &str) -> usize {
        if let Some(index) = self.column_index(name) {
            return index;
        }
        self.headers.push(name.to_string());
        for row in &mut self.rows {
            row.push(fill.to_string());
        }
        self.headers.len() - 1
    }

    pub fn set_column(&mut self, name: &str, values: Vec<String>) {
        let index = self.ensure_column(name, "");
        for (row, value) in self.rows.iter_mut().zip(values) {
            row[index] = value;
        }
    }

    pub fn rename_column(&mut self, from: &str, to: &str) {
        if let Some(index) = self.column_index(from) {
            self.headers[index] = to.to_string();
        }
    }

    pub fn map_column<F>(&mut self, name: &str, mut f: F) -> usize
    where
        F: FnMut(&str) -> Option<String>,
    {
        let Some(index) = self.column_index(name) else {
            return 0;
        };
        let mut changed = 0;
        for row in &mut self.rows {
            if let Some(value) = f(&row[index]) {
                if value != row[index] {
                    row[index] = value;
                    changed += 1;
                }
            }
        }
        changed
    }

    pub fn retain_rows<F>(&mut self, mut keep: F)
    where
        F: FnMut(&[String]) -> bool,
    {
        self.rows.retain(|row| keep(row));
    }

    pub fn drop_column(&mut self, name: &str) {
        if let Some(index) = self.column_index(name) {
            self.headers.remove(index);
            for row in &mut self.rows {
                row.remove(index);
            }
        }
    }

    pub fn concat<'a, I>(tables: I) -> Table
    where
        I: IntoIterator<Item = &'a Table>,
    {
        let tables = tables.into_iter().collect::<Vec<_>>();
        let mut headers: Vec<String> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        for table in &tables {
            for header in &table.headers {
                if !positions.contains_key(header) {
                    positions.insert(header.clone(), headers.len());
                    headers.push(header.clone());
                }
            }
        }

        let mut out = Table::new(headers);
        for table in tables {
            let mapping = table
                .headers
                .iter()
                .map(|header| positions[header])
                .collect::<Vec<_>>();
            for row in &table.rows {
                let mut merged = vec![String::new(); out.headers.len()];
                for (cell, target) in row.iter().zip(&mapping) {
                    merged[*target] = cell.clone();
                }
                out.rows.push(merged);
            }
        }
        out
    }
}

fn table_read(path: &Path, message: String) -> ReconcileError {
    ReconcileError::TableRead {
        path: path.to_path_buf(),
        message,
    }
}
