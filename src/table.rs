use std::io::{Read, Write};
use std::path::Path;

use crate::error::LoadError;

/// Untyped rows exactly as they came out of the delimited source, before
/// deciding which row is the header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawGrid {
    pub source_name: String,
    pub rows: Vec<Vec<String>>,
}

/// A rectangular table: one header row and data rows of the same width.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

fn delimiter_for(path: &Path) -> Result<u8, LoadError> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    match ext.as_str() {
        "csv" | "txt" | "" => Ok(b','),
        "tsv" | "tab" => Ok(b'\t'),
        other => Err(LoadError::format(
            path.display().to_string(),
            format!("unsupported extension .{other}"),
        )),
    }
}

impl RawGrid {
    pub fn from_path(path: &Path) -> Result<Self, LoadError> {
        let delimiter = delimiter_for(path)?;
        let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(file, delimiter, path.display().to_string())
    }

    pub fn from_reader<R: Read>(
        reader: R,
        delimiter: u8,
        source_name: impl Into<String>,
    ) -> Result<Self, LoadError> {
        let source_name = source_name.into();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(reader);

        let mut rows = Vec::new();
        for result in reader.records() {
            let record =
                result.map_err(|err| LoadError::format(source_name.clone(), err.to_string()))?;
            let row: Vec<String> = record.iter().map(|cell| cell.trim().to_string()).collect();
            if row.iter().all(|cell| cell.is_empty()) {
                continue;
            }
            rows.push(row);
        }

        if rows.is_empty() {
            return Err(LoadError::format(source_name, "no tabular rows found"));
        }

        Ok(Self { source_name, rows })
    }

    /// Treat row `skip` as the header and everything after it as data. Rows
    /// are padded or truncated to the header width.
    pub fn to_table(&self, skip: usize) -> Table {
        let Some(header_row) = self.rows.get(skip) else {
            return Table::default();
        };
        let headers: Vec<String> = header_row
            .iter()
            .enumerate()
            .map(|(idx, name)| {
                if name.is_empty() {
                    format!("column_{}", idx + 1)
                } else {
                    name.clone()
                }
            })
            .collect();
        let width = headers.len();
        let rows = self.rows[skip + 1..]
            .iter()
            .map(|row| {
                let mut row = row.clone();
                row.resize(width, String::new());
                row
            })
            .collect();

        Table { headers, rows }
    }
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    /// Index of the column whose header equals `name`, ignoring case.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|header| header.trim().eq_ignore_ascii_case(name))
    }

    /// Non-empty trimmed cell value.
    pub fn cell(&self, row: usize, column: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map(|cell| cell.trim())
            .filter(|cell| !cell.is_empty())
    }

    pub fn width(&self) -> usize {
        self.headers.len()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> csv::Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}
