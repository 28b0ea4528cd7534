//! Tabular file parser
//!
//! Turns the raw bytes of an uploaded file into ordered rows. The first row of
//! the source supplies column names and is not emitted. Cell contents are not
//! coerced: CSV cells stay strings, spreadsheet cells keep the type the
//! workbook stored.
//!
//! Parsing is synchronous and CPU bound; async callers should run it on
//! `tokio::task::spawn_blocking`.

use std::collections::HashSet;
use std::io::Cursor;

use calamine::{open_workbook_from_rs, Data, Range, Reader, Xls, Xlsx};
use serde_json::{Number, Value};
use tabula_common::TabulaError;
use thiserror::Error;

use crate::models::{FileType, RowData};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unsupported file format '{0}'. Allowed: csv, xlsx, xls")]
    UnsupportedFormat(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),
}

impl From<ParseError> for TabulaError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::UnsupportedFormat(t) => TabulaError::UnsupportedFormat(t),
            ParseError::MalformedInput(m) => TabulaError::MalformedInput(m),
        }
    }
}

/// Decode `bytes` according to `declared_type` (`csv`, `xlsx` or `xls`, any case)
pub fn parse(bytes: &[u8], declared_type: &str) -> Result<Vec<RowData>, ParseError> {
    let file_type: FileType = declared_type
        .parse()
        .map_err(|_| ParseError::UnsupportedFormat(declared_type.to_string()))?;

    match file_type {
        FileType::Csv => parse_csv(bytes),
        FileType::Xlsx => {
            let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes))
                .map_err(|e| ParseError::MalformedInput(format!("invalid xlsx workbook: {}", e)))?;
            let range = first_sheet(workbook.worksheet_range_at(0))?;
            rows_from_range(&range)
        }
        FileType::Xls => {
            let mut workbook: Xls<_> = open_workbook_from_rs(Cursor::new(bytes))
                .map_err(|e| ParseError::MalformedInput(format!("invalid xls workbook: {}", e)))?;
            let range = first_sheet(workbook.worksheet_range_at(0))?;
            rows_from_range(&range)
        }
    }
}

fn parse_csv(bytes: &[u8]) -> Result<Vec<RowData>, ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let raw_headers = reader
        .headers()
        .map_err(|e| ParseError::MalformedInput(e.to_string()))?
        .clone();

    if raw_headers.is_empty() {
        return Err(ParseError::MalformedInput("no columns to parse".to_string()));
    }

    let headers = normalize_headers(raw_headers.iter().map(str::to_string));
    let mut rows = Vec::new();

    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(|e| ParseError::MalformedInput(e.to_string()))?;
        if record.len() > headers.len() {
            return Err(ParseError::MalformedInput(format!(
                "data row {} has {} fields, header has {}",
                index + 1,
                record.len(),
                headers.len()
            )));
        }

        let row = headers
            .iter()
            .enumerate()
            .map(|(col, name)| {
                let value = match record.get(col) {
                    Some(cell) if !cell.is_empty() => Value::String(cell.to_string()),
                    _ => Value::Null,
                };
                (name.clone(), value)
            })
            .collect();
        rows.push(row);
    }

    Ok(rows)
}

fn first_sheet<E: std::fmt::Display>(
    sheet: Option<Result<Range<Data>, E>>,
) -> Result<Range<Data>, ParseError> {
    match sheet {
        Some(Ok(range)) => Ok(range),
        Some(Err(e)) => Err(ParseError::MalformedInput(format!("unreadable worksheet: {}", e))),
        None => Err(ParseError::MalformedInput("workbook has no worksheets".to_string())),
    }
}

fn rows_from_range(range: &Range<Data>) -> Result<Vec<RowData>, ParseError> {
    let mut source_rows = range.rows();

    let header_cells = source_rows
        .next()
        .ok_or_else(|| ParseError::MalformedInput("no columns to parse".to_string()))?;
    let headers = normalize_headers(header_cells.iter().map(header_text));

    let rows = source_rows
        .filter(|cells| !cells.iter().all(|c| matches!(c, Data::Empty)))
        .map(|cells| {
            headers
                .iter()
                .enumerate()
                .map(|(col, name)| {
                    let value = cells.get(col).map(cell_value).unwrap_or(Value::Null);
                    (name.clone(), value)
                })
                .collect()
        })
        .collect();

    Ok(rows)
}

fn header_text(cell: &Data) -> String {
    match cell {
        Data::Empty | Data::Error(_) => String::new(),
        Data::String(s) => s.trim().to_string(),
        other => match cell_value(other) {
            Value::String(s) => s,
            value => value.to_string(),
        },
    }
}

fn cell_value(cell: &Data) -> Value {
    match cell {
        Data::Int(i) => Value::from(*i),
        Data::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        Data::String(s) => Value::String(s.clone()),
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(naive) => Value::String(naive.format("%Y-%m-%dT%H:%M:%S").to_string()),
            None => Number::from_f64(dt.as_f64()).map(Value::Number).unwrap_or(Value::Null),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::String(s.clone()),
        Data::Error(_) | Data::Empty => Value::Null,
    }
}

/// Blank names become `Unnamed: {index}`; repeats get `.1`, `.2`, ... suffixes
fn normalize_headers<I>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    let mut headers = Vec::new();

    for (index, name) in raw.into_iter().enumerate() {
        let base = match name.trim() {
            "" => format!("Unnamed: {}", index),
            trimmed => trimmed.to_string(),
        };

        let mut candidate = base.clone();
        let mut suffix = 1;
        while seen.contains(&candidate) {
            candidate = format!("{}.{}", base, suffix);
            suffix += 1;
        }

        seen.insert(candidate.clone());
        headers.push(candidate);
    }

    headers
}
