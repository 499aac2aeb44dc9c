//! Input parsing for the `blockwire-insert` tool.
//!
//! Rows arrive as tab-separated lines. Each field is parsed according to the
//! column type at the same position, so the column list given on the command
//! line has to match the target table's column order.
use std::io::{BufRead, Lines};

use thiserror::Error;

use crate::{
    ClientError,
    pipeline::RowSource,
    protocol::{CodecError, ColumnType, Row, Value},
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("invalid {column_type} value '{value}'")]
    InvalidValue { column_type: ColumnType, value: String },

    #[error(transparent)]
    Column(#[from] CodecError),
}

/// Parses a comma separated list of column type names.
pub fn parse_columns(spec: &str) -> Result<Vec<ColumnType>, ParseError> {
    spec.split(',')
        .map(|name| Ok(name.trim().parse::<ColumnType>()?))
        .collect()
}

/// Parses one tab-separated line into a row.
pub fn parse_row(types: &[ColumnType], line: &str) -> Result<Row, ParseError> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() != types.len() {
        return Err(ParseError::FieldCount {
            expected: types.len(),
            found: fields.len(),
        });
    }
    types
        .iter()
        .zip(fields)
        .map(|(column_type, field)| parse_value(*column_type, field))
        .collect()
}

pub fn parse_value(column_type: ColumnType, field: &str) -> Result<Value, ParseError> {
    let invalid = || ParseError::InvalidValue {
        column_type,
        value: field.to_string(),
    };
    Ok(match column_type {
        ColumnType::Int8 => Value::Int8(field.parse().map_err(|_| invalid())?),
        ColumnType::UInt8 => Value::UInt8(field.parse().map_err(|_| invalid())?),
        ColumnType::Int32 => Value::Int32(field.parse().map_err(|_| invalid())?),
        ColumnType::UInt32 => Value::UInt32(field.parse().map_err(|_| invalid())?),
        ColumnType::Int64 => Value::Int64(field.parse().map_err(|_| invalid())?),
        ColumnType::UInt64 => Value::UInt64(field.parse().map_err(|_| invalid())?),
        ColumnType::String => Value::String(unescape(field)),
        ColumnType::Date => Value::Date(parse_date(field).ok_or_else(invalid)?),
        ColumnType::DateTime => Value::DateTime(field.parse().map_err(|_| invalid())?),
    })
}

/// Accepts `YYYY-MM-DD` or a plain day count since 1970-01-01.
pub fn parse_date(field: &str) -> Option<u16> {
    let mut parts = field.splitn(3, '-');
    let (Some(year), Some(month), Some(day)) = (parts.next(), parts.next(), parts.next()) else {
        return field.parse().ok();
    };
    let year: i64 = year.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    let day: u32 = day.parse().ok()?;
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }
    u16::try_from(days_from_civil(year, month, day)).ok()
}

/// Days since 1970-01-01 in the proleptic Gregorian calendar.
fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let year = if month <= 2 { year - 1 } else { year };
    let era = year.div_euclid(400);
    let year_of_era = year - era * 400;
    let month = i64::from(month);
    let day_of_year = (153 * (if month > 2 { month - 3 } else { month + 9 }) + 2) / 5 + i64::from(day) - 1;
    let day_of_era = year_of_era * 365 + year_of_era / 4 - year_of_era / 100 + day_of_year;
    era * 146_097 + day_of_era - 719_468
}

/// Undoes tab-separated escaping: `\t`, `\n`, `\\`.
fn unescape(field: &str) -> String {
    if !field.contains('\\') {
        return field.to_string();
    }
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Rows read line by line from a tab-separated stream.
pub struct LineSource<R> {
    lines: Lines<R>,
    types: Vec<ColumnType>,
    line: usize,
}

impl<R: BufRead> LineSource<R> {
    pub fn new(reader: R, types: Vec<ColumnType>) -> Self {
        Self {
            lines: reader.lines(),
            types,
            line: 0,
        }
    }
}

impl<R: BufRead + Send + 'static> RowSource for LineSource<R> {
    fn next_row(&mut self) -> Option<Result<Row, ClientError>> {
        let line = self.lines.next()?;
        self.line += 1;
        let row = line
            .map_err(|e| ClientError::Source(format!("line {}: {e}", self.line)))
            .and_then(|line| {
                parse_row(&self.types, line.trim_end_matches('\r'))
                    .map_err(|e| ClientError::Source(format!("line {}: {e}", self.line)))
            });
        Some(row)
    }
}
