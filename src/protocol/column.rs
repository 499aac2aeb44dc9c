//! Column types and their binary layouts.
//!
//! A column is a named, typed run of values stored back to back in one buffer.
//! Writes go one value at a time as rows are assembled; reads copy a whole
//! column's worth of bytes in a single transfer, so materialising a block never
//! allocates per value.
use std::{fmt, str::FromStr};

use super::{
    CodecError,
    wire::{WireReader, write_string},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Int8,
    UInt8,
    Int32,
    UInt32,
    Int64,
    UInt64,
    String,
    Date,
    DateTime,
}

impl ColumnType {
    /// Type name as it appears on the wire.
    pub fn name(self) -> &'static str {
        match self {
            ColumnType::Int8 => "Int8",
            ColumnType::UInt8 => "UInt8",
            ColumnType::Int32 => "Int32",
            ColumnType::UInt32 => "UInt32",
            ColumnType::Int64 => "Int64",
            ColumnType::UInt64 => "UInt64",
            ColumnType::String => "String",
            ColumnType::Date => "Date",
            ColumnType::DateTime => "DateTime",
        }
    }

    /// Width in bytes of one value, `None` for variable-width types.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            ColumnType::Int8 | ColumnType::UInt8 => Some(1),
            ColumnType::Date => Some(2),
            ColumnType::Int32 | ColumnType::UInt32 | ColumnType::DateTime => Some(4),
            ColumnType::Int64 | ColumnType::UInt64 => Some(8),
            ColumnType::String => None,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ColumnType {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Int8" => ColumnType::Int8,
            "UInt8" => ColumnType::UInt8,
            "Int32" => ColumnType::Int32,
            "UInt32" => ColumnType::UInt32,
            "Int64" => ColumnType::Int64,
            "UInt64" => ColumnType::UInt64,
            "String" => ColumnType::String,
            "Date" => ColumnType::Date,
            "DateTime" => ColumnType::DateTime,
            other => return Err(CodecError::UnsupportedColumnType(other.to_string())),
        })
    }
}

/// A single field of a row-record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int8(i8),
    UInt8(u8),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    String(String),
    /// Days since 1970-01-01.
    Date(u16),
    /// Seconds since the unix epoch.
    DateTime(u32),
}

impl Value {
    pub fn column_type(&self) -> ColumnType {
        match self {
            Value::Int8(_) => ColumnType::Int8,
            Value::UInt8(_) => ColumnType::UInt8,
            Value::Int32(_) => ColumnType::Int32,
            Value::UInt32(_) => ColumnType::UInt32,
            Value::Int64(_) => ColumnType::Int64,
            Value::UInt64(_) => ColumnType::UInt64,
            Value::String(_) => ColumnType::String,
            Value::Date(_) => ColumnType::Date,
            Value::DateTime(_) => ColumnType::DateTime,
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for Value {
            fn from(value: $ty) -> Self {
                Value::$variant(value)
            }
        })*
    };
}

value_from!(
    i8 => Int8,
    u8 => UInt8,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    String => String,
);

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

/// An ordered tuple of values matching a block's column order and types.
pub type Row = Vec<Value>;

/// Serialises one value into `out` using the fixed layout of `column_type`.
pub fn write_value(column_type: ColumnType, value: &Value, out: &mut Vec<u8>) -> Result<(), CodecError> {
    match (column_type, value) {
        (ColumnType::Int8, Value::Int8(v)) => out.push(*v as u8),
        (ColumnType::UInt8, Value::UInt8(v)) => out.push(*v),
        (ColumnType::Int32, Value::Int32(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (ColumnType::UInt32, Value::UInt32(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (ColumnType::Int64, Value::Int64(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (ColumnType::UInt64, Value::UInt64(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (ColumnType::String, Value::String(v)) => write_string(out, v),
        (ColumnType::Date, Value::Date(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (ColumnType::DateTime, Value::DateTime(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (expected, value) => {
            return Err(CodecError::ValueMismatch {
                expected,
                found: value.column_type(),
            });
        }
    }
    Ok(())
}

/// Copies `rows` values of `column_type` from `reader` into `out` in one transfer.
///
/// Fixed-width columns take exactly `rows * width` bytes. String columns are
/// scanned first to find where the last length-prefixed value ends, then the
/// whole span is copied at once.
pub fn read_column(
    column_type: ColumnType,
    reader: &mut WireReader<'_>,
    rows: usize,
    out: &mut Vec<u8>,
) -> Result<(), CodecError> {
    let span = match column_type.fixed_width() {
        Some(width) => rows.checked_mul(width).ok_or(CodecError::VarintOverflow)?,
        None => {
            let mut probe = reader.clone();
            for _ in 0..rows {
                let len = probe.read_len()?;
                probe.skip(len)?;
            }
            probe.position() - reader.position()
        }
    };

    out.extend_from_slice(reader.read_bytes(span)?);
    Ok(())
}

/// Decodes a single value. Used when a column's contents need to be inspected.
pub fn read_value(column_type: ColumnType, reader: &mut WireReader<'_>) -> Result<Value, CodecError> {
    Ok(match column_type {
        ColumnType::Int8 => Value::Int8(reader.read_u8()? as i8),
        ColumnType::UInt8 => Value::UInt8(reader.read_u8()?),
        ColumnType::Int32 => Value::Int32(reader.read_i32_le()?),
        ColumnType::UInt32 => Value::UInt32(reader.read_u32_le()?),
        ColumnType::Int64 => Value::Int64(i64::from_le_bytes(reader.read_array()?)),
        ColumnType::UInt64 => Value::UInt64(u64::from_le_bytes(reader.read_array()?)),
        ColumnType::String => Value::String(reader.read_string()?),
        ColumnType::Date => Value::Date(u16::from_le_bytes(reader.read_array()?)),
        ColumnType::DateTime => Value::DateTime(reader.read_u32_le()?),
    })
}

/// One named, typed column and its raw value bytes.
#[derive(Debug, PartialEq, Eq)]
pub struct Column {
    name: String,
    column_type: ColumnType,
    data: Vec<u8>,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self::with_data(name, column_type, Vec::new())
    }

    pub fn with_data(name: impl Into<String>, column_type: ColumnType, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            column_type,
            data,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn push(&mut self, value: &Value) -> Result<(), CodecError> {
        write_value(self.column_type, value, &mut self.data)
    }

    /// Decodes `rows` values from the column buffer.
    pub fn values(&self, rows: usize) -> Result<Vec<Value>, CodecError> {
        let mut reader = WireReader::new(&self.data);
        (0..rows)
            .map(|_| read_value(self.column_type, &mut reader))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(column_type: ColumnType) -> Vec<Value> {
        match column_type {
            ColumnType::Int8 => vec![Value::Int8(-128), Value::Int8(0), Value::Int8(127)],
            ColumnType::UInt8 => vec![Value::UInt8(0), Value::UInt8(255)],
            ColumnType::Int32 => vec![Value::Int32(i32::MIN), Value::Int32(-1), Value::Int32(42)],
            ColumnType::UInt32 => vec![Value::UInt32(1), Value::UInt32(u32::MAX)],
            ColumnType::Int64 => vec![Value::Int64(i64::MIN), Value::Int64(i64::MAX)],
            ColumnType::UInt64 => vec![Value::UInt64(0), Value::UInt64(u64::MAX)],
            ColumnType::String => vec!["".into(), "a".into(), "x".repeat(300).into(), "日本".into()],
            ColumnType::Date => vec![Value::Date(0), Value::Date(17_532)],
            ColumnType::DateTime => vec![Value::DateTime(0), Value::DateTime(1_519_000_000)],
        }
    }

    const ALL: [ColumnType; 9] = [
        ColumnType::Int8,
        ColumnType::UInt8,
        ColumnType::Int32,
        ColumnType::UInt32,
        ColumnType::Int64,
        ColumnType::UInt64,
        ColumnType::String,
        ColumnType::Date,
        ColumnType::DateTime,
    ];

    #[test]
    fn column_round_trip_every_type() {
        for column_type in ALL {
            let values = samples(column_type);
            let mut written = Column::new("c", column_type);
            for value in &values {
                written.push(value).unwrap();
            }

            // Trailing bytes belong to the next column and must be left alone.
            let mut wire = written.data().to_vec();
            wire.extend_from_slice(&[0xEE, 0xEE]);

            let mut reader = WireReader::new(&wire);
            let mut copied = Vec::new();
            read_column(column_type, &mut reader, values.len(), &mut copied).unwrap();

            assert_eq!(copied, written.data(), "{column_type}");
            assert_eq!(reader.remaining(), 2);
            let read = Column::with_data("c", column_type, copied);
            assert_eq!(read.values(values.len()).unwrap(), values);
        }
    }

    #[test]
    fn fixed_layouts() {
        let mut out = Vec::new();
        write_value(ColumnType::UInt32, &Value::UInt32(1), &mut out).unwrap();
        write_value(ColumnType::Date, &Value::Date(0x0102), &mut out).unwrap();
        write_value(ColumnType::Int8, &Value::Int8(-1), &mut out).unwrap();
        assert_eq!(out, vec![1, 0, 0, 0, 0x02, 0x01, 0xFF]);
    }

    #[test]
    fn type_names_round_trip() {
        for column_type in ALL {
            assert_eq!(column_type.name().parse::<ColumnType>().unwrap(), column_type);
        }
    }

    #[test]
    #[should_panic(expected = "UnsupportedColumnType")]
    fn unknown_type_name() {
        "Nullable(UInt32)".parse::<ColumnType>().unwrap();
    }

    #[test]
    #[should_panic(expected = "ValueMismatch")]
    fn write_wrong_value_type() {
        write_value(ColumnType::UInt32, &Value::Int32(1), &mut Vec::new()).unwrap();
    }

    #[test]
    #[should_panic(expected = "Truncated")]
    fn read_short_string_column() {
        let mut wire = Vec::new();
        write_string(&mut wire, "abc");
        read_column(ColumnType::String, &mut WireReader::new(&wire), 2, &mut Vec::new()).unwrap();
    }

    #[test]
    fn read_zero_rows() {
        let mut out = Vec::new();
        read_column(ColumnType::String, &mut WireReader::new(&[]), 0, &mut out).unwrap();
        assert!(out.is_empty());
    }
}
