//! Column-oriented blocks.
//!
//! A [`Block`] has a single owner at any time: the assembler fills it, hands it
//! to the transmitter by value, and it is released (dropped) once written. Blocks
//! are never cloned.
use super::{
    CodecError,
    column::{Column, ColumnType, read_column},
    varint,
    wire::{WireReader, write_i32, write_string},
};

const FIELD_END: u64 = 0;
const FIELD_IS_OVERFLOWS: u64 = 1;
const FIELD_BUCKET_NUM: u64 = 2;

/// Per-block metadata, written as numbered fields closed by a zero tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub is_overflows: bool,
    pub bucket_num: i32,
}

impl Default for BlockInfo {
    fn default() -> Self {
        Self {
            is_overflows: false,
            bucket_num: -1,
        }
    }
}

impl BlockInfo {
    pub fn write(&self, out: &mut Vec<u8>) {
        varint::write_u64(out, FIELD_IS_OVERFLOWS);
        varint::write_bool(out, self.is_overflows);
        varint::write_u64(out, FIELD_BUCKET_NUM);
        write_i32(out, self.bucket_num);
        varint::write_u64(out, FIELD_END);
    }

    pub fn read(reader: &mut WireReader<'_>) -> Result<Self, CodecError> {
        let mut info = BlockInfo::default();
        loop {
            match reader.read_varint()? {
                FIELD_END => return Ok(info),
                FIELD_IS_OVERFLOWS => info.is_overflows = reader.read_bool()?,
                FIELD_BUCKET_NUM => info.bucket_num = reader.read_i32_le()?,
                other => return Err(CodecError::UnknownBlockInfoField(other)),
            }
        }
    }
}

/// Column names and types of a block, in order.
pub type Schema = Vec<(String, ColumnType)>;

#[derive(Debug, PartialEq, Eq)]
pub struct Block {
    info: BlockInfo,
    columns: Vec<Column>,
    rows: usize,
}

impl Block {
    pub fn new(info: BlockInfo, columns: Vec<Column>, rows: usize) -> Self {
        Self { info, columns, rows }
    }

    /// Zero columns, zero rows. Sent to request the sample block and to end a stream.
    pub fn empty() -> Self {
        Self::new(BlockInfo::default(), Vec::new(), 0)
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() && self.rows == 0
    }

    pub fn info(&self) -> BlockInfo {
        self.info
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn schema(&self) -> Schema {
        self.columns
            .iter()
            .map(|c| (c.name().to_string(), c.column_type()))
            .collect()
    }

    /// Writes block info, column and row counts, then every column.
    ///
    /// Column bytes are only present when the block has rows.
    pub fn write(&self, out: &mut Vec<u8>) {
        self.info.write(out);
        varint::write_u64(out, self.columns.len() as u64);
        varint::write_u64(out, self.rows as u64);

        for column in &self.columns {
            write_string(out, column.name());
            write_string(out, column.column_type().name());
            if self.rows > 0 {
                out.extend_from_slice(column.data());
            }
        }
    }

    pub fn read(reader: &mut WireReader<'_>) -> Result<Self, CodecError> {
        let info = BlockInfo::read(reader)?;
        let num_columns = reader.read_len()?;
        let rows = reader.read_len()?;

        let mut columns = Vec::with_capacity(num_columns.min(1024));
        for _ in 0..num_columns {
            let name = reader.read_string()?;
            let column_type: ColumnType = reader.read_string()?.parse()?;
            let mut data = Vec::new();
            if rows > 0 {
                read_column(column_type, reader, rows, &mut data)?;
            }
            columns.push(Column::with_data(name, column_type, data));
        }

        Ok(Self::new(info, columns, rows))
    }
}
