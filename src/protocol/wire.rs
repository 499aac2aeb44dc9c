//! Primitive wire reads and writes shared by every message codec.
//!
//! Multi-byte integers are little-endian. Strings are a varint byte length followed
//! by UTF-8 bytes.
use super::{CodecError, varint};

pub fn write_string(out: &mut Vec<u8>, value: &str) {
    varint::write_u64(out, value.len() as u64);
    out.extend_from_slice(value.as_bytes());
}

pub fn write_i32(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Cursor over a borrowed byte slice.
///
/// Every read fails with [`CodecError::Truncated`] instead of panicking when the
/// slice runs out, which lets message decoders report "need more input" by
/// simply retrying from the start once more bytes have arrived.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn read_varint(&mut self) -> Result<u64, CodecError> {
        let (value, len) = varint::read_u64(&self.buf[self.pos..])?;
        self.pos += len;
        Ok(value)
    }

    /// Reads a varint that is used as an in-memory length or count.
    pub fn read_len(&mut self) -> Result<usize, CodecError> {
        let value = self.read_varint()?;
        usize::try_from(value).map_err(|_| CodecError::VarintOverflow)
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u32_le(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32_le(&mut self) -> Result<i32, CodecError> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < len {
            return Err(CodecError::Truncated);
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), CodecError> {
        self.read_bytes(len).map(|_| ())
    }

    pub fn read_string(&mut self) -> Result<String, CodecError> {
        let len = self.read_len()?;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }
}
