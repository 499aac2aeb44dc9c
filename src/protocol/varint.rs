//! Unsigned LEB128 integers.
//!
//! Every length, count and message tag on the wire is written as an unsigned
//! LEB128 varint: seven value bits per byte, least significant group first, with
//! the high bit set on every byte except the last. Values are never negative, so
//! there is no zig-zag step.
//!
//! Decoding is deliberately permissive: non-minimal encodings such as
//! `[0x80, 0x00]` for zero are accepted, matching what servers emit in practice.
use super::CodecError;

/// Longest encoding of a `u64` (ten groups of seven bits).
pub const MAX_VARINT_LEN: usize = 10;

/// Appends `value` to `out`.
pub fn write_u64(out: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        out.push((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

pub fn write_u32(out: &mut Vec<u8>, value: u32) {
    write_u64(out, u64::from(value));
}

/// Booleans travel as a single-byte varint, `0` or `1`.
pub fn write_bool(out: &mut Vec<u8>, value: bool) {
    out.push(u8::from(value));
}

/// Decodes one varint from the front of `buf`.
///
/// Returns the value and the number of bytes it occupied. Fails with
/// [`CodecError::Truncated`] when the continuation bit runs past the end of the
/// buffer.
pub fn read_u64(buf: &[u8]) -> Result<(u64, usize), CodecError> {
    let mut value = 0u64;

    for (i, byte) in buf.iter().enumerate() {
        if i == MAX_VARINT_LEN {
            return Err(CodecError::VarintOverflow);
        }
        // The tenth group holds only bit 63.
        if i == MAX_VARINT_LEN - 1 && byte & 0x7E != 0 {
            return Err(CodecError::VarintOverflow);
        }
        value |= u64::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }

    if buf.len() >= MAX_VARINT_LEN {
        Err(CodecError::VarintOverflow)
    } else {
        Err(CodecError::Truncated)
    }
}

pub fn read_u32(buf: &[u8]) -> Result<(u32, usize), CodecError> {
    let (value, len) = read_u64(buf)?;
    let value = u32::try_from(value).map_err(|_| CodecError::VarintOverflow)?;
    Ok((value, len))
}
