//! Compression envelopes for data blocks.
//!
//! A compressed frame is laid out as:
//!
//! ```text
//! | checksum (16) | method (1) | compressed size (4 LE) | decompressed size (4 LE) | payload |
//! ```
//!
//! The compressed size counts the 9-byte header plus the payload. The checksum
//! is a 128-bit CityHash (v1.0.2) over everything after itself, stored as two
//! little-endian 64-bit halves.
use std::{fmt, str::FromStr};

use log::trace;
use lz4::block::CompressionMode;
use thiserror::Error;

pub const CHECKSUM_SIZE: usize = 16;
pub const HEADER_SIZE: usize = 9;
const LZ4_MAX_INPUT_SIZE: usize = 0x7E00_0000;
const LZ4_HC_LEVEL: i32 = 9;

#[derive(Debug, Error)]
pub enum CompressionError {
    #[error("unknown compression method byte {0:#04x}")]
    UnknownMethod(u8),
    #[error("checksum mismatch: expected {expected:#034x}, computed {actual:#034x}")]
    ChecksumMismatch { expected: u128, actual: u128 },
    #[error("decompression failed: {0}")]
    DecompressionFailed(String),
    #[error("compression failed: {0}")]
    CompressionFailed(String),
    #[error("frame of {0} bytes is shorter than its header")]
    FrameTooShort(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Lz4,
    Lz4Hc,
    Zstd,
    /// Integrity-only: the payload is stored as is, the checksum still applies.
    None,
}

impl CompressionMethod {
    pub fn method_byte(self) -> u8 {
        match self {
            // LZ4-HC output is plain LZ4 to the decoder.
            CompressionMethod::Lz4 | CompressionMethod::Lz4Hc => 0x82,
            CompressionMethod::Zstd => 0x90,
            CompressionMethod::None => 0x02,
        }
    }

    pub fn from_method_byte(byte: u8) -> Result<Self, CompressionError> {
        match byte {
            0x82 => Ok(CompressionMethod::Lz4),
            0x90 => Ok(CompressionMethod::Zstd),
            0x02 => Ok(CompressionMethod::None),
            other => Err(CompressionError::UnknownMethod(other)),
        }
    }

    /// Setting value understood by the server's `network_compression_method`.
    pub fn name(self) -> &'static str {
        match self {
            CompressionMethod::Lz4 => "lz4",
            CompressionMethod::Lz4Hc => "lz4hc",
            CompressionMethod::Zstd => "zstd",
            CompressionMethod::None => "none",
        }
    }

    /// Worst-case payload size for `len` input bytes.
    pub fn bound(self, len: usize) -> usize {
        match self {
            CompressionMethod::Lz4 | CompressionMethod::Lz4Hc => {
                if len > LZ4_MAX_INPUT_SIZE {
                    0
                } else {
                    len + len / 255 + 16
                }
            }
            CompressionMethod::Zstd => zstd::zstd_safe::compress_bound(len),
            CompressionMethod::None => len,
        }
    }
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CompressionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lz4" => Ok(CompressionMethod::Lz4),
            "lz4hc" => Ok(CompressionMethod::Lz4Hc),
            "zstd" => Ok(CompressionMethod::Zstd),
            "none" => Ok(CompressionMethod::None),
            other => Err(format!("unknown compression method '{other}'")),
        }
    }
}

/// Method and level applied to every outbound data block of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Compression {
    pub method: CompressionMethod,
    pub level: i32,
}

impl Compression {
    pub fn compress(self, raw: &[u8]) -> Result<CompressedFrame, CompressionError> {
        compress(raw, self.level, self.method)
    }
}

/// 128-bit fingerprint used as the frame checksum.
pub fn fingerprint(data: &[u8]) -> u128 {
    // Low half on the wire is CityHash's first word.
    cityhash_rs::cityhash_102_128(data).rotate_left(64)
}

/// A complete frame: checksum, header and payload in one owned buffer.
#[derive(Debug, PartialEq, Eq)]
pub struct CompressedFrame {
    bytes: Vec<u8>,
}

impl CompressedFrame {
    /// Wraps raw frame bytes after checking that the header fits and the
    /// advertised compressed size matches the buffer.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, CompressionError> {
        if bytes.len() < CHECKSUM_SIZE + HEADER_SIZE {
            return Err(CompressionError::FrameTooShort(bytes.len()));
        }
        let frame = Self { bytes };
        if frame.compressed_size() < HEADER_SIZE
            || frame.compressed_size() != frame.bytes.len() - CHECKSUM_SIZE
        {
            return Err(CompressionError::FrameTooShort(frame.bytes.len()));
        }
        Ok(frame)
    }

    pub fn checksum(&self) -> u128 {
        let mut raw = [0; CHECKSUM_SIZE];
        raw.copy_from_slice(&self.bytes[..CHECKSUM_SIZE]);
        u128::from_le_bytes(raw)
    }

    pub fn method_byte(&self) -> u8 {
        self.bytes[CHECKSUM_SIZE]
    }

    /// Header plus payload length, as written in the header.
    pub fn compressed_size(&self) -> usize {
        self.header_u32(CHECKSUM_SIZE + 1) as usize
    }

    pub fn decompressed_size(&self) -> usize {
        self.header_u32(CHECKSUM_SIZE + 5) as usize
    }

    pub fn payload(&self) -> &[u8] {
        &self.bytes[CHECKSUM_SIZE + HEADER_SIZE..]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Recomputes the fingerprint over method byte through payload end.
    pub fn verify(&self) -> Result<(), CompressionError> {
        let expected = self.checksum();
        let actual = fingerprint(&self.bytes[CHECKSUM_SIZE..]);
        if expected != actual {
            return Err(CompressionError::ChecksumMismatch { expected, actual });
        }
        Ok(())
    }

    fn header_u32(&self, at: usize) -> u32 {
        let mut raw = [0; 4];
        raw.copy_from_slice(&self.bytes[at..at + 4]);
        u32::from_le_bytes(raw)
    }
}

/// Compresses `raw` into a checksummed frame.
///
/// `level` only affects ZSTD.
pub fn compress(raw: &[u8], level: i32, method: CompressionMethod) -> Result<CompressedFrame, CompressionError> {
    let decompressed_size = u32::try_from(raw.len())
        .map_err(|_| CompressionError::CompressionFailed(format!("{} bytes exceed frame limit", raw.len())))?;
    let start = CHECKSUM_SIZE + HEADER_SIZE;
    let mut bytes = vec![0u8; start + method.bound(raw.len())];

    let written = match method {
        CompressionMethod::Lz4 => lz4_compress(raw, CompressionMode::DEFAULT, &mut bytes[start..])?,
        CompressionMethod::Lz4Hc => {
            lz4_compress(raw, CompressionMode::HIGHCOMPRESSION(LZ4_HC_LEVEL), &mut bytes[start..])?
        }
        CompressionMethod::Zstd => zstd::bulk::compress_to_buffer(raw, &mut bytes[start..], level)
            .map_err(|e| CompressionError::CompressionFailed(e.to_string()))?,
        CompressionMethod::None => {
            bytes[start..].copy_from_slice(raw);
            raw.len()
        }
    };
    bytes.truncate(start + written);

    let compressed_size = (HEADER_SIZE + written) as u32;
    bytes[CHECKSUM_SIZE] = method.method_byte();
    bytes[CHECKSUM_SIZE + 1..CHECKSUM_SIZE + 5].copy_from_slice(&compressed_size.to_le_bytes());
    bytes[CHECKSUM_SIZE + 5..start].copy_from_slice(&decompressed_size.to_le_bytes());

    let checksum = fingerprint(&bytes[CHECKSUM_SIZE..]);
    bytes[..CHECKSUM_SIZE].copy_from_slice(&checksum.to_le_bytes());

    trace!(
        "compressed {} bytes into {} with {method}",
        raw.len(),
        compressed_size
    );
    Ok(CompressedFrame { bytes })
}

/// Verifies and unpacks a frame.
///
/// A checksum mismatch or a short decompression is fatal: the stream cannot be
/// resynchronised once its contents are in doubt.
pub fn decompress(frame: &CompressedFrame) -> Result<Vec<u8>, CompressionError> {
    frame.verify()?;
    let method = CompressionMethod::from_method_byte(frame.method_byte())?;
    let size = frame.decompressed_size();
    let payload = frame.payload();
    let mut out = vec![0u8; size];

    let produced = match method {
        CompressionMethod::None => {
            if payload.len() != size {
                return Err(CompressionError::DecompressionFailed(format!(
                    "stored payload is {} bytes, header says {size}",
                    payload.len()
                )));
            }
            out.copy_from_slice(payload);
            size
        }
        _ if size == 0 => 0,
        CompressionMethod::Lz4 | CompressionMethod::Lz4Hc => {
            let expected = i32::try_from(size)
                .map_err(|_| CompressionError::DecompressionFailed(format!("{size} bytes exceed lz4 limit")))?;
            lz4::block::decompress_to_buffer(payload, Some(expected), &mut out)
                .map_err(|e| CompressionError::DecompressionFailed(e.to_string()))?
        }
        CompressionMethod::Zstd => zstd::bulk::decompress_to_buffer(payload, &mut out)
            .map_err(|e| CompressionError::DecompressionFailed(e.to_string()))?,
    };

    if produced != size {
        return Err(CompressionError::DecompressionFailed(format!(
            "produced {produced} of {size} bytes"
        )));
    }
    Ok(out)
}

fn lz4_compress(raw: &[u8], mode: CompressionMode, out: &mut [u8]) -> Result<usize, CompressionError> {
    if raw.len() > LZ4_MAX_INPUT_SIZE {
        return Err(CompressionError::CompressionFailed(format!(
            "{} bytes exceed lz4 input limit",
            raw.len()
        )));
    }
    lz4::block::compress_to_buffer(raw, Some(mode), false, out)
        .map_err(|e| CompressionError::CompressionFailed(e.to_string()))
}
