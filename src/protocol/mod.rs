//! Native wire protocol.
//!
//! This module defines the binary protocol spoken between the client and the
//! database server: primitive encodings, column layouts, block framing, message
//! framing, and the optional compression envelope around data blocks. It also
//! provides the transport abstraction the connection writes through.
//!
//! # Overview
//!
//! Every message starts with a varint tag. The tag spaces are different per
//! direction and must not be unified:
//!
//! | direction       | Hello | Query | Data | Exception | EndOfStream |
//! |-----------------|-------|-------|------|-----------|-------------|
//! | client → server | 0x00  | 0x01  | 0x02 | -         | -           |
//! | server → client | 0x00  | -     | 0x01 | 0x02      | 0x05        |
//!
//! Optional message fields are gated on the protocol revision negotiated during
//! the handshake (the lower of the client's and the server's revision).
//!
//! # Binary Format
//!
//! - Lengths, counts and tags are unsigned LEB128 varints ([`varint`]).
//! - Fixed-width integers are little-endian.
//! - Strings are a varint byte length followed by UTF-8 bytes.
//! - A data block is block info, column count, row count, then for every column
//!   its name, its type name and (when there are rows) its raw value bytes.
//! - With compression enabled, the block body of a data message is wrapped in a
//!   checksummed [`CompressedFrame`].
//!
//! # Key Components
//!
//! - [`Block`]: column-oriented batch of rows, the unit of transfer.
//! - [`MessageDecoder`]: resumable decoder for server messages.
//! - [`ProtocolTransport`]: outbound message writer over a [`Transport`].
//!
//! # See Also
//!
//! - [`connection`](crate::connection): drives the handshake and the stream.
pub mod block;
pub mod column;
pub mod compression;
pub mod message;
pub mod settings;
mod transport;
pub mod varint;
pub mod wire;

use thiserror::Error;

pub use block::{Block, BlockInfo, Schema};
pub use column::{Column, ColumnType, Row, Value};
pub use compression::{CompressedFrame, Compression, CompressionError, CompressionMethod};
pub use message::{DecodeResult, MessageDecoder, ServerException, ServerInfo, ServerMessage};
pub use settings::{SettingValue, Settings};
pub use transport::{InboundReader, ProtocolTransport, Transport};

/// Malformed or unsupported wire content. Always fatal for the connection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("input ended in the middle of a value")]
    Truncated,
    #[error("varint does not fit the target integer")]
    VarintOverflow,
    #[error("unsupported column type '{0}'")]
    UnsupportedColumnType(String),
    #[error("unknown message tag {0:#04x}")]
    UnknownMessage(u64),
    #[error("unknown block info field {0}")]
    UnknownBlockInfoField(u64),
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
    #[error("value of type {found} written to {expected} column")]
    ValueMismatch { expected: ColumnType, found: ColumnType },
    #[error("row has {found} fields, block has {expected} columns")]
    RowWidth { expected: usize, found: usize },
    #[error("unknown compression method byte {0:#04x}")]
    UnknownCompressionMethod(u8),
    #[error("decompressed block ends early")]
    TruncatedPayload,
    #[error("{0} unexpected bytes after decompressed block")]
    TrailingBytes(usize),
}
