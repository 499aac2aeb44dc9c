//! Message framing for both directions.
//!
//! Client messages are encoded straight into an output buffer. Server messages
//! are decoded by [`MessageDecoder`], which is resumable: when the bytes seen so
//! far end mid-message it reports [`DecodeResult::NeedMore`] and the caller
//! retries once more input has arrived.
use std::{env, sync::LazyLock};

use log::trace;
use thiserror::Error;

use crate::{ClientConfig, ClientError};

use super::{
    CodecError,
    block::Block,
    compression::{CHECKSUM_SIZE, CompressedFrame, Compression, decompress},
    settings::Settings,
    varint,
    wire::{WireReader, write_string},
};

pub const CLIENT_NAME: &str = "blockwire";
pub const CLIENT_VERSION_MAJOR: u64 = 1;
pub const CLIENT_VERSION_MINOR: u64 = 1;
pub const CLIENT_REVISION: u64 = 54327;

/// First protocol revisions that carry optional fields.
pub mod revision {
    pub const WITH_CLIENT_INFO: u64 = 54032;
    pub const WITH_SERVER_TIMEZONE: u64 = 54058;
    pub const WITH_QUOTA_KEY_IN_CLIENT_INFO: u64 = 54060;
}

/// Tags of messages the client sends.
pub mod client_tag {
    pub const HELLO: u64 = 0x00;
    pub const QUERY: u64 = 0x01;
    pub const DATA: u64 = 0x02;
}

/// Tags of messages the server sends.
pub mod server_tag {
    pub const HELLO: u64 = 0x00;
    pub const DATA: u64 = 0x01;
    pub const EXCEPTION: u64 = 0x02;
    pub const END_OF_STREAM: u64 = 0x05;
}

const QUERY_KIND_INITIAL: u8 = 1;
const INTERFACE_TCP: u8 = 1;
const STAGE_COMPLETE: u64 = 2;
const INITIAL_ADDRESS: &str = "0.0.0.0:0";

/// Client info up to and including the client hostname. Identical for every
/// query a process sends, so it is built once.
static CLIENT_INFO_PREFIX: LazyLock<Vec<u8>> = LazyLock::new(|| {
    let os_user = env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .unwrap_or_default();
    let hostname = env::var("HOSTNAME").unwrap_or_else(|_| "undetermined".to_string());

    let mut out = Vec::new();
    out.push(QUERY_KIND_INITIAL);
    write_string(&mut out, ""); // initial user
    write_string(&mut out, ""); // initial query id
    write_string(&mut out, INITIAL_ADDRESS);
    out.push(INTERFACE_TCP);
    write_string(&mut out, &os_user);
    write_string(&mut out, &hostname);
    out
});

pub fn encode_hello(config: &ClientConfig, out: &mut Vec<u8>) {
    varint::write_u64(out, client_tag::HELLO);
    write_string(out, &config.client_name);
    varint::write_u64(out, CLIENT_VERSION_MAJOR);
    varint::write_u64(out, CLIENT_VERSION_MINOR);
    varint::write_u64(out, CLIENT_REVISION);
    write_string(out, &config.database);
    write_string(out, &config.username);
    write_string(out, &config.password);
}

/// Encodes a query message. `revision` is the negotiated protocol revision.
pub fn encode_query(config: &ClientConfig, query: &str, settings: &Settings, revision: u64, out: &mut Vec<u8>) {
    varint::write_u64(out, client_tag::QUERY);
    write_string(out, &config.query_id);

    if revision >= revision::WITH_CLIENT_INFO {
        out.extend_from_slice(&CLIENT_INFO_PREFIX);
        write_string(out, &config.client_name);
        varint::write_u64(out, CLIENT_VERSION_MAJOR);
        varint::write_u64(out, CLIENT_VERSION_MINOR);
        varint::write_u64(out, CLIENT_REVISION);
        if revision >= revision::WITH_QUOTA_KEY_IN_CLIENT_INFO {
            write_string(out, ""); // quota key
        }
    }

    settings.write(out);
    write_string(out, "");

    varint::write_u64(out, STAGE_COMPLETE);
    varint::write_bool(out, settings.compression_method().is_some());
    write_string(out, query);
}

/// Encodes a data message for the main stream, compressing the block body when
/// `compression` is set.
pub fn encode_data(block: &Block, compression: Option<Compression>, out: &mut Vec<u8>) -> Result<(), ClientError> {
    varint::write_u64(out, client_tag::DATA);
    write_string(out, "");

    match compression {
        None => block.write(out),
        Some(compression) => {
            let mut raw = Vec::new();
            block.write(&mut raw);
            let frame = compression.compress(&raw)?;
            out.extend_from_slice(frame.as_bytes());
        }
    }
    Ok(())
}

/// Server identity from the handshake reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub name: String,
    pub version_major: u64,
    pub version_minor: u64,
    pub revision: u64,
    pub timezone: Option<String>,
}

impl ServerInfo {
    pub fn negotiated_revision(&self) -> u64 {
        self.revision.min(CLIENT_REVISION)
    }

    fn read(reader: &mut WireReader<'_>) -> Result<Self, CodecError> {
        let name = reader.read_string()?;
        let version_major = reader.read_varint()?;
        let version_minor = reader.read_varint()?;
        let revision = reader.read_varint()?;

        let mut info = Self {
            name,
            version_major,
            version_minor,
            revision,
            timezone: None,
        };
        if info.negotiated_revision() >= revision::WITH_SERVER_TIMEZONE {
            info.timezone = Some(reader.read_string()?);
        }
        Ok(info)
    }
}

/// Error reported by the server, with an optional chain of nested causes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{name}, code [{code}], message: {message}")]
pub struct ServerException {
    pub code: i32,
    pub name: String,
    pub message: String,
    pub stack_trace: String,
    #[source]
    pub nested: Option<Box<ServerException>>,
}

impl ServerException {
    fn read(reader: &mut WireReader<'_>) -> Result<Self, CodecError> {
        let code = reader.read_i32_le()?;
        let name = reader.read_string()?;
        let message = reader.read_string()?;
        let stack_trace = reader.read_string()?;
        let nested = if reader.read_bool()? {
            Some(Box::new(Self::read(reader)?))
        } else {
            None
        };

        Ok(Self {
            code,
            name,
            message,
            stack_trace,
            nested,
        })
    }

    /// Appends this exception in server wire format, tag included.
    pub fn write(&self, out: &mut Vec<u8>) {
        varint::write_u64(out, server_tag::EXCEPTION);
        self.write_body(out);
    }

    fn write_body(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.code.to_le_bytes());
        write_string(out, &self.name);
        write_string(out, &self.message);
        write_string(out, &self.stack_trace);
        varint::write_bool(out, self.nested.is_some());
        if let Some(nested) = &self.nested {
            nested.write_body(out);
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum ServerMessage {
    Hello(ServerInfo),
    Data(Block),
    Exception(ServerException),
    EndOfStream,
}

impl ServerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Hello(_) => "Hello",
            ServerMessage::Data(_) => "Data",
            ServerMessage::Exception(_) => "Exception",
            ServerMessage::EndOfStream => "EndOfStream",
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum DecodeResult<T> {
    /// A full message, and how many bytes of the input it used.
    Frame { frame: T, consumed: usize },
    /// The input ends mid-message; keep it and retry with more bytes.
    NeedMore,
}

/// Resumable decoder for server messages.
#[derive(Debug, Default)]
pub struct MessageDecoder {
    compressed: bool,
}

impl MessageDecoder {
    /// `compressed` tells whether the server wraps data blocks in compressed frames.
    pub fn new(compressed: bool) -> Self {
        Self { compressed }
    }

    /// Attempts to decode one message from the start of `buf`.
    ///
    /// The buffer is never modified. Only an input that ends early yields
    /// `NeedMore`; any other failure is fatal.
    pub fn decode(&mut self, buf: &[u8]) -> Result<DecodeResult<ServerMessage>, ClientError> {
        let mut reader = WireReader::new(buf);
        match self.read_message(&mut reader) {
            Ok(frame) => {
                trace!("decoded server {} ({} bytes)", frame.kind(), reader.position());
                Ok(DecodeResult::Frame {
                    frame,
                    consumed: reader.position(),
                })
            }
            Err(ClientError::Protocol(CodecError::Truncated)) => Ok(DecodeResult::NeedMore),
            Err(e) => Err(e),
        }
    }

    fn read_message(&self, reader: &mut WireReader<'_>) -> Result<ServerMessage, ClientError> {
        Ok(match reader.read_varint()? {
            server_tag::HELLO => ServerMessage::Hello(ServerInfo::read(reader)?),
            server_tag::DATA => {
                let _table = reader.read_string()?;
                let block = if self.compressed {
                    read_compressed_block(reader)?
                } else {
                    Block::read(reader)?
                };
                ServerMessage::Data(block)
            }
            server_tag::EXCEPTION => ServerMessage::Exception(ServerException::read(reader)?),
            server_tag::END_OF_STREAM => ServerMessage::EndOfStream,
            other => return Err(CodecError::UnknownMessage(other).into()),
        })
    }
}

pub(crate) fn read_compressed_block(reader: &mut WireReader<'_>) -> Result<Block, ClientError> {
    let mut header = reader.clone();
    header.skip(CHECKSUM_SIZE + 1)?;
    let compressed_size = header.read_u32_le()? as usize;

    let bytes = reader.read_bytes(CHECKSUM_SIZE + compressed_size)?;
    let frame = CompressedFrame::from_bytes(bytes.to_vec())?;
    let raw = decompress(&frame)?;

    // Running out of bytes inside a complete frame is corruption, not a short read.
    let mut inner = WireReader::new(&raw);
    let block = Block::read(&mut inner).map_err(|e| match e {
        CodecError::Truncated => CodecError::TruncatedPayload,
        other => other,
    })?;
    if inner.remaining() > 0 {
        return Err(CodecError::TrailingBytes(inner.remaining()).into());
    }
    Ok(block)
}
