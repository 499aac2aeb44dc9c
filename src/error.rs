use std::io;

use thiserror::Error;

use crate::{
    connection::ConnectionState,
    pipeline::FlowError,
    protocol::{CodecError, CompressionError, ServerException},
    thread::PoolShutdown,
};

/// Terminal error of a connection. Every variant ends the stream and closes
/// the transport; nothing is retried internally.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("[protocol] {0}")]
    Protocol(#[from] CodecError),
    #[error("[corrupted stream] {0}")]
    CorruptedStream(CompressionError),
    #[error("[server] {0}")]
    Server(#[from] ServerException),
    #[error("[transport] {0}")]
    Transport(#[from] io::Error),
    #[error("[flow control] {0}")]
    FlowControl(#[from] FlowError),
    #[error("[protocol] unexpected {event} in state {state:?}")]
    UnexpectedState {
        state: ConnectionState,
        event: &'static str,
    },
    #[error("[row source] {0}")]
    Source(String),
    #[error("[compression pool] {0}")]
    Pool(#[from] PoolShutdown),
}

impl From<CompressionError> for ClientError {
    fn from(err: CompressionError) -> Self {
        match err {
            // An unknown method is a protocol mismatch, not damaged bytes.
            CompressionError::UnknownMethod(byte) => ClientError::Protocol(CodecError::UnknownCompressionMethod(byte)),
            other => ClientError::CorruptedStream(other),
        }
    }
}
