use std::{
    io::{self, ErrorKind, Read, Write},
    net::{Shutdown, TcpStream},
};

use log::trace;

use crate::{ClientConfig, ClientError};

use super::{
    block::Block,
    compression::Compression,
    message::{self, DecodeResult, MessageDecoder, ServerMessage},
    settings::Settings,
};

const READ_CHUNK: usize = 64 * 1024;

/// Reliable, ordered byte stream to the server.
///
/// The write half stays with the connection; the read half is handed to a
/// reader thread.
pub trait Transport: Write {
    type Reader: Read + Send + 'static;

    fn try_clone_reader(&self) -> io::Result<Self::Reader>;

    /// Advisory: writes issued while unwritable still succeed but may block.
    fn is_writable(&self) -> bool {
        true
    }

    /// Closes both directions. The reader sees end of stream.
    fn close(&mut self) -> io::Result<()>;
}

impl Transport for TcpStream {
    type Reader = TcpStream;

    fn try_clone_reader(&self) -> io::Result<Self::Reader> {
        self.try_clone()
    }

    fn close(&mut self) -> io::Result<()> {
        match self.shutdown(Shutdown::Both) {
            Err(e) if e.kind() == ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

/// Encodes client messages onto a [`Transport`].
pub struct ProtocolTransport<T: Transport> {
    stream: T,
    buf: Vec<u8>,
}

impl<T: Transport> ProtocolTransport<T> {
    pub fn new(stream: T) -> Self {
        Self {
            stream,
            buf: Vec::new(),
        }
    }

    pub fn send_hello(&mut self, config: &ClientConfig) -> Result<(), ClientError> {
        self.buf.clear();
        message::encode_hello(config, &mut self.buf);
        self.write_buf()
    }

    pub fn send_query(
        &mut self,
        config: &ClientConfig,
        query: &str,
        settings: &Settings,
        revision: u64,
    ) -> Result<(), ClientError> {
        self.buf.clear();
        message::encode_query(config, query, settings, revision, &mut self.buf);
        self.write_buf()
    }

    pub fn send_block(&mut self, block: &Block, compression: Option<Compression>) -> Result<(), ClientError> {
        self.buf.clear();
        message::encode_data(block, compression, &mut self.buf)?;
        self.write_buf()
    }

    /// Writes an already encoded message.
    pub fn write_frame(&mut self, frame: &[u8]) -> Result<(), ClientError> {
        self.stream.write_all(frame)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), ClientError> {
        self.stream.flush()?;
        Ok(())
    }

    pub fn is_writable(&self) -> bool {
        self.stream.is_writable()
    }

    pub fn reader(&self) -> Result<T::Reader, ClientError> {
        Ok(self.stream.try_clone_reader()?)
    }

    pub fn close(&mut self) -> Result<(), ClientError> {
        self.stream.close()?;
        Ok(())
    }

    fn write_buf(&mut self) -> Result<(), ClientError> {
        trace!("writing {} bytes", self.buf.len());
        self.stream.write_all(&self.buf)?;
        Ok(())
    }
}

/// Turns the read half of a transport into a sequence of server messages.
pub struct InboundReader<R: Read> {
    reader: R,
    decoder: MessageDecoder,
    buf: Vec<u8>,
    chunk: Vec<u8>,
}

impl<R: Read> InboundReader<R> {
    pub fn new(reader: R, decoder: MessageDecoder) -> Self {
        Self {
            reader,
            decoder,
            buf: Vec::new(),
            chunk: vec![0; READ_CHUNK],
        }
    }

    /// Blocks until a full message has arrived.
    ///
    /// End of stream in the middle of a message, or before one starts, is a
    /// transport error.
    pub fn next_message(&mut self) -> Result<ServerMessage, ClientError> {
        loop {
            if !self.buf.is_empty() {
                if let DecodeResult::Frame { frame, consumed } = self.decoder.decode(&self.buf)? {
                    self.buf.drain(..consumed);
                    return Ok(frame);
                }
            }

            let n = match self.reader.read(&mut self.chunk) {
                Ok(0) => {
                    return Err(io::Error::new(ErrorKind::UnexpectedEof, "server closed the connection").into());
                }
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            self.buf.extend_from_slice(&self.chunk[..n]);
        }
    }
}
