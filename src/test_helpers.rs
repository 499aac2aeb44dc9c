//! In-memory transport and a scripted server for exercising a whole
//! connection without a network.
use std::{
    collections::VecDeque,
    io::{self, Read, Write},
    sync::{
        Arc, Condvar, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use crate::{
    ClientError, Transport,
    protocol::{
        Block, CodecError, CompressionMethod, ServerException,
        compression::compress,
        message::{CLIENT_REVISION, client_tag, read_compressed_block, server_tag},
        settings::NETWORK_ZSTD_COMPRESSION_LEVEL,
        varint,
        wire::{WireReader, write_string},
    },
};

#[derive(Default)]
struct PipeState {
    data: VecDeque<u8>,
    closed: bool,
}

/// Unbounded one-way byte pipe.
#[derive(Clone, Default)]
pub struct Pipe(Arc<(Mutex<PipeState>, Condvar)>);

impl Pipe {
    fn push(&self, buf: &[u8]) -> io::Result<usize> {
        let (state, ready) = &*self.0;
        let mut state = state.lock().unwrap();
        if state.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"));
        }
        state.data.extend(buf);
        ready.notify_all();
        Ok(buf.len())
    }

    fn pull(&self, buf: &mut [u8]) -> io::Result<usize> {
        let (state, ready) = &*self.0;
        let mut state = state.lock().unwrap();
        while state.data.is_empty() && !state.closed {
            state = ready.wait(state).unwrap();
        }
        let n = buf.len().min(state.data.len());
        for (slot, byte) in buf.iter_mut().zip(state.data.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    pub fn close(&self) {
        let (state, ready) = &*self.0;
        state.lock().unwrap().closed = true;
        ready.notify_all();
    }
}

pub struct PipeReader(Pipe);

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.pull(buf)
    }
}

/// Client end of [`duplex`].
pub struct MemoryTransport {
    outgoing: Pipe,
    incoming: Pipe,
    writable: Arc<AtomicBool>,
}

impl Write for MemoryTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.outgoing.push(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Transport for MemoryTransport {
    type Reader = PipeReader;

    fn try_clone_reader(&self) -> io::Result<Self::Reader> {
        Ok(PipeReader(self.incoming.clone()))
    }

    fn is_writable(&self) -> bool {
        self.writable.load(Ordering::SeqCst)
    }

    fn close(&mut self) -> io::Result<()> {
        self.outgoing.close();
        self.incoming.close();
        Ok(())
    }
}

/// A connected transport/server pair, plus the transport's writability flag.
pub fn duplex() -> (MemoryTransport, FakeServer, Arc<AtomicBool>) {
    let to_server = Pipe::default();
    let to_client = Pipe::default();
    let writable = Arc::new(AtomicBool::new(true));

    let transport = MemoryTransport {
        outgoing: to_server.clone(),
        incoming: to_client.clone(),
        writable: Arc::clone(&writable),
    };
    let server = FakeServer {
        input: PipeReader(to_server),
        output: to_client,
        buf: Vec::new(),
        compressed: false,
    };
    (transport, server, writable)
}

#[derive(Debug)]
pub enum ClientMessage {
    Hello {
        client_name: String,
        revision: u64,
        database: String,
        username: String,
        password: String,
    },
    Query {
        query_id: String,
        settings: Vec<(String, String)>,
        compression: bool,
        query: String,
    },
    Data(Block),
}

/// Server side of [`duplex`]. Announces [`CLIENT_REVISION`] with timezone
/// `UTC`, and panics on anything it cannot parse.
pub struct FakeServer {
    input: PipeReader,
    output: Pipe,
    buf: Vec<u8>,
    compressed: bool,
}

impl FakeServer {
    /// Whether the client asked for compressed data blocks.
    pub fn compressed(&self) -> bool {
        self.compressed
    }

    pub fn next_message(&mut self) -> ClientMessage {
        loop {
            let mut reader = WireReader::new(&self.buf);
            match self.decode(&mut reader) {
                Ok(message) => {
                    let consumed = reader.position();
                    self.buf.drain(..consumed);
                    if let ClientMessage::Query { compression, .. } = &message {
                        self.compressed = *compression;
                    }
                    return message;
                }
                Err(ClientError::Protocol(CodecError::Truncated)) => {}
                Err(e) => panic!("bad client message: {e}"),
            }

            let mut chunk = [0u8; 64 * 1024];
            let n = self.input.read(&mut chunk).unwrap();
            assert!(n > 0, "client closed the connection");
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }

    fn decode(&self, reader: &mut WireReader<'_>) -> Result<ClientMessage, ClientError> {
        match reader.read_varint()? {
            client_tag::HELLO => Ok(ClientMessage::Hello {
                client_name: reader.read_string()?,
                revision: {
                    reader.read_varint()?;
                    reader.read_varint()?;
                    reader.read_varint()?
                },
                database: reader.read_string()?,
                username: reader.read_string()?,
                password: reader.read_string()?,
            }),
            client_tag::QUERY => {
                let query_id = reader.read_string()?;
                // Client info, as sent at the revision this server announces.
                reader.read_u8()?;
                for _ in 0..3 {
                    reader.read_string()?;
                }
                reader.read_u8()?;
                for _ in 0..3 {
                    reader.read_string()?;
                }
                for _ in 0..3 {
                    reader.read_varint()?;
                }
                reader.read_string()?;
                let mut settings = Vec::new();
                loop {
                    let name = reader.read_string()?;
                    if name.is_empty() {
                        break;
                    }
                    let value = if name == NETWORK_ZSTD_COMPRESSION_LEVEL {
                        reader.read_varint()?.to_string()
                    } else {
                        reader.read_string()?
                    };
                    settings.push((name, value));
                }
                reader.read_varint()?;
                Ok(ClientMessage::Query {
                    query_id,
                    settings,
                    compression: reader.read_bool()?,
                    query: reader.read_string()?,
                })
            }
            client_tag::DATA => {
                reader.read_string()?;
                let compressed = self.compressed;
                let block = if compressed {
                    read_compressed_block(reader)?
                } else {
                    Block::read(reader)?
                };
                Ok(ClientMessage::Data(block))
            }
            other => Err(CodecError::UnknownMessage(other).into()),
        }
    }

    pub fn send_hello(&mut self) {
        let mut out = Vec::new();
        varint::write_u64(&mut out, server_tag::HELLO);
        write_string(&mut out, "FakeHouse");
        varint::write_u64(&mut out, 18);
        varint::write_u64(&mut out, 14);
        varint::write_u64(&mut out, CLIENT_REVISION);
        write_string(&mut out, "UTC");
        self.send(&out);
    }

    /// Sends a data block, compressed when the client asked for it.
    pub fn send_block(&mut self, block: &Block) {
        let mut out = Vec::new();
        varint::write_u64(&mut out, server_tag::DATA);
        write_string(&mut out, "");
        let mut raw = Vec::new();
        block.write(&mut raw);
        if self.compressed {
            let frame = compress(&raw, 1, CompressionMethod::Lz4).unwrap();
            out.extend_from_slice(frame.as_bytes());
        } else {
            out.extend_from_slice(&raw);
        }
        self.send(&out);
    }

    pub fn send_exception(&mut self, exception: &ServerException) {
        let mut out = Vec::new();
        exception.write(&mut out);
        self.send(&out);
    }

    pub fn send_end_of_stream(&mut self) {
        let mut out = Vec::new();
        varint::write_u64(&mut out, server_tag::END_OF_STREAM);
        self.send(&out);
    }

    /// Closes both directions, as a crashed server would.
    pub fn hang_up(&mut self) {
        self.output.close();
        self.input.0.close();
    }

    fn send(&mut self, bytes: &[u8]) {
        self.output.push(bytes).unwrap();
    }
}
