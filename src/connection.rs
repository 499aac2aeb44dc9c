//! Connection state machine and event loop.
//!
//! A connection runs one insert. All state changes and all transport writes
//! happen on the caller's thread, inside [`Connection::insert`]. Everything
//! else reports back to that thread through a single event channel:
//!
//! - a reader thread decodes server messages (decompressing data blocks),
//! - a producer thread assembles rows into blocks,
//! - a worker pool compresses outbound blocks,
//! - a [`WritabilityNotifier`] relays transport writability changes.
use std::{
    collections::BTreeMap,
    io::{self, Read},
    sync::mpsc::{self, Receiver, Sender},
    thread,
};

use log::{debug, info, warn};

use crate::{
    ClientConfig, ClientError,
    pipeline::{BlockAssembler, BlockSink, BlockTransmitter, RowSource, Signal, WriteStatus, spawn_producer},
    protocol::{
        Block, Compression, InboundReader, MessageDecoder, ProtocolTransport, ServerInfo, ServerMessage, Settings,
        Transport, message::encode_data,
    },
    thread::ThreadPool,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
    ServerInfoReceived,
    StreamingSample,
    Streaming,
    Completed,
    Errored,
}

/// Inputs to [`ConnectionState::transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    /// Transport handed over and Hello sent.
    Connect,
    ServerHello,
    /// First data block from the server, carrying the table schema.
    SampleBlock,
    /// Assembler and transmitter are running.
    StreamStarted,
    /// Every block, sentinel included, is on the wire.
    StreamFinished,
    /// Server acknowledged the insert.
    EndOfStream,
    Failure,
}

impl Input {
    pub fn name(self) -> &'static str {
        match self {
            Input::Connect => "Connect",
            Input::ServerHello => "Hello",
            Input::SampleBlock => "Data",
            Input::StreamStarted => "StreamStarted",
            Input::StreamFinished => "StreamFinished",
            Input::EndOfStream => "EndOfStream",
            Input::Failure => "Failure",
        }
    }
}

impl ConnectionState {
    /// The only way a connection changes state. Any input the current state
    /// does not expect is an [`ClientError::UnexpectedState`].
    pub fn transition(self, input: Input) -> Result<ConnectionState, ClientError> {
        use ConnectionState::*;

        let next = match (self, input) {
            (_, Input::Failure) => Errored,
            (Disconnected, Input::Connect) => Connected,
            (Connected, Input::ServerHello) => ServerInfoReceived,
            (ServerInfoReceived, Input::SampleBlock) => StreamingSample,
            (StreamingSample, Input::StreamStarted) => Streaming,
            (Streaming, Input::StreamFinished) => Completed,
            (Completed, Input::EndOfStream) => Completed,
            (state, input) => {
                return Err(ClientError::UnexpectedState {
                    state,
                    event: input.name(),
                });
            }
        };
        Ok(next)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Completed | ConnectionState::Errored)
    }
}

/// Result of a successful insert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertSummary {
    pub rows: u64,
    /// Data blocks, excluding the closing empty block.
    pub blocks: u64,
}

enum Event {
    Inbound(Result<ServerMessage, ClientError>),
    Upstream(Signal<Block>),
    Compressed {
        seq: u64,
        frame: Result<Vec<u8>, ClientError>,
    },
    Writable(bool),
}

impl From<Signal<Block>> for Event {
    fn from(signal: Signal<Block>) -> Self {
        Event::Upstream(signal)
    }
}

/// Lets the transport's owner report writability changes to a connection
/// from any thread.
#[derive(Clone)]
pub struct WritabilityNotifier {
    events: Sender<Event>,
}

impl WritabilityNotifier {
    /// Returns false once the connection is gone.
    pub fn notify(&self, writable: bool) -> bool {
        self.events.send(Event::Writable(writable)).is_ok()
    }
}

pub struct Connection<T: Transport> {
    transport: ProtocolTransport<T>,
    config: ClientConfig,
    state: ConnectionState,
    server: Option<ServerInfo>,
    events: Sender<Event>,
    inbox: Receiver<Event>,
}

impl<T: Transport> Connection<T> {
    pub fn new(transport: T, config: ClientConfig) -> Self {
        let (events, inbox) = mpsc::channel();
        Self {
            transport: ProtocolTransport::new(transport),
            config,
            state: ConnectionState::Disconnected,
            server: None,
            events,
            inbox,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Known once the handshake has completed.
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server.as_ref()
    }

    pub fn writability_notifier(&self) -> WritabilityNotifier {
        WritabilityNotifier {
            events: self.events.clone(),
        }
    }

    /// Runs `query` (an `INSERT ... VALUES` statement) and streams every row of
    /// `source` as its data.
    ///
    /// Returns once the server has acknowledged the insert. On any error the
    /// source is cancelled, buffered blocks are dropped, and the transport is
    /// closed.
    pub fn insert<S: RowSource>(
        &mut self,
        query: &str,
        settings: &Settings,
        source: S,
    ) -> Result<InsertSummary, ClientError> {
        let Connection {
            transport,
            config,
            state,
            server,
            events,
            inbox,
        } = self;

        let settings = settings.clone();
        let compression = settings.compression_method().map(|method| Compression {
            method,
            level: settings.compression_level(),
        });
        let pool = compression.map(|_| ThreadPool::new(config.compression_workers.max(1)));

        let mut task = InsertTask {
            config,
            query,
            settings,
            state,
            server,
            inbox,
            events: events.clone(),
            compression,
            outbound: Outbound {
                transport,
                compression,
                pool,
                events: events.clone(),
                next_seq: 0,
                next_write: 0,
                ready: BTreeMap::new(),
            },
            transmitter: BlockTransmitter::new(),
            source: Some(source),
        };

        match task.run() {
            Ok(summary) => {
                info!("insert acknowledged: {} rows in {} blocks", summary.rows, summary.blocks);
                if let Err(e) = task.outbound.transport.close() {
                    warn!("failed to close transport: {e}");
                }
                Ok(summary)
            }
            Err(e) => {
                task.fail(&e);
                Err(e)
            }
        }
    }
}

struct InsertTask<'a, T: Transport, S> {
    config: &'a ClientConfig,
    query: &'a str,
    settings: Settings,
    state: &'a mut ConnectionState,
    server: &'a mut Option<ServerInfo>,
    inbox: &'a Receiver<Event>,
    events: Sender<Event>,
    compression: Option<Compression>,
    outbound: Outbound<'a, T>,
    transmitter: BlockTransmitter,
    source: Option<S>,
}

impl<T: Transport, S: RowSource> InsertTask<'_, T, S> {
    fn run(&mut self) -> Result<InsertSummary, ClientError> {
        self.advance(Input::Connect)?;
        self.outbound.transport.send_hello(self.config)?;
        self.outbound.transport.flush()?;
        spawn_reader(
            self.outbound.transport.reader()?,
            self.compression.is_some(),
            self.events.clone(),
        );
        info!("hello sent as {}", self.config.client_name);

        loop {
            let event = self
                .inbox
                .recv()
                .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "event channel closed"))?;
            if let Some(summary) = self.handle(event)? {
                return Ok(summary);
            }
        }
    }

    fn handle(&mut self, event: Event) -> Result<Option<InsertSummary>, ClientError> {
        match event {
            Event::Inbound(message) => return self.on_message(message?),
            Event::Upstream(Signal::Next(block)) => self.transmitter.on_next(block, &mut self.outbound)?,
            Event::Upstream(Signal::Complete) => self.transmitter.on_complete(&mut self.outbound)?,
            Event::Upstream(Signal::Error(e)) => return Err(e),
            Event::Compressed { seq, frame } => {
                for _ in 0..self.outbound.on_compressed(seq, frame)? {
                    self.transmitter.on_write_confirmed();
                }
            }
            Event::Writable(writable) => {
                self.transmitter.on_writability_changed(writable, &mut self.outbound)?;
            }
        }

        if *self.state == ConnectionState::Streaming && self.transmitter.is_finished() {
            self.advance(Input::StreamFinished)?;
            info!(
                "sent {} rows in {} blocks, waiting for server",
                self.transmitter.rows_sent(),
                self.transmitter.blocks_sent()
            );
        }
        Ok(None)
    }

    fn on_message(&mut self, message: ServerMessage) -> Result<Option<InsertSummary>, ClientError> {
        match message {
            ServerMessage::Exception(e) => Err(ClientError::Server(e)),
            ServerMessage::Hello(info) => {
                self.advance(Input::ServerHello)?;
                info!(
                    "server {} {}.{} revision {}",
                    info.name, info.version_major, info.version_minor, info.revision
                );
                let revision = info.negotiated_revision();
                *self.server = Some(info);

                let transport = &mut *self.outbound.transport;
                transport.send_query(self.config, self.query, &self.settings, revision)?;
                transport.send_block(&Block::empty(), self.compression)?;
                transport.flush()?;
                Ok(None)
            }
            ServerMessage::Data(sample) => {
                self.advance(Input::SampleBlock)?;
                let schema = sample.schema();
                debug!("sample block: {schema:?}");

                let Some(source) = self.source.take() else {
                    return Err(ClientError::UnexpectedState {
                        state: *self.state,
                        event: "Data",
                    });
                };
                let assembler = BlockAssembler::with_threshold(schema, self.config.block_rows.max(1));
                let subscription = spawn_producer(assembler, source, self.events.clone());
                self.transmitter.on_subscribe(Box::new(subscription))?;
                self.advance(Input::StreamStarted)?;
                Ok(None)
            }
            ServerMessage::EndOfStream => {
                self.advance(Input::EndOfStream)?;
                Ok(Some(InsertSummary {
                    rows: self.transmitter.rows_sent(),
                    blocks: self.transmitter.blocks_sent(),
                }))
            }
        }
    }

    fn advance(&mut self, input: Input) -> Result<(), ClientError> {
        let next = self.state.transition(input)?;
        if next != *self.state {
            debug!("connection {:?} -> {next:?}", *self.state);
        }
        *self.state = next;
        Ok(())
    }

    fn fail(&mut self, err: &ClientError) {
        warn!("insert failed in state {:?}: {err}", *self.state);
        if let Err(e) = self.advance(Input::Failure) {
            debug!("failure not accepted: {e}");
        }
        self.transmitter.cancel();
        if let Some(mut source) = self.source.take() {
            source.cancel();
        }
        if let Err(e) = self.outbound.transport.close() {
            debug!("closing transport after failure: {e}");
        }
    }
}

/// Transport writes for the transmitter. With compression, blocks are
/// compressed on the pool and written back in submission order.
struct Outbound<'a, T: Transport> {
    transport: &'a mut ProtocolTransport<T>,
    compression: Option<Compression>,
    pool: Option<ThreadPool>,
    events: Sender<Event>,
    next_seq: u64,
    next_write: u64,
    ready: BTreeMap<u64, Vec<u8>>,
}

impl<T: Transport> Outbound<'_, T> {
    /// Stores a compressed message and writes every message now in order.
    /// Returns how many were written.
    fn on_compressed(&mut self, seq: u64, frame: Result<Vec<u8>, ClientError>) -> Result<usize, ClientError> {
        self.ready.insert(seq, frame?);

        let mut written = 0;
        while let Some(frame) = self.ready.remove(&self.next_write) {
            self.transport.write_frame(&frame)?;
            self.next_write += 1;
            written += 1;
        }
        if written > 0 {
            self.transport.flush()?;
        }
        Ok(written)
    }
}

impl<T: Transport> BlockSink for Outbound<'_, T> {
    fn is_writable(&self) -> bool {
        self.transport.is_writable()
    }

    fn write(&mut self, block: Block) -> Result<WriteStatus, ClientError> {
        let (Some(pool), Some(compression)) = (&self.pool, self.compression) else {
            self.transport.send_block(&block, None)?;
            return Ok(WriteStatus::Sent);
        };

        let seq = self.next_seq;
        self.next_seq += 1;
        let events = self.events.clone();
        pool.execute(move || {
            let mut out = Vec::new();
            let frame = encode_data(&block, Some(compression), &mut out).map(|()| out);
            drop(block);
            let _ = events.send(Event::Compressed { seq, frame });
        })?;
        Ok(WriteStatus::Pending)
    }

    fn flush(&mut self) -> Result<(), ClientError> {
        self.transport.flush()
    }
}

fn spawn_reader<R: Read + Send + 'static>(reader: R, compressed: bool, events: Sender<Event>) {
    thread::spawn(move || {
        let mut inbound = InboundReader::new(reader, MessageDecoder::new(compressed));
        loop {
            let message = inbound.next_message();
            let stop = message.is_err();
            if events.send(Event::Inbound(message)).is_err() || stop {
                break;
            }
        }
        debug!("reader thread exiting");
    });
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
        time::Duration,
    };

    use crate::{
        pipeline::IterSource,
        protocol::{BlockInfo, Column, ColumnType, CompressionMethod, Row, ServerException, Value},
        test_helpers::{ClientMessage, FakeServer, duplex},
    };

    use super::*;

    fn sample(columns: &[(&str, ColumnType)]) -> Block {
        let columns = columns.iter().map(|(name, t)| Column::new(*name, *t)).collect();
        Block::new(BlockInfo::default(), columns, 0)
    }

    /// Handshake up to and including the client's empty data block. Returns
    /// the query text and its settings.
    fn accept(server: &mut FakeServer) -> (String, Vec<(String, String)>) {
        let ClientMessage::Hello {
            client_name,
            revision,
            database,
            username,
            password,
        } = server.next_message()
        else {
            panic!("expected hello");
        };
        assert_eq!(client_name, "blockwire");
        assert_eq!(revision, 54327);
        assert_eq!((database.as_str(), username.as_str(), password.as_str()), ("default", "default", ""));
        server.send_hello();

        let ClientMessage::Query {
            query_id,
            settings,
            compression: _,
            query,
        } = server.next_message()
        else {
            panic!("expected query");
        };
        assert!(query_id.is_empty());

        let ClientMessage::Data(block) = server.next_message() else {
            panic!("expected empty data block");
        };
        assert!(block.is_empty());
        (query, settings)
    }

    /// Collects data blocks up to the empty one and returns their row counts.
    fn receive_blocks(server: &mut FakeServer) -> Vec<usize> {
        let mut rows = Vec::new();
        loop {
            let ClientMessage::Data(block) = server.next_message() else {
                panic!("expected data block");
            };
            if block.is_empty() {
                return rows;
            }
            rows.push(block.rows());
        }
    }

    #[test]
    fn state_machine_accepts_only_the_expected_input() {
        use ConnectionState::*;

        assert_eq!(Disconnected.transition(Input::Connect).unwrap(), Connected);
        assert_eq!(Connected.transition(Input::ServerHello).unwrap(), ServerInfoReceived);
        assert_eq!(ServerInfoReceived.transition(Input::SampleBlock).unwrap(), StreamingSample);
        assert_eq!(StreamingSample.transition(Input::StreamStarted).unwrap(), Streaming);
        assert_eq!(Streaming.transition(Input::StreamFinished).unwrap(), Completed);
        assert_eq!(Completed.transition(Input::EndOfStream).unwrap(), Completed);

        for input in [Input::ServerHello, Input::SampleBlock, Input::EndOfStream, Input::StreamFinished] {
            assert!(matches!(
                Disconnected.transition(input),
                Err(ClientError::UnexpectedState { state: Disconnected, .. })
            ));
        }
        for input in [Input::Connect, Input::SampleBlock, Input::EndOfStream, Input::StreamStarted] {
            assert!(matches!(
                Connected.transition(input),
                Err(ClientError::UnexpectedState { state: Connected, .. })
            ));
        }
        for state in [Disconnected, Connected, Streaming, Completed, Errored] {
            assert_eq!(state.transition(Input::Failure).unwrap(), Errored);
        }
        assert!(Errored.is_terminal() && Completed.is_terminal());
    }

    #[test]
    fn streams_rows_in_full_and_partial_blocks() {
        let (transport, mut server, _) = duplex();
        let server = thread::spawn(move || {
            let (query, settings) = accept(&mut server);
            assert!(settings.is_empty());
            server.send_block(&sample(&[("value", ColumnType::UInt32)]));
            let rows = receive_blocks(&mut server);
            server.send_end_of_stream();
            (query, rows)
        });

        let mut connection = Connection::new(transport, ClientConfig::default());
        let rows = (0..2_500_000).map(|_| vec![Value::UInt32(1)]);
        let summary = connection
            .insert("INSERT INTO t VALUES", &Settings::new(), IterSource::new(rows))
            .unwrap();

        let (query, blocks) = server.join().unwrap();
        assert_eq!(query, "INSERT INTO t VALUES");
        assert_eq!(blocks, vec![1_048_576, 1_048_576, 402_848]);
        assert_eq!(
            summary,
            InsertSummary {
                rows: 2_500_000,
                blocks: 3
            }
        );
        assert_eq!(connection.state(), ConnectionState::Completed);
        assert_eq!(connection.server_info().unwrap().timezone.as_deref(), Some("UTC"));
    }

    #[test]
    fn compressed_stream_resumes_after_transport_pause() {
        let (transport, mut server, writable) = duplex();
        writable.store(false, Ordering::SeqCst);

        let server = thread::spawn(move || {
            let (_, settings) = accept(&mut server);
            assert!(server.compressed());
            assert_eq!(settings, vec![("network_compression_method".to_string(), "lz4".to_string())]);
            server.send_block(&sample(&[
                ("id", ColumnType::UInt64),
                ("name", ColumnType::String),
                ("day", ColumnType::Date),
            ]));
            let mut blocks = Vec::new();
            loop {
                let ClientMessage::Data(block) = server.next_message() else {
                    panic!("expected data block");
                };
                if block.is_empty() {
                    break;
                }
                blocks.push(block);
            }
            server.send_end_of_stream();
            blocks
        });

        let config = ClientConfig {
            block_rows: 1000,
            ..ClientConfig::default()
        };
        let mut connection = Connection::new(transport, config);
        let notifier = connection.writability_notifier();
        let resume = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            writable.store(true, Ordering::SeqCst);
            notifier.notify(true);
        });

        let rows = (0..25_000u64).map(|i| -> Row { vec![Value::UInt64(i), Value::from(format!("row {i}")), Value::Date(19000)] });
        let settings = Settings::new().with_compression(CompressionMethod::Lz4);
        let summary = connection
            .insert("INSERT INTO t VALUES", &settings, IterSource::new(rows))
            .unwrap();
        resume.join().unwrap();

        let blocks = server.join().unwrap();
        assert_eq!(blocks.len(), 25);
        assert!(blocks.iter().all(|b| b.rows() == 1000));
        assert_eq!(
            blocks[24].columns()[1].values(1000).unwrap()[999],
            Value::from("row 24999")
        );
        assert_eq!(summary, InsertSummary { rows: 25_000, blocks: 25 });
    }

    struct Watched {
        cancelled: Arc<AtomicBool>,
    }

    impl RowSource for Watched {
        fn next_row(&mut self) -> Option<Result<Row, ClientError>> {
            Some(Ok(vec![Value::UInt32(1)]))
        }

        fn cancel(&mut self) {
            self.cancelled.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn server_exception_fails_the_insert() {
        let (transport, mut server, _) = duplex();
        let exception = ServerException {
            code: 60,
            name: "DB::Exception".into(),
            message: "Table default.t doesn't exist.".into(),
            stack_trace: String::new(),
            nested: None,
        };
        let sent = exception.clone();
        let server = thread::spawn(move || {
            accept(&mut server);
            server.send_exception(&sent);
        });

        let cancelled = Arc::new(AtomicBool::new(false));
        let source = Watched {
            cancelled: Arc::clone(&cancelled),
        };
        let mut connection = Connection::new(transport, ClientConfig::default());
        let err = connection.insert("INSERT INTO t VALUES", &Settings::new(), source).unwrap_err();
        server.join().unwrap();

        match err {
            ClientError::Server(e) => assert_eq!(e, exception),
            other => panic!("unexpected {other:?}"),
        }
        assert!(cancelled.load(Ordering::SeqCst));
        assert_eq!(connection.state(), ConnectionState::Errored);
        assert!(connection.state().is_terminal());
    }

    struct Exploding;

    impl RowSource for Exploding {
        fn next_row(&mut self) -> Option<Result<Row, ClientError>> {
            panic!("row decoder gave up");
        }
    }

    #[test]
    fn panicking_source_fails_the_insert() {
        let (transport, mut server, _) = duplex();
        let server = thread::spawn(move || {
            accept(&mut server);
            server.send_block(&sample(&[("value", ColumnType::UInt32)]));
        });

        let mut connection = Connection::new(transport, ClientConfig::default());
        let err = connection
            .insert("INSERT INTO t VALUES", &Settings::new(), Exploding)
            .unwrap_err();
        server.join().unwrap();

        match err {
            ClientError::Source(message) => assert!(message.contains("row decoder gave up"), "{message}"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(connection.state(), ConnectionState::Errored);
    }

    #[test]
    fn exception_mid_stream_cancels_the_source() {
        let (transport, mut server, _) = duplex();
        let server = thread::spawn(move || {
            accept(&mut server);
            server.send_block(&sample(&[("value", ColumnType::UInt32)]));
            assert!(matches!(server.next_message(), ClientMessage::Data(_)));
            server.send_exception(&ServerException {
                code: 241,
                name: "DB::Exception".into(),
                message: "Memory limit exceeded".into(),
                stack_trace: String::new(),
                nested: None,
            });
        });

        let cancelled = Arc::new(AtomicBool::new(false));
        let source = Watched {
            cancelled: Arc::clone(&cancelled),
        };
        let config = ClientConfig {
            block_rows: 100,
            ..ClientConfig::default()
        };
        let mut connection = Connection::new(transport, config);
        let err = connection.insert("INSERT INTO t VALUES", &Settings::new(), source).unwrap_err();
        server.join().unwrap();

        assert!(matches!(err, ClientError::Server(ServerException { code: 241, .. })));
        // The producer stops asynchronously after the cancel.
        for _ in 0..100 {
            if cancelled.load(Ordering::SeqCst) {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert!(cancelled.load(Ordering::SeqCst));
    }

    #[test]
    fn out_of_order_message_is_rejected() {
        let (transport, mut server, _) = duplex();
        let server = thread::spawn(move || {
            assert!(matches!(server.next_message(), ClientMessage::Hello { .. }));
            server.send_end_of_stream();
        });

        let mut connection = Connection::new(transport, ClientConfig::default());
        let err = connection
            .insert("INSERT INTO t VALUES", &Settings::new(), IterSource::new(std::iter::empty::<Row>()))
            .unwrap_err();
        server.join().unwrap();

        assert!(matches!(
            err,
            ClientError::UnexpectedState {
                state: ConnectionState::Connected,
                event: "EndOfStream"
            }
        ));
    }

    #[test]
    fn server_hangup_is_a_transport_error() {
        let (transport, mut server, _) = duplex();
        let server = thread::spawn(move || {
            assert!(matches!(server.next_message(), ClientMessage::Hello { .. }));
            server.hang_up();
        });

        let mut connection = Connection::new(transport, ClientConfig::default());
        let err = connection
            .insert("INSERT INTO t VALUES", &Settings::new(), IterSource::new(std::iter::empty::<Row>()))
            .unwrap_err();
        server.join().unwrap();

        assert!(matches!(err, ClientError::Transport(_)));
    }

    #[test]
    fn empty_source_sends_only_the_sentinel() {
        let (transport, mut server, _) = duplex();
        let server = thread::spawn(move || {
            accept(&mut server);
            server.send_block(&sample(&[("value", ColumnType::UInt32)]));
            let rows = receive_blocks(&mut server);
            server.send_end_of_stream();
            rows
        });

        let mut connection = Connection::new(transport, ClientConfig::default());
        let summary = connection
            .insert("INSERT INTO t VALUES", &Settings::new(), IterSource::new(std::iter::empty::<Row>()))
            .unwrap();

        assert!(server.join().unwrap().is_empty());
        assert_eq!(summary, InsertSummary::default());

        let err = connection
            .insert("INSERT INTO t VALUES", &Settings::new(), IterSource::new(std::iter::empty::<Row>()))
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::UnexpectedState {
                state: ConnectionState::Completed,
                event: "Connect"
            }
        ));
    }
}
