//! Row ingestion and block flow control.
//!
//! Rows are pulled from a [`RowSource`] by a producer thread, batched into
//! blocks by the [`BlockAssembler`], and handed to the connection, where the
//! [`BlockTransmitter`] writes them out as the transport allows.
//!
//! # Backpressure
//!
//! Credit travels upstream, data downstream. The transmitter starts by
//! requesting [`PREFETCH`] blocks and asks for one more each time a data block
//! is confirmed written. The assembler turns block credit into row credit, and
//! the source is never polled without row credit left. A transport that stops
//! being writable therefore stalls the whole chain within `PREFETCH` blocks,
//! without dropping any of them.
//!
//! # Cancellation
//!
//! `transmitter.cancel()` cancels the producer subscription, which cancels the
//! assembler and then the source. Queued blocks and pending column buffers are
//! dropped exactly once.
mod assembler;
mod flow;
mod producer;
mod source;
mod transmitter;

pub use assembler::{AssemblerState, BLOCK_ROWS, BlockAssembler};
pub use flow::{Demand, FlowError, Signal, Subscription};
pub use producer::{ProducerSubscription, spawn_producer};
pub use source::{IterSource, RowSource};
pub use transmitter::{BlockSink, BlockTransmitter, PREFETCH, TransmitterState, WriteStatus};
