//! Streaming bulk-insert client for a columnar database's native TCP protocol.
//!
//! Rows pulled from a [`RowSource`] are batched into column-oriented blocks,
//! optionally compressed, and streamed to the server under credit-based
//! backpressure. See [`Connection::insert`].
pub mod cli;
mod config;
pub mod connection;
mod error;
pub mod pipeline;
pub mod protocol;
pub mod thread;

#[cfg(test)]
mod test_helpers;

pub use config::ClientConfig;
pub use connection::{Connection, ConnectionState, InsertSummary, WritabilityNotifier};
pub use error::ClientError;
pub use pipeline::{IterSource, RowSource};
pub use protocol::Transport;
