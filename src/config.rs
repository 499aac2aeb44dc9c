use crate::{pipeline::BLOCK_ROWS, protocol::message::CLIENT_NAME};

/// Connection-level options. Query-level tuning lives in
/// [`Settings`](crate::protocol::Settings).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub database: String,
    pub username: String,
    pub password: String,
    /// Name the client introduces itself with in Hello and client info.
    pub client_name: String,
    /// Empty lets the server assign one.
    pub query_id: String,
    /// Threads compressing outbound blocks. Unused without compression.
    pub compression_workers: usize,
    /// Rows per outbound data block.
    pub block_rows: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            database: "default".to_string(),
            username: "default".to_string(),
            password: String::new(),
            client_name: CLIENT_NAME.to_string(),
            query_id: String::new(),
            compression_workers: 2,
            block_rows: BLOCK_ROWS,
        }
    }
}
