//! fileshelf: a TCP file service with delimiter-framed JSON commands.
//!
//! Clients hold one persistent connection and send `\r\n\r\n`-delimited
//! JSON request frames. The server splits the byte stream into frames,
//! runs LIST/GET/UPLOAD/DELETE against a directory-backed store through a
//! bounded worker pool (OS threads or isolated child processes), and writes
//! response frames back on the same connection in completion order while
//! counting delivered and failed frames process-wide.

pub mod client;
pub mod config;
pub mod framing;
pub mod pool;
pub mod protocol;
pub mod server;
pub mod stats;
pub mod store;

pub use client::Client;
pub use config::{Config, WorkerStrategy};
pub use protocol::{Request, Response, Status};
pub use server::Server;
pub use stats::ServerStats;
pub use store::FileStore;

/// Boxed error type used at task and binary boundaries.
pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// Convenience result alias for fallible fileshelf operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Port the server listens on when none is configured.
pub const DEFAULT_PORT: u16 = 45000;
