//! TCP acceptor and per-connection framing loop.
//!
//! One task per accepted connection reads into a growing buffer, splits off
//! delimited frames, rejects non-JSON frames inline, and submits the rest
//! to the worker pool. A single writer task per connection serializes
//! response frames onto the socket; completions land in whatever order the
//! pool finishes them, which is part of the wire contract.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, trace, warn};

use crate::config::Config;
use crate::framing;
use crate::pool::WorkerPool;
use crate::protocol::Response;
use crate::stats::ServerStats;
use crate::store::FileStore;

/// Maximum number of concurrent connections
const MAX_CONNECTIONS: usize = 10000;

/// Listen backlog for the accept queue
const LISTEN_BACKLOG: i32 = 1024;

/// Initial read buffer size
const BUFFER_SIZE: usize = 16 * 1024;

/// Server instance
pub struct Server {
    listener: TcpListener,
    pool: Arc<WorkerPool>,
    stats: Arc<ServerStats>,
    connection_limit: Arc<Semaphore>,
    stats_interval: u64,
}

impl Server {
    /// Bind the listener and start the worker pool described by `config`.
    pub fn bind(config: &Config) -> crate::Result<Server> {
        let store = FileStore::new(&config.root)?;
        let pool = Arc::new(WorkerPool::start(config, store)?);
        let listener = TcpListener::from_std(bind_listener(&config.host, config.port)?)?;

        info!(
            host = %config.host,
            port = config.port,
            workers = config.workers,
            strategy = ?config.strategy,
            root = %config.root.display(),
            "Server listening"
        );

        Ok(Server {
            listener,
            pool,
            stats: Arc::new(ServerStats::new()),
            connection_limit: Arc::new(Semaphore::new(MAX_CONNECTIONS)),
            stats_interval: config.stats_interval,
        })
    }

    /// Address the listener is bound to. With port 0 this is where the
    /// kernel actually put us.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Shared counters, readable at any time.
    pub fn stats(&self) -> Arc<ServerStats> {
        Arc::clone(&self.stats)
    }

    /// Accept connections until the process exits.
    pub async fn run(&self) -> crate::Result<()> {
        let stats = Arc::clone(&self.stats);
        let interval = self.stats_interval;
        tokio::spawn(async move {
            report_stats(stats, interval).await;
        });

        loop {
            // Wait for a connection slot
            let permit = self.connection_limit.clone().acquire_owned().await?;

            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    debug!(peer = %addr, "New connection");

                    let pool = Arc::clone(&self.pool);
                    let stats = Arc::clone(&self.stats);

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, pool, Arc::clone(&stats)).await {
                            debug!(error = %e, "Connection error");
                            stats.record_fail();
                        }
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}

/// Background task logging the aggregate counters.
async fn report_stats(stats: Arc<ServerStats>, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
    // The first tick completes immediately; skip it.
    interval.tick().await;

    loop {
        interval.tick().await;
        let snapshot = stats.snapshot();
        info!(success = snapshot.success, fail = snapshot.fail, "Request totals");
    }
}

/// Build the listening socket with reuse-address and a fixed backlog, then
/// hand it to tokio in non-blocking mode.
fn bind_listener(host: &str, port: u16) -> io::Result<std::net::TcpListener> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("invalid listen address: {e}")))?;

    let domain = match addr {
        SocketAddr::V4(_) => Domain::IPV4,
        SocketAddr::V6(_) => Domain::IPV6,
    };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    Ok(socket.into())
}

/// Handle a single client connection: the framing read loop plus a
/// dedicated writer task.
async fn handle_connection(
    stream: TcpStream,
    pool: Arc<WorkerPool>,
    stats: Arc<ServerStats>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (mut reader, writer) = stream.into_split();
    let (response_tx, response_rx) = mpsc::unbounded_channel::<Bytes>();
    let writer_task = tokio::spawn(write_responses(writer, response_rx));

    let mut buffer = BytesMut::with_capacity(BUFFER_SIZE);
    let served: io::Result<()> = async {
        loop {
            let n = reader.read_buf(&mut buffer).await?;
            if n == 0 {
                trace!("Connection closed by client");
                return Ok(());
            }

            // Drain every complete frame before blocking on the next read.
            while let Some(frame) = framing::extract_frame(&mut buffer) {
                dispatch_frame(frame.freeze(), &pool, &stats, &response_tx);
            }
        }
    }
    .await;

    // In-flight completions still hold channel clones, so the writer drains
    // every pending response before exiting.
    drop(response_tx);
    let written = writer_task.await;

    served?;
    written??;
    Ok(())
}

/// Route one extracted frame.
///
/// Blank frames are dropped silently. Frames that are not valid JSON are
/// rejected here without spending a worker. Everything else goes to the
/// pool with a completion callback that writes the response back and
/// settles the counters.
fn dispatch_frame(
    frame: Bytes,
    pool: &Arc<WorkerPool>,
    stats: &Arc<ServerStats>,
    response_tx: &mpsc::UnboundedSender<Bytes>,
) {
    if framing::is_blank(&frame) {
        trace!("Discarding blank frame");
        return;
    }

    let text = match std::str::from_utf8(&frame) {
        Ok(text) => text,
        Err(e) => {
            reject_frame(format!("Invalid JSON: {e}"), stats, response_tx);
            return;
        }
    };
    if let Err(e) = serde_json::from_str::<serde_json::Value>(text) {
        reject_frame(format!("Invalid JSON: {e}"), stats, response_tx);
        return;
    }

    let handle = pool.submit(text.to_string());
    let stats = Arc::clone(stats);
    let response_tx = response_tx.clone();
    tokio::spawn(async move {
        match handle.outcome().await {
            Some(response) => {
                if response_tx.send(framing::encode_frame(&response)).is_ok() {
                    stats.record_success();
                } else {
                    trace!("Connection closed before response could be written");
                    stats.record_fail();
                }
            }
            None => {
                warn!("Worker failed before producing a response");
                let response = Response::error("worker failed before producing a response");
                let _ = response_tx.send(framing::encode_frame(&response.to_json()));
                stats.record_fail();
            }
        }
    });
}

/// Answer a frame the framer itself rejected.
fn reject_frame(
    message: String,
    stats: &ServerStats,
    response_tx: &mpsc::UnboundedSender<Bytes>,
) {
    warn!(error = %message, "Rejecting unparseable frame");
    let response = Response::error(&message);
    let _ = response_tx.send(framing::encode_frame(&response.to_json()));
    stats.record_fail();
}

/// Drain response frames to the socket one at a time. A single writer
/// keeps concurrent completions from interleaving partial frames.
async fn write_responses(
    mut writer: OwnedWriteHalf,
    mut responses: mpsc::UnboundedReceiver<Bytes>,
) -> io::Result<()> {
    while let Some(frame) = responses.recv().await {
        writer.write_all(&frame).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerStrategy;

    fn test_config(root: std::path::PathBuf) -> Config {
        Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            workers: 2,
            strategy: WorkerStrategy::Thread,
            root,
            stats_interval: 60,
            log_level: "info".to_string(),
            worker_mode: false,
            worker_program: None,
        }
    }

    #[tokio::test]
    async fn test_server_bind() {
        let dir = tempfile::tempdir().unwrap();
        let server = Server::bind(&test_config(dir.path().join("files"))).unwrap();

        assert_ne!(server.local_addr().unwrap().port(), 0);
        let snapshot = server.stats().snapshot();
        assert_eq!(snapshot.total(), 0);
    }

    #[tokio::test]
    async fn test_bind_rejects_bad_host() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path().join("files"));
        config.host = "not-an-ip".to_string();

        assert!(Server::bind(&config).is_err());
    }
}
