//! fileshelf: a TCP file service
//!
//! Clients hold one persistent connection and exchange `\r\n\r\n`-delimited
//! JSON frames:
//! - LIST, GET, UPLOAD, DELETE against a directory-backed store
//! - Commands run on a bounded worker pool (threads or child processes)
//! - Responses return in completion order on the same connection
//! - Configuration via CLI arguments or TOML file
//!
//! With `--io-worker` the same binary runs as a pool worker child instead,
//! serving task lines over stdin/stdout for the process strategy.

use fileshelf::config::Config;
use fileshelf::pool;
use fileshelf::server::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> fileshelf::Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Worker children skip logging setup entirely: the default subscriber
    // writes to stdout, which in worker mode is the result channel.
    if config.worker_mode {
        return pool::run_worker(&config.root);
    }

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        workers = config.workers,
        strategy = ?config.strategy,
        root = %config.root.display(),
        "Starting fileshelf server"
    );

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let server = Server::bind(&config)?;
        server.run().await
    })
}
