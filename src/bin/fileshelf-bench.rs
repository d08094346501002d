//! Load-generation harness for a fileshelf server.
//!
//! Spawns N concurrent connections, each performing one UPLOAD or one GET
//! of a seeded random payload, then prints per-client latency and aggregate
//! throughput. Download runs seed the target file before the clock starts.

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use fileshelf::Client;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

/// Command-line arguments for the bench harness
#[derive(Parser, Debug)]
#[command(name = "fileshelf-bench")]
#[command(version = "0.1.0")]
#[command(about = "Stress a fileshelf server with concurrent transfers", long_about = None)]
struct Cli {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:45000")]
    addr: String,

    /// Operation every client performs
    #[arg(short, long, value_enum, default_value = "upload")]
    operation: Operation,

    /// Payload size in mebibytes
    #[arg(long, default_value_t = 10)]
    size_mb: usize,

    /// Number of concurrent client connections
    #[arg(short, long, default_value_t = 5)]
    clients: usize,

    /// Seed for payload generation
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Operation {
    Upload,
    Download,
}

/// One client's run: elapsed time on success, reason on failure.
struct Outcome {
    client: usize,
    result: Result<Duration, String>,
}

#[tokio::main]
async fn main() -> fileshelf::Result<()> {
    let cli = Cli::parse();

    let payload = Arc::new(generate_payload(cli.size_mb * 1024 * 1024, cli.seed));
    let filename = bench_filename(cli.size_mb);

    println!(
        "fileshelf-bench {} | {:?} x{} clients, {} MiB payload, server {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        cli.operation,
        cli.clients,
        cli.size_mb,
        cli.addr
    );

    if matches!(cli.operation, Operation::Download) {
        let mut seeder = Client::connect(&cli.addr).await?;
        seeder.upload(&filename, &payload).await?;
    }

    let started = Instant::now();
    let mut tasks = Vec::with_capacity(cli.clients);
    for client in 0..cli.clients {
        let addr = cli.addr.clone();
        let payload = Arc::clone(&payload);
        let filename = filename.clone();
        let operation = cli.operation;
        tasks.push(tokio::spawn(async move {
            run_client(client, addr, operation, filename, payload).await
        }));
    }

    let mut outcomes = Vec::with_capacity(cli.clients);
    for task in tasks {
        outcomes.push(task.await?);
    }
    let wall = started.elapsed();

    report(&outcomes, wall, cli.size_mb);
    Ok(())
}

async fn run_client(
    client: usize,
    addr: String,
    operation: Operation,
    filename: String,
    payload: Arc<Vec<u8>>,
) -> Outcome {
    let started = Instant::now();
    let result = async {
        let mut conn = Client::connect(&addr).await?;
        match operation {
            Operation::Upload => conn.upload(&filename, &payload).await?,
            Operation::Download => {
                let bytes = conn.get(&filename).await?;
                if bytes.len() != payload.len() {
                    return Err(format!(
                        "short download: {} of {} bytes",
                        bytes.len(),
                        payload.len()
                    )
                    .into());
                }
            }
        }
        Ok::<(), fileshelf::Error>(())
    }
    .await;

    Outcome {
        client,
        result: match result {
            Ok(()) => Ok(started.elapsed()),
            Err(e) => Err(e.to_string()),
        },
    }
}

fn generate_payload(size: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut payload = vec![0u8; size];
    rng.fill_bytes(&mut payload);
    payload
}

fn bench_filename(size_mb: usize) -> String {
    format!("bench_{size_mb}MB.bin")
}

fn report(outcomes: &[Outcome], wall: Duration, size_mb: usize) {
    let mut ok = 0usize;
    let mut failed = 0usize;
    let mut total_secs = 0f64;

    for outcome in outcomes {
        match &outcome.result {
            Ok(elapsed) => {
                ok += 1;
                let secs = elapsed.as_secs_f64();
                total_secs += secs;
                let throughput = size_mb as f64 / secs.max(f64::EPSILON);
                println!(
                    "  client {:>3}: {:>8.3}s  {:>8.2} MiB/s",
                    outcome.client, secs, throughput
                );
            }
            Err(reason) => {
                failed += 1;
                println!("  client {:>3}: FAILED ({reason})", outcome.client);
            }
        }
    }

    let avg = if ok > 0 { total_secs / ok as f64 } else { 0.0 };
    let aggregate = (ok * size_mb) as f64 / wall.as_secs_f64().max(f64::EPSILON);
    println!(
        "success {ok}, fail {failed}, avg {avg:.3}s/op, aggregate {aggregate:.2} MiB/s over {:.3}s",
        wall.as_secs_f64()
    );
}
