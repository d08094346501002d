//! Bounded worker pool with swappable execution strategies.
//!
//! Connection tasks submit one job per extracted frame and get back a
//! handle that resolves with the response text whenever the job finishes.
//! Two strategies honor the same contract:
//!
//! - `thread`: a fixed set of OS threads drains a shared queue and runs the
//!   command processor in-process against the shared store.
//! - `process`: a fixed set of child processes (this executable relaunched
//!   in worker mode) receives one JSON-encoded task line per job on stdin
//!   and answers one compact response line on stdout; only strings cross
//!   the boundary. A dead child fails its in-flight job and is respawned.
//!
//! Queued work is unbounded in both strategies; submitters get no
//! backpressure signal.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc as async_mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::config::{Config, WorkerStrategy};
use crate::protocol::{self, Response};
use crate::store::FileStore;

/// Delay before retrying after a failed worker process launch.
const RESPAWN_BACKOFF: Duration = Duration::from_millis(100);

/// One frame's worth of work: raw request text in, response text out.
struct Job {
    frame: String,
    reply: oneshot::Sender<String>,
}

/// Handle to a submitted job.
pub struct JobHandle {
    rx: oneshot::Receiver<String>,
}

impl JobHandle {
    /// Wait for the response text. `None` means the executing worker died
    /// before producing one.
    pub async fn outcome(self) -> Option<String> {
        self.rx.await.ok()
    }
}

/// Worker pool with a fixed number of execution contexts.
pub enum WorkerPool {
    Threads(ThreadPool),
    Processes(ProcessPool),
}

impl WorkerPool {
    /// Start the pool described by `config`. Thread workers share `store`
    /// directly; process workers open their own handle on the same root.
    pub fn start(config: &Config, store: Arc<FileStore>) -> io::Result<WorkerPool> {
        match config.strategy {
            WorkerStrategy::Thread => {
                Ok(WorkerPool::Threads(ThreadPool::start(config.workers, store)?))
            }
            WorkerStrategy::Process => {
                let program = match &config.worker_program {
                    Some(path) => path.clone(),
                    None => std::env::current_exe()?,
                };
                Ok(WorkerPool::Processes(ProcessPool::start(
                    config.workers,
                    program,
                    config.root.clone(),
                )))
            }
        }
    }

    /// Queue one frame for execution.
    pub fn submit(&self, frame: String) -> JobHandle {
        let (reply, rx) = oneshot::channel();
        let job = Job { frame, reply };
        match self {
            WorkerPool::Threads(pool) => pool.submit(job),
            WorkerPool::Processes(pool) => pool.submit(job),
        }
        JobHandle { rx }
    }
}

/// Thread-backed strategy: shared-memory workers behind a mutexed queue.
pub struct ThreadPool {
    sender: Option<mpsc::Sender<Job>>,
    workers: Vec<ThreadWorker>,
}

struct ThreadWorker {
    id: usize,
    handle: Option<thread::JoinHandle<()>>,
}

impl ThreadPool {
    fn start(count: usize, store: Arc<FileStore>) -> io::Result<ThreadPool> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));

        let mut workers = Vec::with_capacity(count);
        for id in 0..count {
            workers.push(ThreadWorker::spawn(
                id,
                Arc::clone(&receiver),
                Arc::clone(&store),
            )?);
        }

        info!(workers = count, "Thread worker pool started");
        Ok(ThreadPool {
            sender: Some(sender),
            workers,
        })
    }

    fn submit(&self, job: Job) {
        if let Some(sender) = &self.sender {
            if sender.send(job).is_err() {
                // Send fails only when every worker has exited; the dropped
                // reply sender marks the job lost.
                warn!("Worker queue closed; job dropped");
            }
        }
    }
}

impl ThreadWorker {
    fn spawn(
        id: usize,
        queue: Arc<Mutex<mpsc::Receiver<Job>>>,
        store: Arc<FileStore>,
    ) -> io::Result<ThreadWorker> {
        let handle = thread::Builder::new()
            .name(format!("fileshelf-worker-{id}"))
            .spawn(move || loop {
                let job = {
                    let queue = match queue.lock() {
                        Ok(queue) => queue,
                        Err(_) => {
                            error!(worker = id, "Worker queue lock poisoned");
                            break;
                        }
                    };
                    queue.recv()
                };
                match job {
                    Ok(job) => {
                        let response = protocol::process(&job.frame, &store).to_json();
                        // The receiver may be gone if the connection closed.
                        let _ = job.reply.send(response);
                    }
                    Err(_) => {
                        debug!(worker = id, "Worker queue closed; thread exiting");
                        break;
                    }
                }
            })?;
        Ok(ThreadWorker {
            id,
            handle: Some(handle),
        })
    }
}

impl Drop for ThreadPool {
    /// Closing the queue lets idle workers observe the disconnect and exit;
    /// joining makes shutdown deterministic.
    fn drop(&mut self) {
        drop(self.sender.take());
        for worker in &mut self.workers {
            if let Some(handle) = worker.handle.take() {
                if handle.join().is_err() {
                    warn!(worker = worker.id, "Worker thread panicked");
                }
            }
        }
    }
}

type SharedJobQueue = Arc<tokio::sync::Mutex<async_mpsc::UnboundedReceiver<Job>>>;

/// Process-backed strategy: isolated children fed serialized task lines.
pub struct ProcessPool {
    queue: async_mpsc::UnboundedSender<Job>,
}

impl ProcessPool {
    fn start(count: usize, program: PathBuf, root: PathBuf) -> ProcessPool {
        let (sender, receiver) = async_mpsc::unbounded_channel::<Job>();
        let receiver: SharedJobQueue = Arc::new(tokio::sync::Mutex::new(receiver));

        for id in 0..count {
            tokio::spawn(supervise_worker(
                id,
                program.clone(),
                root.clone(),
                Arc::clone(&receiver),
            ));
        }

        info!(workers = count, program = %program.display(), "Process worker pool started");
        ProcessPool { queue: sender }
    }

    fn submit(&self, job: Job) {
        if self.queue.send(job).is_err() {
            warn!("Worker queue closed; job dropped");
        }
    }
}

/// Own one child process: pull jobs from the shared queue, write one
/// encoded task line, read back one response line. Any pipe failure loses
/// the in-flight job (its reply sender is dropped) and replaces the child.
async fn supervise_worker(id: usize, program: PathBuf, root: PathBuf, queue: SharedJobQueue) {
    let mut worker: Option<WorkerProcess> = None;

    loop {
        let job = {
            let mut queue = queue.lock().await;
            match queue.recv().await {
                Some(job) => job,
                None => break,
            }
        };

        let mut live = match worker.take() {
            Some(live) => live,
            None => match WorkerProcess::spawn(id, &program, &root).await {
                Ok(live) => live,
                Err(e) => {
                    error!(worker = id, error = %e, "Failed to spawn worker process");
                    tokio::time::sleep(RESPAWN_BACKOFF).await;
                    continue;
                }
            },
        };

        match live.run(&job.frame).await {
            Ok(response) => {
                let _ = job.reply.send(response);
                worker = Some(live);
            }
            Err(e) => {
                warn!(worker = id, error = %e, "Worker process failed; respawning");
                let _ = live.child.start_kill();
            }
        }
    }

    debug!(worker = id, "Worker supervisor exiting");
}

/// A live child worker with line-buffered pipes.
struct WorkerProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl WorkerProcess {
    async fn spawn(id: usize, program: &Path, root: &Path) -> io::Result<WorkerProcess> {
        let mut child = Command::new(program)
            .arg("--io-worker")
            .arg("--root")
            .arg(root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "worker stdin not captured"))?;
        let stdout = child
            .stdout
            .take()
            .map(BufReader::new)
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "worker stdout not captured"))?;

        debug!(worker = id, pid = ?child.id(), "Worker process spawned");
        Ok(WorkerProcess {
            child,
            stdin,
            stdout,
        })
    }

    /// Round-trip one frame through the child.
    ///
    /// The frame is sent as one JSON string literal so embedded newlines
    /// survive the line transport; the response line is compact JSON and
    /// cannot contain raw newlines.
    async fn run(&mut self, frame: &str) -> io::Result<String> {
        let mut line = serde_json::to_string(frame)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;

        let mut response = String::new();
        let n = self.stdout.read_line(&mut response).await?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "worker closed its pipe",
            ));
        }
        Ok(response.trim_end().to_string())
    }
}

/// Entry point for worker mode: serve JSON-encoded task lines from stdin
/// until EOF, answering exactly one response line per task on stdout.
///
/// Nothing else may write to stdout in this mode; it is the result channel.
pub fn run_worker(root: &Path) -> crate::Result<()> {
    let store = FileStore::new(root)?;
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for line in stdin.lock().lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<String>(&line) {
            Ok(frame) => protocol::process(&frame, &store).to_json(),
            Err(e) => Response::error(format!("worker received malformed task: {e}")).to_json(),
        };
        writeln!(out, "{response}")?;
        out.flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn thread_config(root: &Path, workers: usize) -> Config {
        Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            workers,
            strategy: WorkerStrategy::Thread,
            root: root.to_path_buf(),
            stats_interval: 60,
            log_level: "info".to_string(),
            worker_mode: false,
            worker_program: None,
        }
    }

    #[tokio::test]
    async fn test_submit_resolves_with_response() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("files")).unwrap();
        let pool = WorkerPool::start(&thread_config(dir.path(), 2), store).unwrap();

        let handle = pool.submit(r#"{"command": "LIST", "params": []}"#.to_string());
        let response = handle.outcome().await.unwrap();
        assert_eq!(response, r#"{"status":"OK","data":[]}"#);
    }

    #[tokio::test]
    async fn test_workers_survive_bad_frames() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("files")).unwrap();
        let pool = WorkerPool::start(&thread_config(dir.path(), 1), store).unwrap();

        let handle = pool.submit(r#"{"command": "NOPE", "params": []}"#.to_string());
        let response = handle.outcome().await.unwrap();
        assert!(response.contains("ERROR"));

        // The single worker is still alive and serving.
        let handle = pool.submit(r#"{"command": "LIST", "params": []}"#.to_string());
        assert!(handle.outcome().await.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_submissions_all_complete() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join("files")).unwrap();
        let pool = Arc::new(WorkerPool::start(&thread_config(dir.path(), 4), Arc::clone(&store)).unwrap());

        let mut handles = Vec::new();
        for i in 0..16 {
            let frame = format!(r#"{{"command": "UPLOAD", "params": ["f{i}.txt", "aGVsbG8="]}}"#);
            handles.push(pool.submit(frame));
        }
        for handle in handles {
            let response = handle.outcome().await.unwrap();
            assert!(response.contains("OK"), "{response}");
        }

        assert_eq!(store.list().unwrap().len(), 16);
    }
}
