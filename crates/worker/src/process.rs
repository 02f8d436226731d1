//! External worker process supervision.

use std::io;
use std::process::Stdio;

use async_trait::async_trait;
use p2pminer_config::WorkerConfig;
use p2pminer_core::{EventBus, NodeEvent, StatusHandle};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time;
use tracing::{error, info, warn};

use crate::error::{WorkerError, WorkerResult};
use crate::scrape;

/// Control surface of the worker, as used by the node's control loop.
#[async_trait]
pub trait WorkerControl: Send + Sync {
    /// Starts the worker. Starting a running worker is a no-op.
    async fn start(&self) -> WorkerResult<()>;

    /// Stops the worker. Stopping a stopped worker is a no-op.
    async fn stop(&self) -> WorkerResult<()>;

    /// Whether a worker process is alive.
    async fn is_running(&self) -> bool;
}

/// Builds the worker command line, binary excluded.
pub fn command_args(config: &WorkerConfig) -> Vec<String> {
    let mut args = vec![
        "-o".to_string(),
        config.pool_url.clone(),
        "-u".to_string(),
        config.wallet_address.clone(),
    ];
    if config.keepalive {
        args.push("-k".to_string());
    }
    if config.tls {
        args.push("--tls".to_string());
    }
    args.extend(config.extra_args.iter().cloned());
    args
}

/// Supervises at most one worker child process.
///
/// Stdout is scraped for throughput figures that land in the shared
/// [`StatusHandle`]; stderr is logged. The child is killed if the handle is
/// dropped while it runs.
#[derive(Debug)]
pub struct WorkerProcess {
    config: WorkerConfig,
    status: StatusHandle,
    events: EventBus,
    child: Mutex<Option<Child>>,
}

impl WorkerProcess {
    /// Creates a supervisor. Nothing is spawned until [`WorkerControl::start`].
    pub fn new(config: WorkerConfig, status: StatusHandle, events: EventBus) -> Self {
        Self {
            config,
            status,
            events,
            child: Mutex::new(None),
        }
    }

    /// Worker configuration.
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    fn spawn(&self) -> WorkerResult<Child> {
        let args = command_args(&self.config);
        info!(binary = %self.config.binary.display(), args = %args.join(" "), "Starting worker");

        let mut child = Command::new(&self.config.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => WorkerError::BinaryNotFound {
                    path: self.config.binary.clone(),
                },
                _ => WorkerError::Spawn(e),
            })?;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(scrape::scrape_stdout(
                stdout,
                self.status.clone(),
                self.events.clone(),
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(scrape::log_stderr(stderr));
        }
        Ok(child)
    }

    async fn terminate(&self, child: &mut Child) -> WorkerResult<Option<i32>> {
        if let Some(exit) = child.try_wait().map_err(WorkerError::Stop)? {
            info!(code = ?exit.code(), "Worker had already exited");
            return Ok(exit.code());
        }

        info!(pid = ?child.id(), "Stopping worker");
        request_exit(child)?;

        match time::timeout(self.config.stop_timeout(), child.wait()).await {
            Ok(exit) => Ok(exit.map_err(WorkerError::Stop)?.code()),
            Err(_) => {
                warn!(timeout = ?self.config.stop_timeout(), "Worker ignored termination, killing");
                child.kill().await.map_err(WorkerError::Stop)?;
                Ok(None)
            }
        }
    }
}

#[cfg(unix)]
fn request_exit(child: &mut Child) -> WorkerResult<()> {
    let Some(pid) = child.id() else {
        return Ok(());
    };
    // SAFETY: `pid` belongs to a child we have not reaped yet.
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if rc == 0 {
        Ok(())
    } else {
        Err(WorkerError::Stop(io::Error::last_os_error()))
    }
}

#[cfg(not(unix))]
fn request_exit(child: &mut Child) -> WorkerResult<()> {
    child.start_kill().map_err(WorkerError::Stop)
}

#[async_trait]
impl WorkerControl for WorkerProcess {
    async fn start(&self) -> WorkerResult<()> {
        let mut slot = self.child.lock().await;
        if let Some(child) = slot.as_mut() {
            if matches!(child.try_wait(), Ok(None)) {
                info!(pid = ?child.id(), "Worker already running");
                return Ok(());
            }
        }

        match self.spawn() {
            Ok(child) => {
                let pid = child.id();
                info!(?pid, "Worker started");
                self.events.emit(NodeEvent::WorkerStarted { pid });
                *slot = Some(child);
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Worker unavailable");
                self.status.mark_unavailable();
                self.events.emit(NodeEvent::WorkerUnavailable {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn stop(&self) -> WorkerResult<()> {
        let Some(mut child) = self.child.lock().await.take() else {
            info!("Worker is not running");
            return Ok(());
        };

        let result = self.terminate(&mut child).await;
        self.status.mark_unavailable();
        let code = match &result {
            Ok(code) => *code,
            Err(_) => None,
        };
        info!(?code, "Worker stopped");
        self.events.emit(NodeEvent::WorkerStopped { code });
        result.map(|_| ())
    }

    async fn is_running(&self) -> bool {
        match self.child.lock().await.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            None => false,
        }
    }
}
