//! The MapReduce coordinator.
//!
//! Every RPC handler and the timeout monitor go through the one mutex around
//! the [`Ledger`]. Handlers never await while holding it, so a request waits
//! at most for another request's in-memory bookkeeping.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::net::UnixListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::UnixListenerStream;
use tonic::{transport::Server, Request, Response, Status};
use tracing::{info, warn};

use crate::error::SchedulerError;
use crate::rpc::{
    Coordinator, CoordinatorServer, DoneReply, DoneRequest, StatusReply, StatusRequest, TaskReply,
    TaskRequest,
};
use ledger::{Ledger, Progress, TaskKind};

pub mod ledger;

/// Tunables for one coordinator run.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Number of reduce buckets, and so of reduce tasks.
    pub n_reduce: u32,
    /// How long a task may run before it is handed out again.
    pub task_timeout: Duration,
    /// How often running tasks are checked against `task_timeout`.
    pub scan_interval: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            n_reduce: crate::DEFAULT_N_REDUCE,
            task_timeout: crate::TASK_TIMEOUT,
            scan_interval: crate::TIMEOUT_SCAN_INTERVAL,
        }
    }
}

/// The gRPC face of the scheduler. Clones share one ledger.
#[derive(Clone)]
pub struct CoordinatorService {
    ledger: Arc<Mutex<Ledger>>,
}

impl CoordinatorService {
    pub fn new(inputs: Vec<String>, config: &CoordinatorConfig) -> Result<Self, SchedulerError> {
        let ledger = Ledger::new(inputs, config.n_reduce, config.task_timeout)?;
        Ok(Self {
            ledger: Arc::new(Mutex::new(ledger)),
        })
    }

    /// Whether every map and reduce task has completed.
    pub fn job_complete(&self) -> bool {
        self.lock().is_done()
    }

    pub fn progress(&self) -> Progress {
        self.lock().progress()
    }

    fn lock(&self) -> MutexGuard<'_, Ledger> {
        // Every ledger method leaves it consistent, so a panic elsewhere
        // while holding the lock does not invalidate the state.
        self.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Periodically reclaim stalled tasks until `shutdown` fires.
    async fn monitor_timeouts(self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let reclaimed = self.lock().reclaim_stalled(Instant::now());
                    if !reclaimed.is_empty() {
                        info!(count = reclaimed.len(), "reclaimed stalled tasks");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    }
}

#[tonic::async_trait]
impl Coordinator for CoordinatorService {
    async fn request_task(
        &self,
        request: Request<TaskRequest>,
    ) -> Result<Response<TaskReply>, Status> {
        let worker = request.into_inner().worker_id;
        let assignment = self.lock().request_task(&worker, Instant::now());
        Ok(Response::new(assignment.into()))
    }

    async fn report_task_done(
        &self,
        request: Request<DoneRequest>,
    ) -> Result<Response<DoneReply>, Status> {
        let DoneRequest {
            worker_id,
            task_type,
            task_id,
            files,
        } = request.into_inner();
        let outcome = TaskKind::try_from(task_type)
            .and_then(|kind| self.lock().report_done(&worker_id, kind, task_id, files));
        if let Err(err) = outcome {
            warn!(worker = %worker_id, task_id, %err, "rejected completion report");
            return Err(err.into());
        }
        Ok(Response::new(DoneReply { exit: true }))
    }

    async fn job_status(
        &self,
        _request: Request<StatusRequest>,
    ) -> Result<Response<StatusReply>, Status> {
        Ok(Response::new(self.progress().into()))
    }
}

/// A coordinator serving on a Unix socket, with its timeout monitor.
pub struct RunningCoordinator {
    service: CoordinatorService,
    socket: PathBuf,
    shutdown: watch::Sender<bool>,
    server: JoinHandle<Result<(), tonic::transport::Error>>,
    monitor: JoinHandle<()>,
}

impl RunningCoordinator {
    /// Bind `socket`, replacing a stale socket file, and start serving.
    pub async fn start(
        inputs: Vec<String>,
        config: CoordinatorConfig,
        socket: &Path,
    ) -> Result<Self> {
        let service = CoordinatorService::new(inputs, &config)?;
        match std::fs::remove_file(socket) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => {
                return Err(e).with_context(|| format!("cannot remove {}", socket.display()));
            }
            _ => {}
        }
        let listener = UnixListener::bind(socket)
            .with_context(|| format!("cannot listen on {}", socket.display()))?;
        let progress = service.progress();
        info!(
            socket = %socket.display(),
            n_map = progress.n_map,
            n_reduce = progress.n_reduce,
            "coordinator listening"
        );

        let (shutdown, rx) = watch::channel(false);
        let mut server_rx = rx.clone();
        let server = tokio::spawn(
            Server::builder()
                .add_service(CoordinatorServer::new(service.clone()))
                .serve_with_incoming_shutdown(UnixListenerStream::new(listener), async move {
                    let _ = server_rx.changed().await;
                }),
        );
        let monitor = tokio::spawn(service.clone().monitor_timeouts(config.scan_interval, rx));

        Ok(Self {
            service,
            socket: socket.to_path_buf(),
            shutdown,
            server,
            monitor,
        })
    }

    pub fn job_complete(&self) -> bool {
        self.service.job_complete()
    }

    pub fn progress(&self) -> Progress {
        self.service.progress()
    }

    /// Poll [`Self::job_complete`] every `interval` until it holds.
    pub async fn wait_until_done(&self, interval: Duration) {
        while !self.job_complete() {
            tokio::time::sleep(interval).await;
        }
    }

    /// Stop the server and the monitor, then remove the socket file.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown.send(true);
        self.monitor.await.context("timeout monitor panicked")?;
        self.server
            .await
            .context("rpc server panicked")?
            .context("rpc server failed")?;
        if let Err(e) = std::fs::remove_file(&self.socket) {
            warn!(socket = %self.socket.display(), %e, "could not remove socket");
        }
        info!("coordinator stopped");
        Ok(())
    }
}
