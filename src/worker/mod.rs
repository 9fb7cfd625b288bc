//! The MapReduce worker.
//!
//! A worker process runs at most one task. It asks the coordinator for work
//! until it gets some, executes it, reports back and returns. Anything that
//! goes wrong locally is returned as an error and the caller is expected to
//! exit; the coordinator notices the silence and reassigns the task.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::sleep;
use tonic::Code;
use tracing::{debug, info, warn};

use crate::coordinator::ledger::{Assignment, TaskKind};
use crate::error::WorkerError;
use crate::rpc::{self, DoneRequest, TaskRequest, TaskType};
use crate::{utils, Workload};

pub mod executor;

/// Tunables for one worker process.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Shared directory holding inputs, intermediate and output files.
    pub work_dir: PathBuf,
    /// Sleep between asking again after a wait reply.
    pub wait_backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            wait_backoff: crate::WAIT_BACKOFF,
        }
    }
}

/// How a worker run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The coordinator said the job is finished.
    Exited,
    /// One task was executed. `reported` is false when the completion report
    /// was lost in transport. A report the coordinator rejects is an error.
    Completed {
        kind: TaskKind,
        id: u32,
        reported: bool,
    },
}

/// Ask the coordinator at `socket` for a task, run it with `workload` and
/// report it done.
pub async fn run(socket: &Path, workload: Workload, config: &WorkerConfig) -> Result<Outcome> {
    let worker_id = utils::worker_identity();
    let mut client = rpc::connect(socket).await?;
    info!(worker = %worker_id, socket = %socket.display(), "worker started");

    let (kind, id, files) = loop {
        let reply = client
            .request_task(TaskRequest {
                worker_id: worker_id.clone(),
            })
            .await
            .map_err(|status| WorkerError::Rpc {
                call: "RequestTask",
                status,
            })?;

        match Assignment::try_from(reply.into_inner())? {
            Assignment::Map { id, input, n_reduce } => {
                info!(id, %input, n_reduce, "running map task");
                let dir = config.work_dir.clone();
                let map_fn = workload.map_fn;
                let files = tokio::task::spawn_blocking(move || {
                    executor::run_map(map_fn, id, &input, n_reduce, &dir)
                })
                .await
                .context("map task panicked")??;
                break (TaskKind::Map, id, files);
            }
            Assignment::Reduce { id, inputs, .. } => {
                info!(id, n_inputs = inputs.len(), "running reduce task");
                let dir = config.work_dir.clone();
                let reduce_fn = workload.reduce_fn;
                let out = tokio::task::spawn_blocking(move || {
                    executor::run_reduce(reduce_fn, id, &inputs, &dir)
                })
                .await
                .context("reduce task panicked")??;
                debug!(output = %out.display(), "reduce output published");
                break (TaskKind::Reduce, id, Vec::new());
            }
            Assignment::Wait => {
                debug!(backoff = ?config.wait_backoff, "no task available, waiting");
                sleep(config.wait_backoff).await;
            }
            Assignment::Exit => {
                info!("job finished, exiting");
                return Ok(Outcome::Exited);
            }
        }
    };

    let report = DoneRequest {
        worker_id,
        task_type: TaskType::from(kind) as i32,
        task_id: id,
        files,
    };
    let reported = match client.report_task_done(report).await {
        Ok(_) => true,
        // A rejected report means the worker and coordinator disagree about
        // the task; only a lost report is left to the timeout.
        Err(status)
            if matches!(
                status.code(),
                Code::NotFound | Code::InvalidArgument | Code::FailedPrecondition
            ) =>
        {
            return Err(WorkerError::Rpc {
                call: "ReportTaskDone",
                status,
            }
            .into());
        }
        Err(status) => {
            warn!(%kind, id, %status, "could not report completion; the task will time out");
            false
        }
    };
    info!(%kind, id, reported, "task done");
    Ok(Outcome::Completed { kind, id, reported })
}
