//! Error types shared by the coordinator and workers.

use thiserror::Error;

use crate::coordinator::ledger::TaskKind;

/// Ways a scheduler request can be rejected.
///
/// None of these change ledger state; each is confined to the reply of the
/// request that caused it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("{kind} task {id} not found")]
    TaskNotFound { kind: TaskKind, id: u32 },

    #[error("task type {0} cannot be reported as done")]
    InvalidTaskKind(i32),

    #[error("`{name}` is not an intermediate file for one of {n_reduce} buckets")]
    MalformedIntermediateName { name: String, n_reduce: u32 },

    #[error("a job needs at least one reduce bucket")]
    NoReduceBuckets,
}

impl From<SchedulerError> for tonic::Status {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::TaskNotFound { .. } => tonic::Status::not_found(err.to_string()),
            SchedulerError::InvalidTaskKind(_)
            | SchedulerError::MalformedIntermediateName { .. }
            | SchedulerError::NoReduceBuckets => tonic::Status::invalid_argument(err.to_string()),
        }
    }
}

/// Failures on the worker side of the RPC boundary.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("cannot reach coordinator at {path}: {source}")]
    Unreachable {
        path: String,
        #[source]
        source: tonic::transport::Error,
    },

    #[error("coordinator rejected {call}: {status}")]
    Rpc {
        call: &'static str,
        #[source]
        status: tonic::Status,
    },

    #[error("malformed reply from coordinator: {0}")]
    MalformedReply(String),
}
