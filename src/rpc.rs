//! Wire contract between workers and the coordinator.
//!
//! Messages are flat protobuf records. They are converted to the domain
//! types at this boundary so nothing past it deals with optional,
//! kind-dependent fields.

use std::path::{Path, PathBuf};

use tokio::net::UnixStream;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;

use crate::coordinator::ledger::{Assignment, Progress, TaskKind};
use crate::error::{SchedulerError, WorkerError};

mod generated {
    include!(concat!(env!("OUT_DIR"), "/mapred.Coordinator.rs"));
}

pub use generated::coordinator_client::CoordinatorClient;
pub use generated::coordinator_server::{Coordinator, CoordinatorServer};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum TaskType {
    Wait = 0,
    Map = 1,
    Reduce = 2,
    Exit = 3,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TaskRequest {
    #[prost(string, tag = "1")]
    pub worker_id: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TaskReply {
    #[prost(enumeration = "TaskType", tag = "1")]
    pub task_type: i32,
    #[prost(uint32, tag = "2")]
    pub task_id: u32,
    /// Set for map tasks only.
    #[prost(string, tag = "3")]
    pub map_input: String,
    /// Set for reduce tasks only.
    #[prost(string, repeated, tag = "4")]
    pub reduce_inputs: Vec<String>,
    #[prost(uint32, tag = "5")]
    pub n_reduce: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DoneRequest {
    #[prost(string, tag = "1")]
    pub worker_id: String,
    #[prost(enumeration = "TaskType", tag = "2")]
    pub task_type: i32,
    #[prost(uint32, tag = "3")]
    pub task_id: u32,
    /// Intermediate files written by a map task.
    #[prost(string, repeated, tag = "4")]
    pub files: Vec<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DoneReply {
    #[prost(bool, tag = "1")]
    pub exit: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StatusRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StatusReply {
    #[prost(bool, tag = "1")]
    pub done: bool,
    #[prost(uint32, tag = "2")]
    pub n_map: u32,
    #[prost(uint32, tag = "3")]
    pub maps_done: u32,
    #[prost(uint32, tag = "4")]
    pub n_reduce: u32,
    #[prost(uint32, tag = "5")]
    pub reduces_done: u32,
    #[prost(uint32, tag = "6")]
    pub idle: u32,
    #[prost(uint32, tag = "7")]
    pub running: u32,
}

impl From<TaskKind> for TaskType {
    fn from(kind: TaskKind) -> Self {
        match kind {
            TaskKind::Map => TaskType::Map,
            TaskKind::Reduce => TaskType::Reduce,
        }
    }
}

impl TryFrom<i32> for TaskKind {
    type Error = SchedulerError;

    fn try_from(raw: i32) -> Result<Self, Self::Error> {
        match TaskType::try_from(raw) {
            Ok(TaskType::Map) => Ok(TaskKind::Map),
            Ok(TaskType::Reduce) => Ok(TaskKind::Reduce),
            _ => Err(SchedulerError::InvalidTaskKind(raw)),
        }
    }
}

impl From<Assignment> for TaskReply {
    fn from(assignment: Assignment) -> Self {
        let mut reply = TaskReply::default();
        match assignment {
            Assignment::Map { id, input, n_reduce } => {
                reply.set_task_type(TaskType::Map);
                reply.task_id = id;
                reply.map_input = input;
                reply.n_reduce = n_reduce;
            }
            Assignment::Reduce { id, inputs, n_reduce } => {
                reply.set_task_type(TaskType::Reduce);
                reply.task_id = id;
                reply.reduce_inputs = inputs;
                reply.n_reduce = n_reduce;
            }
            Assignment::Wait => reply.set_task_type(TaskType::Wait),
            Assignment::Exit => reply.set_task_type(TaskType::Exit),
        }
        reply
    }
}

impl TryFrom<TaskReply> for Assignment {
    type Error = WorkerError;

    fn try_from(reply: TaskReply) -> Result<Self, Self::Error> {
        let task_type = TaskType::try_from(reply.task_type)
            .map_err(|_| WorkerError::MalformedReply(format!("task type {}", reply.task_type)))?;
        let needs_buckets = matches!(task_type, TaskType::Map | TaskType::Reduce);
        if needs_buckets && reply.n_reduce == 0 {
            return Err(WorkerError::MalformedReply("zero reduce buckets".into()));
        }
        Ok(match task_type {
            TaskType::Map => Assignment::Map {
                id: reply.task_id,
                input: reply.map_input,
                n_reduce: reply.n_reduce,
            },
            TaskType::Reduce => Assignment::Reduce {
                id: reply.task_id,
                inputs: reply.reduce_inputs,
                n_reduce: reply.n_reduce,
            },
            TaskType::Wait => Assignment::Wait,
            TaskType::Exit => Assignment::Exit,
        })
    }
}

impl From<Progress> for StatusReply {
    fn from(p: Progress) -> Self {
        StatusReply {
            done: p.done,
            n_map: p.n_map,
            maps_done: p.maps_done,
            n_reduce: p.n_reduce,
            reduces_done: p.reduces_done,
            idle: p.idle,
            running: p.running,
        }
    }
}

/////////////////////////////////////////////////////////////////////////////
// Transport
/////////////////////////////////////////////////////////////////////////////

/// Open a channel to the coordinator listening on the Unix socket at `path`.
pub async fn connect(path: &Path) -> Result<CoordinatorClient<Channel>, WorkerError> {
    let socket: PathBuf = path.to_path_buf();
    let unreachable = |source| WorkerError::Unreachable {
        path: path.display().to_string(),
        source,
    };
    // The URI is required by the endpoint but never dialled.
    let channel = Endpoint::try_from("http://[::]:50051")
        .map_err(unreachable)?
        .connect_with_connector(service_fn(move |_: Uri| {
            UnixStream::connect(socket.clone())
        }))
        .await
        .map_err(unreachable)?;
    Ok(CoordinatorClient::new(channel))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignments_cross_the_wire_intact() {
        let cases = vec![
            Assignment::Map {
                id: 4,
                input: "pg-1.txt".into(),
                n_reduce: 3,
            },
            Assignment::Reduce {
                id: 2,
                inputs: vec!["mr-0-2".into(), "mr-1-2".into()],
                n_reduce: 3,
            },
            Assignment::Reduce {
                id: 0,
                inputs: vec![],
                n_reduce: 1,
            },
            Assignment::Wait,
            Assignment::Exit,
        ];
        for assignment in cases {
            let reply = TaskReply::from(assignment.clone());
            assert_eq!(Assignment::try_from(reply).unwrap(), assignment);
        }
    }

    #[test]
    fn unknown_task_type_is_malformed() {
        let reply = TaskReply {
            task_type: 9,
            ..TaskReply::default()
        };
        assert!(matches!(
            Assignment::try_from(reply),
            Err(WorkerError::MalformedReply(_))
        ));
    }

    #[test]
    fn map_without_buckets_is_malformed() {
        let reply = TaskReply {
            task_type: TaskType::Map as i32,
            map_input: "x".into(),
            ..TaskReply::default()
        };
        assert!(Assignment::try_from(reply).is_err());
    }

    #[test]
    fn only_map_and_reduce_can_be_reported() {
        assert_eq!(TaskKind::try_from(TaskType::Map as i32), Ok(TaskKind::Map));
        assert_eq!(TaskKind::try_from(TaskType::Reduce as i32), Ok(TaskKind::Reduce));
        assert_eq!(
            TaskKind::try_from(TaskType::Exit as i32),
            Err(SchedulerError::InvalidTaskKind(3))
        );
        assert_eq!(
            TaskKind::try_from(42),
            Err(SchedulerError::InvalidTaskKind(42))
        );
    }
}
