//! The coordinator's record of every task and of overall job progress.
//!
//! The ledger is a plain synchronous state machine. It does no locking and no
//! I/O, and takes the current time as an argument; the service wraps it in a
//! single mutex and is the only thing that touches it.

use std::collections::BTreeSet;
use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::SchedulerError;
use crate::files;

/// The phase a task belongs to. Task ids are only unique within a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskKind {
    Map,
    Reduce,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Map => f.write_str("map"),
            TaskKind::Reduce => f.write_str("reduce"),
        }
    }
}

/// What a task consumes. Fixed once the task exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// One input source file.
    Map { input: String },
    /// Every intermediate file destined for this bucket, possibly none.
    Reduce { inputs: Vec<String> },
}

/// Lifecycle of a task.
///
/// `Idle -> Running -> Completed`, with `Running -> Idle` when a worker
/// overstays the timeout. `Completed` is terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskState {
    Idle,
    Running { worker: String, since: Instant },
    Completed,
}

#[derive(Debug, Clone)]
pub struct Task {
    pub id: u32,
    pub payload: Payload,
    pub state: TaskState,
}

impl Task {
    fn idle(id: u32, payload: Payload) -> Self {
        Self {
            id,
            payload,
            state: TaskState::Idle,
        }
    }

    pub fn kind(&self) -> TaskKind {
        match self.payload {
            Payload::Map { .. } => TaskKind::Map,
            Payload::Reduce { .. } => TaskKind::Reduce,
        }
    }
}

/// The coordinator's answer to a worker asking for work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assignment {
    Map { id: u32, input: String, n_reduce: u32 },
    Reduce { id: u32, inputs: Vec<String>, n_reduce: u32 },
    /// Nothing is idle right now; ask again later.
    Wait,
    /// The job is finished.
    Exit,
}

/// Result of recording a completion report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The task moved into `Completed` and was counted.
    Recorded,
    /// The task was already `Completed`; nothing was counted.
    Duplicate,
}

/// Snapshot of job progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    pub n_map: u32,
    pub maps_done: u32,
    pub n_reduce: u32,
    pub reduces_done: u32,
    pub idle: u32,
    pub running: u32,
    pub done: bool,
}

#[derive(Debug)]
pub struct Ledger {
    n_reduce: u32,
    task_timeout: Duration,
    map_tasks: Vec<Task>,
    /// Empty until every map task has completed.
    reduce_tasks: Vec<Task>,
    intermediate: BTreeSet<String>,
    maps_done: u32,
    reduces_done: u32,
    done: bool,
}

impl Ledger {
    /// Create one idle map task per input, with ids in input order.
    pub fn new(
        inputs: Vec<String>,
        n_reduce: u32,
        task_timeout: Duration,
    ) -> Result<Self, SchedulerError> {
        if n_reduce == 0 {
            return Err(SchedulerError::NoReduceBuckets);
        }
        let map_tasks = inputs
            .into_iter()
            .zip(0u32..)
            .map(|(input, id)| Task::idle(id, Payload::Map { input }))
            .collect();
        let mut ledger = Self {
            n_reduce,
            task_timeout,
            map_tasks,
            reduce_tasks: Vec::new(),
            intermediate: BTreeSet::new(),
            maps_done: 0,
            reduces_done: 0,
            done: false,
        };
        if ledger.map_tasks.is_empty() {
            ledger.start_reduce();
        }
        Ok(ledger)
    }

    pub fn n_reduce(&self) -> u32 {
        self.n_reduce
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn task(&self, kind: TaskKind, id: u32) -> Option<&Task> {
        self.tasks(kind).get(id as usize)
    }

    pub fn progress(&self) -> Progress {
        let mut progress = Progress {
            n_map: self.map_tasks.len() as u32,
            maps_done: self.maps_done,
            n_reduce: self.n_reduce,
            reduces_done: self.reduces_done,
            done: self.done,
            ..Progress::default()
        };
        for task in self.map_tasks.iter().chain(&self.reduce_tasks) {
            match task.state {
                TaskState::Idle => progress.idle += 1,
                TaskState::Running { .. } => progress.running += 1,
                TaskState::Completed => {}
            }
        }
        progress
    }

    /// Hand the first idle task to `worker`, or tell it to wait or exit.
    pub fn request_task(&mut self, worker: &str, now: Instant) -> Assignment {
        if self.done {
            return Assignment::Exit;
        }
        let n_reduce = self.n_reduce;
        let Some(task) = self
            .map_tasks
            .iter_mut()
            .chain(self.reduce_tasks.iter_mut())
            .find(|t| t.state == TaskState::Idle)
        else {
            debug!(worker, "no idle task");
            return Assignment::Wait;
        };

        task.state = TaskState::Running {
            worker: worker.to_string(),
            since: now,
        };
        info!(worker, kind = %task.kind(), id = task.id, "assigned task");
        match &task.payload {
            Payload::Map { input } => Assignment::Map {
                id: task.id,
                input: input.clone(),
                n_reduce,
            },
            Payload::Reduce { inputs } => Assignment::Reduce {
                id: task.id,
                inputs: inputs.clone(),
                n_reduce,
            },
        }
    }

    /// Record that `worker` finished task `kind`/`id`.
    ///
    /// A report for a task that is already completed, for example from a
    /// straggler whose task was reassigned, is accepted but not counted
    /// again. Invalid reports leave the ledger untouched.
    pub fn report_done(
        &mut self,
        worker: &str,
        kind: TaskKind,
        id: u32,
        produced: Vec<String>,
    ) -> Result<Completion, SchedulerError> {
        if kind == TaskKind::Map {
            if let Some(name) = produced.iter().find(|name| !self.is_own_bucket_file(id, name)) {
                return Err(SchedulerError::MalformedIntermediateName {
                    name: name.clone(),
                    n_reduce: self.n_reduce,
                });
            }
        }

        let task = self
            .tasks_mut(kind)
            .get_mut(id as usize)
            .ok_or(SchedulerError::TaskNotFound { kind, id })?;
        if let TaskState::Running { worker: holder, .. } = &task.state {
            if holder != worker {
                warn!(worker, holder = %holder, %kind, id, "completion from a worker that no longer holds the task");
            }
        }
        let previous = std::mem::replace(&mut task.state, TaskState::Completed);

        if kind == TaskKind::Map {
            self.intermediate.extend(produced);
        }
        if previous == TaskState::Completed {
            debug!(worker, %kind, id, "duplicate completion ignored");
            return Ok(Completion::Duplicate);
        }

        info!(worker, %kind, id, "task completed");
        match kind {
            TaskKind::Map => {
                self.maps_done += 1;
                if self.maps_done as usize == self.map_tasks.len() {
                    self.start_reduce();
                }
            }
            TaskKind::Reduce => self.reduces_done += 1,
        }
        if !self.reduce_tasks.is_empty()
            && self.maps_done as usize == self.map_tasks.len()
            && self.reduces_done as usize == self.reduce_tasks.len()
        {
            self.done = true;
            info!("job complete");
        }
        Ok(Completion::Recorded)
    }

    /// Return every running task older than the timeout to `Idle`.
    ///
    /// Returns the tasks that were reclaimed.
    pub fn reclaim_stalled(&mut self, now: Instant) -> Vec<(TaskKind, u32)> {
        let timeout = self.task_timeout;
        let mut reclaimed = Vec::new();
        for task in self.map_tasks.iter_mut().chain(self.reduce_tasks.iter_mut()) {
            if let TaskState::Running { worker, since } = &task.state {
                if now.saturating_duration_since(*since) > timeout {
                    warn!(worker = %worker, kind = %task.kind(), id = task.id, "task timed out, reclaiming");
                    reclaimed.push((task.kind(), task.id));
                    task.state = TaskState::Idle;
                }
            }
        }
        reclaimed
    }

    /// Build the reduce tasks from the intermediate files seen so far.
    fn start_reduce(&mut self) {
        debug_assert!(self.reduce_tasks.is_empty());
        let mut per_bucket = vec![Vec::new(); self.n_reduce as usize];
        for name in &self.intermediate {
            let bucket = files::parse_intermediate_name(name).map(|(_, b)| b as usize);
            if let Some(inputs) = bucket.and_then(|b| per_bucket.get_mut(b)) {
                inputs.push(name.clone());
            }
        }
        self.reduce_tasks = per_bucket
            .into_iter()
            .zip(0u32..)
            .map(|(inputs, id)| Task::idle(id, Payload::Reduce { inputs }))
            .collect();
        info!(
            n_reduce = self.n_reduce,
            n_files = self.intermediate.len(),
            "all map tasks done, starting reduce phase"
        );
    }

    /// Whether `name` is exactly `mr-<map_id>-<b>` for some bucket `b < N`.
    fn is_own_bucket_file(&self, map_id: u32, name: &str) -> bool {
        match files::parse_intermediate_name(name) {
            Some((_, bucket)) => {
                bucket < self.n_reduce && name == files::intermediate_name(map_id, bucket)
            }
            None => false,
        }
    }

    fn tasks(&self, kind: TaskKind) -> &[Task] {
        match kind {
            TaskKind::Map => &self.map_tasks,
            TaskKind::Reduce => &self.reduce_tasks,
        }
    }

    fn tasks_mut(&mut self, kind: TaskKind) -> &mut Vec<Task> {
        match kind {
            TaskKind::Map => &mut self.map_tasks,
            TaskKind::Reduce => &mut self.reduce_tasks,
        }
    }
}
