//! A fault-tolerant MapReduce coordinator and its workers.
//!
//! A single coordinator hands out map tasks and then reduce tasks to short-lived
//! worker processes over gRPC. Workers exchange data only through a shared
//! directory, publishing every file with a write-then-rename so readers never
//! see a partial file. A worker that crashes or stalls is noticed only because
//! its task times out, after which the task is handed to someone else.

use serde::{Deserialize, Serialize};
use std::hash::Hasher;
use std::time::Duration;

pub mod cmd;
pub mod codec;
pub mod coordinator;
pub mod error;
pub mod files;
pub mod rpc;
pub mod standalone;
pub mod utils;
pub mod worker;
pub mod workload;

/// How long a task may stay running before it is handed to another worker.
pub const TASK_TIMEOUT: Duration = Duration::from_secs(10);

/// How often the coordinator scans for stalled tasks.
pub const TIMEOUT_SCAN_INTERVAL: Duration = Duration::from_millis(500);

/// How long a worker sleeps after being told to wait.
pub const WAIT_BACKOFF: Duration = Duration::from_secs(1);

/// Number of reduce buckets when none is given.
pub const DEFAULT_N_REDUCE: u32 = 10;

/////////////////////////////////////////////////////////////////////////////
// MapReduce application types
/////////////////////////////////////////////////////////////////////////////

/// A map function takes the name of an input source and its full contents.
///
/// It returns every intermediate key-value pair emitted for that input.
pub type MapFn = fn(source: &str, contents: &str) -> anyhow::Result<Vec<KeyValue>>;

/// A reduce function takes in a key and all values emitted for that key,
/// and returns a single output value.
pub type ReduceFn = fn(key: &str, values: &[String]) -> anyhow::Result<String>;

/// A map reduce application.
#[derive(Copy, Clone)]
pub struct Workload {
    pub map_fn: MapFn,
    pub reduce_fn: ReduceFn,
}

/////////////////////////////////////////////////////////////////////////////
// Key-value pairs
/////////////////////////////////////////////////////////////////////////////

/// A single key-value pair.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub struct KeyValue {
    /// The key.
    pub key: String,
    /// The value.
    pub value: String,
}

impl KeyValue {
    /// Construct a new key-value pair from the given key and value.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Consumes the key-value pair and returns the value.
    #[inline]
    pub fn into_value(self) -> String {
        self.value
    }
}

/// Hashes an intermediate key. Compute a reduce bucket for a given key
/// by calculating `ihash(key) % n_reduce`.
///
/// FNV-1a is used with its standard offset basis so every worker process
/// agrees on the bucket of a key, unlike the randomly seeded std hasher.
pub fn ihash(key: &[u8]) -> u32 {
    let mut hasher = fnv::FnvHasher::default();
    hasher.write(key);
    (hasher.finish() & 0x7fff_ffff) as u32
}

/// Compute the reduce bucket for a given key: `ihash(key) % n_reduce`.
///
/// `n_reduce` must be non-zero.
#[inline]
pub fn bucket_for(key: &str, n_reduce: u32) -> u32 {
    ihash(key.as_bytes()) % n_reduce
}
