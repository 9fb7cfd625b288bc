//! Command-line arguments for the binaries under `src/app`.

pub mod coordinator;
pub mod ctl;
pub mod worker;
