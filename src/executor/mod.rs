//! Multi-process indexing: the job executor and its index workers
//!
//! The coordinator (`job-executor` binary) splits the crawled site
//! directories into shards, starts one `index-worker` process per shard and
//! talks to each over a pair of named pipes using the records defined in
//! [`crate::protocol`].

pub mod aggregate;
pub mod command;
pub mod coordinator;
pub mod fifo;
pub mod query_log;
pub mod render;
pub mod shard;
pub mod signals;
pub mod slot;
pub mod worker;

pub use command::Command;
pub use coordinator::{CoordinatorSummary, IndexCoordinator};
pub use slot::{SlotState, WorkerProgram, WorkerSlot};
pub use worker::{IndexWorker, WorkerSummary};
