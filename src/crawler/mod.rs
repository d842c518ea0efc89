//! Multi-threaded site crawler
//!
//! This module contains the crawler process:
//! - [`frontier`] / [`history`]: pending URLs and already-seen strings
//! - [`state`]: the shared frontier lock, counters and completion latch
//! - [`worker`]: the crawl thread pool
//! - [`monitor`]: quiescence detection and job executor hand-off
//! - [`server`]: the TCP command port

pub mod executor_link;
pub mod fetch;
pub mod frontier;
pub mod history;
pub mod links;
pub mod monitor;
pub mod server;
pub mod state;
pub mod worker;

pub use executor_link::{ExecutorLaunch, ExecutorLink};
pub use frontier::UrlFrontier;
pub use history::VisitedSet;
pub use links::{Link, Target};
pub use monitor::{CompletionMonitor, MonitorReport, Pipeline};
pub use server::CommandServer;
pub use state::{Completion, CrawlState, CrawlStats};
pub use worker::CrawlWorkerPool;
