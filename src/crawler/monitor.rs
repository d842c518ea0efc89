//! Completion monitor
//!
//! One thread sleeps on the completion latch. When the crawl goes quiescent
//! (or a shutdown is forced) it:
//! 1. raises the terminate flag and wakes every idle crawl thread
//! 2. joins the crawl pool
//! 3. on quiescence with at least one site directory, launches the job
//!    executor and publishes it as ready for queries

use super::executor_link::{ExecutorLaunch, ExecutorLink};
use super::state::{Completion, CrawlState};
use super::worker::{CrawlWorkerPool, PoolSummary};
use crate::error::CrawlerError;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Terminal width reported when stdout is not a terminal
pub const DEFAULT_TERMINAL_WIDTH: usize = 120;

/// Where the query pipeline stands
pub enum PipelineState {
    /// Still crawling, or launching the executor
    Pending,
    /// Executor up and accepting commands
    Ready(ExecutorLink),
    /// No executor will be started
    Unavailable(String),
}

/// Query pipeline shared with the command port
pub struct Pipeline {
    state: Mutex<PipelineState>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PipelineState::Pending),
        }
    }

    fn publish(&self, state: PipelineState) {
        *self.state.lock() = state;
    }

    pub fn is_ready(&self) -> bool {
        matches!(*self.state.lock(), PipelineState::Ready(_))
    }

    pub fn is_pending(&self) -> bool {
        matches!(*self.state.lock(), PipelineState::Pending)
    }

    /// Run `f` against the executor if it is ready
    pub fn with_executor<R>(&self, f: impl FnOnce(&mut ExecutorLink) -> R) -> Option<R> {
        match &mut *self.state.lock() {
            PipelineState::Ready(link) => Some(f(link)),
            _ => None,
        }
    }

    /// Take the executor out for shutdown
    pub fn take_executor(&self) -> Option<ExecutorLink> {
        let previous = std::mem::replace(
            &mut *self.state.lock(),
            PipelineState::Unavailable("shut down".into()),
        );
        match previous {
            PipelineState::Ready(link) => Some(link),
            _ => None,
        }
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// What the monitor saw
#[derive(Debug, Clone)]
pub struct MonitorReport {
    pub completion: Completion,
    pub pool: PoolSummary,
    pub directories: Vec<String>,
    pub crawl_time: Duration,
    pub executor_started: bool,
}

/// Handle to the monitor thread
pub struct CompletionMonitor {
    handle: Option<JoinHandle<MonitorReport>>,
}

impl CompletionMonitor {
    /// Start watching `state`; takes ownership of the pool to join it
    pub fn spawn(
        state: Arc<CrawlState>,
        pool: CrawlWorkerPool,
        launch: Option<ExecutorLaunch>,
        pipeline: Arc<Pipeline>,
    ) -> Result<Self, CrawlerError> {
        let started = Instant::now();
        let handle = thread::Builder::new()
            .name("crawl-monitor".into())
            .spawn(move || monitor(state, pool, launch, pipeline, started))
            .map_err(|e| CrawlerError::ThreadSpawn {
                id: usize::MAX,
                reason: e.to_string(),
            })?;
        Ok(Self {
            handle: Some(handle),
        })
    }

    /// Wait for the monitor to finish its hand-off
    pub fn join(mut self) -> Option<MonitorReport> {
        self.handle.take().and_then(|h| h.join().ok())
    }
}

/// Width of the controlling terminal
pub fn terminal_width() -> usize {
    console::Term::stdout()
        .size_checked()
        .map(|(_rows, cols)| cols as usize)
        .unwrap_or(DEFAULT_TERMINAL_WIDTH)
}

fn monitor(
    state: Arc<CrawlState>,
    pool: CrawlWorkerPool,
    launch: Option<ExecutorLaunch>,
    pipeline: Arc<Pipeline>,
    started: Instant,
) -> MonitorReport {
    let completion = state.completion().wait();
    let crawl_time = started.elapsed();
    info!(?completion, "Crawl finished, stopping crawl threads");

    state.terminate();
    let summary = pool.join();
    let directories = state.directories();
    let stats = state.stats();
    info!(
        pages = stats.pages,
        bytes = stats.bytes,
        failed = summary.failed,
        dirs = directories.len(),
        "Crawl threads joined"
    );

    let mut report = MonitorReport {
        completion,
        pool: summary,
        directories,
        crawl_time,
        executor_started: false,
    };

    if completion == Completion::Forced {
        pipeline.publish(PipelineState::Unavailable("shutdown requested".into()));
        return report;
    }
    if report.directories.is_empty() {
        info!("No site directories discovered, not starting the job executor");
        pipeline.publish(PipelineState::Unavailable(
            "no site directories were discovered".into(),
        ));
        return report;
    }
    let Some(launch) = launch else {
        pipeline.publish(PipelineState::Unavailable("job executor disabled".into()));
        return report;
    };

    match ExecutorLink::launch(&launch, terminal_width(), &report.directories) {
        Ok(link) => {
            info!(pid = link.pid(), "Job executor ready for queries");
            pipeline.publish(PipelineState::Ready(link));
            report.executor_started = true;
        }
        Err(e) => {
            error!(error = %e, "Failed to start job executor");
            pipeline.publish(PipelineState::Unavailable(e.to_string()));
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CrawlConfig;
    use crate::crawler::links::Target;
    use tempfile::tempdir;

    #[test]
    fn test_forced_completion_skips_executor() {
        let dir = tempdir().unwrap();
        let config = Arc::new(CrawlConfig::for_tests(dir.path(), 2));
        let target = Arc::new(Target {
            host: "127.0.0.1".into(),
            port: 1,
            addrs: vec!["127.0.0.1:1".parse().unwrap()],
        });
        let state = Arc::new(CrawlState::new(2));
        let pipeline = Arc::new(Pipeline::new());

        // nothing seeded: both threads go idle straight away, so force first
        state.completion().force();
        let pool = CrawlWorkerPool::spawn(config, target, Arc::clone(&state)).unwrap();
        let monitor =
            CompletionMonitor::spawn(Arc::clone(&state), pool, None, Arc::clone(&pipeline)).unwrap();

        let report = monitor.join().unwrap();
        assert_eq!(report.completion, Completion::Forced);
        assert!(!report.executor_started);
        assert!(!pipeline.is_ready());
        assert!(!pipeline.is_pending());
    }

    #[test]
    fn test_quiescent_without_directories() {
        let dir = tempdir().unwrap();
        let config = Arc::new(CrawlConfig::for_tests(dir.path(), 3));
        let target = Arc::new(Target {
            host: "127.0.0.1".into(),
            port: 1,
            addrs: vec!["127.0.0.1:1".parse().unwrap()],
        });
        let state = Arc::new(CrawlState::new(3));
        let pipeline = Arc::new(Pipeline::new());

        let pool = CrawlWorkerPool::spawn(config, target, Arc::clone(&state)).unwrap();
        let monitor =
            CompletionMonitor::spawn(Arc::clone(&state), pool, None, Arc::clone(&pipeline)).unwrap();

        let report = monitor.join().unwrap();
        assert_eq!(report.completion, Completion::Quiescent);
        assert!(report.directories.is_empty());
        assert!(pipeline.take_executor().is_none());
    }
}
