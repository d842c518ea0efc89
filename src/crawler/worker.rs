//! Crawl thread pool
//!
//! Each crawl thread:
//! - Pulls a URL from the shared frontier (blocking while it is empty)
//! - Drops URLs that point at another server
//! - Fetches the page and saves it under the save directory
//! - Extracts links from the saved page and queues the unseen ones
//!
//! A thread exits only when the terminate flag is observed, either while
//! waiting for work or after finishing the URL in hand.

use super::fetch;
use super::links::{self, Target};
use super::state::CrawlState;
use crate::config::CrawlConfig;
use crate::error::{CrawlOutcome, CrawlerError};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, trace, warn};

/// Per-thread counters
#[derive(Debug, Default)]
pub struct CrawlerStats {
    pub saved: AtomicU64,
    pub skipped: AtomicU64,
    pub failed: AtomicU64,
}

impl CrawlerStats {
    fn record(&self, outcome: &CrawlOutcome) {
        let counter = match outcome {
            CrawlOutcome::Saved { .. } => &self.saved,
            CrawlOutcome::Skipped { .. } => &self.skipped,
            CrawlOutcome::Failed { .. } => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Totals across the pool after it has been joined
#[derive(Debug, Default, Clone, Copy)]
pub struct PoolSummary {
    pub saved: u64,
    pub skipped: u64,
    pub failed: u64,
}

struct CrawlThread {
    id: usize,
    handle: Option<JoinHandle<()>>,
    stats: Arc<CrawlerStats>,
}

/// The crawl threads
pub struct CrawlWorkerPool {
    threads: Vec<CrawlThread>,
}

impl CrawlWorkerPool {
    /// Start `config.threads` crawl threads
    ///
    /// The frontier should already hold the starting URL.
    pub fn spawn(
        config: Arc<CrawlConfig>,
        target: Arc<Target>,
        state: Arc<CrawlState>,
    ) -> Result<Self, CrawlerError> {
        let mut threads = Vec::with_capacity(config.threads);

        for id in 0..config.threads {
            let stats = Arc::new(CrawlerStats::default());
            let ctx = CrawlContext {
                id,
                config: Arc::clone(&config),
                target: Arc::clone(&target),
                state: Arc::clone(&state),
                stats: Arc::clone(&stats),
            };

            let handle = thread::Builder::new()
                .name(format!("crawler-{}", id))
                .spawn(move || ctx.run())
                .map_err(|e| {
                    // threads already started must not wait forever
                    state.terminate();
                    CrawlerError::ThreadSpawn {
                        id,
                        reason: e.to_string(),
                    }
                })?;

            threads.push(CrawlThread {
                id,
                handle: Some(handle),
                stats,
            });
        }

        info!(threads = threads.len(), "Crawl pool started");
        Ok(Self { threads })
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// Wait for every thread; callers terminate the state first
    pub fn join(mut self) -> PoolSummary {
        let mut summary = PoolSummary::default();
        for thread in &mut self.threads {
            if let Some(handle) = thread.handle.take() {
                if handle.join().is_err() {
                    warn!(worker = thread.id, "{}", CrawlerError::Panicked { id: thread.id });
                }
            }
            summary.saved += thread.stats.saved.load(Ordering::Relaxed);
            summary.skipped += thread.stats.skipped.load(Ordering::Relaxed);
            summary.failed += thread.stats.failed.load(Ordering::Relaxed);
        }
        summary
    }
}

struct CrawlContext {
    id: usize,
    config: Arc<CrawlConfig>,
    target: Arc<Target>,
    state: Arc<CrawlState>,
    stats: Arc<CrawlerStats>,
}

impl CrawlContext {
    fn run(self) {
        debug!(worker = self.id, "Crawl thread starting");

        while let Some(url) = self.state.next_url() {
            let outcome = self.crawl(&url);
            self.stats.record(&outcome);

            match &outcome {
                CrawlOutcome::Saved {
                    path,
                    bytes,
                    new_links,
                } => {
                    debug!(worker = self.id, path = %path, bytes, new_links, "Saved page");
                }
                CrawlOutcome::Skipped { url, reason } => {
                    debug!(worker = self.id, url = %url, reason = %reason, "Skipped URL");
                }
                CrawlOutcome::Failed { url, error } => {
                    let reason = match error {
                        CrawlerError::Fetch(e) => e.reason_code(),
                        _ => "io",
                    };
                    warn!(worker = self.id, url = %url, reason, error = %error, "Failed to crawl URL");
                }
            }
        }

        debug!(worker = self.id, "Crawl thread exiting");
    }

    fn crawl(&self, url: &str) -> CrawlOutcome {
        let path = match links::classify(url, &self.target) {
            Ok(path) => path,
            Err(url) => {
                return CrawlOutcome::Skipped {
                    url,
                    reason: "foreign server".into(),
                }
            }
        };

        let Some(destination) = destination(&self.config.save_dir, &path) else {
            return CrawlOutcome::Skipped {
                url: path,
                reason: "path escapes save directory".into(),
            };
        };

        let page = match fetch::fetch(&self.target, &path, self.config.fetch_timeout) {
            Ok(page) => page,
            Err(e) => {
                return CrawlOutcome::Failed {
                    url: path,
                    error: e.into(),
                }
            }
        };

        if let Err(e) = self.save(&destination, &page.body) {
            return CrawlOutcome::Failed {
                url: path,
                error: e.into(),
            };
        }
        self.state.record_page(page.body.len() as u64);

        let html = String::from_utf8_lossy(&page.body);
        let found = links::extract_links(&html, &path, &self.target);
        trace!(worker = self.id, path = %path, links = found.len(), "Extracted links");
        let new_links = self.state.offer_links(found);

        CrawlOutcome::Saved {
            path,
            bytes: page.body.len(),
            new_links,
        }
    }

    /// Write the page, creating and registering its site directory first
    fn save(&self, destination: &Path, body: &[u8]) -> std::io::Result<()> {
        if let Some(dir) = destination.parent() {
            fs::create_dir_all(dir)?;
            if dir != self.config.save_dir.as_path() {
                let dir_str = dir.to_string_lossy();
                if self.state.register_directory(&dir_str) {
                    info!(worker = self.id, dir = %dir_str, "New site directory");
                }
            }
        }
        fs::write(destination, body)
    }
}

/// File path for a root-relative URL path
///
/// Returns `None` for paths that would leave the save directory.
pub fn destination(save_dir: &Path, url_path: &str) -> Option<PathBuf> {
    let relative = Path::new(url_path.trim_start_matches('/'));
    if relative.as_os_str().is_empty() {
        return None;
    }
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }
    Some(save_dir.join(relative))
}
