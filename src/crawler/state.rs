//! Shared crawl state
//!
//! One [`CrawlState`] is shared by every crawl thread, the completion
//! monitor and the command port. It owns:
//! - the frontier, the blocked-thread count and the terminate flag, all under
//!   one mutex with a condition variable for "work available"
//! - the URL history and the set of site directories
//! - page/byte counters under their own lock
//! - the completion latch the monitor sleeps on

use super::frontier::UrlFrontier;
use super::history::VisitedSet;
use super::links::Link;
use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Why crawling stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Frontier empty and every crawl thread idle
    Quiescent,
    /// Shutdown requested from outside
    Forced,
}

#[derive(Debug, Default)]
struct LatchState {
    quiescent: bool,
    forced: bool,
}

/// One-shot completion latch
///
/// Setting either flag wakes the waiter; once set, a flag stays set.
#[derive(Debug, Default)]
pub struct CompletionLatch {
    state: Mutex<LatchState>,
    changed: Condvar,
}

impl CompletionLatch {
    pub fn new() -> Self {
        Self::default()
    }

    fn signal_quiescent(&self) {
        let mut state = self.state.lock();
        state.quiescent = true;
        self.changed.notify_all();
    }

    /// Request completion regardless of crawl progress
    pub fn force(&self) {
        let mut state = self.state.lock();
        state.forced = true;
        self.changed.notify_all();
    }

    fn current(state: &LatchState) -> Option<Completion> {
        if state.forced {
            Some(Completion::Forced)
        } else if state.quiescent {
            Some(Completion::Quiescent)
        } else {
            None
        }
    }

    /// Block until quiescence or a forced stop
    pub fn wait(&self) -> Completion {
        let mut state = self.state.lock();
        loop {
            if let Some(done) = Self::current(&state) {
                return done;
            }
            self.changed.wait(&mut state);
        }
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Completion> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(done) = Self::current(&state) {
                return Some(done);
            }
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                return Self::current(&state);
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        Self::current(&self.state.lock()).is_some()
    }

    pub fn is_quiescent(&self) -> bool {
        self.state.lock().quiescent
    }
}

#[derive(Debug, Default)]
struct FrontierState {
    queue: UrlFrontier,
    blocked: usize,
    terminating: bool,
}

/// Pages and bytes downloaded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlStats {
    pub pages: u64,
    pub bytes: u64,
}

/// Point-in-time view for progress display
#[derive(Debug, Clone, Copy, Default)]
pub struct CrawlProgress {
    pub stats: CrawlStats,
    pub frontier_len: usize,
    pub blocked: usize,
    pub pool_size: usize,
    pub directories: usize,
}

/// State shared by the crawl pool, the monitor and the command port
#[derive(Debug)]
pub struct CrawlState {
    frontier: Mutex<FrontierState>,
    work_available: Condvar,
    history: VisitedSet,
    directories: VisitedSet,
    stats: Mutex<CrawlStats>,
    completion: CompletionLatch,
    pool_size: usize,
}

impl CrawlState {
    pub fn new(pool_size: usize) -> Self {
        Self {
            frontier: Mutex::new(FrontierState::default()),
            work_available: Condvar::new(),
            history: VisitedSet::new(),
            directories: VisitedSet::new(),
            stats: Mutex::new(CrawlStats::default()),
            completion: CompletionLatch::new(),
            pool_size,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Queue the starting URL; call before the pool starts
    pub fn seed(&self, url: &str) {
        let mut frontier = self.frontier.lock();
        if self.history.add(url) {
            frontier.queue.push(url.to_string());
            self.work_available.notify_one();
        }
    }

    /// Next URL for a crawl thread, or `None` once terminating
    ///
    /// An idle thread counts itself as blocked before waiting. The thread
    /// that makes every pool member blocked while the frontier is empty
    /// raises quiescence; this happens under the frontier lock, so no push
    /// can slip in between the check and the signal.
    pub fn next_url(&self) -> Option<String> {
        let mut frontier = self.frontier.lock();
        while frontier.queue.is_empty() && !frontier.terminating {
            frontier.blocked += 1;
            if frontier.blocked == self.pool_size {
                self.completion.signal_quiescent();
            }
            self.work_available.wait(&mut frontier);
            frontier.blocked -= 1;
        }

        if frontier.terminating {
            return None;
        }
        frontier.queue.pop()
    }

    /// Queue newly discovered links; returns how many were queued
    ///
    /// The history check and the push happen under the frontier lock so two
    /// threads cannot both queue the same link. Local links are recorded in
    /// the history; foreign links are queued unrecorded and dropped when
    /// popped.
    pub fn offer_links(&self, links: Vec<Link>) -> usize {
        let mut frontier = self.frontier.lock();
        let mut queued = 0;
        for link in links {
            let fresh = match &link {
                Link::Local(path) => self.history.add(path),
                Link::Foreign(url) => !self.history.contains(url),
            };
            if fresh {
                frontier.queue.push(link.into_string());
                self.work_available.notify_one();
                queued += 1;
            }
        }
        queued
    }

    /// Stop every crawl thread at its next check
    pub fn terminate(&self) {
        let mut frontier = self.frontier.lock();
        frontier.terminating = true;
        self.work_available.notify_all();
    }

    pub fn is_terminating(&self) -> bool {
        self.frontier.lock().terminating
    }

    pub fn record_page(&self, bytes: u64) {
        let mut stats = self.stats.lock();
        stats.pages += 1;
        stats.bytes += bytes;
    }

    pub fn stats(&self) -> CrawlStats {
        *self.stats.lock()
    }

    /// Register a site directory; returns true the first time
    pub fn register_directory(&self, dir: &str) -> bool {
        self.directories.add(dir)
    }

    pub fn directories(&self) -> Vec<String> {
        self.directories.snapshot()
    }

    pub fn history(&self) -> &VisitedSet {
        &self.history
    }

    pub fn completion(&self) -> &CompletionLatch {
        &self.completion
    }

    pub fn progress(&self) -> CrawlProgress {
        let (frontier_len, blocked) = {
            let frontier = self.frontier.lock();
            (frontier.queue.len(), frontier.blocked)
        };
        CrawlProgress {
            stats: self.stats(),
            frontier_len,
            blocked,
            pool_size: self.pool_size,
            directories: self.directories.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_seed_then_pop() {
        let state = CrawlState::new(1);
        state.seed("/site1/index.html");
        state.seed("/site1/index.html");
        assert_eq!(state.next_url().as_deref(), Some("/site1/index.html"));
        assert_eq!(state.history().len(), 1);
    }

    #[test]
    fn test_offer_links_deduplicates_local() {
        let state = CrawlState::new(1);
        let queued = state.offer_links(vec![
            Link::Local("/site1/a.html".into()),
            Link::Local("/site1/a.html".into()),
            Link::Foreign("http://elsewhere:80/x.html".into()),
        ]);
        assert_eq!(queued, 2);
        assert_eq!(state.history().len(), 1);

        // foreign links are never recorded, so they can be offered again
        assert_eq!(
            state.offer_links(vec![Link::Foreign("http://elsewhere:80/x.html".into())]),
            1
        );
    }

    #[test]
    fn test_quiescence_when_all_threads_idle() {
        let state = Arc::new(CrawlState::new(3));
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let state = Arc::clone(&state);
                thread::spawn(move || while state.next_url().is_some() {})
            })
            .collect();

        assert_eq!(
            state.completion().wait_timeout(Duration::from_secs(5)),
            Some(Completion::Quiescent)
        );
        state.terminate();
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn test_not_quiescent_while_work_pending() {
        let state = CrawlState::new(2);
        state.seed("/a");
        assert_eq!(state.next_url().as_deref(), Some("/a"));
        assert!(!state.completion().is_complete());
    }

    #[test]
    fn test_force_wins_over_quiescence() {
        let latch = CompletionLatch::new();
        latch.signal_quiescent();
        latch.force();
        assert_eq!(latch.wait(), Completion::Forced);
        assert!(latch.is_quiescent());
    }

    #[test]
    fn test_terminate_releases_waiters() {
        let state = Arc::new(CrawlState::new(2));
        let waiter = {
            let state = Arc::clone(&state);
            thread::spawn(move || state.next_url())
        };
        thread::sleep(Duration::from_millis(50));
        state.terminate();
        assert_eq!(waiter.join().unwrap(), None);
        assert!(state.is_terminating());
    }

    #[test]
    fn test_stats_and_directories() {
        let state = CrawlState::new(1);
        state.record_page(100);
        state.record_page(50);
        assert_eq!(state.stats(), CrawlStats { pages: 2, bytes: 150 });

        assert!(state.register_directory("/save/site2"));
        assert!(state.register_directory("/save/site1"));
        assert!(!state.register_directory("/save/site1"));
        assert_eq!(state.directories(), vec!["/save/site1", "/save/site2"]);
    }
}
