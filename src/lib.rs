//! webcrawler - Site Crawler with a Multi-Process Query Engine
//!
//! Crawls every page reachable from a starting URL on one HTTP server,
//! saves the pages under a local directory, then indexes the saved site
//! directories across a pool of worker processes that answer keyword
//! queries.
//!
//! # Features
//!
//! - **Parallel Crawling**: A fixed pool of threads shares one FIFO
//!   frontier; the crawl ends when every thread is idle and the frontier
//!   is empty.
//!
//! - **Sharded Indexing**: The job executor splits site directories
//!   round-robin over index worker processes, each holding a trie-based
//!   inverted index of its shard.
//!
//! - **Resilient Queries**: Dead workers are replaced between commands;
//!   `/search` is bounded by a deadline after which slow workers are
//!   cancelled.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                         HTTP Server                            │
//! └──────────────────────────────┬────────────────────────────────┘
//!                                │ GET (HTTP/1.1, Connection: Close)
//!                                ▼
//! ┌───────────────────────────────────────────────────────────────┐
//! │  webcrawler                                                    │
//! │  ┌─────────┐ ┌─────────┐        ┌─────────┐                    │
//! │  │Thread 1 │ │Thread 2 │  ...   │Thread N │                    │
//! │  └────┬────┘ └────┬────┘        └────┬────┘                    │
//! │       └───────────┼──────────────────┘                         │
//! │                   ▼                                            │
//! │       ┌──────────────────────┐     ┌────────────────────┐      │
//! │       │ Frontier + history   │     │ Command port (TCP) │      │
//! │       │ (quiescence latch)   │     │ STATS / SEARCH ... │      │
//! │       └──────────┬───────────┘     └─────────┬──────────┘      │
//! │                  ▼ idle                      │                 │
//! │       ┌──────────────────────┐               │                 │
//! │       │ Completion monitor   │───────────────┘                 │
//! │       └──────────┬───────────┘                                 │
//! └──────────────────┼────────────────────────────────────────────┘
//!                    │ stdin: directories, commands / stdout: READY, answers
//!                    ▼
//! ┌───────────────────────────────────────────────────────────────┐
//! │  job-executor                                                  │
//! │      ┌────────────┐   ┌────────────┐        ┌────────────┐     │
//! │      │ req0 ans0  │   │ req1 ans1  │  ...   │ reqK ansK  │ FIFOs
//! │      └─────┬──────┘   └─────┬──────┘        └─────┬──────┘     │
//! └────────────┼────────────────┼─────────────────────┼───────────┘
//!              ▼                ▼                     ▼
//!        index-worker     index-worker          index-worker
//!        (trie + docs)    (trie + docs)         (trie + docs)
//! ```
//!
//! # Example
//!
//! ```bash
//! # Crawl and serve queries on port 9090
//! webcrawler -h localhost -p 8080 -c 9090 -t 8 -d ./save /site1/index.html
//!
//! # Query once the crawl has finished
//! echo 'SEARCH apple pie' | nc localhost 9090
//! echo 'MAXCOUNT apple' | nc localhost 9090
//! ```

pub mod config;
pub mod crawler;
pub mod error;
pub mod executor;
pub mod index;
pub mod logging;
pub mod progress;
pub mod protocol;

pub use config::{CrawlConfig, CrawlerArgs, ExecutorConfig, WorkerConfig};
pub use error::{CrawlerError, Result};
pub use executor::{IndexCoordinator, IndexWorker};
