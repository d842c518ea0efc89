//! Configuration types for webcrawler
//!
//! This module defines:
//! - CLI argument parsing for the three binaries using clap derive macros
//! - Runtime configuration with validation
//! - Location of the helper programs installed next to the crawler

use crate::crawler::ExecutorLaunch;
use crate::error::ConfigError;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Maximum crawl threads
const MAX_THREADS: usize = 256;

/// Maximum index worker processes
const MAX_WORKERS: usize = 64;

/// Program name of the coordinator binary
pub const EXECUTOR_PROGRAM: &str = "job-executor";

/// Program name of the index worker binary
pub const WORKER_PROGRAM: &str = "index-worker";

/// Multi-threaded site crawler
#[derive(Parser, Debug, Clone)]
#[command(
    name = "webcrawler",
    version,
    about = "Crawl a web site and answer keyword queries over the saved pages",
    long_about = "Crawls every page reachable from STARTING_URL on one HTTP server, saving \
                  pages under SAVE_DIR. Once the crawl goes idle, the saved site \
                  directories are indexed by a pool of worker processes and can be \
                  queried through the command port.",
    after_help = "EXAMPLES:\n    \
        webcrawler -h localhost -p 8080 -c 9090 -t 8 -d ./save /site1/index.html\n    \
        echo STATS | nc localhost 9090\n    \
        echo 'SEARCH apple pie' | nc localhost 9090",
    disable_help_flag = true
)]
pub struct CrawlerArgs {
    /// Web server host
    #[arg(short = 'h', long = "host", value_name = "HOST")]
    pub host: String,

    /// Web server port
    #[arg(short = 'p', long = "port", value_name = "PORT")]
    pub port: u16,

    /// Port for SHUTDOWN/STATS/SEARCH commands
    #[arg(short = 'c', long = "command-port", value_name = "PORT")]
    pub command_port: u16,

    /// Number of crawl threads
    #[arg(short = 't', long = "threads", default_value_t = 4, value_name = "NUM")]
    pub threads: usize,

    /// Directory to save pages into (must exist)
    #[arg(short = 'd', long = "save-dir", value_name = "DIR")]
    pub save_dir: PathBuf,

    /// Number of index worker processes
    #[arg(long, default_value_t = 5, value_name = "NUM")]
    pub workers: usize,

    /// Path to the job-executor binary (default: next to this program)
    #[arg(long, value_name = "PATH")]
    pub executor: Option<PathBuf>,

    /// Directory for per-worker query logs
    #[arg(long, value_name = "DIR")]
    pub query_log_dir: Option<PathBuf>,

    /// Connect/read timeout per page, in seconds
    #[arg(long, default_value_t = 10, value_name = "SECS")]
    pub timeout: u64,

    /// Show a progress spinner while crawling
    #[arg(long)]
    pub progress: bool,

    /// Verbose logging
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Print help
    #[arg(long, action = clap::ArgAction::Help)]
    pub help: Option<bool>,

    /// Root-relative URL to start from, e.g. /site1/index.html
    #[arg(value_name = "STARTING_URL")]
    pub starting_url: String,
}

/// Validated crawler configuration
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub host: String,
    pub port: u16,
    pub command_port: u16,
    pub threads: usize,
    pub save_dir: PathBuf,
    pub starting_url: String,
    pub fetch_timeout: Duration,
    pub show_progress: bool,
    pub executor: ExecutorLaunch,
}

impl CrawlConfig {
    pub fn from_args(args: CrawlerArgs) -> Result<Self, ConfigError> {
        check_count("thread", args.threads, MAX_THREADS)?;
        check_count("worker", args.workers, MAX_WORKERS)?;

        if !args.starting_url.starts_with('/') {
            return Err(ConfigError::InvalidStartUrl {
                url: args.starting_url,
                reason: "must be root-relative (start with '/')".into(),
            });
        }

        let save_dir = existing_dir(&args.save_dir)?;
        let program = resolve_program(args.executor.as_deref(), EXECUTOR_PROGRAM)?;

        Ok(Self {
            host: args.host,
            port: args.port,
            command_port: args.command_port,
            threads: args.threads,
            save_dir,
            starting_url: args.starting_url,
            fetch_timeout: Duration::from_secs(args.timeout.max(1)),
            show_progress: args.progress,
            executor: ExecutorLaunch {
                program,
                workers: args.workers,
                log_dir: args.query_log_dir,
            },
        })
    }

    #[cfg(test)]
    pub(crate) fn for_tests(save_dir: &Path, threads: usize) -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 1,
            command_port: 0,
            threads,
            save_dir: save_dir.to_path_buf(),
            starting_url: "/index.html".into(),
            fetch_timeout: Duration::from_secs(1),
            show_progress: false,
            executor: ExecutorLaunch {
                program: PathBuf::from(EXECUTOR_PROGRAM),
                workers: 1,
                log_dir: None,
            },
        }
    }
}

/// Index coordinator (job executor)
#[derive(Parser, Debug, Clone)]
#[command(
    name = "job-executor",
    version,
    about = "Distribute site directories over index workers and answer queries",
    long_about = "Reads the terminal width and the directory list from stdin, starts \
                  WORKERS index workers, writes READY, then serves /search, /maxcount, \
                  /mincount, /wc and /exit commands read line by line from stdin."
)]
pub struct ExecutorArgs {
    /// Number of index worker processes
    #[arg(value_name = "WORKERS")]
    pub workers: usize,

    /// Path to the index-worker binary (default: next to this program)
    #[arg(long, value_name = "PATH")]
    pub worker: Option<PathBuf>,

    /// Directory for the named pipes (default: system temp dir)
    #[arg(long, value_name = "DIR")]
    pub fifo_dir: Option<PathBuf>,

    /// Time budget for /search, in seconds
    #[arg(long, default_value_t = 30, value_name = "SECS")]
    pub deadline: u64,

    /// How long a cancelled worker may take to finish its answer, in seconds
    #[arg(long, default_value_t = 5, value_name = "SECS")]
    pub grace: u64,

    /// Directory for per-worker query logs
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Verbose logging
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Validated coordinator configuration
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub workers: usize,
    pub worker_program: PathBuf,
    pub fifo_dir: PathBuf,
    pub deadline: Duration,
    pub grace: Duration,
    pub log_dir: Option<PathBuf>,
}

impl ExecutorConfig {
    pub fn from_args(args: ExecutorArgs) -> Result<Self, ConfigError> {
        check_count("worker", args.workers, MAX_WORKERS)?;
        let worker_program = resolve_program(args.worker.as_deref(), WORKER_PROGRAM)?;
        let fifo_dir = match args.fifo_dir {
            Some(dir) => existing_dir(&dir)?,
            None => std::env::temp_dir(),
        };

        Ok(Self {
            workers: args.workers,
            worker_program,
            fifo_dir,
            deadline: Duration::from_secs(args.deadline.max(1)),
            grace: Duration::from_secs(args.grace),
            log_dir: args.log_dir,
        })
    }
}

/// Index worker, started by the job executor
#[derive(Parser, Debug, Clone)]
#[command(
    name = "index-worker",
    version,
    about = "Index a shard of directories and answer coordinator requests"
)]
pub struct WorkerArgs {
    /// Number of directories in this worker's shard (upper bound)
    #[arg(value_name = "SHARD_SIZE")]
    pub shard_size: usize,

    /// FIFO carrying requests from the coordinator
    #[arg(value_name = "REQUEST_FIFO")]
    pub request_fifo: PathBuf,

    /// FIFO carrying answers to the coordinator
    #[arg(value_name = "ANSWER_FIFO")]
    pub answer_fifo: PathBuf,

    /// Directory for the query log
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Verbose logging
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Validated worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub shard_size: usize,
    pub request_fifo: PathBuf,
    pub answer_fifo: PathBuf,
    pub log_dir: Option<PathBuf>,
}

impl WorkerConfig {
    pub fn from_args(args: WorkerArgs) -> Self {
        Self {
            shard_size: args.shard_size,
            request_fifo: args.request_fifo,
            answer_fifo: args.answer_fifo,
            log_dir: args.log_dir,
        }
    }
}

fn check_count(what: &'static str, count: usize, max: usize) -> Result<(), ConfigError> {
    if count == 0 || count > max {
        return Err(ConfigError::InvalidCount { what, count, max });
    }
    Ok(())
}

fn existing_dir(path: &Path) -> Result<PathBuf, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidDirectory {
        path: path.to_path_buf(),
        reason,
    };
    let canonical = path.canonicalize().map_err(|e| invalid(e.to_string()))?;
    if !canonical.is_dir() {
        return Err(invalid("not a directory".into()));
    }
    Ok(canonical)
}

/// An explicit path if given, otherwise `name` next to the running binary
pub fn resolve_program(explicit: Option<&Path>, name: &str) -> Result<PathBuf, ConfigError> {
    let not_found = |reason: String| ConfigError::ProgramNotFound {
        name: name.to_string(),
        reason,
    };

    let candidate = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let exe = std::env::current_exe().map_err(|e| not_found(e.to_string()))?;
            let dir = exe
                .parent()
                .ok_or_else(|| not_found("executable has no parent directory".into()))?;
            dir.join(name)
        }
    };

    if candidate.is_file() {
        Ok(candidate)
    } else {
        Err(not_found(format!("{} does not exist", candidate.display())))
    }
}
