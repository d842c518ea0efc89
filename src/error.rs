//! Error types for webcrawler
//!
//! This module defines the error hierarchy shared by the three binaries:
//! - Fetch errors (socket failures and malformed HTTP responses)
//! - Wire protocol errors between the coordinator and its workers
//! - Index coordinator errors (FIFOs, spawning, rendezvous)
//! - Shard parsing errors inside an index worker
//! - Configuration and command errors
//!
//! Library code returns these typed errors; the binaries wrap them with
//! anyhow context at the top level.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the crawler process
#[derive(Error, Debug)]
pub enum CrawlerError {
    /// Page fetch errors
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Errors talking to the job executor
    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Failed to bind the command port
    #[error("Failed to listen on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// Failed to start a crawl thread
    #[error("Failed to spawn crawl thread {id}: {reason}")]
    ThreadSpawn { id: usize, reason: String },

    /// A crawl thread panicked
    #[error("Crawl thread {id} panicked")]
    Panicked { id: usize },

    /// I/O errors (saving pages, creating directories)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a response was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedReason {
    /// No blank line within the header size limit
    HeaderTooLarge,
    /// Status line missing or not HTTP
    StatusLine,
    /// Status other than 200 OK
    Status(u16),
    /// Content-Length absent or not a number
    ContentLength,
    /// Connection closed before Content-Length bytes arrived
    TruncatedBody,
}

impl MalformedReason {
    /// Short stable code used in log fields
    pub fn code(&self) -> &'static str {
        match self {
            MalformedReason::HeaderTooLarge => "header_too_large",
            MalformedReason::StatusLine => "bad_status_line",
            MalformedReason::Status(_) => "not_ok",
            MalformedReason::ContentLength => "bad_content_length",
            MalformedReason::TruncatedBody => "truncated_body",
        }
    }
}

impl std::fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MalformedReason::Status(code) => write!(f, "status {}", code),
            other => f.write_str(other.code()),
        }
    }
}

/// Errors fetching a single page
#[derive(Error, Debug)]
pub enum FetchError {
    /// Could not connect to any address of the target server
    #[error("Failed to connect to {server}: {source}")]
    Connect {
        server: String,
        #[source]
        source: std::io::Error,
    },

    /// Socket read/write failure after connecting
    #[error("Socket error on '{path}': {source}")]
    Socket {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Response could not be accepted
    #[error("Malformed response for '{path}': {reason}")]
    Malformed {
        path: String,
        reason: MalformedReason,
    },
}

impl FetchError {
    /// Transient network errors abort the current URL only
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Connect { .. } | FetchError::Socket { .. })
    }

    /// Reason code for structured logging
    pub fn reason_code(&self) -> &'static str {
        match self {
            FetchError::Connect { .. } => "connect",
            FetchError::Socket { .. } => "socket",
            FetchError::Malformed { reason, .. } => reason.code(),
        }
    }
}

/// Errors decoding the coordinator/worker wire format
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Stream ended in the middle of a record
    #[error("Stream closed after {got} of {expected} bytes")]
    ShortRead { expected: usize, got: usize },

    /// Header type outside the known range
    #[error("Unknown message type {0}")]
    UnknownType(u32),

    /// Message type not valid at this point of the exchange
    #[error("Unexpected message type {0:?}")]
    Unexpected(crate::protocol::MessageType),

    /// Payload larger than any legitimate message
    #[error("Payload of {size} bytes exceeds limit of {limit}")]
    Oversized { size: usize, limit: usize },

    /// Negative length in the startup encoding
    #[error("Invalid length field {0}")]
    InvalidLength(i32),

    /// Readiness token mismatch
    #[error("Expected readiness token, got {0:?}")]
    NotReady(String),

    /// Underlying I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Index coordinator and worker process errors
#[derive(Error, Debug)]
pub enum ExecutorError {
    /// Could not create a named pipe
    #[error("Failed to create FIFO '{path}': {source}")]
    FifoCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not open a named pipe
    #[error("Failed to open FIFO '{path}': {source}")]
    FifoOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not start a worker process
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Worker process exited during rendezvous or startup
    #[error("Worker {index} exited during startup ({status})")]
    WorkerExited {
        index: usize,
        status: std::process::ExitStatus,
    },

    /// Timed out waiting for a worker answer
    #[error("Worker {index} did not answer in time")]
    Timeout { index: usize },

    /// Wire protocol errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Shard parsing errors
    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    /// Shutdown requested
    #[error("Interrupted by signal")]
    Interrupted,

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors building a worker's shard index
#[derive(Error, Debug)]
pub enum IndexError {
    /// Directory listing failed
    #[error("Failed to read directory '{path}': {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File read failed
    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Thread or worker counts out of range
    #[error("Invalid {what} count {count}: must be between 1 and {max}")]
    InvalidCount {
        what: &'static str,
        count: usize,
        max: usize,
    },

    /// Save or FIFO directory unusable
    #[error("Invalid directory '{path}': {reason}")]
    InvalidDirectory { path: PathBuf, reason: String },

    /// Starting URL must be root-relative
    #[error("Invalid starting URL '{url}': {reason}")]
    InvalidStartUrl { url: String, reason: String },

    /// Target host could not be resolved
    #[error("Cannot resolve '{host}:{port}': {reason}")]
    Unresolvable {
        host: String,
        port: u16,
        reason: String,
    },

    /// Helper program could not be located
    #[error("Cannot locate program '{name}': {reason}")]
    ProgramNotFound { name: String, reason: String },
}

/// Rejected interactive commands
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Command word not recognised
    #[error("Unrecognized command")]
    Unrecognized,

    /// Command given without its argument(s)
    #[error("Usage: {0}")]
    Usage(&'static str),
}

/// Result type alias for CrawlerError
pub type Result<T> = std::result::Result<T, CrawlerError>;

/// Result type alias for FetchError
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Result type alias for ProtocolError
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;

/// Result type alias for ExecutorError
pub type ExecutorResult<T> = std::result::Result<T, ExecutorError>;

/// Result type alias for IndexError
pub type IndexResult<T> = std::result::Result<T, IndexError>;

/// Represents the outcome of crawling a single URL
#[derive(Debug)]
pub enum CrawlOutcome {
    /// Page saved to disk
    Saved {
        path: String,
        bytes: usize,
        new_links: usize,
    },

    /// Not fetched or not saved, by policy
    Skipped { url: String, reason: String },

    /// Fetch or save failed
    Failed { url: String, error: CrawlerError },
}

impl CrawlOutcome {
    /// Returns true if the page was saved
    pub fn is_saved(&self) -> bool {
        matches!(self, CrawlOutcome::Saved { .. })
    }

    /// Returns the URL or path associated with this outcome
    pub fn url(&self) -> &str {
        match self {
            CrawlOutcome::Saved { path, .. } => path,
            CrawlOutcome::Skipped { url, .. } => url,
            CrawlOutcome::Failed { url, .. } => url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_transient() {
        let refused = FetchError::Connect {
            server: "localhost:8080".into(),
            source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
        };
        assert!(refused.is_transient());
        assert_eq!(refused.reason_code(), "connect");

        let not_ok = FetchError::Malformed {
            path: "/site1/missing.html".into(),
            reason: MalformedReason::Status(404),
        };
        assert!(!not_ok.is_transient());
        assert_eq!(not_ok.reason_code(), "not_ok");
        assert!(not_ok.to_string().contains("status 404"));
    }

    #[test]
    fn test_error_conversion() {
        let fetch_err = FetchError::Malformed {
            path: "/x".into(),
            reason: MalformedReason::ContentLength,
        };
        let crawler_err: CrawlerError = fetch_err.into();
        assert!(matches!(crawler_err, CrawlerError::Fetch(_)));

        let proto: ExecutorError = ProtocolError::UnknownType(42).into();
        assert!(matches!(proto, ExecutorError::Protocol(_)));
    }

    #[test]
    fn test_outcome_url() {
        let outcome = CrawlOutcome::Skipped {
            url: "http://other:80/a.html".into(),
            reason: "foreign host".into(),
        };
        assert!(!outcome.is_saved());
        assert_eq!(outcome.url(), "http://other:80/a.html");
    }
}
