//! Logging setup shared by the three binaries
//!
//! Logs always go to stderr: the job executor's stdout carries command
//! output and protocol tokens.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber; `RUST_LOG` overrides the default filter
pub fn init(verbose: bool) {
    let default = if verbose {
        "webcrawler=debug,warn"
    } else {
        "webcrawler=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
