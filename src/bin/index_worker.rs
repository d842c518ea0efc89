//! index-worker - Index one shard of site directories
//!
//! Started by the job executor with the shard size and the paths of its
//! request and answer FIFOs.

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use tracing::{debug, error};
use webcrawler::config::{WorkerArgs, WorkerConfig};
use webcrawler::executor::{signals, IndexWorker};
use webcrawler::logging;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = WorkerArgs::parse();
    logging::init(args.verbose);
    let config = WorkerConfig::from_args(args);

    signals::install_cancel_handler().context("Failed to install cancel handler")?;
    let terminate = signals::termination_flag().context("Failed to set signal handler")?;

    let worker = IndexWorker::connect(&config, terminate).context("Worker startup failed")?;
    let summary = worker.serve().context("Request loop failed")?;

    debug!(
        pid = std::process::id(),
        documents = summary.documents,
        words_found = summary.words_found,
        requests = summary.requests,
        "Index worker finished"
    );
    Ok(())
}
