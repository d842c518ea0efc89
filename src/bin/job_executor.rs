//! job-executor - Index coordinator
//!
//! Reads the directory hand-off from stdin, starts the index workers,
//! answers `READY`, then serves commands line by line from stdin.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, BufReader, Write};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};
use webcrawler::config::{ExecutorArgs, ExecutorConfig};
use webcrawler::executor::IndexCoordinator;
use webcrawler::logging;
use webcrawler::protocol::{self, READY_TOKEN};

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
    let args = ExecutorArgs::parse();
    logging::init(args.verbose);

    let config = ExecutorConfig::from_args(args).context("Invalid configuration")?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    let mut input = BufReader::new(io::stdin());
    let startup =
        protocol::read_startup(&mut input).context("Failed to read directory hand-off")?;
    info!(
        directories = startup.directories.len(),
        terminal_width = startup.terminal_width,
        "Received site directories"
    );

    let coordinator = IndexCoordinator::start(config, startup, shutdown)
        .context("Failed to start index workers")?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    out.write_all(READY_TOKEN)?;
    out.flush()?;

    let summary = coordinator
        .run(input, &mut out)
        .context("Command loop failed")?;

    info!(
        workers = summary.workers,
        commands = summary.commands,
        restarts = summary.restarts,
        retired = summary.retired,
        interrupted = summary.interrupted,
        "Job executor finished"
    );
    Ok(())
}
