//! webcrawler - Site Crawler with a Multi-Process Query Engine
//!
//! Entry point for the crawler process.

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{error, info, warn};
use webcrawler::config::{CrawlConfig, CrawlerArgs};
use webcrawler::crawler::{
    CommandServer, Completion, CompletionMonitor, CrawlState, CrawlWorkerPool, Pipeline, Target,
};
use webcrawler::error::ConfigError;
use webcrawler::logging;
use webcrawler::progress::{print_header, print_summary, ProgressReporter};

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
    let args = CrawlerArgs::parse();
    logging::init(args.verbose);

    let config = CrawlConfig::from_args(args).context("Invalid configuration")?;
    let target = Target::resolve(&config.host, config.port)
        .map_err(|e| ConfigError::Unresolvable {
            host: config.host.clone(),
            port: config.port,
            reason: e.to_string(),
        })
        .context("Invalid configuration")?;

    if config.show_progress {
        print_header(
            &target.display(),
            &config.starting_url,
            config.threads,
            &config.save_dir.display().to_string(),
        );
    }

    let config = Arc::new(config);
    let target = Arc::new(target);
    let state = Arc::new(CrawlState::new(config.threads));
    let pipeline = Arc::new(Pipeline::new());
    let shutdown = Arc::new(AtomicBool::new(false));

    // Setup signal handler for graceful shutdown
    {
        let state = Arc::clone(&state);
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            eprintln!("\nInterrupt received, shutting down...");
            shutdown.store(true, Ordering::SeqCst);
            state.completion().force();
        })
        .context("Failed to set signal handler")?;
    }

    // Bind first: a busy command port must fail before any page is fetched
    let server = CommandServer::bind(
        config.command_port,
        Arc::clone(&state),
        Arc::clone(&pipeline),
        Arc::clone(&shutdown),
    )
    .context("Failed to open command port")?;

    state.seed(&config.starting_url);
    info!(
        server = %target.display(),
        start = %config.starting_url,
        threads = config.threads,
        "Starting crawl"
    );

    let pool = CrawlWorkerPool::spawn(Arc::clone(&config), Arc::clone(&target), Arc::clone(&state))
        .context("Failed to start crawl threads")?;
    let monitor = CompletionMonitor::spawn(
        Arc::clone(&state),
        pool,
        Some(config.executor.clone()),
        Arc::clone(&pipeline),
    )
    .context("Failed to start completion monitor")?;

    let progress = if config.show_progress {
        Some(spawn_progress(Arc::clone(&state)).context("Failed to start progress display")?)
    } else {
        None
    };

    server.serve();

    if !state.completion().is_complete() {
        state.completion().force();
    }
    let report = monitor.join();
    if let Some(handle) = progress {
        let _ = handle.join();
    }

    if let Some(link) = pipeline.take_executor() {
        match link.shutdown() {
            Ok(lines) => {
                for line in lines {
                    println!("{}", line);
                }
            }
            Err(e) => warn!(error = %e, "Job executor shutdown failed"),
        }
    }

    match report {
        Some(report) => {
            print_summary(&report, state.stats());
            if report.completion == Completion::Forced {
                info!("Crawl was interrupted before completion");
            }
        }
        None => warn!("Completion monitor panicked"),
    }

    Ok(())
}

fn spawn_progress(state: Arc<CrawlState>) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("progress".into())
        .spawn(move || {
            let reporter = ProgressReporter::new();
            reporter.set_status("Connecting...");
            loop {
                match state.completion().wait_timeout(Duration::from_millis(250)) {
                    Some(Completion::Quiescent) => {
                        reporter.finish("Crawl completed");
                        break;
                    }
                    Some(Completion::Forced) => {
                        reporter.finish("Crawl interrupted");
                        break;
                    }
                    None => reporter.update(&state.progress()),
                }
            }
        })
}
