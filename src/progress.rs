//! Progress reporting for the crawl
//!
//! Provides a live spinner while pages are being fetched and styled
//! header/summary blocks around the run.

use crate::crawler::state::CrawlProgress;
use crate::crawler::{Completion, CrawlStats, MonitorReport};
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner showing crawl status
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .expect("Invalid progress template")
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar }
    }

    pub fn update(&self, progress: &CrawlProgress) {
        self.bar.set_message(progress_message(progress));
    }

    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

fn progress_message(progress: &CrawlProgress) -> String {
    format!(
        "Pages: {} | Size: {} | Frontier: {} | Idle: {}/{} | Sites: {}",
        format_number(progress.stats.pages),
        format_size(progress.stats.bytes, BINARY),
        format_number(progress.frontier_len as u64),
        progress.blocked,
        progress.pool_size,
        progress.directories,
    )
}

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Print a header at the start of the crawl
pub fn print_header(server: &str, start: &str, threads: usize, save_dir: &str) {
    println!();
    println!(
        "{} {}",
        style("webcrawler").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Server:").bold(), server);
    println!("  {} {}", style("Start:").bold(), start);
    println!("  {} {}", style("Threads:").bold(), threads);
    println!("  {} {}", style("Save dir:").bold(), save_dir);
    println!();
}

/// Print a summary once crawling is over
pub fn print_summary(report: &MonitorReport, stats: CrawlStats) {
    let secs = report.crawl_time.as_secs_f64();
    let rate = if secs > 0.0 {
        stats.pages as f64 / secs
    } else {
        0.0
    };
    let title = match report.completion {
        Completion::Quiescent => style("Crawl Complete").green().bold(),
        Completion::Forced => style("Crawl Interrupted").yellow().bold(),
    };

    println!();
    println!("{}", title);
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Pages:").bold(), format_number(stats.pages));
    println!("  {} {}", style("Downloaded:").bold(), format_size(stats.bytes, BINARY));
    println!("  {} {}", style("Sites:").bold(), report.directories.len());
    println!(
        "  {} {:.1}s ({:.1} pages/sec)",
        style("Duration:").bold(),
        secs,
        rate
    );
    if report.pool.failed > 0 {
        println!(
            "  {} {}",
            style("Failed:").yellow().bold(),
            format_number(report.pool.failed)
        );
    }
    let executor = if report.executor_started {
        style("started").green()
    } else {
        style("not started").dim()
    };
    println!("  {} {}", style("Job executor:").bold(), executor);
    println!();
}
