//! Crawler command port
//!
//! Plain TCP, one command line per connection:
//! - `SHUTDOWN` stops the crawler
//! - `STATS` reports uptime, pages and bytes downloaded
//! - `SEARCH`, `MAXCOUNT`, `MINCOUNT`, `WORDCOUNT` are forwarded to the job
//!   executor once it is ready, and its answer is relayed back

use super::monitor::Pipeline;
use super::state::CrawlState;
use crate::error::CrawlerError;
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const ACCEPT_TICK: Duration = Duration::from_millis(100);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

pub const NOT_READY_REPLY: &str =
    "web crawling is still in progress (or jobExecutor is not initialized yet)";

/// Parsed command-port request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortCommand {
    Shutdown,
    Stats,
    /// Executor command line to forward
    Forward(String),
    /// Reply without touching any state
    Reject(&'static str),
}

/// Map a command-port line to an action
pub fn parse_command(line: &str) -> PortCommand {
    let mut parts = line.split_whitespace();
    let Some(verb) = parts.next() else {
        return PortCommand::Reject("illegal command");
    };
    let args: Vec<&str> = parts.collect();

    match verb {
        "SHUTDOWN" => PortCommand::Shutdown,
        "STATS" => PortCommand::Stats,
        "SEARCH" if args.is_empty() => PortCommand::Reject("no SEARCH arguments given"),
        "SEARCH" => PortCommand::Forward(format!("/search {}", args.join(" "))),
        "MAXCOUNT" | "MINCOUNT" if args.is_empty() => PortCommand::Reject(if verb == "MAXCOUNT" {
            "no MAXCOUNT argument given"
        } else {
            "no MINCOUNT argument given"
        }),
        "MAXCOUNT" => PortCommand::Forward(format!("/maxcount {}", args[0])),
        "MINCOUNT" => PortCommand::Forward(format!("/mincount {}", args[0])),
        "WORDCOUNT" => PortCommand::Forward("/wc".into()),
        _ => PortCommand::Reject("illegal command"),
    }
}

/// `HH:MM:SS` for an uptime
pub fn format_uptime(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

/// The command port listener
pub struct CommandServer {
    listener: TcpListener,
    state: Arc<CrawlState>,
    pipeline: Arc<Pipeline>,
    started: Instant,
    shutdown: Arc<AtomicBool>,
}

impl CommandServer {
    /// Bind `0.0.0.0:port`; failure here is fatal for the crawler
    pub fn bind(
        port: u16,
        state: Arc<CrawlState>,
        pipeline: Arc<Pipeline>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Self, CrawlerError> {
        let bind_err = |e| CrawlerError::Bind { port, source: e };
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).map_err(bind_err)?;
        listener.set_nonblocking(true).map_err(bind_err)?;
        Ok(Self {
            listener,
            state,
            pipeline,
            started: Instant::now(),
            shutdown,
        })
    }

    pub fn local_port(&self) -> Option<u16> {
        self.listener.local_addr().ok().map(|a| a.port())
    }

    /// Serve until `SHUTDOWN` arrives or the shutdown flag is raised
    pub fn serve(&self) {
        info!(port = ?self.local_port(), "Command port listening");
        while !self.shutdown.load(Ordering::SeqCst) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    debug!(peer = %peer, "Command connection");
                    if let Err(e) = self.handle(stream) {
                        warn!(error = %e, "Command connection failed");
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_TICK),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                    thread::sleep(ACCEPT_TICK);
                }
            }
        }
        info!("Command port closed");
    }

    fn handle(&self, stream: TcpStream) -> std::io::Result<()> {
        stream.set_nonblocking(false)?;
        stream.set_read_timeout(Some(CLIENT_TIMEOUT))?;
        let mut reader = BufReader::new(stream.try_clone()?);
        let mut writer = stream;

        let mut line = String::new();
        reader.read_line(&mut line)?;
        let reply = self.execute(parse_command(line.trim()));
        writer.write_all(reply.as_bytes())?;
        writer.flush()
    }

    fn execute(&self, command: PortCommand) -> String {
        match command {
            PortCommand::Shutdown => {
                info!("SHUTDOWN received");
                if !self.state.completion().is_complete() {
                    self.state.completion().force();
                }
                self.shutdown.store(true, Ordering::SeqCst);
                "Shutting down\n".into()
            }
            PortCommand::Stats => {
                let stats = self.state.stats();
                format!(
                    "Crawler has been up for {}, downloaded {} pages, {} bytes\n",
                    format_uptime(self.started.elapsed()),
                    stats.pages,
                    stats.bytes
                )
            }
            PortCommand::Forward(command) => {
                match self.pipeline.with_executor(|link| link.query(&command)) {
                    None => format!("{}\n", NOT_READY_REPLY),
                    Some(Ok(lines)) => lines.iter().map(|l| format!("{}\n", l)).collect(),
                    Some(Err(e)) => {
                        warn!(error = %e, command = %command, "Job executor query failed");
                        format!("job executor failed: {}\n", e)
                    }
                }
            }
            PortCommand::Reject(message) => format!("{}\n", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("SHUTDOWN"), PortCommand::Shutdown);
        assert_eq!(parse_command("STATS"), PortCommand::Stats);
        assert_eq!(
            parse_command("SEARCH apple  pie"),
            PortCommand::Forward("/search apple pie".into())
        );
        assert_eq!(
            parse_command("MINCOUNT pear extra"),
            PortCommand::Forward("/mincount pear".into())
        );
        assert_eq!(parse_command("WORDCOUNT"), PortCommand::Forward("/wc".into()));
        assert_eq!(
            parse_command("SEARCH"),
            PortCommand::Reject("no SEARCH arguments given")
        );
        assert_eq!(
            parse_command("MAXCOUNT"),
            PortCommand::Reject("no MAXCOUNT argument given")
        );
        assert_eq!(parse_command("search x"), PortCommand::Reject("illegal command"));
        assert_eq!(parse_command(""), PortCommand::Reject("illegal command"));
    }

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(Duration::from_secs(0)), "00:00:00");
        assert_eq!(format_uptime(Duration::from_secs(3_725)), "01:02:05");
        assert_eq!(format_uptime(Duration::from_secs(100 * 3600)), "100:00:00");
    }

    #[test]
    fn test_stats_and_not_ready_over_tcp() {
        let state = Arc::new(CrawlState::new(1));
        state.record_page(2048);
        let shutdown = Arc::new(AtomicBool::new(false));
        let server = CommandServer::bind(
            0,
            Arc::clone(&state),
            Arc::new(Pipeline::new()),
            Arc::clone(&shutdown),
        )
        .unwrap();
        let port = server.local_port().unwrap();
        let serving = thread::spawn(move || server.serve());

        let ask = |line: &str| {
            let mut conn = TcpStream::connect(("127.0.0.1", port)).unwrap();
            conn.write_all(format!("{}\n", line).as_bytes()).unwrap();
            let mut reply = String::new();
            std::io::Read::read_to_string(&mut conn, &mut reply).unwrap();
            reply
        };

        let stats = ask("STATS");
        assert!(stats.starts_with("Crawler has been up for 00:00:"));
        assert!(stats.ends_with("downloaded 1 pages, 2048 bytes\n"));
        assert_eq!(ask("SEARCH apple"), format!("{}\n", NOT_READY_REPLY));
        assert_eq!(ask("FLY"), "illegal command\n");
        assert_eq!(ask("SHUTDOWN"), "Shutting down\n");

        serving.join().unwrap();
        assert!(state.completion().is_complete());
    }
}
