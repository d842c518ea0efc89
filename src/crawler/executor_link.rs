//! Crawler side of the job executor
//!
//! The coordinator runs as a child process with piped stdin/stdout. The
//! crawler writes the directory hand-off, waits for `READY`, and afterwards
//! forwards one command line at a time, collecting output lines up to the
//! `<END>` sentinel.

use crate::error::{ExecutorError, ExecutorResult};
use crate::protocol::{self, END_SENTINEL};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use tracing::{debug, info, warn};

/// How to start the coordinator
#[derive(Debug, Clone)]
pub struct ExecutorLaunch {
    pub program: PathBuf,
    pub workers: usize,
    pub log_dir: Option<PathBuf>,
}

/// A running coordinator process
pub struct ExecutorLink {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl ExecutorLink {
    /// Spawn the coordinator, hand over the directories and wait for `READY`
    pub fn launch(
        launch: &ExecutorLaunch,
        terminal_width: usize,
        directories: &[String],
    ) -> ExecutorResult<Self> {
        let mut command = Command::new(&launch.program);
        command
            .arg(launch.workers.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if let Some(dir) = &launch.log_dir {
            command.arg("--log-dir").arg(dir);
        }

        let mut child = command.spawn().map_err(|e| ExecutorError::Spawn {
            program: launch.program.clone(),
            source: e,
        })?;
        info!(pid = child.id(), workers = launch.workers, dirs = directories.len(), "Job executor started");

        let (Some(mut stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ExecutorError::Io(std::io::Error::other(
                "job executor pipes unavailable",
            )));
        };

        let mut stdout = BufReader::new(stdout);
        let handshake = protocol::write_startup(&mut stdin, terminal_width, directories)
            .map_err(ExecutorError::from)
            .and_then(|()| protocol::expect_ready(&mut stdout).map_err(ExecutorError::from));

        if let Err(e) = handshake {
            let _ = child.kill();
            let _ = child.wait();
            return Err(e);
        }

        debug!("Job executor ready");
        Ok(Self {
            child,
            stdin,
            stdout,
        })
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Send one command line and collect its response lines
    pub fn query(&mut self, command: &str) -> ExecutorResult<Vec<String>> {
        writeln!(self.stdin, "{}", command)?;
        self.stdin.flush()?;
        self.read_response()
    }

    fn read_response(&mut self) -> ExecutorResult<Vec<String>> {
        let mut lines = Vec::new();
        let mut line = String::new();
        loop {
            line.clear();
            if self.stdout.read_line(&mut line)? == 0 {
                return Err(ExecutorError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "job executor closed its output",
                )));
            }
            let text = line.trim_end_matches(['\n', '\r']);
            if text == END_SENTINEL {
                return Ok(lines);
            }
            lines.push(text.to_string());
        }
    }

    /// Send `/exit`, collect the final report and wait for the process
    pub fn shutdown(mut self) -> ExecutorResult<Vec<String>> {
        let report = match self.query("/exit") {
            Ok(lines) => lines,
            Err(e) => {
                warn!(error = %e, "Job executor did not acknowledge exit");
                Vec::new()
            }
        };
        drop(self.stdin);
        let status = self.child.wait()?;
        if status.success() {
            info!("Job executor exited");
        } else {
            warn!(%status, "Job executor exited with failure");
        }
        Ok(report)
    }
}
