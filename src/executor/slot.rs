//! One index worker process and its pipes
//!
//! A slot owns the worker's FIFO pair, its child process and both open
//! descriptors. Starting (or restarting) a slot:
//! 1. spawn the worker with `shard_size`, request FIFO and answer FIFO
//! 2. open the request FIFO for writing (rendezvous with the worker)
//! 3. send the shard as `INIT` records, the last one `END_OF_MESSAGES`
//! 4. open the answer FIFO for reading; the worker opens its end only after
//!    parsing, so this doubles as "worker ready"
//!
//! Steps 1-3 ([`WorkerSlot::spawn`]) and step 4 ([`WorkerSlot::await_ready`])
//! are separate so the coordinator can hand out every shard before waiting
//! on any worker, letting all of them parse at the same time.
//!
//! Liveness is tracked by the coordinator's own thread: `try_wait` before a
//! command is dispatched and after its answers are read, plus EOF or write
//! errors on the pipes.

use super::fifo::{self, DeadlineReader, Direction, FifoPair};
use crate::error::{ExecutorError, ExecutorResult, ProtocolError, ProtocolResult};
use crate::protocol::{self, Header, MessageType};
use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Instant;
use tracing::{debug, info, warn};

/// How to launch a worker
#[derive(Debug, Clone)]
pub struct WorkerProgram {
    pub path: PathBuf,
    pub log_dir: Option<PathBuf>,
}

/// Liveness of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Running and answering
    Alive,
    /// Exited or stopped answering; replace before the next command
    Dead,
    /// Replacement failed; skipped for the rest of the run
    Retired,
}

/// A worker's shard assignment
#[derive(Debug, Clone)]
pub struct Assignment {
    pub shard_size: usize,
    pub directories: Vec<String>,
}

pub struct WorkerSlot {
    index: usize,
    fifos: FifoPair,
    assignment: Assignment,
    child: Option<Child>,
    request: Option<File>,
    answer: Option<File>,
    state: SlotState,
    restarts: u32,
}

impl WorkerSlot {
    /// Create the FIFOs, start the worker and send it its shard
    ///
    /// The slot is not alive until [`WorkerSlot::await_ready`] succeeds.
    pub fn spawn(
        index: usize,
        program: &WorkerProgram,
        fifo_dir: &Path,
        tag: &str,
        assignment: Assignment,
    ) -> ExecutorResult<Self> {
        let fifos = FifoPair::create(fifo_dir, tag, index)?;
        let mut slot = Self {
            index,
            fifos,
            assignment,
            child: None,
            request: None,
            answer: None,
            state: SlotState::Dead,
            restarts: 0,
        };
        slot.distribute(program)?;
        Ok(slot)
    }

    /// Wait for the worker to finish parsing its shard
    pub fn await_ready(&mut self) -> ExecutorResult<()> {
        let result = match self.child.as_mut() {
            Some(child) => fifo::rendezvous(&self.fifos.answer, Direction::Read, self.index, child),
            None => Err(ExecutorError::Interrupted),
        };
        match result {
            Ok(answer) => {
                self.answer = Some(answer);
                self.state = SlotState::Alive;
                Ok(())
            }
            Err(e) => {
                self.kill();
                Err(e)
            }
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    pub fn is_alive(&self) -> bool {
        self.state == SlotState::Alive
    }

    pub fn restarts(&self) -> u32 {
        self.restarts
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    pub fn directories(&self) -> &[String] {
        &self.assignment.directories
    }

    fn launch(&mut self, program: &WorkerProgram) -> ExecutorResult<()> {
        self.distribute(program)?;
        self.await_ready()
    }

    /// Spawn the process and write its directory records
    fn distribute(&mut self, program: &WorkerProgram) -> ExecutorResult<()> {
        let mut command = Command::new(&program.path);
        command
            .arg(self.assignment.shard_size.to_string())
            .arg(&self.fifos.request)
            .arg(&self.fifos.answer)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());
        if let Some(dir) = &program.log_dir {
            command.arg("--log-dir").arg(dir);
        }

        let mut child = command.spawn().map_err(|e| ExecutorError::Spawn {
            program: program.path.clone(),
            source: e,
        })?;
        debug!(worker = self.index, pid = child.id(), "Spawned index worker");

        let result = self.send_assignment(&mut child);
        self.child = Some(child);
        match result {
            Ok(request) => {
                self.request = Some(request);
                Ok(())
            }
            Err(e) => {
                self.kill();
                Err(e)
            }
        }
    }

    fn send_assignment(&self, child: &mut Child) -> ExecutorResult<File> {
        let mut request =
            fifo::rendezvous(&self.fifos.request, Direction::Write, self.index, child)?;

        let dirs = &self.assignment.directories;
        let mut batch = Vec::new();
        for (i, dir) in dirs.iter().enumerate() {
            let kind = if i + 1 == dirs.len() {
                MessageType::EndOfMessages
            } else {
                MessageType::Init
            };
            batch.extend_from_slice(&protocol::encode_message(kind, dir.as_bytes()));
        }
        if dirs.is_empty() {
            batch.extend_from_slice(&Header::bare(MessageType::EndOfMessages).to_bytes());
        }
        request.write_all(&batch)?;
        Ok(request)
    }

    /// Check the process without blocking; marks the slot dead if it exited
    pub fn poll_liveness(&mut self) -> SlotState {
        if self.is_alive() {
            if let Some(child) = self.child.as_mut() {
                match child.try_wait() {
                    Ok(Some(status)) => {
                        warn!(worker = self.index, %status, "Index worker exited");
                        self.state = SlotState::Dead;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(worker = self.index, error = %e, "Cannot query index worker status");
                    }
                }
            }
        }
        self.state
    }

    /// Flag the slot dead after a failed read or write
    pub fn mark_dead(&mut self) {
        if self.state == SlotState::Alive {
            warn!(worker = self.index, "Index worker stopped answering");
            self.state = SlotState::Dead;
        }
    }

    /// Restart a dead worker on the same shard
    ///
    /// Leftover answer bytes are drained first so nothing stale is read
    /// later. On failure the slot is retired.
    pub fn replace(&mut self, program: &WorkerProgram) -> ExecutorResult<()> {
        if self.state != SlotState::Dead {
            return Ok(());
        }
        if let Some(answer) = self.answer.as_mut() {
            let stale = fifo::drain_nonblocking(answer);
            if stale > 0 {
                debug!(worker = self.index, bytes = stale, "Drained stale answer bytes");
            }
        }
        self.kill();

        match self.launch(program) {
            Ok(()) => {
                self.restarts += 1;
                info!(worker = self.index, pid = ?self.pid(), dirs = self.assignment.directories.len(), "Replaced index worker");
                Ok(())
            }
            Err(e) => {
                warn!(worker = self.index, error = %e, "Could not replace index worker");
                self.state = SlotState::Retired;
                Err(e)
            }
        }
    }

    /// Send a complete request; marks the slot dead on failure
    pub fn send(&mut self, bytes: &[u8]) -> bool {
        if !self.is_alive() {
            return false;
        }
        let result = match self.request.as_mut() {
            Some(request) => request.write_all(bytes),
            None => return false,
        };
        if let Err(e) = result {
            debug!(worker = self.index, error = %e, "Request write failed");
            self.mark_dead();
            return false;
        }
        true
    }

    /// Descriptor to poll for answers
    pub fn answer_fd(&self) -> Option<RawFd> {
        self.answer.as_ref().map(AsRawFd::as_raw_fd)
    }

    /// Read the next answer record
    ///
    /// With a deadline, the whole record (header and payload) must arrive
    /// before it; otherwise the read fails with [`ExecutorError::Timeout`].
    pub fn next_message(&mut self, deadline: Option<Instant>) -> ExecutorResult<Option<(Header, Vec<u8>)>> {
        let index = self.index;
        let answer = self.answer.as_mut().ok_or(ExecutorError::Protocol(
            ProtocolError::ShortRead {
                expected: protocol::HEADER_SIZE,
                got: 0,
            },
        ))?;

        let record = match deadline {
            Some(deadline) => read_record(&mut DeadlineReader::new(answer, deadline)),
            None => read_record(answer),
        };
        record.map_err(|e| match e {
            ProtocolError::Io(io) if io.kind() == ErrorKind::TimedOut => {
                ExecutorError::Timeout { index }
            }
            other => other.into(),
        })
    }

    /// Read a fixed-size reply of `u32` count
    pub fn read_u32(&mut self) -> ExecutorResult<u32> {
        let answer = self.answer.as_mut().ok_or(ExecutorError::Interrupted)?;
        Ok(protocol::read_u32(answer)?)
    }

    /// Read three `u64` totals
    pub fn read_totals(&mut self) -> ExecutorResult<[u64; 3]> {
        let answer = self.answer.as_mut().ok_or(ExecutorError::Interrupted)?;
        Ok([
            protocol::read_u64(answer)?,
            protocol::read_u64(answer)?,
            protocol::read_u64(answer)?,
        ])
    }

    /// Ask the worker to abandon its current search
    pub fn cancel(&self) {
        if let Some(pid) = self.pid() {
            let ret = unsafe { libc::kill(pid as libc::pid_t, libc::SIGUSR1) };
            if ret != 0 {
                debug!(worker = self.index, error = %std::io::Error::last_os_error(), "Cancel signal failed");
            }
        }
    }

    /// Kill the process and close both pipes
    pub fn kill(&mut self) {
        self.request = None;
        self.answer = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        if self.state == SlotState::Alive {
            self.state = SlotState::Dead;
        }
    }

    /// Close the request pipe and wait for the process to exit
    pub fn close(&mut self) {
        self.request = None;
        self.answer = None;
        if let Some(mut child) = self.child.take() {
            match child.wait() {
                Ok(status) if !status.success() => {
                    debug!(worker = self.index, %status, "Index worker exit status")
                }
                Ok(_) => {}
                Err(e) => warn!(worker = self.index, error = %e, "Failed to wait for index worker"),
            }
        }
    }
}

fn read_record<R: Read>(reader: &mut R) -> ProtocolResult<Option<(Header, Vec<u8>)>> {
    let Some(header) = protocol::read_header(reader)? else {
        return Ok(None);
    };
    let payload = protocol::read_payload(reader, header.payload_size)?;
    Ok(Some((header, payload)))
}

impl Drop for WorkerSlot {
    fn drop(&mut self) {
        self.close();
    }
}
