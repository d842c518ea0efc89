//! Index coordinator - owns the worker pool and answers commands
//!
//! The coordinator is responsible for:
//! - Splitting the directory list into round-robin shards
//! - Starting one index worker per shard and waiting for all to parse
//! - Reading commands line by line and broadcasting them to live workers
//! - Merging answers, with a deadline for `/search`
//! - Replacing workers that died between commands
//! - Collecting per-worker statistics on `/exit`

use super::aggregate::{self, BestFile, SearchHit, WordTotals};
use super::command::Command;
use super::fifo;
use super::render::underline;
use super::shard;
use super::slot::{Assignment, SlotState, WorkerProgram, WorkerSlot};
use crate::config::ExecutorConfig;
use crate::error::{ExecutorError, ExecutorResult, ProtocolError};
use crate::index::Extreme;
use crate::protocol::{self, Header, MessageType, StartupInfo, END_SENTINEL};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use std::io::{BufRead, Write};
use std::os::unix::io::RawFd;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Longest single wait before shutdown and deadlines are re-checked
const POLL_TICK: Duration = Duration::from_millis(200);

/// Statistics for a finished session
#[derive(Debug, Clone, Default)]
pub struct CoordinatorSummary {
    /// Workers started at the beginning
    pub workers: usize,

    /// Commands executed (blank and rejected lines excluded)
    pub commands: u64,

    /// Successful worker replacements
    pub restarts: u32,

    /// Slots that could not be replaced
    pub retired: usize,

    /// Ended by a signal rather than `/exit` or end of input
    pub interrupted: bool,
}

enum Flow {
    Continue,
    Stop,
}

/// Distributes directories over index workers and serves queries
pub struct IndexCoordinator {
    /// Configuration
    config: ExecutorConfig,

    /// How workers are launched, including replacements
    program: WorkerProgram,

    /// Width used to wrap search results
    terminal_width: usize,

    /// One slot per started worker
    slots: Vec<WorkerSlot>,

    /// Set by the signal handler
    shutdown: Arc<AtomicBool>,

    /// Commands executed so far
    commands: u64,
}

impl IndexCoordinator {
    /// Start every worker and wait until all of them have parsed their shard
    ///
    /// Any worker failing to start is fatal.
    pub fn start(
        config: ExecutorConfig,
        startup: StartupInfo,
        shutdown: Arc<AtomicBool>,
    ) -> ExecutorResult<Self> {
        let directories = startup.directories;
        let workers = shard::effective_workers(config.workers, directories.len());
        let shard_size = shard::shard_size(directories.len(), workers);
        let tag = format!("webcrawler_{}", std::process::id());
        let program = WorkerProgram {
            path: config.worker_program.clone(),
            log_dir: config.log_dir.clone(),
        };

        info!(
            workers,
            directories = directories.len(),
            shard_size,
            "Starting index workers"
        );

        let started = Instant::now();
        let mut slots = Vec::with_capacity(workers);
        let launched = start_slots(
            &mut slots,
            &program,
            &config.fifo_dir,
            &tag,
            &directories,
            workers,
            shard_size,
            &shutdown,
        );
        if let Err(e) = launched {
            // dropping a parsing worker would wait on it forever
            slots.iter_mut().for_each(WorkerSlot::kill);
            return Err(e);
        }

        info!(
            workers,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "All index workers ready"
        );

        Ok(Self {
            config,
            program,
            terminal_width: startup.terminal_width,
            slots,
            shutdown,
            commands: 0,
        })
    }

    /// Number of worker slots
    pub fn workers(&self) -> usize {
        self.slots.len()
    }

    /// Get a clone of the shutdown flag (for signal handlers)
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Serve commands from `input` until `/exit`, end of input or a signal
    ///
    /// Every response written to `out` ends with the `<END>` line.
    pub fn run<R, W>(mut self, input: R, out: &mut W) -> ExecutorResult<CoordinatorSummary>
    where
        R: BufRead + Send + 'static,
        W: Write,
    {
        let lines = spawn_line_reader(input)?;
        let mut interrupted = false;

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                interrupted = true;
                break;
            }

            let line = match lines.recv_timeout(POLL_TICK) {
                Ok(line) => line,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("Command input closed");
                    match self.finish(out) {
                        Ok(()) => {}
                        Err(ExecutorError::Interrupted) => interrupted = true,
                        Err(e) => return Err(e),
                    }
                    break;
                }
            };

            match self.handle_line(&line, out) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => break,
                Err(ExecutorError::Interrupted) => {
                    interrupted = true;
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        let summary = CoordinatorSummary {
            workers: self.slots.len(),
            commands: self.commands,
            restarts: self.slots.iter().map(WorkerSlot::restarts).sum(),
            retired: self
                .slots
                .iter()
                .filter(|s| s.state() == SlotState::Retired)
                .count(),
            interrupted,
        };
        self.close_all();
        Ok(summary)
    }

    fn handle_line<W: Write>(&mut self, line: &str, out: &mut W) -> ExecutorResult<Flow> {
        let command = match Command::parse(line) {
            Ok(Some(command)) => command,
            Ok(None) => {
                end_response(out)?;
                return Ok(Flow::Continue);
            }
            Err(e) => {
                writeln!(out, "{}", e)?;
                end_response(out)?;
                return Ok(Flow::Continue);
            }
        };

        self.commands += 1;
        debug!(command = ?command, "Executing command");

        if command == Command::Exit {
            self.finish(out)?;
            return Ok(Flow::Stop);
        }

        self.revive();
        self.execute(&command, out)?;
        end_response(out)?;

        for slot in &mut self.slots {
            slot.poll_liveness();
        }
        Ok(Flow::Continue)
    }

    /// Replace workers found dead since the last command
    fn revive(&mut self) {
        for slot in &mut self.slots {
            if slot.poll_liveness() == SlotState::Dead {
                let _ = slot.replace(&self.program);
            }
        }
    }

    fn execute<W: Write>(&mut self, command: &Command, out: &mut W) -> ExecutorResult<()> {
        match command {
            Command::Search(words) => self.search(words, out),
            Command::MaxCount(word) => self.count_query(Extreme::Max, word, out),
            Command::MinCount(word) => self.count_query(Extreme::Min, word, out),
            Command::WordCount => self.word_count(out),
            // handled before dispatch
            Command::Exit => Ok(()),
        }
    }

    /// Send `request` to every live worker; returns receivers and the dead count
    fn broadcast(&mut self, request: &[u8]) -> (Vec<usize>, usize) {
        let mut pending = Vec::new();
        let mut dead = 0;
        for slot in &mut self.slots {
            if slot.send(request) {
                pending.push(slot.index());
            } else {
                dead += 1;
            }
        }
        (pending, dead)
    }

    fn ready_among(&self, pending: &[usize], wait: Duration) -> ExecutorResult<Vec<usize>> {
        let watched: Vec<(usize, RawFd)> = pending
            .iter()
            .filter_map(|&i| self.slots[i].answer_fd().map(|fd| (i, fd)))
            .collect();
        let fds: Vec<RawFd> = watched.iter().map(|&(_, fd)| fd).collect();
        let ready = fifo::poll_readable(&fds, wait)?;
        Ok(ready.into_iter().map(|k| watched[k].0).collect())
    }

    /// Wait for every pending worker without a time limit
    ///
    /// `read` consumes one worker's answer. Workers whose answer cannot be
    /// read are marked dead and left out of the result.
    fn gather<T, F>(&mut self, mut pending: Vec<usize>, mut read: F) -> ExecutorResult<(Vec<(usize, T)>, usize)>
    where
        F: FnMut(&mut WorkerSlot) -> ExecutorResult<T>,
    {
        let mut answers = Vec::with_capacity(pending.len());
        let mut dead = 0;

        while !pending.is_empty() {
            if self.shutdown.load(Ordering::SeqCst) {
                return Err(ExecutorError::Interrupted);
            }
            for index in self.ready_among(&pending, POLL_TICK)? {
                pending.retain(|&i| i != index);
                let slot = &mut self.slots[index];
                match read(slot) {
                    Ok(answer) => answers.push((index, answer)),
                    Err(e) => {
                        warn!(worker = index, error = %e, "Lost worker answer");
                        slot.mark_dead();
                        dead += 1;
                    }
                }
            }
            // a slot without an answer descriptor can never become ready
            let before = pending.len();
            pending.retain(|&i| self.slots[i].answer_fd().is_some());
            dead += before - pending.len();
        }
        Ok((answers, dead))
    }

    fn search<W: Write>(&mut self, words: &[String], out: &mut W) -> ExecutorResult<()> {
        let request = protocol::encode_search(words);
        let deadline = Instant::now() + self.config.deadline;
        let read_limit = deadline + self.config.grace;
        let width = self.terminal_width;

        let (mut pending, mut dead) = self.broadcast(&request);
        let mut hits = 0usize;

        while !pending.is_empty() {
            if self.shutdown.load(Ordering::SeqCst) {
                return Err(ExecutorError::Interrupted);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            for index in self.ready_among(&pending, remaining.min(POLL_TICK))? {
                pending.retain(|&i| i != index);
                let slot = &mut self.slots[index];
                match relay_hits(slot, words, read_limit, width, &mut hits, out) {
                    Ok(()) => {}
                    Err(e @ ExecutorError::Io(_)) => return Err(e),
                    Err(ExecutorError::Timeout { .. }) => {
                        // stalled part way through its answer
                        writeln!(out, "{}", aggregate::timeout_notice(index))?;
                        slot.kill();
                        dead += 1;
                    }
                    Err(e) => {
                        warn!(worker = index, error = %e, "Search answer lost");
                        slot.kill();
                        dead += 1;
                    }
                }
            }
        }

        for index in pending {
            writeln!(out, "{}", aggregate::timeout_notice(index))?;
            let slot = &mut self.slots[index];
            slot.cancel();
            let limit = Instant::now() + self.config.grace;
            match drain_hits(slot, limit) {
                Ok(discarded) => {
                    info!(worker = index, discarded, "Search deadline expired");
                }
                Err(e) => {
                    warn!(worker = index, error = %e, "Cancelled worker did not finish");
                    slot.kill();
                    dead += 1;
                }
            }
        }

        if hits == 0 {
            writeln!(out, "{}", aggregate::not_found_message(words.len()))?;
        }
        if dead > 0 {
            writeln!(out, "{}", aggregate::search_dead_notice(dead))?;
        }
        info!(words = words.len(), hits, dead, "Search answered");
        Ok(())
    }

    fn count_query<W: Write>(&mut self, extreme: Extreme, word: &str, out: &mut W) -> ExecutorResult<()> {
        let kind = match extreme {
            Extreme::Max => MessageType::MaxCount,
            Extreme::Min => MessageType::MinCount,
        };
        let request = protocol::encode_message(kind, word.as_bytes());
        let (pending, not_sent) = self.broadcast(&request);

        let (answers, lost) = self.gather(pending, |slot| read_count_answer(slot, kind))?;

        let mut best = BestFile::new(extreme);
        for (_, answer) in answers {
            if let Some((path, count)) = answer {
                best.offer(path, u64::from(count));
            }
        }

        match best.result() {
            Some((path, count)) => writeln!(out, "{}  count: {}", path, count)?,
            None => writeln!(out, "{}", aggregate::NO_FILE_MESSAGE)?,
        }
        writeln!(out)?;
        self.report_dead(not_sent + lost, out)
    }

    fn word_count<W: Write>(&mut self, out: &mut W) -> ExecutorResult<()> {
        let request = Header::bare(MessageType::WordCount).to_bytes();
        let (pending, not_sent) = self.broadcast(&request);
        let (answers, lost) = self.gather(pending, WorkerSlot::read_totals)?;

        let mut totals = WordTotals::default();
        for (_, answer) in answers {
            totals.add(answer);
        }
        writeln!(out, "{}", totals.render())?;
        self.report_dead(not_sent + lost, out)
    }

    fn report_dead<W: Write>(&self, dead: usize, out: &mut W) -> ExecutorResult<()> {
        if dead > 0 {
            writeln!(out, "{}", aggregate::dead_notice(dead, self.slots.len()))?;
        }
        Ok(())
    }

    /// Ask every worker for its statistics and let it exit
    fn finish<W: Write>(&mut self, out: &mut W) -> ExecutorResult<()> {
        let request = Header::bare(MessageType::Exit).to_bytes();
        let (pending, _) = self.broadcast(&request);
        let (mut answers, lost) = self.gather(pending, WorkerSlot::read_u32)?;
        answers.sort_by_key(|&(index, _)| index);

        for (index, words) in answers {
            writeln!(out, "{}", aggregate::exit_notice(index, words))?;
        }
        if lost > 0 {
            debug!(lost, "Workers exited without statistics");
        }
        end_response(out)
    }

    fn close_all(&mut self) {
        for slot in &mut self.slots {
            slot.close();
        }
        info!(workers = self.slots.len(), "Index workers stopped");
    }
}

/// Read one worker's search records until `END_OF_MESSAGES`, printing each hit
/// Hand out every shard, then wait for each worker to finish parsing
#[allow(clippy::too_many_arguments)]
fn start_slots(
    slots: &mut Vec<WorkerSlot>,
    program: &WorkerProgram,
    fifo_dir: &Path,
    tag: &str,
    directories: &[String],
    workers: usize,
    shard_size: usize,
    shutdown: &AtomicBool,
) -> ExecutorResult<()> {
    for index in 0..workers {
        if shutdown.load(Ordering::SeqCst) {
            return Err(ExecutorError::Interrupted);
        }
        let assignment = Assignment {
            shard_size,
            directories: shard::shard_for(directories, index, workers)
                .into_iter()
                .map(str::to_string)
                .collect(),
        };
        let slot = WorkerSlot::spawn(index, program, fifo_dir, tag, assignment)?;
        debug!(worker = index, pid = ?slot.pid(), dirs = slot.directories().len(), "Index worker spawned");
        slots.push(slot);
    }

    for slot in slots.iter_mut() {
        if shutdown.load(Ordering::SeqCst) {
            return Err(ExecutorError::Interrupted);
        }
        slot.await_ready()?;
        debug!(worker = slot.index(), "Index worker ready");
    }
    Ok(())
}

fn relay_hits<W: Write>(
    slot: &mut WorkerSlot,
    words: &[String],
    limit: Instant,
    width: usize,
    hits: &mut usize,
    out: &mut W,
) -> ExecutorResult<()> {
    loop {
        let Some((header, payload)) = slot.next_message(Some(limit))? else {
            return Err(closed_early());
        };
        match header.kind {
            MessageType::EndOfMessages => return Ok(()),
            MessageType::Search => {
                *hits += 1;
                let hit = SearchHit::decode(&payload);
                writeln!(out, "{}. {}", hits, hit.location)?;
                for row in underline(&hit.text, words, width) {
                    writeln!(out, "{}", row)?;
                }
                writeln!(out)?;
            }
            other => return Err(ProtocolError::Unexpected(other).into()),
        }
    }
}

/// Discard a cancelled worker's records up to `END_OF_MESSAGES`
fn drain_hits(slot: &mut WorkerSlot, limit: Instant) -> ExecutorResult<usize> {
    let mut discarded = 0;
    loop {
        let Some((header, _)) = slot.next_message(Some(limit))? else {
            return Err(closed_early());
        };
        match header.kind {
            MessageType::EndOfMessages => return Ok(discarded),
            MessageType::Search => discarded += 1,
            other => return Err(ProtocolError::Unexpected(other).into()),
        }
    }
}

/// `Some((path, count))`, or `None` when the word is not in the shard
fn read_count_answer(slot: &mut WorkerSlot, kind: MessageType) -> ExecutorResult<Option<(String, u32)>> {
    match slot.next_message(None)? {
        Some((header, _)) if header.kind == MessageType::EndOfMessages => Ok(None),
        Some((header, payload)) if header.kind == kind => {
            let count = slot.read_u32()?;
            Ok(Some((String::from_utf8_lossy(&payload).into_owned(), count)))
        }
        Some((header, _)) => Err(ProtocolError::Unexpected(header.kind).into()),
        None => Err(closed_early()),
    }
}

fn closed_early() -> ExecutorError {
    ProtocolError::ShortRead {
        expected: protocol::HEADER_SIZE,
        got: 0,
    }
    .into()
}

fn end_response<W: Write>(out: &mut W) -> ExecutorResult<()> {
    writeln!(out, "{}", END_SENTINEL)?;
    out.flush()?;
    Ok(())
}

/// Forward input lines to a channel from a dedicated thread
///
/// The channel disconnects at end of input.
pub fn spawn_line_reader<R: BufRead + Send + 'static>(input: R) -> ExecutorResult<Receiver<String>> {
    let (tx, rx) = unbounded();
    thread::Builder::new()
        .name("command-reader".into())
        .spawn(move || {
            for line in input.lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to read command input");
                        break;
                    }
                }
            }
        })?;
    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::path::PathBuf;

    fn empty_coordinator() -> IndexCoordinator {
        let config = ExecutorConfig {
            workers: 3,
            worker_program: PathBuf::from("/nonexistent/index-worker"),
            fifo_dir: std::env::temp_dir(),
            deadline: Duration::from_secs(1),
            grace: Duration::from_secs(1),
            log_dir: None,
        };
        let startup = StartupInfo {
            terminal_width: 80,
            directories: Vec::new(),
        };
        IndexCoordinator::start(config, startup, Arc::new(AtomicBool::new(false))).unwrap()
    }

    fn responses(output: &[u8]) -> Vec<Vec<String>> {
        let text = String::from_utf8_lossy(output);
        let mut out = Vec::new();
        let mut current = Vec::new();
        for line in text.lines() {
            if line == END_SENTINEL {
                out.push(std::mem::take(&mut current));
            } else {
                current.push(line.to_string());
            }
        }
        out
    }

    #[test]
    fn test_no_directories_starts_no_workers() {
        let coordinator = empty_coordinator();
        assert_eq!(coordinator.workers(), 0);
    }

    #[test]
    fn test_commands_without_workers() {
        let coordinator = empty_coordinator();
        let input = Cursor::new("/wc\n/search apple pie\n/maxcount apple\n/fly\n\n/exit\n");
        let mut output = Vec::new();
        let summary = coordinator.run(input, &mut output).unwrap();

        let replies = responses(&output);
        assert_eq!(replies.len(), 6);
        assert_eq!(replies[0], vec!["Bytes: 0  Words: 0  Lines: 0"]);
        assert_eq!(replies[1], vec!["Given words do not exist in any text file"]);
        assert_eq!(
            replies[2],
            vec!["There is no text file containing given keyword".to_string(), String::new()]
        );
        assert_eq!(replies[3], vec!["Unrecognized command"]);
        assert!(replies[4].is_empty());
        assert!(replies[5].is_empty());

        assert_eq!(summary.commands, 4);
        assert!(!summary.interrupted);
    }

    #[test]
    fn test_end_of_input_finishes_session() {
        let coordinator = empty_coordinator();
        let mut output = Vec::new();
        let summary = coordinator
            .run(Cursor::new("/search x\n"), &mut output)
            .unwrap();

        let replies = responses(&output);
        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0], vec!["Given word does not exist in any text file"]);
        assert_eq!(summary.commands, 1);
    }

    #[test]
    fn test_usage_error_reply() {
        let coordinator = empty_coordinator();
        let mut output = Vec::new();
        coordinator
            .run(Cursor::new("/mincount\n/exit\n"), &mut output)
            .unwrap();
        let replies = responses(&output);
        assert_eq!(replies[0], vec!["Usage: /mincount word"]);
    }

    #[test]
    fn test_shutdown_flag_stops_session() {
        let coordinator = empty_coordinator();
        coordinator.shutdown_flag().store(true, Ordering::SeqCst);
        let mut output = Vec::new();
        let summary = coordinator
            .run(Cursor::new("/wc\n"), &mut output)
            .unwrap();
        assert!(summary.interrupted);
        assert!(output.is_empty());
    }

    #[test]
    fn test_line_reader_disconnects_at_eof() {
        let rx = spawn_line_reader(Cursor::new("a\nb\n")).unwrap();
        assert_eq!(rx.recv().unwrap(), "a");
        assert_eq!(rx.recv().unwrap(), "b");
        assert!(rx.recv().is_err());
    }
}
