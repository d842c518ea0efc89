//! Index worker - parses one shard and answers coordinator requests
//!
//! Startup:
//! 1. open the request FIFO (blocks until the coordinator opens it)
//! 2. read the directory list: `INIT` records, the last one `END_OF_MESSAGES`
//! 3. parse every file of the shard into the document store and trie
//! 4. open the answer FIFO, which tells the coordinator parsing is done
//!
//! Then one request is read and answered at a time until `EXIT` or until
//! the coordinator closes the request pipe.

use super::aggregate::SearchHit;
use super::query_log::QueryLog;
use super::signals;
use crate::config::WorkerConfig;
use crate::error::{ExecutorError, ExecutorResult, ProtocolError};
use crate::index::{build_shard, Extreme, ShardIndex};
use crate::protocol::{self, Header, MessageType};
use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Counters reported when the worker exits
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerSummary {
    /// Documents parsed from the shard
    pub documents: usize,

    /// Distinct words matched by `/search` requests
    pub words_found: u32,

    /// Requests answered
    pub requests: u64,
}

/// Read the shard's directory records from the request pipe
pub fn read_assignment<R: Read>(request: &mut R) -> ExecutorResult<Vec<String>> {
    let mut directories = Vec::new();
    loop {
        let header = protocol::read_header(request)?.ok_or(ProtocolError::ShortRead {
            expected: protocol::HEADER_SIZE,
            got: 0,
        })?;
        match header.kind {
            MessageType::Init => directories.push(protocol::read_string(request, header.payload_size)?),
            MessageType::EndOfMessages => {
                if header.payload_size > 0 {
                    directories.push(protocol::read_string(request, header.payload_size)?);
                }
                return Ok(directories);
            }
            other => return Err(ProtocolError::Unexpected(other).into()),
        }
    }
}

fn open_fifo(path: &Path, options: &OpenOptions) -> ExecutorResult<File> {
    options.open(path).map_err(|source| ExecutorError::FifoOpen {
        path: path.to_path_buf(),
        source,
    })
}

pub struct IndexWorker<R, W> {
    shard: ShardIndex,
    request: R,
    answer: W,
    log: QueryLog,
    terminate: Arc<AtomicBool>,
    words_found: u32,
    requests: u64,
}

impl IndexWorker<BufReader<File>, BufWriter<File>> {
    /// Run the startup handshake on the configured FIFOs
    pub fn connect(config: &WorkerConfig, terminate: Arc<AtomicBool>) -> ExecutorResult<Self> {
        let request = open_fifo(&config.request_fifo, OpenOptions::new().read(true))?;
        let mut request = BufReader::new(request);

        let directories = read_assignment(&mut request)?;
        if directories.len() > config.shard_size {
            warn!(
                received = directories.len(),
                expected = config.shard_size,
                "More directories than the announced shard size"
            );
        }

        let shard = build_shard(&directories);
        info!(
            directories = directories.len(),
            documents = shard.documents.len(),
            words = shard.index.len(),
            "Shard parsed"
        );

        let log = QueryLog::open(config.log_dir.as_deref(), std::process::id()).unwrap_or_else(|e| {
            warn!(error = %e, "Cannot open query log");
            QueryLog::disabled()
        });
        if log.is_enabled() {
            debug!(dir = ?config.log_dir, "Query log enabled");
        }

        let answer = open_fifo(&config.answer_fifo, OpenOptions::new().write(true))?;

        Ok(IndexWorker::new(shard, request, BufWriter::new(answer), log, terminate))
    }
}

impl<R: Read, W: Write> IndexWorker<R, W> {
    pub fn new(shard: ShardIndex, request: R, answer: W, log: QueryLog, terminate: Arc<AtomicBool>) -> Self {
        Self {
            shard,
            request,
            answer,
            log,
            terminate,
            words_found: 0,
            requests: 0,
        }
    }

    /// Answer requests until `EXIT`, end of the request stream or a signal
    pub fn serve(mut self) -> ExecutorResult<WorkerSummary> {
        loop {
            if self.terminating() {
                debug!("Termination requested");
                break;
            }

            let Some((raw_kind, payload_size)) = protocol::read_raw_header(&mut self.request)? else {
                debug!("Request pipe closed");
                break;
            };
            self.requests += 1;

            let kind = match MessageType::try_from(raw_kind) {
                Ok(kind) => kind,
                Err(e) => {
                    debug!(error = %e, "Unknown request");
                    self.reject(payload_size)?;
                    continue;
                }
            };
            let header = Header::new(kind, payload_size);

            match header.kind {
                MessageType::Search => {
                    let words = protocol::read_search_words(&mut self.request, header.payload_size)?;
                    self.search(&words)?;
                }
                kind @ (MessageType::MaxCount | MessageType::MinCount) => {
                    let word = protocol::read_string(&mut self.request, header.payload_size)?;
                    self.count(kind, &word)?;
                }
                MessageType::WordCount => self.word_count()?,
                MessageType::Exit => {
                    self.answer.write_all(&self.words_found.to_ne_bytes())?;
                    self.answer.flush()?;
                    break;
                }
                other => {
                    debug!(kind = ?other, "Unsupported request");
                    self.reject(header.payload_size)?;
                }
            }
        }

        Ok(WorkerSummary {
            documents: self.shard.documents.len(),
            words_found: self.words_found,
            requests: self.requests,
        })
    }

    /// Skip the payload of a request this worker does not serve and answer `ERROR`
    fn reject(&mut self, payload_size: u32) -> ExecutorResult<()> {
        protocol::read_payload(&mut self.request, payload_size)?;
        self.answer.write_all(&Header::bare(MessageType::Error).to_bytes())?;
        self.answer.flush()?;
        Ok(())
    }

    fn terminating(&self) -> bool {
        self.terminate.load(Ordering::SeqCst)
    }

    fn search(&mut self, words: &[String]) -> ExecutorResult<()> {
        signals::reset_cancel();

        let mut lines = BTreeSet::new();
        for word in words {
            if let Some(list) = self.shard.index.get_mut(word) {
                if list.mark_found() {
                    self.words_found += 1;
                }
                lines.extend(list.entries().iter().map(|p| (p.file_id, p.line_id)));
            }
        }

        if self.terminating() {
            // no END: the coordinator must see this as a death, not a short answer
            return Ok(());
        }

        let documents = &self.shard.documents;
        let mut sent = 0usize;
        let mut cancelled = false;
        for (file_id, line_id) in lines {
            if signals::cancel_requested() {
                cancelled = true;
                break;
            }
            let Some(document) = documents.get(file_id) else {
                continue;
            };
            let text = document.line(line_id).unwrap_or("");
            let record = SearchHit::encode(document.path(), line_id + 1, text);
            protocol::write_message(&mut self.answer, MessageType::Search, record.as_bytes())?;
            sent += 1;
        }

        self.answer.write_all(&Header::bare(MessageType::EndOfMessages).to_bytes())?;
        self.answer.flush()?;

        if cancelled {
            info!(sent, "Search cancelled");
            return Ok(());
        }
        debug!(words = words.len(), sent, "Search answered");

        for word in words {
            let paths = match self.shard.index.get(word) {
                Some(list) => list
                    .file_totals()
                    .map(|(file_id, _)| documents.path(file_id))
                    .collect::<Vec<_>>()
                    .join(" "),
                None => "-".to_string(),
            };
            self.log.record("search", &[word, &paths]);
        }
        Ok(())
    }

    fn count(&mut self, kind: MessageType, word: &str) -> ExecutorResult<()> {
        let (extreme, verb) = match kind {
            MessageType::MinCount => (Extreme::Min, "mincount"),
            _ => (Extreme::Max, "maxcount"),
        };
        let documents = &self.shard.documents;
        let best = self
            .shard
            .index
            .get(word)
            .and_then(|list| list.extreme_file(extreme, |id| documents.path(id)));

        match best {
            Some((file_id, total)) => {
                let path = documents.path(file_id);
                let count = u32::try_from(total).unwrap_or(u32::MAX);
                protocol::write_message(&mut self.answer, kind, path.as_bytes())?;
                self.answer.write_all(&count.to_ne_bytes())?;
                self.log.record(verb, &[word, &count.to_string(), path]);
            }
            None => {
                self.answer.write_all(&Header::bare(MessageType::EndOfMessages).to_bytes())?;
                self.log.record(verb, &[word, "-", "-"]);
            }
        }
        self.answer.flush()?;
        Ok(())
    }

    fn word_count(&mut self) -> ExecutorResult<()> {
        let totals = self.shard.documents.totals();
        let mut reply = Vec::with_capacity(24);
        for value in [totals.bytes, totals.words, totals.lines] {
            reply.extend_from_slice(&value.to_ne_bytes());
        }
        self.answer.write_all(&reply)?;
        self.answer.flush()?;
        self.log.record(
            "wc",
            &[
                &totals.bytes.to_string(),
                &totals.words.to_string(),
                &totals.lines.to_string(),
            ],
        );
        Ok(())
    }
}
