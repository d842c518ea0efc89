//! Per-worker query log
//!
//! One line per request: `<timestamp> : <verb> : <field> : ...`. A worker
//! started without a log directory keeps a disabled log and writes nothing.

use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

pub struct QueryLog {
    writer: Option<BufWriter<File>>,
}

impl QueryLog {
    /// `<dir>/worker_<pid>.log`
    pub fn path_for(dir: &Path, pid: u32) -> PathBuf {
        dir.join(format!("worker_{}.log", pid))
    }

    /// Open (appending) the log for this process, or a disabled log
    pub fn open(dir: Option<&Path>, pid: u32) -> io::Result<Self> {
        let Some(dir) = dir else {
            return Ok(Self::disabled());
        };
        std::fs::create_dir_all(dir)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(Self::path_for(dir, pid))?;
        Ok(Self {
            writer: Some(BufWriter::new(file)),
        })
    }

    pub fn disabled() -> Self {
        Self { writer: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.writer.is_some()
    }

    /// Append one entry; a failing log is closed after the first error
    pub fn record(&mut self, verb: &str, fields: &[&str]) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };

        let mut line = format!("{} : {}", Local::now().format("%a %b %e %H:%M:%S %Y"), verb);
        for field in fields {
            line.push_str(" : ");
            line.push_str(field);
        }

        let result = writeln!(writer, "{}", line).and_then(|_| writer.flush());
        if let Err(e) = result {
            warn!(error = %e, "Query log disabled after write failure");
            self.writer = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_records_are_appended() {
        let dir = tempdir().unwrap();
        {
            let mut log = QueryLog::open(Some(dir.path()), 42).unwrap();
            assert!(log.is_enabled());
            log.record("search", &["apple", "/save/site1/a.html"]);
            log.record("wc", &["10", "2", "1"]);
        }
        {
            let mut log = QueryLog::open(Some(dir.path()), 42).unwrap();
            log.record("maxcount", &["pear", "-", "-"]);
        }

        let text = std::fs::read_to_string(QueryLog::path_for(dir.path(), 42)).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with(" : search : apple : /save/site1/a.html"));
        assert!(lines[1].ends_with(" : wc : 10 : 2 : 1"));
        assert!(lines[2].ends_with(" : maxcount : pear : - : -"));
    }

    #[test]
    fn test_disabled_log_writes_nothing() {
        let mut log = QueryLog::open(None, 1).unwrap();
        assert!(!log.is_enabled());
        log.record("wc", &["0", "0", "0"]);
    }
}
