//! Shard parsing
//!
//! Every regular file of every assigned directory is read twice:
//! - pass 1 counts the non-empty lines and the visible length of each
//! - pass 2 materializes the visible text into the document store and feeds
//!   each word into the inverted index
//!
//! Leading spaces and tabs are skipped, lines that are empty after that are
//! dropped, and `<...>` tag spans are removed from the visible text. Words
//! are split on spaces and tabs.

use super::documents::{Document, DocumentStore, TextTotals};
use super::trie::InvertedIndex;
use crate::error::{IndexError, IndexResult};
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Index and documents built from one shard
#[derive(Debug, Default)]
pub struct ShardIndex {
    pub documents: DocumentStore,
    pub index: InvertedIndex,
}

/// Regular files of `dir`, sorted by name
pub fn list_files(dir: &Path) -> IndexResult<Vec<PathBuf>> {
    let read_dir = fs::read_dir(dir).map_err(|e| IndexError::ReadDir {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut files = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|e| IndexError::ReadDir {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if is_file {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Content of a raw line once leading blanks and line endings are removed
fn trimmed(raw: &str) -> &str {
    raw.trim_end_matches(['\n', '\r'])
        .trim_start_matches([' ', '\t'])
}

/// Visible text of a line with every `<...>` span removed
pub fn strip_tags(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut in_tag = false;
    for ch in line.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}

/// Words of a visible line
pub fn words(line: &str) -> impl Iterator<Item = &str> {
    line.split([' ', '\t']).filter(|w| !w.is_empty())
}

fn open(path: &Path) -> IndexResult<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| IndexError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Iterate the raw lines of a file as lossily decoded text
fn for_each_line<F>(path: &Path, mut f: F) -> IndexResult<()>
where
    F: FnMut(&str),
{
    let mut reader = open(path)?;
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .map_err(|e| IndexError::ReadFile {
                path: path.to_path_buf(),
                source: e,
            })?;
        if n == 0 {
            return Ok(());
        }
        f(&String::from_utf8_lossy(&buf));
    }
}

/// Pass 1: visible length of every non-empty line
fn measure(path: &Path) -> IndexResult<Vec<usize>> {
    let mut lengths = Vec::new();
    for_each_line(path, |raw| {
        let line = trimmed(raw);
        if !line.is_empty() {
            lengths.push(strip_tags(line).len());
        }
    })?;
    Ok(lengths)
}

/// Parse one file into the store and index; returns its file id
pub fn parse_file(path: &Path, shard: &mut ShardIndex) -> IndexResult<usize> {
    let lengths = measure(path)?;

    let file_id = shard.documents.next_id();
    let mut lines: Vec<String> = Vec::with_capacity(lengths.len());
    let mut totals = TextTotals::default();

    for_each_line(path, |raw| {
        let line = trimmed(raw);
        if line.is_empty() {
            return;
        }
        let line_id = lines.len();
        let mut visible = String::with_capacity(lengths.get(line_id).copied().unwrap_or(0));
        visible.push_str(&strip_tags(line));

        for word in words(&visible) {
            shard.index.add_appearance(word, file_id, line_id);
            totals.words += 1;
        }
        totals.bytes += visible.len() as u64;
        totals.lines += 1;
        lines.push(visible);
    })?;

    let document = Document::new(path.to_string_lossy().into_owned(), lines);
    Ok(shard.documents.push(document, totals))
}

/// Build the index for a list of directories
///
/// Unreadable directories and files are logged and skipped; the worker
/// still serves whatever it managed to parse.
pub fn build_shard<S: AsRef<str>>(directories: &[S]) -> ShardIndex {
    let mut shard = ShardIndex::default();

    for dir in directories {
        let dir = Path::new(dir.as_ref());
        let files = match list_files(dir) {
            Ok(files) => files,
            Err(e) => {
                warn!(error = %e, "Skipping directory");
                continue;
            }
        };

        for file in files {
            if let Err(e) = parse_file(&file, &mut shard) {
                warn!(error = %e, "Skipping file");
            }
        }
        debug!(dir = %dir.display(), documents = shard.documents.len(), "Parsed directory");
    }

    shard
}
