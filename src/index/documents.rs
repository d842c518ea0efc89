//! Per-worker document store
//!
//! Holds every parsed file of a worker's shard: its path and the visible
//! text of each non-empty line. A document's position in the store is its
//! file id in the inverted index.

/// Running byte/word/line totals for a shard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextTotals {
    pub bytes: u64,
    pub words: u64,
    pub lines: u64,
}

impl TextTotals {
    pub fn add(&mut self, other: TextTotals) {
        self.bytes += other.bytes;
        self.words += other.words;
        self.lines += other.lines;
    }
}

/// A parsed text file
#[derive(Debug, Clone)]
pub struct Document {
    path: String,
    lines: Vec<String>,
}

impl Document {
    pub fn new(path: String, lines: Vec<String>) -> Self {
        Self { path, lines }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn line(&self, line_id: usize) -> Option<&str> {
        self.lines.get(line_id).map(String::as_str)
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }
}

/// Append-only collection of a shard's documents
#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: Vec<Document>,
    totals: TextTotals,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id the next pushed document will receive
    pub fn next_id(&self) -> usize {
        self.documents.len()
    }

    /// Append a document and its counts; returns its file id
    pub fn push(&mut self, document: Document, totals: TextTotals) -> usize {
        self.documents.push(document);
        self.totals.add(totals);
        self.documents.len() - 1
    }

    pub fn get(&self, file_id: usize) -> Option<&Document> {
        self.documents.get(file_id)
    }

    /// Path of a document, or an empty string for an unknown id
    pub fn path(&self, file_id: usize) -> &str {
        self.documents.get(file_id).map_or("", Document::path)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn totals(&self) -> TextTotals {
        self.totals
    }
}
