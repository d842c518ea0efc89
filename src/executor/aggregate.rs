//! Combining worker answers into one response

use crate::index::{Extreme, TextTotals};

/// Running best `(path, count)` across workers
#[derive(Debug, Clone)]
pub struct BestFile {
    extreme: Extreme,
    best: Option<(String, u64)>,
}

impl BestFile {
    pub fn new(extreme: Extreme) -> Self {
        Self {
            extreme,
            best: None,
        }
    }

    /// Consider one worker's answer
    pub fn offer(&mut self, path: String, count: u64) {
        let better = match &self.best {
            None => true,
            Some((best_path, best_count)) => self
                .extreme
                .prefers((count, &path), (*best_count, best_path)),
        };
        if better {
            self.best = Some((path, count));
        }
    }

    pub fn result(&self) -> Option<(&str, u64)> {
        self.best.as_ref().map(|(p, c)| (p.as_str(), *c))
    }
}

/// Sum of every answering worker's totals
#[derive(Debug, Clone, Copy, Default)]
pub struct WordTotals(pub TextTotals);

impl WordTotals {
    pub fn add(&mut self, [bytes, words, lines]: [u64; 3]) {
        self.0.add(TextTotals {
            bytes,
            words,
            lines,
        });
    }

    pub fn render(&self) -> String {
        format!(
            "Bytes: {}  Words: {}  Lines: {}",
            self.0.bytes, self.0.words, self.0.lines
        )
    }
}

/// One matching line as sent by a worker: `"<path>  <n>\n<text>"`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub location: String,
    pub text: String,
}

impl SearchHit {
    pub fn encode(path: &str, line_number: usize, text: &str) -> String {
        format!("{}  {}\n{}", path, line_number, text)
    }

    pub fn decode(payload: &[u8]) -> Self {
        let record = String::from_utf8_lossy(payload);
        match record.split_once('\n') {
            Some((location, text)) => Self {
                location: location.to_string(),
                text: text.to_string(),
            },
            None => Self {
                location: record.into_owned(),
                text: String::new(),
            },
        }
    }
}

pub fn not_found_message(word_count: usize) -> &'static str {
    if word_count == 1 {
        "Given word does not exist in any text file"
    } else {
        "Given words do not exist in any text file"
    }
}

pub const NO_FILE_MESSAGE: &str = "There is no text file containing given keyword";

/// Dead tally for `/search`
pub fn search_dead_notice(dead: usize) -> String {
    format!(
        "{} workers did not answer because they were forced to terminate",
        dead
    )
}

/// Dead tally for `/maxcount`, `/mincount` and `/wc`
pub fn dead_notice(dead: usize, total: usize) -> String {
    format!(
        "{} out of {} workers did not answer because they were forced to terminate",
        dead, total
    )
}

pub fn timeout_notice(worker: usize) -> String {
    format!("worker {} did not respond in time", worker)
}

pub fn exit_notice(worker: usize, words: u32) -> String {
    format!(
        "worker {} found {} (different) word(s) in /search commands.",
        worker, words
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_best_file_max_ties_to_smaller_path() {
        let mut best = BestFile::new(Extreme::Max);
        best.offer("/save/site2/b.txt".into(), 5);
        best.offer("/save/site1/a.txt".into(), 5);
        best.offer("/save/site3/c.txt".into(), 2);
        assert_eq!(best.result(), Some(("/save/site1/a.txt", 5)));
    }

    #[test]
    fn test_best_file_min() {
        let mut best = BestFile::new(Extreme::Min);
        assert_eq!(best.result(), None);
        best.offer("/s/z.txt".into(), 1);
        best.offer("/s/a.txt".into(), 4);
        best.offer("/s/m.txt".into(), 1);
        assert_eq!(best.result(), Some(("/s/m.txt", 1)));
    }

    #[test]
    fn test_word_totals() {
        let mut totals = WordTotals::default();
        totals.add([10, 2, 1]);
        totals.add([5, 1, 1]);
        assert_eq!(totals.render(), "Bytes: 15  Words: 3  Lines: 2");
    }

    #[test]
    fn test_search_hit_round_trip() {
        let encoded = SearchHit::encode("/save/site1/a.html", 3, "apple pie");
        let hit = SearchHit::decode(encoded.as_bytes());
        assert_eq!(hit.location, "/save/site1/a.html  3");
        assert_eq!(hit.text, "apple pie");
    }

    #[test]
    fn test_messages() {
        assert_eq!(not_found_message(1), "Given word does not exist in any text file");
        assert_eq!(not_found_message(2), "Given words do not exist in any text file");
        assert_eq!(
            dead_notice(1, 2),
            "1 out of 2 workers did not answer because they were forced to terminate"
        );
        assert_eq!(exit_notice(0, 3), "worker 0 found 3 (different) word(s) in /search commands.");
    }
}
