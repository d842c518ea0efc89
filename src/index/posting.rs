//! Posting lists
//!
//! A posting list records every (file, line) a word occurs on, with the
//! number of occurrences on that line. Entries are kept strictly ordered by
//! `(file_id, line_id)`, which also keeps all lines of one file adjacent.
//! The aggregate queries rely on that contiguity to total a file's
//! occurrences in a single linear pass.

use std::cmp::Ordering;

/// One (file, line) occurrence record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posting {
    pub file_id: usize,
    pub line_id: usize,
    pub count: u32,
}

impl Posting {
    fn key(&self) -> (usize, usize) {
        (self.file_id, self.line_id)
    }
}

/// Which end of the count range an aggregate query is after
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extreme {
    Max,
    Min,
}

impl Extreme {
    /// True if `candidate` beats `best`; equal counts go to the smaller path
    pub fn prefers(self, candidate: (u64, &str), best: (u64, &str)) -> bool {
        let by_count = match self {
            Extreme::Max => candidate.0.cmp(&best.0),
            Extreme::Min => best.0.cmp(&candidate.0),
        };
        match by_count {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => candidate.1 < best.1,
        }
    }
}

/// Occurrences of a single word across a worker's documents
#[derive(Debug, Clone, Default)]
pub struct PostingList {
    entries: Vec<Posting>,

    /// Set once a search has matched this word
    found_by_worker: bool,
}

impl PostingList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one more occurrence of the word on `(file_id, line_id)`
    pub fn add_appearance(&mut self, file_id: usize, line_id: usize) {
        match self
            .entries
            .binary_search_by_key(&(file_id, line_id), Posting::key)
        {
            Ok(pos) => self.entries[pos].count += 1,
            Err(pos) => self.entries.insert(
                pos,
                Posting {
                    file_id,
                    line_id,
                    count: 1,
                },
            ),
        }
    }

    pub fn entries(&self) -> &[Posting] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Mark the word as found by a search; returns true the first time
    pub fn mark_found(&mut self) -> bool {
        !std::mem::replace(&mut self.found_by_worker, true)
    }

    pub fn found_by_worker(&self) -> bool {
        self.found_by_worker
    }

    /// Whether the word occurs anywhere in `file_id`
    #[cfg(test)]
    pub fn involves_file(&self, file_id: usize) -> bool {
        let start = self.entries.partition_point(|p| p.file_id < file_id);
        self.entries.get(start).is_some_and(|p| p.file_id == file_id)
    }

    /// Per-file occurrence totals, in file order
    pub fn file_totals(&self) -> impl Iterator<Item = (usize, u64)> + '_ {
        self.entries
            .chunk_by(|a, b| a.file_id == b.file_id)
            .map(|group| {
                let total = group.iter().map(|p| u64::from(p.count)).sum();
                (group[0].file_id, total)
            })
    }

    /// File with the largest or smallest total, ties to the smaller path
    ///
    /// `path_of` maps a file id to its path. Returns `None` for an empty list.
    pub fn extreme_file<'a, F>(&self, extreme: Extreme, path_of: F) -> Option<(usize, u64)>
    where
        F: Fn(usize) -> &'a str,
    {
        let mut best: Option<(usize, u64)> = None;
        for (file_id, total) in self.file_totals() {
            let better = match best {
                None => true,
                Some((best_id, best_total)) => {
                    extreme.prefers((total, path_of(file_id)), (best_total, path_of(best_id)))
                }
            };
            if better {
                best = Some((file_id, total));
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_strictly_ordered(list: &PostingList) -> bool {
        list.entries().windows(2).all(|w| w[0].key() < w[1].key())
    }

    #[test]
    fn test_out_of_order_inserts_stay_sorted() {
        let mut list = PostingList::new();
        for (file, line) in [(2, 0), (0, 5), (1, 1), (0, 1), (2, 0), (0, 5), (1, 0)] {
            list.add_appearance(file, line);
        }

        assert!(is_strictly_ordered(&list));
        assert_eq!(list.len(), 5);
        assert_eq!(list.entries()[1], Posting { file_id: 0, line_id: 5, count: 2 });

        // files are contiguous: ids never go back once left
        let ids: Vec<usize> = list.entries().iter().map(|p| p.file_id).collect();
        let mut seen = ids.clone();
        seen.dedup();
        let mut sorted = seen.clone();
        sorted.sort_unstable();
        assert_eq!(seen, sorted);
    }

    #[test]
    fn test_file_totals() {
        let mut list = PostingList::new();
        list.add_appearance(0, 0);
        list.add_appearance(0, 3);
        list.add_appearance(0, 3);
        list.add_appearance(4, 1);
        let totals: Vec<_> = list.file_totals().collect();
        assert_eq!(totals, vec![(0, 3), (4, 1)]);
        assert!(list.involves_file(4));
        assert!(!list.involves_file(2));
    }

    #[test]
    fn test_extreme_tie_breaks_on_path() {
        let paths = ["/s/zeta.txt", "/s/alpha.txt", "/s/mid.txt"];
        let mut list = PostingList::new();
        for _ in 0..3 {
            list.add_appearance(0, 0);
            list.add_appearance(1, 2);
        }
        list.add_appearance(2, 0);

        let max = list.extreme_file(Extreme::Max, |id| paths[id]);
        assert_eq!(max, Some((1, 3)));

        let min = list.extreme_file(Extreme::Min, |id| paths[id]);
        assert_eq!(min, Some((2, 1)));
    }

    #[test]
    fn test_mark_found_once() {
        let mut list = PostingList::new();
        assert!(!list.found_by_worker());
        assert!(list.mark_found());
        assert!(!list.mark_found());
        assert!(list.found_by_worker());
    }

    #[test]
    fn test_empty_list_has_no_extreme() {
        let list = PostingList::new();
        assert!(list.is_empty());
        assert_eq!(list.extreme_file(Extreme::Max, |_| ""), None);
    }
}
