//! Trie-based inverted index
//!
//! Words are stored byte by byte in an arena of nodes. Each node keeps its
//! children sorted by byte, so walking the trie depth-first yields words in
//! byte-wise order. A node that terminates a word owns that word's
//! [`PostingList`].

use super::posting::PostingList;

#[derive(Debug, Default)]
struct TrieNode {
    /// (byte, arena index), sorted by byte
    children: Vec<(u8, usize)>,
    postings: Option<PostingList>,
}

impl TrieNode {
    fn child(&self, byte: u8) -> Option<usize> {
        self.children
            .binary_search_by_key(&byte, |&(b, _)| b)
            .ok()
            .map(|pos| self.children[pos].1)
    }
}

/// Word -> posting list map backed by a trie
#[derive(Debug)]
pub struct InvertedIndex {
    nodes: Vec<TrieNode>,
    distinct_words: usize,
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self {
            nodes: vec![TrieNode::default()],
            distinct_words: 0,
        }
    }

    /// Record an occurrence of `word` on `(file_id, line_id)`
    ///
    /// Empty words are ignored.
    pub fn add_appearance(&mut self, word: &str, file_id: usize, line_id: usize) {
        if word.is_empty() {
            return;
        }

        let mut current = 0;
        for &byte in word.as_bytes() {
            current = match self.nodes[current]
                .children
                .binary_search_by_key(&byte, |&(b, _)| b)
            {
                Ok(pos) => self.nodes[current].children[pos].1,
                Err(pos) => {
                    let next = self.nodes.len();
                    self.nodes.push(TrieNode::default());
                    self.nodes[current].children.insert(pos, (byte, next));
                    next
                }
            };
        }

        let node = &mut self.nodes[current];
        if node.postings.is_none() {
            self.distinct_words += 1;
        }
        node.postings
            .get_or_insert_with(PostingList::new)
            .add_appearance(file_id, line_id);
    }

    fn locate(&self, word: &str) -> Option<usize> {
        let mut current = 0;
        for &byte in word.as_bytes() {
            current = self.nodes[current].child(byte)?;
        }
        Some(current)
    }

    /// Posting list for `word`, if it was ever indexed
    pub fn get(&self, word: &str) -> Option<&PostingList> {
        self.locate(word)
            .and_then(|idx| self.nodes[idx].postings.as_ref())
    }

    pub fn get_mut(&mut self, word: &str) -> Option<&mut PostingList> {
        let idx = self.locate(word)?;
        self.nodes[idx].postings.as_mut()
    }

    #[cfg(test)]
    pub fn contains(&self, word: &str) -> bool {
        self.get(word).is_some()
    }

    /// Number of distinct words indexed
    pub fn len(&self) -> usize {
        self.distinct_words
    }

    pub fn is_empty(&self) -> bool {
        self.distinct_words == 0
    }

    /// All indexed words in byte-wise order
    #[cfg(test)]
    pub fn words(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.distinct_words);
        // (node, edge byte, parent prefix length)
        let mut stack: Vec<(usize, Option<u8>, usize)> = vec![(0, None, 0)];
        let mut prefix: Vec<u8> = Vec::new();

        while let Some((idx, edge, depth)) = stack.pop() {
            prefix.truncate(depth);
            if let Some(byte) = edge {
                prefix.push(byte);
            }
            let node = &self.nodes[idx];
            if node.postings.is_some() {
                out.push(String::from_utf8_lossy(&prefix).into_owned());
            }
            for &(byte, child) in node.children.iter().rev() {
                stack.push((child, Some(byte), prefix.len()));
            }
        }
        out
    }
}

impl Default for InvertedIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::posting::Extreme;

    #[test]
    fn test_insert_and_lookup() {
        let mut index = InvertedIndex::new();
        index.add_appearance("apple", 0, 0);
        index.add_appearance("apple", 0, 0);
        index.add_appearance("app", 1, 2);

        assert_eq!(index.len(), 2);
        assert_eq!(index.get("apple").unwrap().entries()[0].count, 2);
        assert_eq!(index.get("app").unwrap().len(), 1);
        assert!(index.get("ap").is_none());
        assert!(index.get("apples").is_none());
        assert!(!index.contains("banana"));
    }

    #[test]
    fn test_empty_word_ignored() {
        let mut index = InvertedIndex::new();
        index.add_appearance("", 0, 0);
        assert!(index.is_empty());
    }

    #[test]
    fn test_words_in_byte_order() {
        let mut index = InvertedIndex::new();
        for word in ["pear", "apple", "Zebra", "app", "peach", "b"] {
            index.add_appearance(word, 0, 0);
        }
        assert_eq!(
            index.words(),
            vec!["Zebra", "app", "apple", "b", "peach", "pear"]
        );
    }

    #[test]
    fn test_maxcount_tie_goes_to_smaller_path() {
        let paths = ["/data/site/a.txt", "/data/site/b.txt"];
        let mut index = InvertedIndex::new();
        for _ in 0..3 {
            index.add_appearance("apple", 1, 0);
        }
        for _ in 0..3 {
            index.add_appearance("apple", 0, 0);
        }

        let best = index
            .get("apple")
            .unwrap()
            .extreme_file(Extreme::Max, |id| paths[id]);
        assert_eq!(best, Some((0, 3)));
    }
}
