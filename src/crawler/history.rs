//! Visited set
//!
//! An unbalanced binary search tree of strings ordered byte-wise, behind a
//! single mutex. Used both for crawl history (URLs already queued) and for
//! the set of site directories created under the save directory.
//!
//! Insert, lookup, traversal and drop are all iterative so that a
//! degenerate tree (URLs discovered in sorted order) cannot overflow the
//! stack.

use parking_lot::Mutex;
use std::cmp::Ordering;

#[derive(Debug)]
struct Node {
    value: String,
    left: Option<Box<Node>>,
    right: Option<Box<Node>>,
}

#[derive(Debug, Default)]
struct Tree {
    root: Option<Box<Node>>,
    size: usize,
}

impl Tree {
    fn insert(&mut self, value: &str) -> bool {
        let mut slot = &mut self.root;
        while let Some(node) = slot {
            slot = match value.as_bytes().cmp(node.value.as_bytes()) {
                Ordering::Less => &mut node.left,
                Ordering::Greater => &mut node.right,
                Ordering::Equal => return false,
            };
        }
        *slot = Some(Box::new(Node {
            value: value.to_string(),
            left: None,
            right: None,
        }));
        self.size += 1;
        true
    }

    fn contains(&self, value: &str) -> bool {
        let mut current = self.root.as_deref();
        while let Some(node) = current {
            current = match value.as_bytes().cmp(node.value.as_bytes()) {
                Ordering::Less => node.left.as_deref(),
                Ordering::Greater => node.right.as_deref(),
                Ordering::Equal => return true,
            };
        }
        false
    }

    fn in_order(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.size);
        let mut stack: Vec<&Node> = Vec::new();
        let mut current = self.root.as_deref();

        loop {
            while let Some(node) = current {
                stack.push(node);
                current = node.left.as_deref();
            }
            match stack.pop() {
                Some(node) => {
                    out.push(node.value.clone());
                    current = node.right.as_deref();
                }
                None => break,
            }
        }
        out
    }
}

impl Drop for Tree {
    fn drop(&mut self) {
        let mut pending: Vec<Box<Node>> = self.root.take().into_iter().collect();
        while let Some(mut node) = pending.pop() {
            pending.extend(node.left.take());
            pending.extend(node.right.take());
        }
    }
}

/// Thread-safe set of strings
#[derive(Debug, Default)]
pub struct VisitedSet {
    tree: Mutex<Tree>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `value`; returns false if it was already present
    pub fn add(&self, value: &str) -> bool {
        self.tree.lock().insert(value)
    }

    pub fn contains(&self, value: &str) -> bool {
        self.tree.lock().contains(value)
    }

    pub fn len(&self) -> usize {
        self.tree.lock().size
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every member in byte-wise order
    ///
    /// Callers take the snapshot once crawling has stopped; the result then
    /// has exactly `len()` entries.
    pub fn snapshot(&self) -> Vec<String> {
        self.tree.lock().in_order()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_add_is_idempotent() {
        let set = VisitedSet::new();
        assert!(set.add("/site1/index.html"));
        assert!(!set.add("/site1/index.html"));
        assert_eq!(set.len(), 1);
        assert!(set.contains("/site1/index.html"));
        assert!(!set.contains("/site1/other.html"));
        assert_eq!(set.snapshot().len(), set.len());
    }

    #[test]
    fn test_snapshot_sorted() {
        let set = VisitedSet::new();
        for s in ["m", "c", "x", "a", "e", "B"] {
            set.add(s);
        }
        assert_eq!(set.snapshot(), vec!["B", "a", "c", "e", "m", "x"]);
    }

    #[test]
    fn test_degenerate_tree() {
        let set = VisitedSet::new();
        for i in 0..5_000 {
            set.add(&format!("/site/page{:06}.html", i));
        }
        assert_eq!(set.len(), 5_000);
        assert!(set.contains("/site/page004999.html"));
        let snapshot = set.snapshot();
        assert_eq!(snapshot.len(), 5_000);
        assert_eq!(snapshot[0], "/site/page000000.html");
    }

    #[test]
    fn test_concurrent_adds_count_once() {
        let set = Arc::new(VisitedSet::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let set = Arc::clone(&set);
                thread::spawn(move || (0..500).filter(|i| set.add(&i.to_string())).count())
            })
            .collect();

        let inserted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(inserted, 500);
        assert_eq!(set.len(), 500);
        assert_eq!(set.snapshot().len(), 500);
    }
}
