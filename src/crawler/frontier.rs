//! Pending-URL queue
//!
//! Pushes go to the front and pops come from the back, so URLs leave in the
//! order they arrived. The frontier does no locking of its own; it lives
//! inside the crawl state's frontier mutex so that emptiness checks, pops and
//! the quiescence signal all happen under one lock.

use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct UrlFrontier {
    items: VecDeque<String>,
}

impl UrlFrontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend a URL
    pub fn push(&mut self, url: String) {
        self.items.push_front(url);
    }

    /// Remove the oldest URL
    pub fn pop(&mut self) -> Option<String> {
        self.items.pop_back()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut frontier = UrlFrontier::new();
        frontier.push("a".into());
        frontier.push("b".into());
        frontier.push("c".into());
        assert_eq!(frontier.len(), 3);

        assert_eq!(frontier.pop().as_deref(), Some("a"));
        assert_eq!(frontier.pop().as_deref(), Some("b"));
        frontier.push("d".into());
        assert_eq!(frontier.pop().as_deref(), Some("c"));
        assert_eq!(frontier.pop().as_deref(), Some("d"));
    }

    #[test]
    fn test_pop_empty() {
        let mut frontier = UrlFrontier::new();
        assert!(frontier.is_empty());
        assert_eq!(frontier.pop(), None);
    }
}
