//! In-memory index held by each index worker
//!
//! - [`trie::InvertedIndex`]: word -> [`posting::PostingList`]
//! - [`documents::DocumentStore`]: parsed lines, addressed by file id
//! - [`parse`]: turns a shard of directories into both

pub mod documents;
pub mod parse;
pub mod posting;
pub mod trie;

pub use documents::{Document, DocumentStore, TextTotals};
pub use parse::{build_shard, ShardIndex};
pub use posting::{Extreme, Posting, PostingList};
pub use trie::InvertedIndex;
