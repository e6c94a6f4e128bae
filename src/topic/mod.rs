//! Topic matching
//!
//! Implements topic name/filter validation and a topic trie whose terminal
//! values are shaped by a pluggable [`ValueStrategy`].

pub mod strategy;
mod trie;
pub mod validation;

pub use strategy::{Counted, Dedup, Plain, TrueOnly, ValueStrategy};
pub use trie::{SnapshotEntry, TopicTrie, TrieOptions};
pub use validation::{
    parse_levels, topic_matches_filter, validate_topic_filter, validate_topic_name, TopicLevel,
};
