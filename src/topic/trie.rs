//! Topic Trie for subscription matching
//!
//! A trie (prefix tree) keyed by topic level. Terminal values are managed by
//! a [`ValueStrategy`] so the same walk serves plain bindings, deduplicated
//! subscribers, "any match" checks and counting variants.
//!
//! Performance optimizations:
//! - Uses compact_str for memory-efficient topic level storage
//! - Uses SmallVec for typical topic depths (up to 8 levels)
//! - Matching is callback based, results are only collected on request

use ahash::AHashMap;
use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::strategy::ValueStrategy;

/// Separator and wildcard tokens understood by the trie
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrieOptions {
    /// Level separator
    pub separator: char,
    /// Matches exactly one level
    pub wildcard_one: String,
    /// Matches one or more trailing levels, must be the last level
    pub wildcard_some: String,
}

impl Default for TrieOptions {
    fn default() -> Self {
        Self {
            separator: '/',
            wildcard_one: "+".to_string(),
            wildcard_some: "#".to_string(),
        }
    }
}

impl TrieOptions {
    fn is_one(&self, level: &str) -> bool {
        level == self.wildcard_one
    }

    fn is_some(&self, level: &str) -> bool {
        level == self.wildcard_some
    }

    fn levels<'a>(&self, topic: &'a str) -> SmallVec<[&'a str; 8]> {
        topic.split(self.separator).collect()
    }
}

/// One pattern and the values stored under it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry<V> {
    pub pattern: String,
    pub values: Vec<V>,
}

/// Node in the topic trie
#[derive(Debug)]
struct TrieNode<T> {
    /// Values for a pattern ending exactly here
    value: Option<T>,
    /// Children indexed by topic level
    children: AHashMap<CompactString, TrieNode<T>>,
    /// Single-level wildcard (+) child
    single_wildcard: Option<Box<TrieNode<T>>>,
    /// Values for a pattern ending with the multi-level wildcard (#) here
    multi_wildcard: Option<T>,
}

impl<T> TrieNode<T> {
    fn new() -> Self {
        Self {
            value: None,
            children: AHashMap::new(),
            single_wildcard: None,
            multi_wildcard: None,
        }
    }

    /// Nothing stored here or below
    fn is_empty(&self) -> bool {
        self.value.is_none()
            && self.multi_wildcard.is_none()
            && self.single_wildcard.is_none()
            && self.children.is_empty()
    }

    fn count_nodes(&self) -> usize {
        let wildcard = self
            .single_wildcard
            .as_ref()
            .map_or(0, |child| 1 + child.count_nodes());
        self.children
            .values()
            .map(|child| 1 + child.count_nodes())
            .sum::<usize>()
            + wildcard
    }
}

impl<T> Default for TrieNode<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Topic Trie parameterised by its value strategy
#[derive(Debug)]
pub struct TopicTrie<S: ValueStrategy> {
    root: TrieNode<S::Stored>,
    strategy: S,
    options: TrieOptions,
}

impl<S: ValueStrategy + Default> TopicTrie<S> {
    pub fn new() -> Self {
        Self::with_strategy(S::default())
    }
}

impl<S: ValueStrategy + Default> Default for TopicTrie<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ValueStrategy> TopicTrie<S> {
    pub fn with_strategy(strategy: S) -> Self {
        Self::with_options(strategy, TrieOptions::default())
    }

    pub fn with_options(strategy: S, options: TrieOptions) -> Self {
        Self {
            root: TrieNode::new(),
            strategy,
            options,
        }
    }

    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    pub fn options(&self) -> &TrieOptions {
        &self.options
    }

    /// Insert `value` under `pattern`
    ///
    /// A multi-level wildcard ends the walk; anything after it is ignored.
    pub fn add(&mut self, pattern: &str, value: S::Value) {
        let Self {
            root,
            strategy,
            options,
        } = self;
        let mut node = root;
        let mut levels = pattern.split(options.separator).peekable();

        while let Some(level) = levels.next() {
            if options.is_some(level) {
                Self::store(strategy, &mut node.multi_wildcard, value);
                return;
            }

            node = if options.is_one(level) {
                &mut **node
                    .single_wildcard
                    .get_or_insert_with(|| Box::new(TrieNode::new()))
            } else {
                node.children.entry(CompactString::new(level)).or_default()
            };

            if levels.peek().is_none() {
                Self::store(strategy, &mut node.value, value);
                return;
            }
        }
    }

    fn store(strategy: &mut S, slot: &mut Option<S::Stored>, value: S::Value) {
        match slot {
            Some(stored) => strategy.add_value(stored, value),
            None => *slot = Some(strategy.initial_value(value)),
        }
    }

    /// Remove the value identified by `key` from `pattern`, pruning empty nodes
    pub fn remove(&mut self, pattern: &str, key: &S::Key) {
        let levels = self.options.levels(pattern);
        Self::remove_recursive(
            &mut self.strategy,
            &self.options,
            &mut self.root,
            &levels,
            Some(key),
        );
    }

    /// Remove every value stored under `pattern`, pruning empty nodes
    pub fn remove_all(&mut self, pattern: &str) {
        let levels = self.options.levels(pattern);
        Self::remove_recursive(
            &mut self.strategy,
            &self.options,
            &mut self.root,
            &levels,
            None,
        );
    }

    fn remove_recursive(
        strategy: &mut S,
        options: &TrieOptions,
        node: &mut TrieNode<S::Stored>,
        levels: &[&str],
        key: Option<&S::Key>,
    ) {
        let Some((&level, rest)) = levels.split_first() else {
            return;
        };

        if options.is_some(level) {
            Self::remove_from_slot(strategy, &mut node.multi_wildcard, key);
            return;
        }

        if options.is_one(level) {
            let prune = match node.single_wildcard.as_deref_mut() {
                Some(child) => {
                    Self::remove_below(strategy, options, child, rest, key);
                    child.is_empty()
                }
                None => false,
            };
            if prune {
                node.single_wildcard = None;
            }
        } else {
            let prune = match node.children.get_mut(level) {
                Some(child) => {
                    Self::remove_below(strategy, options, child, rest, key);
                    child.is_empty()
                }
                None => false,
            };
            if prune {
                node.children.remove(level);
            }
        }
    }

    fn remove_below(
        strategy: &mut S,
        options: &TrieOptions,
        child: &mut TrieNode<S::Stored>,
        rest: &[&str],
        key: Option<&S::Key>,
    ) {
        if rest.is_empty() {
            Self::remove_from_slot(strategy, &mut child.value, key);
        } else {
            Self::remove_recursive(strategy, options, child, rest, key);
        }
    }

    fn remove_from_slot(strategy: &mut S, slot: &mut Option<S::Stored>, key: Option<&S::Key>) {
        match key {
            Some(key) => {
                let empty = match slot.as_mut() {
                    Some(stored) => strategy.remove_value(stored, key),
                    None => false,
                };
                if empty {
                    *slot = None;
                }
            }
            None => {
                if let Some(stored) = slot.take() {
                    strategy.drop_values(stored);
                }
            }
        }
    }

    /// Exact lookup of the values stored under `pattern` (no matching)
    pub fn get(&self, pattern: &str) -> Option<&S::Stored> {
        let mut node = &self.root;
        let mut levels = pattern.split(self.options.separator).peekable();

        while let Some(level) = levels.next() {
            if self.options.is_some(level) {
                return node.multi_wildcard.as_ref();
            }

            node = if self.options.is_one(level) {
                node.single_wildcard.as_deref()?
            } else {
                node.children.get(level)?
            };

            if levels.peek().is_none() {
                return node.value.as_ref();
            }
        }

        None
    }

    /// Visit the storage of every pattern matching `topic`
    ///
    /// Order per level: literal child, then `+`, then `#`.
    pub fn matches<F>(&self, topic: &str, mut callback: F)
    where
        F: FnMut(&S::Stored),
    {
        let levels = self.options.levels(topic);
        Self::matches_recursive(&self.root, &levels, &mut callback);
    }

    fn matches_recursive<F>(node: &TrieNode<S::Stored>, levels: &[&str], callback: &mut F)
    where
        F: FnMut(&S::Stored),
    {
        let Some((&level, rest)) = levels.split_first() else {
            if let Some(ref v) = node.value {
                callback(v);
            }
            return;
        };

        if let Some(child) = node.children.get(level) {
            Self::matches_recursive(child, rest, callback);
        }

        if let Some(ref child) = node.single_wildcard {
            Self::matches_recursive(child, rest, callback);
        }

        // At least one level remains, so `#` matches here
        if let Some(ref v) = node.multi_wildcard {
            callback(v);
        }
    }

    /// Collect the match output for `topic`
    pub fn match_values(&self, topic: &str) -> Vec<S::Output> {
        let mut result = Vec::new();
        self.matches(topic, |stored| self.strategy.add_values(stored, &mut result));
        result
    }

    /// Number of items `match_values` would return
    pub fn match_count(&self, topic: &str) -> usize {
        let mut count = 0;
        self.matches(topic, |stored| count += self.strategy.count_values(stored));
        count
    }

    /// Whether `key` is stored under any pattern matching `topic`
    pub fn test(&self, topic: &str, key: &S::Key) -> bool {
        let levels = self.options.levels(topic);
        self.test_recursive(&self.root, &levels, key)
    }

    fn test_recursive(&self, node: &TrieNode<S::Stored>, levels: &[&str], key: &S::Key) -> bool {
        let Some((&level, rest)) = levels.split_first() else {
            return node
                .value
                .as_ref()
                .is_some_and(|v| self.strategy.test_values(v, key));
        };

        if let Some(child) = node.children.get(level) {
            if self.test_recursive(child, rest, key) {
                return true;
            }
        }

        if let Some(ref child) = node.single_wildcard {
            if self.test_recursive(child, rest, key) {
                return true;
            }
        }

        node.multi_wildcard
            .as_ref()
            .is_some_and(|v| self.strategy.test_values(v, key))
    }

    /// Number of nodes below the root
    pub fn node_count(&self) -> usize {
        self.root.count_nodes()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Drop every pattern
    pub fn clear(&mut self) {
        self.root = TrieNode::new();
        self.strategy.clear();
    }

    /// Dump every pattern with the values that re-create it, sorted by pattern
    pub fn snapshot(&self) -> Vec<SnapshotEntry<S::Value>> {
        let mut entries = Vec::new();
        let mut path: Vec<&str> = Vec::new();
        self.snapshot_recursive(&self.root, &mut path, &mut entries);
        entries.sort_by(|a, b| a.pattern.cmp(&b.pattern));
        entries
    }

    fn snapshot_recursive<'a>(
        &'a self,
        node: &'a TrieNode<S::Stored>,
        path: &mut Vec<&'a str>,
        entries: &mut Vec<SnapshotEntry<S::Value>>,
    ) {
        let separator = self.options.separator.to_string();

        if let Some(ref v) = node.value {
            entries.push(SnapshotEntry {
                pattern: path.join(&separator),
                values: self.strategy.values(v),
            });
        }

        if let Some(ref v) = node.multi_wildcard {
            path.push(&self.options.wildcard_some);
            entries.push(SnapshotEntry {
                pattern: path.join(&separator),
                values: self.strategy.values(v),
            });
            path.pop();
        }

        for (level, child) in &node.children {
            path.push(level.as_str());
            self.snapshot_recursive(child, path, entries);
            path.pop();
        }

        if let Some(ref child) = node.single_wildcard {
            path.push(&self.options.wildcard_one);
            self.snapshot_recursive(child, path, entries);
            path.pop();
        }
    }

    /// Add every value of a snapshot
    pub fn restore<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = SnapshotEntry<S::Value>>,
    {
        for entry in entries {
            for value in entry.values {
                self.add(&entry.pattern, value);
            }
        }
    }
}
