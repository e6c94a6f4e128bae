//! Value strategies for the topic trie
//!
//! The trie only knows how to walk topic levels. What it keeps at a terminal
//! node, how values are merged, removed, tested and reported is decided by a
//! [`ValueStrategy`] injected at construction.

use std::hash::Hash;
use std::marker::PhantomData;

use hashlink::LinkedHashSet;

/// Policy for the values stored at trie terminals
pub trait ValueStrategy {
    /// Value handed to `add`
    type Value;
    /// Key handed to `remove` and `test`
    type Key: ?Sized;
    /// Storage kept at one terminal
    type Stored;
    /// Item produced by matching
    type Output;

    /// Build the storage for the first value added at a terminal
    fn initial_value(&mut self, value: Self::Value) -> Self::Stored;

    /// Merge a value into existing storage
    fn add_value(&mut self, stored: &mut Self::Stored, value: Self::Value);

    /// Remove the value identified by `key`.
    /// Returns true once `stored` holds nothing and can be dropped.
    fn remove_value(&mut self, stored: &mut Self::Stored, key: &Self::Key) -> bool;

    /// A whole terminal was cleared at once
    fn drop_values(&mut self, _stored: Self::Stored) {}

    /// Whether `key` is present in `stored`
    fn test_values(&self, stored: &Self::Stored, key: &Self::Key) -> bool;

    /// Append the match output for `stored` to `dest`
    fn add_values(&self, stored: &Self::Stored, dest: &mut Vec<Self::Output>);

    /// Number of items `add_values` would append
    fn count_values(&self, stored: &Self::Stored) -> usize;

    /// Values that re-create `stored` when added again (for snapshots)
    fn values(&self, stored: &Self::Stored) -> Vec<Self::Value>;

    /// The trie was cleared
    fn clear(&mut self) {}
}

/// Keeps every added value, duplicates included
#[derive(Debug)]
pub struct Plain<T>(PhantomData<T>);

impl<T> Default for Plain<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T: PartialEq + Clone> ValueStrategy for Plain<T> {
    type Value = T;
    type Key = T;
    type Stored = Vec<T>;
    type Output = T;

    fn initial_value(&mut self, value: T) -> Vec<T> {
        vec![value]
    }

    fn add_value(&mut self, stored: &mut Vec<T>, value: T) {
        stored.push(value);
    }

    fn remove_value(&mut self, stored: &mut Vec<T>, key: &T) -> bool {
        if let Some(pos) = stored.iter().position(|v| v == key) {
            stored.remove(pos);
        }
        stored.is_empty()
    }

    fn test_values(&self, stored: &Vec<T>, key: &T) -> bool {
        stored.contains(key)
    }

    fn add_values(&self, stored: &Vec<T>, dest: &mut Vec<T>) {
        dest.extend(stored.iter().cloned());
    }

    fn count_values(&self, stored: &Vec<T>) -> usize {
        stored.len()
    }

    fn values(&self, stored: &Vec<T>) -> Vec<T> {
        stored.clone()
    }
}

/// Keeps each distinct value once per terminal, in insertion order
#[derive(Debug)]
pub struct Dedup<T>(PhantomData<T>);

impl<T> Default for Dedup<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T: Eq + Hash + Clone> ValueStrategy for Dedup<T> {
    type Value = T;
    type Key = T;
    type Stored = LinkedHashSet<T>;
    type Output = T;

    fn initial_value(&mut self, value: T) -> LinkedHashSet<T> {
        let mut set = LinkedHashSet::new();
        set.insert(value);
        set
    }

    fn add_value(&mut self, stored: &mut LinkedHashSet<T>, value: T) {
        stored.insert(value);
    }

    fn remove_value(&mut self, stored: &mut LinkedHashSet<T>, key: &T) -> bool {
        stored.remove(key);
        stored.is_empty()
    }

    fn test_values(&self, stored: &LinkedHashSet<T>, key: &T) -> bool {
        stored.contains(key)
    }

    fn add_values(&self, stored: &LinkedHashSet<T>, dest: &mut Vec<T>) {
        dest.extend(stored.iter().cloned());
    }

    fn count_values(&self, stored: &LinkedHashSet<T>) -> usize {
        stored.len()
    }

    fn values(&self, stored: &LinkedHashSet<T>) -> Vec<T> {
        stored.iter().cloned().collect()
    }
}

/// Only records that a pattern exists; used for "does anything match" checks
#[derive(Debug, Default)]
pub struct TrueOnly;

impl ValueStrategy for TrueOnly {
    type Value = ();
    type Key = ();
    type Stored = ();
    type Output = ();

    fn initial_value(&mut self, _value: ()) {}

    fn add_value(&mut self, _stored: &mut (), _value: ()) {}

    fn remove_value(&mut self, _stored: &mut (), _key: &()) -> bool {
        true
    }

    fn test_values(&self, _stored: &(), _key: &()) -> bool {
        true
    }

    fn add_values(&self, _stored: &(), _dest: &mut Vec<()>) {}

    fn count_values(&self, _stored: &()) -> usize {
        0
    }

    fn values(&self, _stored: &()) -> Vec<()> {
        vec![()]
    }
}

/// Wraps another strategy and counts the terminals holding values
#[derive(Debug, Default)]
pub struct Counted<S> {
    inner: S,
    topic_count: usize,
}

impl<S> Counted<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            topic_count: 0,
        }
    }

    /// Number of distinct patterns currently holding values
    pub fn topic_count(&self) -> usize {
        self.topic_count
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: ValueStrategy> ValueStrategy for Counted<S> {
    type Value = S::Value;
    type Key = S::Key;
    type Stored = S::Stored;
    type Output = S::Output;

    fn initial_value(&mut self, value: S::Value) -> S::Stored {
        self.topic_count += 1;
        self.inner.initial_value(value)
    }

    fn add_value(&mut self, stored: &mut S::Stored, value: S::Value) {
        self.inner.add_value(stored, value);
    }

    fn remove_value(&mut self, stored: &mut S::Stored, key: &S::Key) -> bool {
        let empty = self.inner.remove_value(stored, key);
        if empty {
            self.topic_count -= 1;
        }
        empty
    }

    fn drop_values(&mut self, stored: S::Stored) {
        self.topic_count -= 1;
        self.inner.drop_values(stored);
    }

    fn test_values(&self, stored: &S::Stored, key: &S::Key) -> bool {
        self.inner.test_values(stored, key)
    }

    fn add_values(&self, stored: &S::Stored, dest: &mut Vec<S::Output>) {
        self.inner.add_values(stored, dest);
    }

    fn count_values(&self, stored: &S::Stored) -> usize {
        self.inner.count_values(stored)
    }

    fn values(&self, stored: &S::Stored) -> Vec<S::Value> {
        self.inner.values(stored)
    }

    fn clear(&mut self) {
        self.topic_count = 0;
        self.inner.clear();
    }
}
