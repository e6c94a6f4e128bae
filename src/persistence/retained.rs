//! Retained message store

use std::sync::Arc;

use hashlink::LinkedHashMap;
use parking_lot::RwLock;

use crate::protocol::Packet;
use crate::topic::{TopicTrie, TrieOptions, TrueOnly};

/// At most one retained packet per topic, in store order
#[derive(Debug, Default)]
pub struct RetainedStore {
    messages: RwLock<LinkedHashMap<Arc<str>, Packet>>,
}

impl RetainedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep a copy of `packet`; an empty payload removes the topic instead
    ///
    /// Replacing a topic moves it to the end.
    pub fn store(&self, packet: &Packet) {
        let mut messages = self.messages.write();
        messages.remove(&packet.topic);
        if !packet.payload.is_empty() {
            messages.insert(packet.topic.clone(), packet.clone());
        }
    }

    pub fn get(&self, topic: &str) -> Option<Packet> {
        self.messages.read().get(topic).cloned()
    }

    /// Retained packets whose topic matches any of `patterns`
    ///
    /// Each topic appears once no matter how many patterns match it.
    pub fn matching(&self, patterns: &[&str], options: &TrieOptions) -> Vec<Packet> {
        let mut matcher = TopicTrie::with_options(TrueOnly, options.clone());
        for pattern in patterns {
            matcher.add(pattern, ());
        }

        self.messages
            .read()
            .values()
            .filter(|packet| matcher.test(&packet.topic, &()))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.messages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.read().is_empty()
    }

    pub fn clear(&self) {
        self.messages.write().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::QoS;

    fn retained(topic: &str, payload: &'static str) -> Packet {
        Packet::publish(topic, payload, QoS::AtMostOnce).with_retain(true)
    }

    fn topics(packets: &[Packet]) -> Vec<&str> {
        packets.iter().map(|p| p.topic.as_ref()).collect()
    }

    #[test]
    fn test_store_replaces_and_moves_to_end() {
        let store = RetainedStore::new();
        store.store(&retained("a", "1"));
        store.store(&retained("b", "1"));
        store.store(&retained("a", "2"));

        let all = store.matching(&["#"], &TrieOptions::default());
        assert_eq!(topics(&all), vec!["b", "a"]);
        assert_eq!(store.get("a").map(|p| p.payload), Some("2".into()));
    }

    #[test]
    fn test_empty_payload_deletes() {
        let store = RetainedStore::new();
        store.store(&retained("hello/world", "42"));
        store.store(&retained("hello/world", ""));

        assert!(store.is_empty());
        assert!(store.matching(&["hello/#"], &TrieOptions::default()).is_empty());

        // absent topic
        store.store(&retained("nothing", ""));
        assert!(store.is_empty());
    }

    #[test]
    fn test_matching_many_patterns_yields_topic_once() {
        let store = RetainedStore::new();
        store.store(&retained("hello/world", "1"));
        store.store(&retained("hello/matteo", "1"));
        store.store(&retained("other", "1"));

        let found = store.matching(
            &["hello/world", "hello/+", "hello/#"],
            &TrieOptions::default(),
        );
        assert_eq!(topics(&found), vec!["hello/world", "hello/matteo"]);
    }
}
