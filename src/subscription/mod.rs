//! Subscription registry
//!
//! Tracks every `(client, topic)` subscription with its QoS. Subscriptions
//! with QoS 1 or 2 are also stored in a [`TopicTrie`] so publishes can be
//! routed; QoS 0 subscriptions live only in the per-client map.
//!
//! The trie and the per-client map sit behind a single lock so readers never
//! observe one updated without the other.

#[cfg(test)]
mod tests;

use std::sync::Arc;

use hashlink::LinkedHashMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::protocol::QoS;
use crate::topic::{TopicTrie, TrieOptions, ValueStrategy};

/// A routed subscription
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    /// Client ID
    pub client_id: Arc<str>,
    /// Pattern the client subscribed with
    pub topic: Arc<str>,
    /// Granted QoS
    pub qos: QoS,
}

impl Subscription {
    pub fn new(client_id: impl Into<Arc<str>>, topic: impl Into<Arc<str>>, qos: QoS) -> Self {
        Self {
            client_id: client_id.into(),
            topic: topic.into(),
            qos,
        }
    }
}

/// A subscription as seen from its client
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientSubscription {
    pub topic: Arc<str>,
    pub qos: QoS,
}

impl ClientSubscription {
    pub fn new(topic: impl Into<Arc<str>>, qos: QoS) -> Self {
        Self {
            topic: topic.into(),
            qos,
        }
    }
}

/// Identifies one subscriber stored under one pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberKey {
    pub client_id: Arc<str>,
    pub topic: Arc<str>,
}

impl SubscriberKey {
    pub fn new(client_id: impl Into<Arc<str>>, topic: impl Into<Arc<str>>) -> Self {
        Self {
            client_id: client_id.into(),
            topic: topic.into(),
        }
    }
}

/// Subscribers stored under one pattern, keyed by client
#[derive(Debug, Clone)]
pub struct SubscriberSet {
    topic: Arc<str>,
    clients: LinkedHashMap<Arc<str>, QoS>,
}

impl SubscriberSet {
    /// Pattern the subscribers used
    pub fn topic(&self) -> &Arc<str> {
        &self.topic
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Subscription> + '_ {
        self.clients.iter().map(|(client_id, qos)| Subscription {
            client_id: client_id.clone(),
            topic: self.topic.clone(),
            qos: *qos,
        })
    }
}

/// Trie strategy keeping one QoS per client and pattern
///
/// Removal only looks at the client id. `test` answers "is this client the
/// only subscriber of exactly this pattern".
#[derive(Debug, Default)]
pub struct Subscribers {
    subscriptions_count: usize,
}

impl Subscribers {
    /// Number of distinct `(client, pattern)` pairs stored
    pub fn subscriptions_count(&self) -> usize {
        self.subscriptions_count
    }
}

impl ValueStrategy for Subscribers {
    type Value = Subscription;
    type Key = SubscriberKey;
    type Stored = SubscriberSet;
    type Output = Subscription;

    fn initial_value(&mut self, value: Subscription) -> SubscriberSet {
        self.subscriptions_count += 1;
        let mut clients = LinkedHashMap::new();
        clients.insert(value.client_id, value.qos);
        SubscriberSet {
            topic: value.topic,
            clients,
        }
    }

    fn add_value(&mut self, stored: &mut SubscriberSet, value: Subscription) {
        if let Some(qos) = stored.clients.get_mut(&value.client_id) {
            *qos = value.qos;
        } else {
            stored.clients.insert(value.client_id, value.qos);
            self.subscriptions_count += 1;
        }
    }

    fn remove_value(&mut self, stored: &mut SubscriberSet, key: &SubscriberKey) -> bool {
        if stored.clients.remove(&*key.client_id).is_some() {
            self.subscriptions_count -= 1;
        }
        stored.clients.is_empty()
    }

    fn drop_values(&mut self, stored: SubscriberSet) {
        self.subscriptions_count -= stored.clients.len();
    }

    fn test_values(&self, stored: &SubscriberSet, key: &SubscriberKey) -> bool {
        stored.topic == key.topic
            && stored.clients.len() == 1
            && stored.clients.contains_key(&*key.client_id)
    }

    fn add_values(&self, stored: &SubscriberSet, dest: &mut Vec<Subscription>) {
        dest.extend(stored.iter());
    }

    fn count_values(&self, stored: &SubscriberSet) -> usize {
        stored.clients.len()
    }

    fn values(&self, stored: &SubscriberSet) -> Vec<Subscription> {
        stored.iter().collect()
    }

    fn clear(&mut self) {
        self.subscriptions_count = 0;
    }
}

#[derive(Debug)]
struct RegistryInner {
    trie: TopicTrie<Subscribers>,
    /// client id -> topic -> qos, both in first-subscription order
    clients: LinkedHashMap<Arc<str>, LinkedHashMap<Arc<str>, QoS>>,
}

/// Thread-safe subscription registry
#[derive(Debug)]
pub struct SubscriptionRegistry {
    inner: RwLock<RegistryInner>,
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::with_options(TrieOptions::default())
    }

    pub fn with_options(options: TrieOptions) -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                trie: TopicTrie::with_options(Subscribers::default(), options),
                clients: LinkedHashMap::new(),
            }),
        }
    }

    /// Add or replace subscriptions of a client
    ///
    /// Entries apply in order, so the last one wins for a repeated topic.
    /// The client record is created even when `subs` is empty.
    pub fn add_subscriptions(&self, client_id: &Arc<str>, subs: &[ClientSubscription]) {
        let mut inner = self.inner.write();
        let RegistryInner { trie, clients } = &mut *inner;

        let stored = clients
            .entry(client_id.clone())
            .or_insert_with(LinkedHashMap::new);

        for sub in subs {
            let previous = stored.get(&sub.topic).copied();

            if sub.qos.is_acknowledged() {
                trie.add(
                    &sub.topic,
                    Subscription {
                        client_id: client_id.clone(),
                        topic: sub.topic.clone(),
                        qos: sub.qos,
                    },
                );
            } else if previous.is_some_and(QoS::is_acknowledged) {
                // Demoted to QoS 0, no longer routed
                trie.remove(&sub.topic, &SubscriberKey::new(client_id.clone(), sub.topic.clone()));
            }

            // Updating in place keeps the first-subscription position
            match stored.get_mut(&sub.topic) {
                Some(qos) => *qos = sub.qos,
                None => {
                    stored.insert(sub.topic.clone(), sub.qos);
                }
            }
        }

        debug!(client_id = %client_id, count = subs.len(), "Added subscriptions");
    }

    /// Remove subscriptions of a client; unknown topics are ignored
    pub fn remove_subscriptions(&self, client_id: &str, topics: &[&str]) {
        let mut inner = self.inner.write();
        let RegistryInner { trie, clients } = &mut *inner;

        let Some(stored) = clients.get_mut(client_id) else {
            return;
        };

        let mut owner: Option<Arc<str>> = None;
        for topic in topics {
            if let Some((topic, qos)) = stored.remove_entry(*topic) {
                if qos.is_acknowledged() {
                    let client_id = owner.get_or_insert_with(|| Arc::from(client_id)).clone();
                    trie.remove(&topic, &SubscriberKey { client_id, topic: topic.clone() });
                }
            }
        }

        if stored.is_empty() {
            clients.remove(client_id);
            debug!(client_id = %client_id, "Client has no subscriptions left");
        }
    }

    /// All `(topic, qos)` of a client, or `None` when no record exists
    pub fn subscriptions_by_client(&self, client_id: &str) -> Option<Vec<ClientSubscription>> {
        let inner = self.inner.read();
        inner.clients.get(client_id).map(|stored| {
            stored
                .iter()
                .map(|(topic, qos)| ClientSubscription {
                    topic: topic.clone(),
                    qos: *qos,
                })
                .collect()
        })
    }

    /// QoS 1/2 subscriptions whose pattern matches `topic`
    pub fn subscriptions_by_topic(&self, topic: &str) -> Vec<Subscription> {
        self.inner.read().trie.match_values(topic)
    }

    /// Matches of `topic` that were stored under exactly `pattern`
    pub fn subscriptions_by_topic_pattern(&self, topic: &str, pattern: &str) -> Vec<Subscription> {
        let inner = self.inner.read();
        let mut result = Vec::new();
        inner.trie.matches(topic, |stored| {
            if &*stored.topic == pattern {
                result.extend(stored.iter());
            }
        });
        result
    }

    /// Whether `client_id` is the only QoS 1/2 subscriber of `pattern`
    pub fn is_last_subscriber(&self, pattern: &str, client_id: &str) -> bool {
        let key = SubscriberKey::new(client_id, pattern);
        self.inner.read().trie.test(pattern, &key)
    }

    /// Drop every subscription of a client together with its record
    pub fn clean_subscriptions(&self, client_id: &str) {
        let mut inner = self.inner.write();
        let RegistryInner { trie, clients } = &mut *inner;

        let Some((client_id, stored)) = clients.remove_entry(client_id) else {
            return;
        };

        for (topic, qos) in stored {
            if qos.is_acknowledged() {
                trie.remove(
                    &topic,
                    &SubscriberKey {
                        client_id: client_id.clone(),
                        topic: topic.clone(),
                    },
                );
            }
        }

        debug!(client_id = %client_id, "Cleaned subscriptions");
    }

    /// `(routed subscriptions, clients with any subscription record)`
    pub fn count_offline(&self) -> (usize, usize) {
        let inner = self.inner.read();
        (inner.trie.strategy().subscriptions_count(), inner.clients.len())
    }

    /// Clients holding a subscription to exactly `topic` (no wildcard matching)
    pub fn client_list(&self, topic: &str) -> Vec<Arc<str>> {
        let inner = self.inner.read();
        inner
            .clients
            .iter()
            .filter(|(_, stored)| stored.contains_key(topic))
            .map(|(client_id, _)| client_id.clone())
            .collect()
    }

    /// Number of trie nodes, for leak checks
    pub fn node_count(&self) -> usize {
        self.inner.read().trie.node_count()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.trie.clear();
        inner.clients.clear();
    }
}
