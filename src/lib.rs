//! TopicStore - MQTT topic matching and broker session persistence
//!
//! A wildcard topic trie with pluggable value strategies, a subscription
//! registry built on it, and an in-memory persistence layer for retained
//! messages, in-flight packets and wills, coordinated by a network-agnostic
//! broker core.

pub mod broker;
pub mod config;
pub mod logging;
pub mod persistence;
pub mod protocol;
pub mod subscription;
pub mod topic;

pub use broker::{Broker, ConnectOutcome, PublishOutcome, SweeperHandle};
pub use config::Config;
pub use persistence::{MemoryPersistence, Persistence, PersistenceError};
pub use protocol::{BrokerIdentity, Client, Packet, QoS, WillMessage};
pub use subscription::{ClientSubscription, Subscription, SubscriptionRegistry};
pub use topic::{TopicTrie, TrieOptions};
