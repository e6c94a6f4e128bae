//! Persistence module.
//!
//! Holds the broker state that outlives a single connection:
//! - Subscriptions (through the [`SubscriptionRegistry`])
//! - Retained messages
//! - Outgoing and incoming in-flight packets
//! - Wills
//!
//! Uses a trait-based design allowing different backends. [`MemoryPersistence`]
//! keeps everything in process memory; a durable backend implements the same
//! [`Persistence`] trait and may suspend on I/O at the same call boundaries.
//!
//! Streams are single-pass and built from a snapshot taken when the stream is
//! created, so later mutations are not observed.
//!
//! [`SubscriptionRegistry`]: crate::subscription::SubscriptionRegistry

mod error;
mod memory;
mod queue;
mod retained;
mod will;


pub use error::{PersistenceError, Result};
pub use memory::MemoryPersistence;
pub use queue::{IncomingStore, OutgoingQueues};
pub use retained::RetainedStore;
pub use will::WillStore;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::protocol::{BrokerIdentity, Client, Packet, WillMessage};
use crate::subscription::{ClientSubscription, Subscription};

/// Capability set of a broker persistence backend
#[async_trait]
pub trait Persistence: Send + Sync {
    // ========================================================================
    // Broker identity
    // ========================================================================

    /// Broker whose id is stamped on stored wills
    fn set_broker(&self, broker: Arc<BrokerIdentity>);

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// Add or replace subscriptions; QoS 0 entries are kept but never routed
    async fn add_subscriptions(&self, client: &Client, subs: &[ClientSubscription]) -> Result<()>;

    /// Remove subscriptions; unknown topics are ignored
    async fn remove_subscriptions(&self, client: &Client, topics: &[&str]) -> Result<()>;

    /// `None` when the client has no subscription record
    async fn subscriptions_by_client(
        &self,
        client: &Client,
    ) -> Result<Option<Vec<ClientSubscription>>>;

    /// QoS 1/2 subscriptions matching a topic name
    async fn subscriptions_by_topic(&self, topic: &str) -> Result<Vec<Subscription>>;

    async fn clean_subscriptions(&self, client: &Client) -> Result<()>;

    /// `(subscriptions, clients)`
    async fn count_offline(&self) -> Result<(usize, usize)>;

    /// Clients subscribed to exactly `topic`
    async fn get_client_list(&self, topic: &str) -> Result<BoxStream<'static, Arc<str>>>;

    // ========================================================================
    // Retained messages
    // ========================================================================

    /// Store a copy; an empty payload deletes the topic
    async fn store_retained(&self, packet: &Packet) -> Result<()>;

    async fn create_retained_stream(&self, pattern: &str) -> Result<BoxStream<'static, Packet>> {
        self.create_retained_stream_combi(&[pattern]).await
    }

    /// Each matching topic is yielded once
    async fn create_retained_stream_combi(
        &self,
        patterns: &[&str],
    ) -> Result<BoxStream<'static, Packet>>;

    // ========================================================================
    // Outgoing queue
    // ========================================================================

    async fn outgoing_enqueue(&self, sub: &Subscription, packet: &Packet) -> Result<()> {
        self.outgoing_enqueue_combi(std::slice::from_ref(sub), packet)
            .await
    }

    /// Append a copy of `packet` to every subscriber's queue, message id reset
    async fn outgoing_enqueue_combi(&self, subs: &[Subscription], packet: &Packet) -> Result<()>;

    /// Assign a message id by origin, or replace by message id
    async fn outgoing_update(&self, client: &Client, packet: &Packet) -> Result<()>;

    /// Remove the entry carrying `message_id`; absent ids are not an error
    async fn outgoing_clear_message_id(
        &self,
        client: &Client,
        message_id: u16,
    ) -> Result<Option<Packet>>;

    /// Queue contents in FIFO order; entries stay queued
    async fn outgoing_stream(&self, client: &Client) -> Result<BoxStream<'static, Packet>>;

    // ========================================================================
    // Incoming QoS 2
    // ========================================================================

    async fn incoming_store_packet(&self, client: &Client, packet: &Packet) -> Result<()>;

    async fn incoming_get_packet(&self, client: &Client, message_id: u16) -> Result<Packet>;

    async fn incoming_del_packet(&self, client: &Client, message_id: u16) -> Result<()>;

    // ========================================================================
    // Wills
    // ========================================================================

    /// Store a will stamped with the client and current broker ids
    async fn put_will(&self, client: &Client, will: WillMessage) -> Result<()>;

    async fn get_will(&self, client: &Client) -> Result<Option<WillMessage>>;

    async fn del_will(&self, client: &Client) -> Result<Option<WillMessage>>;

    /// Wills stored by brokers not in `exclude`
    async fn stream_will(
        &self,
        exclude: &HashSet<Arc<str>>,
    ) -> Result<BoxStream<'static, WillMessage>>;

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Drop all state; later calls fail with [`PersistenceError::Destroyed`]
    async fn destroy(&self) -> Result<()>;
}
