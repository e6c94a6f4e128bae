//! In-memory persistence backend

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use parking_lot::RwLock;
use tracing::{debug, info};

use super::error::{PersistenceError, Result};
use super::queue::{IncomingStore, OutgoingQueues};
use super::retained::RetainedStore;
use super::will::WillStore;
use super::Persistence;
use crate::protocol::{BrokerIdentity, Client, Packet, WillMessage};
use crate::subscription::{ClientSubscription, Subscription, SubscriptionRegistry};
use crate::topic::TrieOptions;

/// Persistence backend keeping all state in process memory
#[derive(Debug)]
pub struct MemoryPersistence {
    broker: RwLock<Option<Arc<BrokerIdentity>>>,
    options: TrieOptions,
    subscriptions: SubscriptionRegistry,
    retained: RetainedStore,
    outgoing: OutgoingQueues,
    incoming: IncomingStore,
    wills: WillStore,
    destroyed: AtomicBool,
}

impl Default for MemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::with_options(TrieOptions::default())
    }

    /// Use custom separator and wildcard tokens for matching
    pub fn with_options(options: TrieOptions) -> Self {
        Self {
            broker: RwLock::new(None),
            subscriptions: SubscriptionRegistry::with_options(options.clone()),
            options,
            retained: RetainedStore::new(),
            outgoing: OutgoingQueues::new(),
            incoming: IncomingStore::new(),
            wills: WillStore::new(),
            destroyed: AtomicBool::new(false),
        }
    }

    pub fn with_broker(self, broker: Arc<BrokerIdentity>) -> Self {
        *self.broker.write() = Some(broker);
        self
    }

    /// Subscription registry backing this store
    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.subscriptions
    }

    pub fn options(&self) -> &TrieOptions {
        &self.options
    }

    fn broker_id(&self) -> Option<Arc<str>> {
        self.broker.read().as_ref().map(|broker| broker.id().clone())
    }

    fn check_alive(&self) -> Result<()> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(PersistenceError::Destroyed);
        }
        Ok(())
    }
}

#[async_trait]
impl Persistence for MemoryPersistence {
    fn set_broker(&self, broker: Arc<BrokerIdentity>) {
        *self.broker.write() = Some(broker);
    }

    async fn add_subscriptions(&self, client: &Client, subs: &[ClientSubscription]) -> Result<()> {
        self.check_alive()?;
        self.subscriptions.add_subscriptions(&client.id, subs);
        Ok(())
    }

    async fn remove_subscriptions(&self, client: &Client, topics: &[&str]) -> Result<()> {
        self.check_alive()?;
        self.subscriptions.remove_subscriptions(&client.id, topics);
        Ok(())
    }

    async fn subscriptions_by_client(
        &self,
        client: &Client,
    ) -> Result<Option<Vec<ClientSubscription>>> {
        self.check_alive()?;
        Ok(self.subscriptions.subscriptions_by_client(&client.id))
    }

    async fn subscriptions_by_topic(&self, topic: &str) -> Result<Vec<Subscription>> {
        self.check_alive()?;
        Ok(self.subscriptions.subscriptions_by_topic(topic))
    }

    async fn clean_subscriptions(&self, client: &Client) -> Result<()> {
        self.check_alive()?;
        self.subscriptions.clean_subscriptions(&client.id);
        Ok(())
    }

    async fn count_offline(&self) -> Result<(usize, usize)> {
        self.check_alive()?;
        Ok(self.subscriptions.count_offline())
    }

    async fn get_client_list(&self, topic: &str) -> Result<BoxStream<'static, Arc<str>>> {
        self.check_alive()?;
        Ok(stream::iter(self.subscriptions.client_list(topic)).boxed())
    }

    async fn store_retained(&self, packet: &Packet) -> Result<()> {
        self.check_alive()?;
        self.retained.store(packet);
        debug!(topic = %packet.topic, deleted = packet.payload.is_empty(), "Stored retained");
        Ok(())
    }

    async fn create_retained_stream_combi(
        &self,
        patterns: &[&str],
    ) -> Result<BoxStream<'static, Packet>> {
        self.check_alive()?;
        let packets = self.retained.matching(patterns, &self.options);
        Ok(stream::iter(packets).boxed())
    }

    async fn outgoing_enqueue_combi(&self, subs: &[Subscription], packet: &Packet) -> Result<()> {
        self.check_alive()?;
        for sub in subs {
            self.outgoing.enqueue(&sub.client_id, packet);
        }
        Ok(())
    }

    async fn outgoing_update(&self, client: &Client, packet: &Packet) -> Result<()> {
        self.check_alive()?;
        self.outgoing.update(&client.id, packet)
    }

    async fn outgoing_clear_message_id(
        &self,
        client: &Client,
        message_id: u16,
    ) -> Result<Option<Packet>> {
        self.check_alive()?;
        Ok(self.outgoing.clear_message_id(&client.id, message_id))
    }

    async fn outgoing_stream(&self, client: &Client) -> Result<BoxStream<'static, Packet>> {
        self.check_alive()?;
        Ok(stream::iter(self.outgoing.snapshot(&client.id)).boxed())
    }

    async fn incoming_store_packet(&self, client: &Client, packet: &Packet) -> Result<()> {
        self.check_alive()?;
        self.incoming.store(&client.id, packet);
        Ok(())
    }

    async fn incoming_get_packet(&self, client: &Client, message_id: u16) -> Result<Packet> {
        self.check_alive()?;
        self.incoming.get(&client.id, message_id)
    }

    async fn incoming_del_packet(&self, client: &Client, message_id: u16) -> Result<()> {
        self.check_alive()?;
        self.incoming.remove(&client.id, message_id).map(|_| ())
    }

    async fn put_will(&self, client: &Client, will: WillMessage) -> Result<()> {
        self.check_alive()?;
        self.wills.put(&client.id, self.broker_id(), will);
        Ok(())
    }

    async fn get_will(&self, client: &Client) -> Result<Option<WillMessage>> {
        self.check_alive()?;
        Ok(self.wills.get(&client.id))
    }

    async fn del_will(&self, client: &Client) -> Result<Option<WillMessage>> {
        self.check_alive()?;
        Ok(self.wills.remove(&client.id))
    }

    async fn stream_will(
        &self,
        exclude: &HashSet<Arc<str>>,
    ) -> Result<BoxStream<'static, WillMessage>> {
        self.check_alive()?;
        Ok(stream::iter(self.wills.excluding(exclude)).boxed())
    }

    async fn destroy(&self) -> Result<()> {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.subscriptions.clear();
        self.retained.clear();
        self.outgoing.clear();
        self.incoming.clear();
        self.wills.clear();

        info!("Memory persistence destroyed");
        Ok(())
    }
}
