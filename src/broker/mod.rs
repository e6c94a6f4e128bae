//! Broker session coordinator
//!
//! Wires subscriptions, retained messages, in-flight queues and wills
//! together on top of a [`Persistence`] backend:
//! - subscribe registers patterns and hands back matching retained packets
//! - publish stamps the packet with this broker's identity, stores it as
//!   retained when flagged and queues QoS 1/2 deliveries per subscriber
//! - connect restores or cleans the session and replays queued packets
//! - disconnect publishes or drops the will
//!
//! Network I/O is not handled here; callers feed already decoded packets in
//! and write the returned packets out.

mod will;

pub use will::SweeperHandle;

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use hashlink::LinkedHashMap;
use futures_util::StreamExt;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::persistence::{Persistence, PersistenceError, Result};
use crate::protocol::{BrokerIdentity, Client, Command, Packet, QoS, WillMessage};
use crate::subscription::{ClientSubscription, Subscription};
use crate::topic::{validate_topic_filter, validate_topic_name, TrieOptions};

/// Result of a CONNECT
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectOutcome {
    /// A subscription record existed for a persistent session
    pub session_present: bool,
    /// Subscriptions restored for a persistent session
    pub subscriptions: Vec<ClientSubscription>,
    /// Queued packets to resend, with message ids assigned
    pub pending: Vec<Packet>,
}

/// Result of routing one PUBLISH
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    /// The packet as stamped by this broker
    pub packet: Packet,
    /// Clients with a matching QoS 1/2 subscription
    pub matched: usize,
    /// Deliveries queued (subscriptions with an effective QoS above 0)
    pub enqueued: usize,
}

/// Broker coordinator
pub struct Broker {
    identity: Arc<BrokerIdentity>,
    persistence: Arc<dyn Persistence>,
    options: TrieOptions,
    max_levels: usize,
    /// Next message id per client
    message_ids: DashMap<Arc<str>, u16>,
    /// Last heartbeat seen from other brokers
    heartbeats: DashMap<Arc<str>, Instant>,
}

impl Broker {
    /// Create a broker; the persistence is told to stamp wills with `identity`
    pub fn new(identity: Arc<BrokerIdentity>, persistence: Arc<dyn Persistence>) -> Self {
        persistence.set_broker(identity.clone());
        Self {
            identity,
            persistence,
            options: TrieOptions::default(),
            max_levels: 0,
            message_ids: DashMap::new(),
            heartbeats: DashMap::new(),
        }
    }

    /// Build a broker from the `broker` and `topic` config sections
    pub fn from_config(config: &Config, persistence: Arc<dyn Persistence>) -> Self {
        let identity = Arc::new(BrokerIdentity::new(config.broker.resolved_id()));
        Self::new(identity, persistence)
            .with_topic_options(config.topic.trie_options(), config.topic.max_levels)
    }

    /// Separator and wildcard tokens used to validate topics, 0 levels = unlimited
    ///
    /// Must agree with the options the persistence matches with.
    pub fn with_topic_options(mut self, options: TrieOptions, max_levels: usize) -> Self {
        self.options = options;
        self.max_levels = max_levels;
        self
    }

    pub fn id(&self) -> &Arc<str> {
        self.identity.id()
    }

    pub fn identity(&self) -> &Arc<BrokerIdentity> {
        &self.identity
    }

    pub fn persistence(&self) -> &Arc<dyn Persistence> {
        &self.persistence
    }

    /// Get next message identifier for a client (never 0)
    pub fn next_message_id(&self, client_id: &Arc<str>) -> u16 {
        let mut next = self.message_ids.entry(client_id.clone()).or_insert(1);
        let id = *next;
        *next = next.wrapping_add(1);
        if *next == 0 {
            *next = 1;
        }
        id
    }

    fn check_topic(&self, topic: &str) -> Result<()> {
        validate_topic_name(topic, &self.options, self.max_levels)
            .map_err(|reason| PersistenceError::invalid_topic(topic, reason))
    }

    fn check_filter(&self, filter: &str) -> Result<()> {
        validate_topic_filter(filter, &self.options, self.max_levels)
            .map_err(|reason| PersistenceError::invalid_topic(filter, reason))
    }

    // ========================================================================
    // Session lifecycle
    // ========================================================================

    /// Handle CONNECT
    ///
    /// A clean session drops the stored subscriptions and clears queued
    /// packets instead of returning them.
    pub async fn connect(
        &self,
        client: &Client,
        clean: bool,
        will: Option<WillMessage>,
    ) -> Result<ConnectOutcome> {
        if let Some(ref will) = will {
            self.check_topic(&will.topic)?;
        }

        let mut outcome = ConnectOutcome::default();

        if clean {
            self.persistence.clean_subscriptions(client).await?;
        } else if let Some(subs) = self.persistence.subscriptions_by_client(client).await? {
            outcome.session_present = true;
            outcome.subscriptions = subs;
        }

        if let Some(will) = will {
            self.persistence.put_will(client, will).await?;
        }

        let queued: Vec<Packet> = self.persistence.outgoing_stream(client).await?.collect().await;
        for mut packet in queued {
            if packet.cmd == Command::Publish {
                packet.message_id = self.next_message_id(&client.id);
            }

            if let Err(e) = self.persistence.outgoing_update(client, &packet).await {
                warn!(client_id = %client.id, "Failed to replay queued packet: {}", e);
                continue;
            }

            if clean {
                self.persistence
                    .outgoing_clear_message_id(client, packet.message_id)
                    .await?;
            } else {
                outcome.pending.push(packet);
            }
        }

        info!(
            client_id = %client.id,
            clean,
            session_present = outcome.session_present,
            pending = outcome.pending.len(),
            "Client connected"
        );
        Ok(outcome)
    }

    /// Publish a will; a will that can not be routed is logged and dropped
    pub(crate) async fn publish_will(&self, will: &WillMessage) -> Result<Option<PublishOutcome>> {
        match self.publish(&will.to_packet()).await {
            Ok(outcome) => Ok(Some(outcome)),
            Err(e @ PersistenceError::InvalidTopic { .. }) => {
                warn!(client_id = ?will.client_id, "Dropping unroutable will: {}", e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Handle a client going away
    ///
    /// A graceful disconnect discards the will, any other publishes it.
    pub async fn disconnect(
        &self,
        client: &Client,
        graceful: bool,
        clean: bool,
    ) -> Result<Option<PublishOutcome>> {
        let will = self.persistence.get_will(client).await?;

        let published = match will {
            Some(will) if !graceful => self.publish_will(&will).await?,
            _ => None,
        };
        self.persistence.del_will(client).await?;

        if clean {
            self.persistence.clean_subscriptions(client).await?;
            self.message_ids.remove(&client.id);
        }

        info!(client_id = %client.id, graceful, clean, "Client disconnected");
        Ok(published)
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// Handle SUBSCRIBE, returning the retained packets to deliver
    pub async fn subscribe(
        &self,
        client: &Client,
        subs: &[ClientSubscription],
    ) -> Result<Vec<Packet>> {
        for sub in subs {
            self.check_filter(&sub.topic)?;
        }

        self.persistence.add_subscriptions(client, subs).await?;

        if subs.is_empty() {
            return Ok(Vec::new());
        }

        let patterns: Vec<&str> = subs.iter().map(|sub| sub.topic.as_ref()).collect();
        let retained: Vec<Packet> = self
            .persistence
            .create_retained_stream_combi(&patterns)
            .await?
            .collect()
            .await;

        debug!(
            client_id = %client.id,
            subscriptions = subs.len(),
            retained = retained.len(),
            "Client subscribed"
        );
        Ok(retained)
    }

    /// Handle UNSUBSCRIBE
    pub async fn unsubscribe(&self, client: &Client, topics: &[&str]) -> Result<()> {
        for topic in topics {
            self.check_filter(topic)?;
        }

        self.persistence.remove_subscriptions(client, topics).await?;
        debug!(client_id = %client.id, count = topics.len(), "Client unsubscribed");
        Ok(())
    }

    // ========================================================================
    // Publish
    // ========================================================================

    /// Route a PUBLISH
    ///
    /// Each matching QoS 1/2 subscriber gets one copy queued at
    /// `min(packet qos, subscription qos)`; QoS 0 deliveries are not queued.
    /// A client matched by several patterns is served at the highest QoS.
    pub async fn publish(&self, packet: &Packet) -> Result<PublishOutcome> {
        self.check_topic(&packet.topic)?;

        let packet = self.identity.stamp(packet);

        if packet.retain {
            self.persistence.store_retained(&packet).await?;
        }

        // Overlapping patterns of one client collapse into a single delivery
        // at the highest granted QoS, keeping one queued copy per origin.
        let mut by_client: LinkedHashMap<Arc<str>, Subscription> = LinkedHashMap::new();
        for sub in self.persistence.subscriptions_by_topic(&packet.topic).await? {
            match by_client.get_mut(&sub.client_id) {
                Some(existing) if existing.qos >= sub.qos => {}
                Some(existing) => *existing = sub,
                None => {
                    by_client.insert(sub.client_id.clone(), sub);
                }
            }
        }
        let matched = by_client.len();

        let mut at_least_once: Vec<Subscription> = Vec::new();
        let mut exactly_once: Vec<Subscription> = Vec::new();
        for (_, sub) in by_client {
            match packet.qos.min(sub.qos) {
                QoS::AtMostOnce => {}
                QoS::AtLeastOnce => at_least_once.push(sub),
                QoS::ExactlyOnce => exactly_once.push(sub),
            }
        }

        let enqueued = at_least_once.len() + exactly_once.len();
        for (qos, group) in [
            (QoS::AtLeastOnce, at_least_once),
            (QoS::ExactlyOnce, exactly_once),
        ] {
            if group.is_empty() {
                continue;
            }
            let delivery = Packet {
                qos,
                retain: false,
                ..packet.clone()
            };
            self.persistence
                .outgoing_enqueue_combi(&group, &delivery)
                .await?;
        }

        debug!(
            topic = %packet.topic,
            broker_counter = packet.broker_counter,
            matched,
            enqueued,
            "Routed publish"
        );
        Ok(PublishOutcome {
            packet,
            matched,
            enqueued,
        })
    }

    // ========================================================================
    // Acknowledgements
    // ========================================================================

    /// Handle PUBACK, returning the acknowledged packet if it was queued
    pub async fn puback(&self, client: &Client, message_id: u16) -> Result<Option<Packet>> {
        let acked = self
            .persistence
            .outgoing_clear_message_id(client, message_id)
            .await?;
        if acked.is_none() {
            debug!(client_id = %client.id, message_id, "Acknowledgement for unknown message id");
        }
        Ok(acked)
    }

    /// Handle PUBCOMP
    pub async fn pubcomp(&self, client: &Client, message_id: u16) -> Result<Option<Packet>> {
        self.puback(client, message_id).await
    }

    /// Handle PUBREC: the queued publish becomes a PUBREL
    pub async fn pubrec(&self, client: &Client, message_id: u16) -> Result<Packet> {
        let pubrel = Packet::pubrel(message_id);
        self.persistence.outgoing_update(client, &pubrel).await?;
        Ok(pubrel)
    }

    /// Store an inbound QoS 2 PUBLISH until its PUBREL arrives
    pub async fn receive_qos2(&self, client: &Client, packet: &Packet) -> Result<()> {
        self.persistence.incoming_store_packet(client, packet).await
    }

    /// Handle an inbound PUBREL: release the stored packet and route it
    pub async fn release_incoming(
        &self,
        client: &Client,
        message_id: u16,
    ) -> Result<PublishOutcome> {
        let packet = self
            .persistence
            .incoming_get_packet(client, message_id)
            .await?;
        self.persistence
            .incoming_del_packet(client, message_id)
            .await?;
        self.publish(&packet).await
    }
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("id", self.identity.id())
            .field("counter", &self.identity.counter())
            .field("clients", &self.message_ids.len())
            .finish()
    }
}
