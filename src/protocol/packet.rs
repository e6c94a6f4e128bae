//! Packet, client and broker identity records

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use super::QoS;

/// Packet command carried through the outgoing queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Command {
    /// Application message
    #[default]
    Publish,
    /// QoS 2 release, replaces the publish once PUBREC arrived
    PubRel,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Publish => write!(f, "publish"),
            Command::PubRel => write!(f, "pubrel"),
        }
    }
}

/// A packet as seen by the store
///
/// `message_id` 0 means "not assigned yet". Until an id is assigned the
/// packet is identified by `(broker_id, broker_counter)`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Packet {
    pub cmd: Command,
    pub topic: Arc<str>,
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,
    pub dup: bool,
    pub message_id: u16,
    pub broker_id: Option<Arc<str>>,
    pub broker_counter: u64,
}

impl Packet {
    /// Create a PUBLISH packet
    pub fn publish(topic: impl Into<Arc<str>>, payload: impl Into<Bytes>, qos: QoS) -> Self {
        Self {
            cmd: Command::Publish,
            topic: topic.into(),
            payload: payload.into(),
            qos,
            ..Default::default()
        }
    }

    /// Create a PUBREL packet for an assigned message id
    pub fn pubrel(message_id: u16) -> Self {
        Self {
            cmd: Command::PubRel,
            qos: QoS::AtLeastOnce,
            message_id,
            ..Default::default()
        }
    }

    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    pub fn with_message_id(mut self, message_id: u16) -> Self {
        self.message_id = message_id;
        self
    }

    /// Private copy for a queue: everything but the message id survives
    pub fn queued_copy(&self) -> Self {
        Self {
            message_id: 0,
            ..self.clone()
        }
    }

    /// Whether this packet carries the given broker origin stamp
    pub fn has_origin(&self, broker_id: Option<&str>, broker_counter: u64) -> bool {
        self.broker_id.as_deref() == broker_id && self.broker_counter == broker_counter
    }
}

/// Connected client identity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Client {
    pub id: Arc<str>,
}

impl Client {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self { id: id.into() }
    }
}

impl From<&str> for Client {
    fn from(id: &str) -> Self {
        Client::new(id)
    }
}

/// Broker identity used to stamp packets with their origin
///
/// The counter only ever grows, so `(id, counter)` is unique per packet
/// published through this broker.
#[derive(Debug)]
pub struct BrokerIdentity {
    id: Arc<str>,
    counter: AtomicU64,
}

impl BrokerIdentity {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self::with_counter(id, 0)
    }

    pub fn with_counter(id: impl Into<Arc<str>>, counter: u64) -> Self {
        Self {
            id: id.into(),
            counter: AtomicU64::new(counter),
        }
    }

    pub fn id(&self) -> &Arc<str> {
        &self.id
    }

    /// Last counter value handed out
    pub fn counter(&self) -> u64 {
        self.counter.load(Ordering::Acquire)
    }

    /// Copy `packet`, stamping it with this broker and the next counter value
    pub fn stamp(&self, packet: &Packet) -> Packet {
        let counter = self.counter.fetch_add(1, Ordering::AcqRel) + 1;
        Packet {
            broker_id: Some(self.id.clone()),
            broker_counter: counter,
            ..packet.queued_copy()
        }
    }
}

/// Last will of a client
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WillMessage {
    /// Owning client, filled in when stored
    pub client_id: Option<Arc<str>>,
    /// Broker that stored the will, filled in when stored
    pub broker_id: Option<Arc<str>>,
    pub topic: Arc<str>,
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,
}

impl WillMessage {
    pub fn new(topic: impl Into<Arc<str>>, payload: impl Into<Bytes>, qos: QoS) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos,
            ..Default::default()
        }
    }

    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    /// The PUBLISH sent on behalf of the departed client
    pub fn to_packet(&self) -> Packet {
        Packet::publish(self.topic.clone(), self.payload.clone(), self.qos).with_retain(self.retain)
    }
}
