//! Outgoing and incoming in-flight queues

use std::collections::VecDeque;
use std::sync::Arc;

use ahash::AHashMap;
use dashmap::DashMap;

use super::error::{PersistenceError, Result};
use crate::protocol::Packet;

/// Per-client FIFO of packets waiting for acknowledgement
#[derive(Debug, Default)]
pub struct OutgoingQueues {
    queues: DashMap<Arc<str>, VecDeque<Packet>>,
}

impl OutgoingQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a private copy of `packet` with no message id assigned
    pub fn enqueue(&self, client_id: &Arc<str>, packet: &Packet) {
        self.queues
            .entry(client_id.clone())
            .or_default()
            .push_back(packet.queued_copy());
    }

    /// Assign a message id to the entry with the same origin, or replace the
    /// entry with the same message id
    pub fn update(&self, client_id: &str, packet: &Packet) -> Result<()> {
        let mut queue = self
            .queues
            .get_mut(client_id)
            .ok_or_else(PersistenceError::no_such_packet)?;

        if let Some(entry) = queue
            .iter_mut()
            .find(|entry| entry.has_origin(packet.broker_id.as_deref(), packet.broker_counter))
        {
            entry.message_id = packet.message_id;
            return Ok(());
        }

        if let Some(entry) = queue
            .iter_mut()
            .find(|entry| entry.message_id == packet.message_id)
        {
            *entry = packet.clone();
            return Ok(());
        }

        Err(PersistenceError::no_such_packet())
    }

    /// Remove and return the entry carrying `message_id`, if any
    pub fn clear_message_id(&self, client_id: &str, message_id: u16) -> Option<Packet> {
        let removed = self.queues.get_mut(client_id).and_then(|mut queue| {
            let pos = queue
                .iter()
                .position(|entry| entry.message_id == message_id)?;
            queue.remove(pos)
        });

        // Drop the client entry once its last packet is gone
        self.queues.remove_if(client_id, |_, queue| queue.is_empty());

        removed
    }

    /// Number of clients with a non-empty queue
    pub fn client_count(&self) -> usize {
        self.queues.len()
    }

    /// Copy of a client's queue in FIFO order
    pub fn snapshot(&self, client_id: &str) -> Vec<Packet> {
        self.queues
            .get(client_id)
            .map(|queue| queue.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, client_id: &str) -> usize {
        self.queues.get(client_id).map_or(0, |queue| queue.len())
    }

    pub fn clear(&self) {
        self.queues.clear();
    }
}

/// Inbound QoS 2 packets keyed by `(client, message id)`
#[derive(Debug, Default)]
pub struct IncomingStore {
    packets: DashMap<Arc<str>, AHashMap<u16, Packet>>,
}

impl IncomingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, client_id: &Arc<str>, packet: &Packet) {
        self.packets
            .entry(client_id.clone())
            .or_default()
            .insert(packet.message_id, packet.clone());
    }

    pub fn get(&self, client_id: &str, message_id: u16) -> Result<Packet> {
        self.packets
            .get(client_id)
            .and_then(|packets| packets.get(&message_id).cloned())
            .ok_or_else(PersistenceError::no_such_packet)
    }

    pub fn remove(&self, client_id: &str, message_id: u16) -> Result<Packet> {
        let removed = self
            .packets
            .get_mut(client_id)
            .and_then(|mut packets| packets.remove(&message_id));

        // Drop the client entry once its last packet is gone
        self.packets
            .remove_if(client_id, |_, packets| packets.is_empty());

        removed.ok_or_else(PersistenceError::no_such_packet)
    }

    pub fn clear(&self) {
        self.packets.clear();
    }
}
