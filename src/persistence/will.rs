//! Will store

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;

use crate::protocol::WillMessage;

/// One last will per client
#[derive(Debug, Default)]
pub struct WillStore {
    wills: DashMap<Arc<str>, WillMessage>,
}

impl WillStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `will` for `client_id`, stamping the owner and broker ids
    pub fn put(&self, client_id: &Arc<str>, broker_id: Option<Arc<str>>, mut will: WillMessage) {
        will.client_id = Some(client_id.clone());
        will.broker_id = broker_id;
        self.wills.insert(client_id.clone(), will);
    }

    pub fn get(&self, client_id: &str) -> Option<WillMessage> {
        self.wills.get(client_id).map(|will| will.clone())
    }

    pub fn remove(&self, client_id: &str) -> Option<WillMessage> {
        self.wills.remove(client_id).map(|(_, will)| will)
    }

    /// Wills stored by any broker not in `exclude`
    pub fn excluding(&self, exclude: &HashSet<Arc<str>>) -> Vec<WillMessage> {
        self.wills
            .iter()
            .filter(|entry| {
                entry
                    .broker_id
                    .as_ref()
                    .map_or(true, |broker_id| !exclude.contains(broker_id))
            })
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.wills.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wills.is_empty()
    }

    pub fn clear(&self) {
        self.wills.clear();
    }
}
