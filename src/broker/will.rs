//! Will sweeping
//!
//! Wills are stamped with the broker that stored them. When a broker stops
//! sending heartbeats its clients' wills are published by whichever broker
//! sweeps next, then deleted so they go out exactly once.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::Broker;
use crate::persistence::Result;
use crate::protocol::{Client, WillMessage};

impl Broker {
    /// Record a heartbeat from another broker sharing the persistence
    pub fn record_heartbeat(&self, broker_id: &str) {
        self.heartbeats.insert(Arc::from(broker_id), Instant::now());
    }

    /// Brokers heard from within `dead_after`, this one included
    ///
    /// Brokers silent for longer are forgotten.
    pub fn alive_brokers(&self, dead_after: Duration) -> HashSet<Arc<str>> {
        let now = Instant::now();
        self.heartbeats
            .retain(|_, seen| now.duration_since(*seen) <= dead_after);

        let mut alive: HashSet<Arc<str>> = self
            .heartbeats
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        alive.insert(self.identity.id().clone());
        alive
    }

    /// Publish and delete the wills of every broker presumed dead
    ///
    /// Wills whose topic is rejected are deleted without being published.
    /// Returns the number of wills published.
    pub async fn sweep_wills(&self, dead_after: Duration) -> Result<usize> {
        let alive = self.alive_brokers(dead_after);
        let wills: Vec<WillMessage> = self.persistence.stream_will(&alive).await?.collect().await;

        let mut published = 0;
        for will in wills {
            let Some(client_id) = will.client_id.clone() else {
                warn!(topic = %will.topic, "Skipping will without owner");
                continue;
            };

            let outcome = self.publish_will(&will).await?;
            self.persistence.del_will(&Client::new(client_id.clone())).await?;
            if outcome.is_none() {
                continue;
            }
            published += 1;

            debug!(
                client_id = %client_id,
                broker_id = ?will.broker_id,
                "Published will of dead broker"
            );
        }

        Ok(published)
    }

    /// Sweep wills every `interval` on a background task
    ///
    /// The first sweep runs one interval after spawning, giving other brokers
    /// time to announce themselves.
    pub fn spawn_will_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        dead_after: Duration,
    ) -> SweeperHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let task = tokio::spawn(Self::sweep_loop(
            self.clone(),
            shutdown_rx,
            interval,
            dead_after,
        ));

        SweeperHandle { shutdown_tx, task }
    }

    async fn sweep_loop(
        broker: Arc<Broker>,
        mut shutdown_rx: mpsc::Receiver<()>,
        interval: Duration,
        dead_after: Duration,
    ) {
        let start = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match broker.sweep_wills(dead_after).await {
                        Ok(0) => {}
                        Ok(count) => info!("Published {} wills of dead brokers", count),
                        Err(e) => error!("Will sweep failed: {}", e),
                    }
                }

                // Shutdown signal or handle dropped
                _ = shutdown_rx.recv() => {
                    break;
                }
            }
        }

        info!(broker_id = %broker.id(), "Will sweeper exited");
    }
}

/// Handle to a running will sweeper
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Stop the sweeper and wait for it to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.task.await {
            error!("Will sweeper task failed: {}", e);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{MemoryPersistence, Persistence};
    use crate::protocol::{BrokerIdentity, QoS};

    fn broker(id: &str, persistence: Arc<MemoryPersistence>) -> Broker {
        Broker::new(Arc::new(BrokerIdentity::new(id)), persistence)
    }

    async fn put_will_as(persistence: &MemoryPersistence, broker_id: &str, client_id: &str) {
        persistence.set_broker(Arc::new(BrokerIdentity::new(broker_id)));
        persistence
            .put_will(
                &Client::from(client_id),
                WillMessage::new("mywill", "last will", QoS::AtMostOnce),
            )
            .await
            .unwrap();
    }

    #[test]
    fn test_alive_brokers_includes_self() {
        let broker = broker("me", Arc::new(MemoryPersistence::new()));
        broker.record_heartbeat("other");

        let alive = broker.alive_brokers(Duration::from_secs(60));
        assert!(alive.contains("me"));
        assert!(alive.contains("other"));
    }

    #[tokio::test]
    async fn test_silent_broker_is_forgotten() {
        let broker = broker("me", Arc::new(MemoryPersistence::new()));
        broker.record_heartbeat("other");
        tokio::time::sleep(Duration::from_millis(20)).await;

        let alive = broker.alive_brokers(Duration::from_millis(5));
        assert!(!alive.contains("other"));
        assert!(alive.contains("me"));
    }

    #[tokio::test]
    async fn test_sweep_publishes_dead_broker_wills_once() {
        let persistence = Arc::new(MemoryPersistence::new());
        put_will_as(&persistence, "anotherBroker", "myClientId42").await;
        put_will_as(&persistence, "liveBroker", "c2").await;

        let broker = broker("me", persistence.clone());
        put_will_as(&persistence, "me", "c3").await;
        broker.record_heartbeat("liveBroker");

        let dead_after = Duration::from_secs(60);
        assert_eq!(broker.sweep_wills(dead_after).await.unwrap(), 1);
        assert_eq!(broker.sweep_wills(dead_after).await.unwrap(), 0);

        assert!(persistence
            .get_will(&Client::from("myClientId42"))
            .await
            .unwrap()
            .is_none());
        assert!(persistence
            .get_will(&Client::from("c2"))
            .await
            .unwrap()
            .is_some());
        assert!(persistence
            .get_will(&Client::from("c3"))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_sweeper_task_runs_and_shuts_down() {
        let persistence = Arc::new(MemoryPersistence::new());
        put_will_as(&persistence, "anotherBroker", "myClientId42").await;

        let broker = Arc::new(broker("me", persistence.clone()));
        let handle =
            broker.spawn_will_sweeper(Duration::from_millis(10), Duration::from_millis(30));

        let mut delivered = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if persistence
                .get_will(&Client::from("myClientId42"))
                .await
                .unwrap()
                .is_none()
            {
                delivered = true;
                break;
            }
        }
        assert!(delivered);

        assert!(!handle.is_finished());
        handle.shutdown().await;
    }
}
