use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

/// Transport decoupling result production from persistence.
///
/// A topic behaves as a single-consumer-group queue: `subscribe` may be
/// taken once per topic and yields every payload published to it,
/// including payloads published before the subscription existed (up to the
/// queue capacity). Delivery order is publish order per topic; nothing is
/// guaranteed across topics.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Append a payload to the topic queue, waiting while the queue is full.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()>;

    /// Take the consumer end of the topic queue.
    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<Vec<u8>>>;
}

/// In-process bus backed by one bounded channel per topic.
///
/// A broker-backed implementation would pump its messages into the same
/// receiver shape; consumers depend only on [`EventBus`].
pub struct ChannelBus {
    capacity: usize,
    topics: Mutex<HashMap<String, Topic>>,
}

struct Topic {
    tx: mpsc::Sender<Vec<u8>>,
    // Held until a consumer subscribes
    pending_rx: Option<mpsc::Receiver<Vec<u8>>>,
}

impl Topic {
    fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self { tx, pending_rx: Some(rx) }
    }
}

impl ChannelBus {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, topics: Mutex::new(HashMap::new()) }
    }

    fn with_topic<T>(&self, topic: &str, f: impl FnOnce(&mut Topic) -> T) -> T {
        let mut topics = self.topics.lock().expect("bus lock poisoned");
        let entry =
            topics.entry(topic.to_string()).or_insert_with(|| Topic::new(self.capacity));
        f(entry)
    }
}

#[async_trait]
impl EventBus for ChannelBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        let tx = self.with_topic(topic, |entry| entry.tx.clone());
        debug!(topic, bytes = payload.len(), "publishing payload");
        if tx.send(payload).await.is_err() {
            bail!("bus topic {topic} is closed");
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<mpsc::Receiver<Vec<u8>>> {
        match self.with_topic(topic, |entry| entry.pending_rx.take()) {
            Some(rx) => Ok(rx),
            None => bail!("bus topic {topic} already has a consumer"),
        }
    }
}
