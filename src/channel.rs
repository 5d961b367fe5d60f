use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;
use tracing::warn;

use crate::error::Error;
use crate::error::Result;
use crate::traits::NotificationChannel;
use crate::traits::Publisher;
use crate::traits::Subscriber;
use crate::types::Notification;

const CHANNEL: &str = "notification channel";

type Session = Arc<RwLock<Option<broadcast::Sender<Notification>>>>;

/// In-process pub/sub on top of a tokio broadcast channel.
///
/// Messages are not persisted: publishing with no live subscriber drops the message, and a subscriber that falls more
/// than `capacity` messages behind loses the overflow. [`BroadcastChannel::disconnect()`] tears the transport down,
/// ending every live subscription; the next publish or subscribe brings it back up empty.
pub struct BroadcastChannel {
    capacity: usize,
    session:  Session,
}

impl BroadcastChannel {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            capacity: capacity.max(1),
            session:  Arc::new(RwLock::new(None)),
        })
    }

    fn sender(session: &Session, capacity: usize) -> broadcast::Sender<Notification> {
        if let Some(sender) = session.read().as_ref() {
            return sender.clone();
        }
        let mut guard = session.write();
        guard
            .get_or_insert_with(|| {
                debug!("Notification channel (re)connected");
                broadcast::channel(capacity).0
            })
            .clone()
    }

    /// Simulate a transport outage.
    pub fn disconnect(&self) {
        if self.session.write().take().is_some() {
            warn!("Notification channel disconnected");
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.session.read().as_ref().map_or(0, |s| s.receiver_count())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[async_trait]
impl NotificationChannel for BroadcastChannel {
    fn publisher(&self) -> Result<Arc<dyn Publisher>> {
        Ok(Arc::new(BroadcastPublisher {
            session:  self.session.clone(),
            capacity: self.capacity,
        }))
    }

    async fn subscribe(&self, topic: &str) -> Result<Box<dyn Subscriber>> {
        let receiver = Self::sender(&self.session, self.capacity).subscribe();
        debug!("Subscribed to '{topic}'");
        Ok(Box::new(BroadcastSubscriber {
            topic: topic.to_string(),
            receiver,
        }))
    }
}

impl Debug for BroadcastChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastChannel")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

pub struct BroadcastPublisher {
    session:  Session,
    capacity: usize,
}

#[async_trait]
impl Publisher for BroadcastPublisher {
    async fn publish(&self, topic: &str, payload: String) -> Result<()> {
        let sender = BroadcastChannel::sender(&self.session, self.capacity);
        let notification = Notification {
            topic: topic.to_string(),
            payload,
        };
        // Fire and forget: nobody listening is not an error.
        if let Err(err) = sender.send(notification) {
            debug!("No subscribers for '{topic}', dropped payload '{}'", err.0.payload);
        }
        Ok(())
    }
}

impl Debug for BroadcastPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BroadcastPublisher")
    }
}

pub struct BroadcastSubscriber {
    topic:    String,
    receiver: broadcast::Receiver<Notification>,
}

#[async_trait]
impl Subscriber for BroadcastSubscriber {
    async fn next_payload(&mut self) -> Result<String> {
        loop {
            match self.receiver.recv().await {
                Ok(notification) if notification.topic == self.topic => return Ok(notification.payload),
                Ok(_) => continue,
                Err(RecvError::Lagged(missed)) => {
                    warn!("Subscriber of '{}' lagged behind, {missed} notifications lost", self.topic);
                }
                Err(RecvError::Closed) => return Err(Error::ConnectionLost(CHANNEL)),
            }
        }
    }
}
