//! Message broker port and the in-memory implementation.
//!
//! The router and engine depend only on [`MessageBroker`]; deployments
//! back it with their broker client of choice. [`InMemoryBroker`] carries
//! the full pub/sub semantics over per-channel broadcast channels and is
//! used by the test suites and embedded deployments.

use async_trait::async_trait;
use dashmap::DashMap;
use mov_core::{ChannelName, Error, Message, Result};
use tokio::sync::broadcast;
use tracing::warn;

/// A live subscription to one channel.
#[derive(Debug)]
pub struct Subscription {
    channel: ChannelName,
    receiver: broadcast::Receiver<Message>,
}

impl Subscription {
    /// Create a subscription from a broadcast receiver.
    #[must_use]
    pub fn new(channel: ChannelName, receiver: broadcast::Receiver<Message>) -> Self {
        Self { channel, receiver }
    }

    /// The subscribed channel.
    #[must_use]
    pub fn channel(&self) -> &ChannelName {
        &self.channel
    }

    /// Receive the next message, or `None` once the channel is gone.
    ///
    /// A lagged receiver skips the dropped messages and keeps going; the
    /// gap is logged, not fatal.
    pub async fn recv(&mut self) -> Option<Message> {
        loop {
            match self.receiver.recv().await {
                Ok(message) => return Some(message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(channel = %self.channel, skipped, "subscription lagged, messages dropped");
                },
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Port onto the message broker.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Open a subscription for the given channel.
    ///
    /// # Errors
    /// Returns a broker error if the subscription cannot be created.
    async fn subscribe(&self, channel: &ChannelName) -> Result<Subscription>;

    /// Publish a message to its channel. Fire-and-forget: delivery to
    /// zero subscribers is a success.
    ///
    /// # Errors
    /// Returns a broker error if the publish cannot be handed off.
    async fn publish(&self, message: Message) -> Result<()>;
}

/// In-memory broker over per-channel broadcast queues.
#[derive(Debug)]
pub struct InMemoryBroker {
    channels: DashMap<ChannelName, broadcast::Sender<Message>>,
    capacity: usize,
}

impl InMemoryBroker {
    /// Create a broker whose per-channel queues hold `capacity` messages.
    ///
    /// # Errors
    /// Returns a configuration error if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::configuration("broker channel capacity must be greater than 0"));
        }
        Ok(Self { channels: DashMap::new(), capacity })
    }

    fn sender(&self, channel: &ChannelName) -> broadcast::Sender<Message> {
        self.channels
            .entry(channel.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self { channels: DashMap::new(), capacity: 1024 }
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn subscribe(&self, channel: &ChannelName) -> Result<Subscription> {
        let receiver = self.sender(channel).subscribe();
        Ok(Subscription::new(channel.clone(), receiver))
    }

    async fn publish(&self, message: Message) -> Result<()> {
        // send only fails with zero receivers, which is fine for
        // fire-and-forget semantics.
        let _ = self.sender(&message.channel).send(message);
        Ok(())
    }
}
