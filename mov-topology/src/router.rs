//! Channel router: at most one live subscription per channel.
//!
//! The router owns the open/close bookkeeping over the broker port and a
//! raw publish surface. The registry is guarded by a single lock held
//! only for the duration of the lookup/insert/remove, never while
//! forwarding messages, so one channel's throughput cannot block another
//! channel's open/close. Each open channel is consumed by exactly one
//! [`RouteStream`]; closing the channel flips a watch flag that ends the
//! stream and releases the broker subscription.

use crate::broker::{MessageBroker, Subscription};
use mov_core::{ChannelName, Message, Result, RouterError};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tokio::sync::watch;
use tracing::{debug, error};

/// Bookkeeping for one open channel.
#[derive(Debug)]
struct OpenRoute {
    closed: watch::Sender<bool>,
}

/// Counters for router activity.
#[derive(Debug, Default)]
struct RouterMetrics {
    opened: AtomicU64,
    closed: AtomicU64,
    published: AtomicU64,
    publish_failures: AtomicU64,
}

/// Snapshot of the router counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterStats {
    /// Channels opened since creation.
    pub opened: u64,
    /// Channels closed since creation.
    pub closed: u64,
    /// Messages published.
    pub published: u64,
    /// Publishes that failed at the broker.
    pub publish_failures: u64,
}

/// Push-based stream of messages for one open channel.
///
/// Ends when the router closes the channel or the broker drops the
/// subscription.
#[derive(Debug)]
pub struct RouteStream {
    subscription: Subscription,
    closed: watch::Receiver<bool>,
}

impl RouteStream {
    /// Receive the next message, or `None` once the route is closed.
    ///
    /// The close flag wins over a pending message: once `close()` has
    /// returned, no further message comes out of the stream, buffered or
    /// not.
    pub async fn recv(&mut self) -> Option<Message> {
        loop {
            if *self.closed.borrow() {
                return None;
            }
            tokio::select! {
                biased;
                changed = self.closed.changed() => {
                    if changed.is_err() || *self.closed.borrow() {
                        return None;
                    }
                },
                message = self.subscription.recv() => {
                    if *self.closed.borrow() {
                        return None;
                    }
                    return message;
                },
            }
        }
    }
}

/// Router guaranteeing at most one live subscription per channel.
pub struct ChannelRouter {
    broker: Arc<dyn MessageBroker>,
    routes: Mutex<HashMap<ChannelName, OpenRoute>>,
    metrics: RouterMetrics,
}

impl std::fmt::Debug for ChannelRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRouter").field("stats", &self.stats()).finish()
    }
}

impl ChannelRouter {
    /// Create a router over the given broker.
    #[must_use]
    pub fn new(broker: Arc<dyn MessageBroker>) -> Self {
        Self { broker, routes: Mutex::new(HashMap::new()), metrics: RouterMetrics::default() }
    }

    /// Open a subscription for `channel` and return its message stream.
    ///
    /// # Errors
    /// Returns [`RouterError::AlreadyOpen`] if a subscription for the
    /// channel already exists, or a broker error if the subscription
    /// cannot be created.
    pub async fn open(&self, channel: &ChannelName) -> Result<RouteStream> {
        let (closed_tx, closed_rx) = watch::channel(false);
        {
            let mut routes = self.routes.lock();
            if routes.contains_key(channel) {
                return Err(RouterError::AlreadyOpen { channel: channel.to_string() }.into());
            }
            routes.insert(channel.clone(), OpenRoute { closed: closed_tx });
        }

        // The broker call happens outside the registry lock; undo the
        // reservation if it fails.
        match self.broker.subscribe(channel).await {
            Ok(subscription) => {
                self.metrics.opened.fetch_add(1, Ordering::Relaxed);
                debug!(%channel, "channel opened");
                Ok(RouteStream { subscription, closed: closed_rx })
            },
            Err(err) => {
                self.routes.lock().remove(channel);
                Err(err)
            },
        }
    }

    /// Close the subscription for `channel`.
    ///
    /// # Errors
    /// Returns [`RouterError::NotOpen`] if no subscription exists. This
    /// is a caller error, not fatal.
    pub fn close(&self, channel: &ChannelName) -> Result<()> {
        let route = self
            .routes
            .lock()
            .remove(channel)
            .ok_or_else(|| RouterError::NotOpen { channel: channel.to_string() })?;
        // Receiver may already be gone; the route is unregistered either way.
        let _ = route.closed.send(true);
        self.metrics.closed.fetch_add(1, Ordering::Relaxed);
        debug!(%channel, "channel closed");
        Ok(())
    }

    /// Fire-and-forget publish of a raw payload to `channel`.
    ///
    /// # Errors
    /// Returns a broker error on failure; the failure is also logged and
    /// counted so one channel's trouble never affects another channel.
    pub async fn publish(&self, channel: &ChannelName, payload: bytes::Bytes) -> Result<()> {
        let message = Message::new(channel.clone(), payload);
        match self.broker.publish(message).await {
            Ok(()) => {
                self.metrics.published.fetch_add(1, Ordering::Relaxed);
                Ok(())
            },
            Err(err) => {
                self.metrics.publish_failures.fetch_add(1, Ordering::Relaxed);
                error!(%channel, error = %err, "publish failed");
                Err(err)
            },
        }
    }

    /// Whether a subscription for `channel` is currently open.
    #[must_use]
    pub fn is_open(&self, channel: &ChannelName) -> bool {
        self.routes.lock().contains_key(channel)
    }

    /// Snapshot of the router counters.
    #[must_use]
    pub fn stats(&self) -> RouterStats {
        RouterStats {
            opened: self.metrics.opened.load(Ordering::Relaxed),
            closed: self.metrics.closed.load(Ordering::Relaxed),
            published: self.metrics.published.load(Ordering::Relaxed),
            publish_failures: self.metrics.publish_failures.load(Ordering::Relaxed),
        }
    }
}
