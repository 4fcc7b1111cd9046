//! In-process multicast channels keyed by name.
//!
//! Every subscriber owns a bounded queue; a publish is copied into each
//! queue registered on the channel at that moment. A channel exists only
//! while it has at least one subscriber.

use futures::Stream;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::{debug, warn};

struct Listener<T> {
    id: u64,
    tx: mpsc::Sender<T>,
}

struct Registry<T> {
    channels: Mutex<HashMap<String, Vec<Listener<T>>>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl<T> Registry<T> {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Listener<T>>>> {
        // Listener lists stay consistent even if a holder panicked.
        self.channels.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn remove(&self, channel: &str, id: u64) {
        let mut channels = self.lock();
        if let Some(listeners) = channels.get_mut(channel) {
            listeners.retain(|l| l.id != id);
            if listeners.is_empty() {
                channels.remove(channel);
                debug!(channel, "Last subscriber left, channel torn down");
            }
        }
    }
}

/// Process-wide multicast registry. Cheap to clone; clones share channels.
pub struct PubSub<T> {
    registry: Arc<Registry<T>>,
}

impl<T> Clone for PubSub<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<T> PubSub<T>
where
    T: Clone + Send + 'static,
{
    /// Create a registry whose subscribers each buffer up to `capacity` messages.
    pub fn new(capacity: usize) -> Self {
        Self {
            registry: Arc::new(Registry {
                channels: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Deliver `message` to every current subscriber of `channel`.
    ///
    /// Fire-and-forget: returns how many subscribers received a copy. A
    /// subscriber whose buffer is full misses this message.
    pub fn publish(&self, channel: &str, message: T) -> usize {
        let mut channels = self.registry.lock();
        let Some(listeners) = channels.get_mut(channel) else {
            return 0;
        };

        let mut delivered = 0;
        listeners.retain(|listener| match listener.tx.try_send(message.clone()) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(channel, subscriber = listener.id, "Subscriber buffer full, message dropped");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });

        if listeners.is_empty() {
            channels.remove(channel);
        }
        delivered
    }

    /// Register a new subscriber. It receives only messages published from now on.
    pub fn subscribe(&self, channel: &str) -> Subscription<T> {
        let (tx, rx) = mpsc::channel(self.registry.capacity);
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);

        self.registry
            .lock()
            .entry(channel.to_string())
            .or_default()
            .push(Listener { id, tx });

        debug!(channel, subscriber = id, "Subscriber registered");

        Subscription {
            channel: channel.to_string(),
            id,
            rx,
            registry: Arc::downgrade(&self.registry),
        }
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.registry.lock().get(channel).map_or(0, Vec::len)
    }

    /// Number of channels that currently have subscribers.
    pub fn channel_count(&self) -> usize {
        self.registry.lock().len()
    }
}

/// An independent, ordered stream of messages from one channel.
///
/// Dropping it unregisters this subscriber only.
pub struct Subscription<T> {
    channel: String,
    id: u64,
    rx: mpsc::Receiver<T>,
    registry: Weak<Registry<T>>,
}

impl<T> Subscription<T> {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Wait for the next message. `None` once the registry itself is gone.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Take a buffered message without waiting.
    pub fn try_recv(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(&self.channel, self.id);
        }
    }
}
