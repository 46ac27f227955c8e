// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Transport event feed.
//!
//! Transports push adapter and link events into an [`EventFeed`]; each
//! consumer holds a [`Subscription`] with its own queue. Subscriptions are
//! removed explicitly with [`Subscription::unsubscribe`] or when dropped, so
//! a restarted session never leaves a stale handler behind.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Events pushed by a transport, independent of any command in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The adapter was powered on.
    AdapterEnabled,
    /// The adapter was powered off.
    AdapterDisabled,
    /// The active serial link dropped.
    ConnectionLost,
    /// Asynchronous error reported by the stack.
    Error(String),
}

impl TransportEvent {
    /// Event name as used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AdapterEnabled => "adapterEnabled",
            Self::AdapterDisabled => "adapterDisabled",
            Self::ConnectionLost => "connectionLost",
            Self::Error(_) => "error",
        }
    }
}

#[derive(Debug, Default)]
struct Registry {
    next_id: u64,
    subscribers: HashMap<u64, mpsc::UnboundedSender<TransportEvent>>,
}

/// Fan-out of transport events to any number of subscribers.
#[derive(Debug, Clone, Default)]
pub struct EventFeed {
    registry: Arc<Mutex<Registry>>,
}

impl EventFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut registry = self.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.subscribers.insert(id, tx);
        debug!("Event subscriber {} registered", id);

        Subscription {
            id,
            rx,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver an event to every live subscriber.
    ///
    /// Subscribers whose receiving side is gone are pruned.
    pub fn publish(&self, event: TransportEvent) {
        let mut registry = self.registry.lock();
        trace!(
            "Publishing {} to {} subscribers",
            event.name(),
            registry.subscribers.len()
        );
        registry
            .subscribers
            .retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().subscribers.len()
    }

    /// Drop every subscriber, ending their streams.
    pub fn close(&self) {
        self.registry.lock().subscribers.clear();
    }
}

/// A registered consumer of transport events.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<TransportEvent>,
    registry: std::sync::Weak<Mutex<Registry>>,
}

impl Subscription {
    /// Wait for the next event. Returns `None` once the feed is closed.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }

    /// Take an event if one is already queued.
    pub fn try_recv(&mut self) -> Option<TransportEvent> {
        self.rx.try_recv().ok()
    }

    /// Remove this subscriber from the feed.
    pub fn unsubscribe(self) {
        // Removal happens in Drop.
    }

    fn remove(&self) {
        if let Some(registry) = self.registry.upgrade() {
            if registry.lock().subscribers.remove(&self.id).is_some() {
                debug!("Event subscriber {} removed", self.id);
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let feed = EventFeed::new();
        let mut a = feed.subscribe();
        let mut b = feed.subscribe();

        feed.publish(TransportEvent::ConnectionLost);

        assert_eq!(a.recv().await, Some(TransportEvent::ConnectionLost));
        assert_eq!(b.recv().await, Some(TransportEvent::ConnectionLost));
    }

    #[test]
    fn test_subscribe_unsubscribe_symmetry() {
        let feed = EventFeed::new();
        let a = feed.subscribe();
        let b = feed.subscribe();
        assert_eq!(feed.subscriber_count(), 2);

        a.unsubscribe();
        assert_eq!(feed.subscriber_count(), 1);

        drop(b);
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[test]
    fn test_unsubscribed_consumer_misses_later_events() {
        let feed = EventFeed::new();
        let mut kept = feed.subscribe();
        let gone = feed.subscribe();
        gone.unsubscribe();

        feed.publish(TransportEvent::Error("boom".into()));
        assert_eq!(kept.try_recv(), Some(TransportEvent::Error("boom".into())));
        assert_eq!(kept.try_recv(), None);
    }

    #[tokio::test]
    async fn test_close_ends_streams() {
        let feed = EventFeed::new();
        let mut sub = feed.subscribe();
        feed.close();
        assert_eq!(sub.recv().await, None);
        assert_eq!(feed.subscriber_count(), 0);
    }
}
