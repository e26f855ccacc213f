//! Outbound message dispatcher
//!
//! Delivery runs on its own task so the arbiter loop never waits on the
//! network. Messages are delivered strictly in the order they were queued.
//! A failed delivery is logged and published as a `delivery_failed` event;
//! the state change that produced the message stands.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{MessagingGateway, Outbound};
use crate::domain::arbiter::event::ArbiterEvent;
use crate::domain::events::EventPublisher;

/// Counters reported when the dispatcher stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub delivered: u64,
    pub failed: u64,
}

/// Sending side of the dispatcher; cheap to clone
#[derive(Debug, Clone)]
pub struct DispatcherHandle {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl DispatcherHandle {
    /// Queue a message for delivery without waiting for it
    ///
    /// Returns false if the dispatcher has already stopped.
    pub fn send(&self, message: Outbound) -> bool {
        match self.tx.send(message) {
            Ok(()) => true,
            Err(mpsc::error::SendError(message)) => {
                warn!(target_id = %message.target(), "Dispatcher stopped, message dropped");
                false
            }
        }
    }
}

/// Delivery loop bound to one gateway
pub struct Dispatcher {
    gateway: Arc<dyn MessagingGateway>,
    events: Arc<dyn EventPublisher>,
    rx: mpsc::UnboundedReceiver<Outbound>,
    stats: DispatchStats,
}

impl Dispatcher {
    /// Spawn the delivery loop; it ends once every handle is dropped
    pub fn spawn(
        gateway: Arc<dyn MessagingGateway>,
        events: Arc<dyn EventPublisher>,
    ) -> (DispatcherHandle, JoinHandle<DispatchStats>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = Self {
            gateway,
            events,
            rx,
            stats: DispatchStats::default(),
        };
        let task = tokio::spawn(dispatcher.run());
        (DispatcherHandle { tx }, task)
    }

    async fn run(mut self) -> DispatchStats {
        debug!(gateway = self.gateway.name(), "Dispatcher started");

        while let Some(message) = self.rx.recv().await {
            self.deliver(message).await;
        }

        info!(
            gateway = self.gateway.name(),
            delivered = self.stats.delivered,
            failed = self.stats.failed,
            "Dispatcher stopped"
        );
        self.stats
    }

    async fn deliver(&mut self, message: Outbound) {
        match self.gateway.deliver(&message).await {
            Ok(()) => {
                self.stats.delivered += 1;
            }
            Err(e) => {
                self.stats.failed += 1;
                warn!(
                    gateway = self.gateway.name(),
                    target_id = %message.target(),
                    error = %e,
                    code = e.code(),
                    "Delivery failed"
                );
                let event = ArbiterEvent::delivery_failed(
                    message.resource(),
                    &message.target(),
                    &e.to_string(),
                );
                if let Err(e) = self.events.publish(&event).await {
                    warn!(error = %e, "Failed to record delivery failure");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::InMemoryEventStore;
    use crate::gateway::RecordingGateway;

    fn notice(text: &str) -> Outbound {
        Outbound::Notice {
            resource: "staging".to_string(),
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_delivers_in_order() {
        let gateway = Arc::new(RecordingGateway::new());
        let events = Arc::new(InMemoryEventStore::new());
        let (handle, task) = Dispatcher::spawn(gateway.clone(), events.clone());

        assert!(handle.send(notice("one")));
        assert!(handle.send(notice("two")));
        assert!(handle.send(notice("three")));
        drop(handle);

        let stats = task.await.unwrap();
        assert_eq!(stats, DispatchStats { delivered: 3, failed: 0 });
        assert_eq!(gateway.notices(), vec!["one", "two", "three"]);
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_failures_become_events() {
        let gateway = Arc::new(RecordingGateway::failing());
        let events = Arc::new(InMemoryEventStore::new());
        let (handle, task) = Dispatcher::spawn(gateway, events.clone());

        handle.send(notice("lost"));
        drop(handle);

        let stats = task.await.unwrap();
        assert_eq!(stats.failed, 1);

        let failed = events.events_by_type("delivery_failed");
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].resource, "staging");
        assert_eq!(failed[0].data.as_ref().unwrap()["target"], "notice:staging");
    }
}
