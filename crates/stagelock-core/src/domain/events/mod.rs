//! Domain event infrastructure
//!
//! Events are immutable facts about what the arbiter did. They give operators
//! an audit trail and are the channel through which delivery failures surface.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Base trait for all domain events
pub trait DomainEvent: Send + Sync {
    /// Get the event type as a string
    fn event_type(&self) -> &str;

    /// Resource the event belongs to
    fn resource(&self) -> &str;

    /// Get the timestamp when this event occurred
    fn timestamp(&self) -> DateTime<Utc>;

    /// Get optional event data as JSON
    fn data(&self) -> Option<&serde_json::Value>;
}

/// Publisher trait for emitting domain events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a domain event
    async fn publish(&self, event: &dyn DomainEvent) -> Result<()>;

    /// Publish multiple events in order
    async fn publish_all(&self, events: &[&dyn DomainEvent]) -> Result<()> {
        for event in events {
            self.publish(*event).await?;
        }
        Ok(())
    }
}

/// A stored event record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: Uuid,
    pub resource: String,
    pub event_type: String,
    pub data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl StoredEvent {
    pub fn new(
        resource: impl Into<String>,
        event_type: impl Into<String>,
        data: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            resource: resource.into(),
            event_type: event_type.into(),
            data,
            created_at: Utc::now(),
        }
    }

    /// Create from a domain event
    pub fn from_event(event: &dyn DomainEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            resource: event.resource().to_string(),
            event_type: event.event_type().to_string(),
            data: event.data().cloned(),
            created_at: event.timestamp(),
        }
    }
}

impl DomainEvent for StoredEvent {
    fn event_type(&self) -> &str {
        &self.event_type
    }

    fn resource(&self) -> &str {
        &self.resource
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn data(&self) -> Option<&serde_json::Value> {
        self.data.as_ref()
    }
}

/// Events kept by [`InMemoryEventStore::new`]
pub const DEFAULT_EVENT_HISTORY: usize = 1000;

/// In-memory event store holding the most recent events
///
/// Once `capacity` events are held, each new event evicts the oldest one.
#[derive(Debug)]
pub struct InMemoryEventStore {
    events: RwLock<VecDeque<StoredEvent>>,
    capacity: usize,
    evicted: AtomicU64,
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_EVENT_HISTORY)
    }
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store keeping at most `capacity` events (at least one)
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: RwLock::new(VecDeque::with_capacity(capacity.min(DEFAULT_EVENT_HISTORY))),
            capacity,
            evicted: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events dropped to stay within capacity
    pub fn evicted(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    pub fn store(&self, event: StoredEvent) {
        let mut events = self.events.write().unwrap_or_else(PoisonError::into_inner);
        while events.len() >= self.capacity {
            events.pop_front();
            self.evicted.fetch_add(1, Ordering::Relaxed);
        }
        events.push_back(event);
    }

    /// Events recorded for one resource
    pub fn events_for(&self, resource: &str) -> Vec<StoredEvent> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.resource == resource)
            .cloned()
            .collect()
    }

    pub fn all_events(&self) -> Vec<StoredEvent> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    pub fn events_by_type(&self, event_type: &str) -> Vec<StoredEvent> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    /// Up to `limit` most recent events of one type, oldest first
    pub fn recent_by_type(&self, event_type: &str, limit: usize) -> Vec<StoredEvent> {
        let events = self.events.read().unwrap_or_else(PoisonError::into_inner);
        let mut recent: Vec<StoredEvent> = events
            .iter()
            .rev()
            .filter(|e| e.event_type == event_type)
            .take(limit)
            .cloned()
            .collect();
        recent.reverse();
        recent
    }

    pub fn len(&self) -> usize {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.events
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventStore {
    async fn publish(&self, event: &dyn DomainEvent) -> Result<()> {
        self.store(StoredEvent::from_event(event));
        Ok(())
    }
}
