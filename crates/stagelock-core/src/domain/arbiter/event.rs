//! Arbiter domain events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::{ActionKind, Notice, UserId};
use crate::domain::events::DomainEvent;

/// Type of arbiter event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArbiterEventType {
    /// The resource was taken (acquire, override, or handoff)
    Acquired,
    /// The holder gave the resource up
    Released,
    /// A user joined the queue
    Queued,
    /// A user left the queue
    Dequeued,
    /// A user jumped to the front of the queue
    QueueJumped,
    /// A reminder was sent to the holder
    ReminderSent,
    /// An expired reminder no longer applied
    ReminderStale,
    /// An inbound interaction was rejected
    InteractionRejected,
    /// An outbound message could not be delivered
    DeliveryFailed,
}

impl ArbiterEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Acquired => "acquired",
            Self::Released => "released",
            Self::Queued => "queued",
            Self::Dequeued => "dequeued",
            Self::QueueJumped => "queue_jumped",
            Self::ReminderSent => "reminder_sent",
            Self::ReminderStale => "reminder_stale",
            Self::InteractionRejected => "interaction_rejected",
            Self::DeliveryFailed => "delivery_failed",
        }
    }
}

impl std::fmt::Display for ArbiterEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An arbiter domain event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArbiterEvent {
    pub id: Uuid,
    pub resource: String,
    pub event_type: ArbiterEventType,
    pub data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl ArbiterEvent {
    pub fn new(
        resource: impl Into<String>,
        event_type: ArbiterEventType,
        data: Option<serde_json::Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            resource: resource.into(),
            event_type,
            data,
            created_at: Utc::now(),
        }
    }

    /// Event describing the transition behind a public notice
    pub fn from_notice(resource: &str, action: ActionKind, notice: &Notice) -> Self {
        let event_type = match notice {
            Notice::Took(_) => ArbiterEventType::Acquired,
            Notice::Released(_) => ArbiterEventType::Released,
            Notice::AddedToQueue(_) => ArbiterEventType::Queued,
            Notice::RemovedFromQueue(_) => ArbiterEventType::Dequeued,
            Notice::MovedToFront(_) => ArbiterEventType::QueueJumped,
        };
        let data = serde_json::json!({
            "actor": notice.actor().as_str(),
            "action": action.as_str(),
        });
        Self::new(resource, event_type, Some(data))
    }

    pub fn reminder_sent(resource: &str, holder: &UserId) -> Self {
        let data = serde_json::json!({ "holder": holder.as_str() });
        Self::new(resource, ArbiterEventType::ReminderSent, Some(data))
    }

    pub fn reminder_stale(resource: &str, holder: &UserId, generation: u64) -> Self {
        let data = serde_json::json!({
            "holder": holder.as_str(),
            "generation": generation,
        });
        Self::new(resource, ArbiterEventType::ReminderStale, Some(data))
    }

    pub fn interaction_rejected(resource: &str, reason: &str) -> Self {
        let data = serde_json::json!({ "reason": reason });
        Self::new(resource, ArbiterEventType::InteractionRejected, Some(data))
    }

    pub fn delivery_failed(resource: &str, target: &str, error: &str) -> Self {
        let data = serde_json::json!({
            "target": target,
            "error": error,
        });
        Self::new(resource, ArbiterEventType::DeliveryFailed, Some(data))
    }
}

impl DomainEvent for ArbiterEvent {
    fn event_type(&self) -> &str {
        self.event_type.as_str()
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
