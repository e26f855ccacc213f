//! Stagelock Core Library
//!
//! This crate provides the core functionality for Stagelock, including:
//! - Resource arbitration (holder, wait queue, queue jumping, override)
//! - Holder reminders with stale-timer detection
//! - Messaging gateways (console, Slack Web API, in-memory recording)
//! - Inbound interaction parsing
//! - Domain events for auditing
//! - File-based configuration

pub mod config;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod interaction;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::domain::arbiter::{
        ActionKind, Arbiter, ArbiterHandle, ArbiterSettings, ControllerSnapshot, Decision,
        LockState, UserId,
    };
    pub use crate::domain::events::{EventPublisher, InMemoryEventStore};
    pub use crate::error::{Error, Result};
    pub use crate::gateway::{Dispatcher, MessagingGateway};
    pub use crate::interaction::{InteractionEvent, parse_line};
}
