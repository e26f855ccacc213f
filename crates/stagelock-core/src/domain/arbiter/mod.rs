//! Resource arbitration
//!
//! Grants exclusive use of named resources (a staging environment, a shared
//! device) to one user at a time, with a FIFO wait queue, queue jumping,
//! forced takeover, and a reminder to holders who keep a resource while
//! others wait.
//!
//! # Architecture
//!
//! - **Controller**: [`ResourceController`], the pure state machine of one resource
//! - **Reminders**: [`ReminderScheduler`], one cancellable timer per resource
//! - **Service**: [`Arbiter`], the actor that serializes every mutation
//! - **Notices**: rendering of status, notices, and direct messages
//!
//! # Example
//!
//! ```ignore
//! use stagelock_core::domain::arbiter::{ActionKind, Arbiter, ArbiterSettings, UserId};
//!
//! let (dispatcher, _) = Dispatcher::spawn(gateway, events.clone());
//! let (arbiter, task) = Arbiter::spawn(ArbiterSettings::new(["staging"]), dispatcher, events);
//!
//! arbiter.submit("staging", ActionKind::Acquire, UserId::new("U1")?).await?;
//! ```

pub mod controller;
pub mod event;
pub mod notice;
pub mod reminder;
pub mod service;
pub mod types;

pub use controller::ResourceController;
pub use event::{ArbiterEvent, ArbiterEventType};
pub use notice::{Affordance, ButtonStyle, StatusView, status_view};
pub use reminder::{DEFAULT_REMINDER_DELAY, ReminderDue, ReminderOutcome, ReminderScheduler};
pub use service::{Arbiter, ArbiterHandle, ArbiterSettings, Command};
pub use types::{
    ActionKind, ControllerSnapshot, Decision, DirectMessage, DirectNotice, LockState, Notice,
    UserId,
};
