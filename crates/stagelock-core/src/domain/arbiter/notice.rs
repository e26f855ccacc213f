//! Human-readable content derived from controller state
//!
//! Everything here is pure: the same state always renders the same text.
//! Gateways decide how a [`StatusView`] is drawn (buttons, plain lines, ...).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::controller::ResourceController;
use super::types::{ActionKind, DirectNotice, LockState, Notice, UserId};

/// Visual weight of an affordance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    Primary,
    PrimaryText,
    DangerText,
    Danger,
}

impl ButtonStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::PrimaryText => "primary_text",
            Self::DangerText => "danger_text",
            Self::Danger => "danger",
        }
    }
}

/// A button offered alongside the status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Affordance {
    pub action: ActionKind,
    pub label: String,
    pub style: ButtonStyle,
}

impl Affordance {
    fn new(action: ActionKind, label: &str, style: ButtonStyle) -> Self {
        Self {
            action,
            label: label.to_string(),
            style,
        }
    }
}

/// The persistent status message for one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusView {
    pub resource: String,
    pub text: String,
    pub affordances: Vec<Affordance>,
}

/// Render the status message for the controller's current state
pub fn status_view(controller: &ResourceController) -> StatusView {
    let resource = controller.resource().to_string();

    match (controller.state(), controller.holder()) {
        (LockState::Taken, Some(holder)) => {
            let mut text = format!("Taken by {}\n", holder.mention());
            if let Some(line) = format_queue(controller.queue()) {
                text.push_str(&line);
            }
            StatusView {
                resource,
                text,
                affordances: vec![
                    Affordance::new(ActionKind::Release, "Give up", ButtonStyle::Primary),
                    Affordance::new(ActionKind::Enqueue, "Get on Queue", ButtonStyle::PrimaryText),
                    Affordance::new(
                        ActionKind::JumpQueue,
                        "Get in Front of Queue",
                        ButtonStyle::DangerText,
                    ),
                    Affordance::new(
                        ActionKind::Override,
                        "Override and take now",
                        ButtonStyle::Danger,
                    ),
                ],
            }
        }
        // A queue left behind while Free is not shown
        _ => StatusView {
            resource: resource.clone(),
            text: "Free to take!".to_string(),
            affordances: vec![Affordance::new(
                ActionKind::Acquire,
                &format!("Take {}", capitalize(&resource)),
                ButtonStyle::Primary,
            )],
        },
    }
}

/// `Queue: <@B>, <@C>`, or nothing for an empty queue
pub fn format_queue<'a>(queue: impl ExactSizeIterator<Item = &'a UserId>) -> Option<String> {
    if queue.len() == 0 {
        return None;
    }
    let names: Vec<String> = queue.map(UserId::mention).collect();
    Some(format!("Queue: {}", names.join(", ")))
}

/// Confirmation text for a public notice
pub fn notice_text(resource: &str, notice: &Notice) -> String {
    match notice {
        Notice::Took(user) => format!("{} took {}.", user.mention(), resource),
        Notice::Released(user) => format!("{} released {}.", user.mention(), resource),
        Notice::RemovedFromQueue(user) => format!("{} removed from queue.", user.mention()),
        Notice::AddedToQueue(user) => format!("{} added to queue.", user.mention()),
        Notice::MovedToFront(user) => format!("{} moved to front of queue.", user.mention()),
    }
}

/// Text of a direct message; `held_for` is the reminder delay
pub fn direct_text(resource: &str, notice: &DirectNotice, held_for: Duration) -> String {
    match notice {
        DirectNotice::HandedOver => format!("You have {} now", resource),
        DirectNotice::Stolen { by } => {
            format!("User {} has stolen {} from you", by.mention(), resource)
        }
        DirectNotice::Reminder => format!(
            "You have had {} for {}.\nIf you are done, please release {}.",
            resource,
            humanize(held_for),
            resource
        ),
    }
}

/// `30 seconds`, `1 minute`, `5 minutes`, `90 seconds`
pub fn humanize(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (value, unit) = if secs >= 60 && secs % 60 == 0 {
        (secs / 60, "minute")
    } else {
        (secs, "second")
    };
    if value == 1 {
        format!("1 {}", unit)
    } else {
        format!("{} {}s", value, unit)
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
