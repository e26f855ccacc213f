//! Arbiter types: lock state, actions, decisions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Identifier of a requester as delivered by the messaging platform
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    /// Create a user identifier, rejecting blank values
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidUser("user identifier is empty".to_string()));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(Error::InvalidUser(format!(
                "user identifier '{}' contains whitespace",
                trimmed
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Platform mention markup, e.g. `<@U123>`
    pub fn mention(&self) -> String {
        format!("<@{}>", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for UserId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<UserId> for String {
    fn from(value: UserId) -> Self {
        value.0
    }
}

impl FromStr for UserId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Whether the resource is currently held
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockState {
    #[default]
    Free,
    Taken,
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Taken => write!(f, "taken"),
        }
    }
}

/// An action a requester can take against the resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Take the resource if it is free
    Acquire,
    /// Give the resource up, or leave the queue
    Release,
    /// Join the back of the queue
    Enqueue,
    /// Move to the front of the queue
    JumpQueue,
    /// Take the resource from the current holder
    Override,
}

impl ActionKind {
    pub const ALL: [ActionKind; 5] = [
        Self::Acquire,
        Self::Release,
        Self::Enqueue,
        Self::JumpQueue,
        Self::Override,
    ];

    /// Canonical name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Acquire => "acquire",
            Self::Release => "release",
            Self::Enqueue => "enqueue",
            Self::JumpQueue => "jump_queue",
            Self::Override => "override",
        }
    }

    /// Name carried on interactive buttons
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Acquire => "take",
            Self::Release => "release",
            Self::Enqueue => "getOnQueue",
            Self::JumpQueue => "queueNext",
            Self::Override => "override",
        }
    }

    /// Parse either the canonical or the button name
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim() {
            "acquire" | "take" => Some(Self::Acquire),
            "release" => Some(Self::Release),
            "enqueue" | "getOnQueue" => Some(Self::Enqueue),
            "jump_queue" | "jumpQueue" | "queueNext" => Some(Self::JumpQueue),
            "override" => Some(Self::Override),
            _ => None,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s).ok_or_else(|| Error::InvalidInteraction(format!("invalid action '{}'", s)))
    }
}

/// Public confirmation produced by a transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "user", rename_all = "snake_case")]
pub enum Notice {
    Took(UserId),
    Released(UserId),
    RemovedFromQueue(UserId),
    AddedToQueue(UserId),
    MovedToFront(UserId),
}

impl Notice {
    /// The user the notice is about
    pub fn actor(&self) -> &UserId {
        match self {
            Self::Took(u)
            | Self::Released(u)
            | Self::RemovedFromQueue(u)
            | Self::AddedToQueue(u)
            | Self::MovedToFront(u) => u,
        }
    }
}

/// What a direct message tells its recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DirectNotice {
    /// The resource was handed over from the queue
    HandedOver,
    /// Someone overrode the recipient
    Stolen { by: UserId },
    /// The recipient has held the resource past the reminder delay
    Reminder,
}

/// A notice addressed to one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectMessage {
    pub to: UserId,
    pub notice: DirectNotice,
}

impl DirectMessage {
    pub fn new(to: UserId, notice: DirectNotice) -> Self {
        Self { to, notice }
    }
}

/// Outcome of applying one action to a controller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Public confirmation, absent for no-ops
    pub notice: Option<Notice>,
    /// Direct messages to send, in order
    pub direct_messages: Vec<DirectMessage>,
    /// Arm a reminder for the (new) holder
    pub rearm_timer: bool,
    /// Cancel any armed reminder
    pub cancel_timer: bool,
}

impl Decision {
    /// A decision that changes nothing
    pub fn noop() -> Self {
        Self::default()
    }

    pub fn with_notice(notice: Notice) -> Self {
        Self {
            notice: Some(notice),
            ..Self::default()
        }
    }

    pub fn rearm(mut self) -> Self {
        self.rearm_timer = true;
        self
    }

    pub fn cancel(mut self) -> Self {
        self.cancel_timer = true;
        self
    }

    pub fn message(mut self, message: DirectMessage) -> Self {
        self.direct_messages.push(message);
        self
    }

    /// True when the action left state untouched
    pub fn is_noop(&self) -> bool {
        self.notice.is_none()
            && self.direct_messages.is_empty()
            && !self.rearm_timer
            && !self.cancel_timer
    }
}

/// Read-only copy of a controller's state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerSnapshot {
    pub resource: String,
    pub state: LockState,
    pub holder: Option<UserId>,
    pub queue: Vec<UserId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_rejects_blank() {
        assert!(UserId::new("").is_err());
        assert!(UserId::new("   ").is_err());
        assert!(UserId::new("U1 U2").is_err());
        assert_eq!(UserId::new(" U1 ").unwrap().as_str(), "U1");
    }

    #[test]
    fn test_user_mention() {
        let user = UserId::new("U42").unwrap();
        assert_eq!(user.mention(), "<@U42>");
    }

    #[test]
    fn test_user_id_deserialize_validates() {
        let ok: UserId = serde_json::from_str("\"U7\"").unwrap();
        assert_eq!(ok.as_str(), "U7");
        assert!(serde_json::from_str::<UserId>("\"\"").is_err());
    }

    #[test]
    fn test_action_kind_accepts_button_names() {
        assert_eq!(ActionKind::parse("take"), Some(ActionKind::Acquire));
        assert_eq!(ActionKind::parse("getOnQueue"), Some(ActionKind::Enqueue));
        assert_eq!(ActionKind::parse("queueNext"), Some(ActionKind::JumpQueue));
        assert_eq!(ActionKind::parse("jump_queue"), Some(ActionKind::JumpQueue));
        assert_eq!(ActionKind::parse("dance"), None);
    }

    #[test]
    fn test_action_kind_round_trips_names() {
        for kind in ActionKind::ALL {
            assert_eq!(ActionKind::parse(kind.as_str()), Some(kind));
            assert_eq!(ActionKind::parse(kind.wire_name()), Some(kind));
        }
    }

    #[test]
    fn test_unknown_action_is_invalid_interaction() {
        let err = "dance".parse::<ActionKind>().unwrap_err();
        assert_eq!(err.code(), "E001");
    }

    #[test]
    fn test_decision_noop() {
        assert!(Decision::noop().is_noop());
        let user = UserId::new("U1").unwrap();
        assert!(!Decision::with_notice(Notice::Took(user)).is_noop());
    }

    #[test]
    fn test_lock_state_display() {
        assert_eq!(LockState::Free.to_string(), "free");
        assert_eq!(LockState::Taken.to_string(), "taken");
    }
}
