//! Inbound interaction parsing
//!
//! Two forms are accepted, one per line:
//!
//! - a Slack-style interactive callback in JSON, whose `callback_id` names
//!   the resource and whose first action carries the button name
//! - plain text: `<action> <user> [resource]`

use serde::Deserialize;

use crate::domain::arbiter::types::{ActionKind, UserId};
use crate::error::{Error, Result};

/// One authenticated user action, routed to a resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionEvent {
    pub resource: String,
    pub action: ActionKind,
    pub actor: UserId,
}

#[derive(Debug, Deserialize)]
struct Callback {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    callback_id: Option<String>,
    user: CallbackUser,
    #[serde(default)]
    actions: Vec<CallbackAction>,
}

#[derive(Debug, Deserialize)]
struct CallbackUser {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CallbackAction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    action_id: Option<String>,
    #[serde(default)]
    value: Option<String>,
}

impl CallbackAction {
    fn action_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .or(self.action_id.as_deref())
            .or(self.value.as_deref())
    }
}

/// Parse one inbound line
///
/// `default_resource` applies when the interaction does not name one.
pub fn parse_line(line: &str, default_resource: &str) -> Result<InteractionEvent> {
    let line = line.trim();
    if line.is_empty() {
        return Err(Error::InvalidInteraction("empty interaction".to_string()));
    }
    if line.starts_with('{') {
        parse_callback(line, default_resource)
    } else {
        parse_text(line, default_resource)
    }
}

/// Parse a JSON interactive callback
pub fn parse_callback(payload: &str, default_resource: &str) -> Result<InteractionEvent> {
    let callback: Callback = serde_json::from_str(payload)
        .map_err(|e| Error::InvalidInteraction(format!("malformed callback: {}", e)))?;

    match callback.kind.as_str() {
        "interactive_message" | "block_actions" => {}
        other => {
            return Err(Error::InvalidInteraction(format!(
                "unsupported interaction type '{}'",
                other
            )));
        }
    }

    let name = callback
        .actions
        .first()
        .and_then(CallbackAction::action_name)
        .ok_or_else(|| Error::InvalidInteraction("callback carries no action".to_string()))?;

    let resource = callback
        .callback_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| default_resource.to_string());

    Ok(InteractionEvent {
        resource,
        action: action(name)?,
        actor: UserId::new(callback.user.id)?,
    })
}

fn parse_text(line: &str, default_resource: &str) -> Result<InteractionEvent> {
    let mut parts = line.split_whitespace();
    let (Some(name), Some(user)) = (parts.next(), parts.next()) else {
        return Err(Error::InvalidInteraction(format!(
            "expected '<action> <user> [resource]', got '{}'",
            line
        )));
    };
    let resource = parts.next().unwrap_or(default_resource).to_string();
    if parts.next().is_some() {
        return Err(Error::InvalidInteraction(format!(
            "unexpected trailing input in '{}'",
            line
        )));
    }

    Ok(InteractionEvent {
        resource,
        action: action(name)?,
        actor: UserId::new(user)?,
    })
}

fn action(name: &str) -> Result<ActionKind> {
    ActionKind::parse(name)
        .ok_or_else(|| Error::InvalidInteraction(format!("invalid interaction '{}'", name)))
}
