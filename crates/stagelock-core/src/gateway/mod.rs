//! Messaging gateway boundary
//!
//! The arbiter never talks to a chat platform directly. It produces
//! [`Outbound`] messages and hands them to a [`Dispatcher`], which delivers
//! them through a [`MessagingGateway`] implementation:
//!
//! - [`ConsoleGateway`]: prints to stdout, for local use
//! - [`SlackGateway`]: Slack Web API over HTTPS
//! - [`RecordingGateway`]: keeps everything in memory, for tests and dry runs

pub mod console;
pub mod dispatcher;
pub mod recording;
pub mod slack;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{GatewayConfig, GatewayKind};
use crate::domain::arbiter::notice::StatusView;
use crate::domain::arbiter::types::UserId;
use crate::error::Result;

pub use console::ConsoleGateway;
pub use dispatcher::{DispatchStats, Dispatcher, DispatcherHandle};
pub use recording::RecordingGateway;
pub use slack::SlackGateway;

/// One message on its way to the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outbound {
    /// Replace the persistent status message of a resource
    Status(StatusView),
    /// Transient confirmation in the resource's channel
    Notice { resource: String, text: String },
    /// Message addressed to one user
    Direct {
        resource: String,
        to: UserId,
        text: String,
    },
}

impl Outbound {
    pub fn resource(&self) -> &str {
        match self {
            Self::Status(view) => &view.resource,
            Self::Notice { resource, .. } | Self::Direct { resource, .. } => resource,
        }
    }

    /// Short description of where the message goes, for logs and events
    pub fn target(&self) -> String {
        match self {
            Self::Status(view) => format!("status:{}", view.resource),
            Self::Notice { resource, .. } => format!("notice:{}", resource),
            Self::Direct { to, .. } => format!("dm:{}", to),
        }
    }
}

/// The three send primitives the arbiter needs from a chat platform
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Publish or replace the persistent status message
    async fn post_status(&self, status: &StatusView) -> Result<()>;

    /// Publish a transient confirmation
    async fn post_notice(&self, resource: &str, text: &str) -> Result<()>;

    /// Send a message to one user
    async fn direct_message(&self, user: &UserId, text: &str) -> Result<()>;

    /// Gateway name for logs
    fn name(&self) -> &'static str;

    /// Deliver any outbound message
    async fn deliver(&self, message: &Outbound) -> Result<()> {
        match message {
            Outbound::Status(view) => self.post_status(view).await,
            Outbound::Notice { resource, text } => self.post_notice(resource, text).await,
            Outbound::Direct { to, text, .. } => self.direct_message(to, text).await,
        }
    }
}

/// Build the gateway selected in configuration
pub fn build(config: &GatewayConfig) -> Result<Arc<dyn MessagingGateway>> {
    let gateway: Arc<dyn MessagingGateway> = match config.kind {
        GatewayKind::Console => Arc::new(ConsoleGateway::stdout()),
        GatewayKind::Recording => Arc::new(RecordingGateway::new()),
        GatewayKind::Slack => Arc::new(SlackGateway::from_config(config)?),
    };
    Ok(gateway)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_target() {
        let user = UserId::new("U1").unwrap();
        let dm = Outbound::Direct {
            resource: "staging".to_string(),
            to: user,
            text: "hi".to_string(),
        };
        assert_eq!(dm.target(), "dm:U1");
        assert_eq!(dm.resource(), "staging");

        let notice = Outbound::Notice {
            resource: "staging".to_string(),
            text: "hi".to_string(),
        };
        assert_eq!(notice.target(), "notice:staging");
    }

    #[test]
    fn test_build_console_gateway() {
        let config = GatewayConfig::default();
        let gateway = build(&config).expect("console gateway builds");
        assert_eq!(gateway.name(), "console");
    }

    #[tokio::test]
    async fn test_deliver_routes_by_kind() {
        let gateway = RecordingGateway::new();
        let user = UserId::new("U1").unwrap();
        gateway
            .deliver(&Outbound::Direct {
                resource: "staging".to_string(),
                to: user.clone(),
                text: "You have staging now".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(gateway.direct_messages_to(&user), vec!["You have staging now"]);
    }
}
