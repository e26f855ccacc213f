//! In-memory gateway that records every outbound message

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::{MessagingGateway, Outbound};
use crate::domain::arbiter::notice::StatusView;
use crate::domain::arbiter::types::UserId;
use crate::error::{Error, Result};

/// Gateway that keeps messages in memory and can simulate failures
#[derive(Debug, Default)]
pub struct RecordingGateway {
    messages: Mutex<Vec<Outbound>>,
    failing: AtomicBool,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// A gateway whose every delivery fails
    pub fn failing() -> Self {
        let gateway = Self::new();
        gateway.set_failing(true);
        gateway
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Everything delivered so far, in order
    pub fn messages(&self) -> Vec<Outbound> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn notices(&self) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m {
                Outbound::Notice { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn statuses(&self) -> Vec<StatusView> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m {
                Outbound::Status(view) => Some(view),
                _ => None,
            })
            .collect()
    }

    pub fn direct_messages_to(&self, user: &UserId) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m {
                Outbound::Direct { to, text, .. } if &to == user => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn record(&self, message: Outbound) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::GatewayDeliveryFailure(format!(
                "recording gateway set to fail ({})",
                message.target()
            )));
        }
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message);
        Ok(())
    }
}

#[async_trait]
impl MessagingGateway for RecordingGateway {
    async fn post_status(&self, status: &StatusView) -> Result<()> {
        self.record(Outbound::Status(status.clone()))
    }

    async fn post_notice(&self, resource: &str, text: &str) -> Result<()> {
        self.record(Outbound::Notice {
            resource: resource.to_string(),
            text: text.to_string(),
        })
    }

    async fn direct_message(&self, user: &UserId, text: &str) -> Result<()> {
        self.record(Outbound::Direct {
            resource: String::new(),
            to: user.clone(),
            text: text.to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "recording"
    }

    async fn deliver(&self, message: &Outbound) -> Result<()> {
        self.record(message.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_in_order() {
        let gateway = RecordingGateway::new();
        gateway.post_notice("staging", "first").await.unwrap();
        gateway.post_notice("staging", "second").await.unwrap();

        assert_eq!(gateway.notices(), vec!["first", "second"]);
        assert_eq!(gateway.messages().len(), 2);

        gateway.clear();
        assert!(gateway.messages().is_empty());
    }

    #[tokio::test]
    async fn test_failing_gateway_records_nothing() {
        let gateway = RecordingGateway::failing();
        let err = gateway.post_notice("staging", "lost").await.unwrap_err();

        assert_eq!(err.code(), "E100");
        assert!(gateway.messages().is_empty());

        gateway.set_failing(false);
        gateway.post_notice("staging", "kept").await.unwrap();
        assert_eq!(gateway.notices(), vec!["kept"]);
    }
}
