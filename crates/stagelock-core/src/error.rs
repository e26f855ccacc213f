//! Error types for Stagelock

use thiserror::Error;

/// Result type alias using Stagelock's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Stagelock error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Interaction errors (E001-E099)
    #[error("Invalid interaction: {0}")]
    InvalidInteraction(String),

    #[error("Resource '{0}' is not arbitrated here. Run `stagelock config get arbiter.resources` to see configured resources.")]
    ResourceNotFound(String),

    #[error("Invalid user identifier: {0}")]
    InvalidUser(String),

    // Gateway errors (E100-E199)
    #[error("Gateway delivery failed: {0}")]
    GatewayDeliveryFailure(String),

    #[error("Network error: {0}. Check your internet connection.")]
    NetworkError(#[from] reqwest::Error),

    // Arbiter errors (E300-E399)
    #[error("Arbiter is not running: {0}")]
    ArbiterUnavailable(String),

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Generic errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInteraction(_) => "E001",
            Self::ResourceNotFound(_) => "E002",
            Self::InvalidUser(_) => "E003",
            Self::GatewayDeliveryFailure(_) => "E100",
            Self::NetworkError(_) => "E101",
            Self::ArbiterUnavailable(_) => "E300",
            Self::ConfigError(_) => "E600",
            Self::Json(_) => "E800",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::ResourceNotFound(_) => Some("stagelock config get arbiter.resources".to_string()),
            Self::NetworkError(_) => Some("Check internet connection".to_string()),
            Self::GatewayDeliveryFailure(_) => {
                Some("Check STAGELOCK_SLACK_TOKEN and gateway.channel".to_string())
            }
            Self::ConfigError(_) => Some("stagelock config list".to_string()),
            _ => None,
        }
    }

    /// Whether this error leaves arbiter state untouched and can be skipped
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::ArbiterUnavailable(_))
    }
}
