//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Stagelock configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub arbiter: ArbiterConfig,
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbiterConfig {
    /// Resources arbitrated by this process
    pub resources: Vec<String>,
    /// Resource used when an interaction does not name one
    pub default_resource: String,
    pub reminder_delay_secs: u64,
    /// Capacity of the arbiter's command queue
    pub command_buffer: usize,
    /// Domain events kept in memory; older ones are evicted
    pub event_history: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayKind {
    #[default]
    Console,
    Slack,
    Recording,
}

impl GatewayKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Console => "console",
            Self::Slack => "slack",
            Self::Recording => "recording",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "console" => Some(Self::Console),
            "slack" => Some(Self::Slack),
            "recording" => Some(Self::Recording),
            _ => None,
        }
    }
}

impl fmt::Display for GatewayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub kind: GatewayKind,
    /// Channel holding the status message (Slack channel ID)
    pub channel: String,
    pub api_base_url: String,
    pub timeout_secs: u64,
    #[serde(skip)]
    pub bot_token: Option<String>,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            resources: vec!["staging".to_string()],
            default_resource: "staging".to_string(),
            reminder_delay_secs: 30,
            command_buffer: 256,
            event_history: 1000,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            kind: GatewayKind::Console,
            channel: String::new(),
            api_base_url: "https://slack.com/api".to_string(),
            timeout_secs: 10,
            bot_token: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            arbiter: ArbiterConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

impl ArbiterConfig {
    pub fn reminder_delay(&self) -> Duration {
        Duration::from_secs(self.reminder_delay_secs)
    }

    /// Configured resources, always including the default one
    pub fn all_resources(&self) -> Vec<String> {
        let mut resources = self.resources.clone();
        if !resources.contains(&self.default_resource) {
            resources.push(self.default_resource.clone());
        }
        resources
    }
}

impl GatewayConfig {
    pub fn enforce_env_only(&self) -> anyhow::Result<()> {
        if self.bot_token.is_some() {
            return Err(anyhow!(
                "Bot tokens must be provided via environment variables, not stored in configuration"
            ));
        }
        Ok(())
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("STAGELOCK_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("stagelock")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        self.validate()?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).with_context(|| {
                format!("Failed to create config directory: {}", dir.display())
            })?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.gateway.enforce_env_only()?;

        if self.arbiter.reminder_delay_secs == 0 {
            return Err(anyhow!("arbiter.reminder_delay_secs must be greater than 0"));
        }
        if self.arbiter.command_buffer == 0 {
            return Err(anyhow!("arbiter.command_buffer must be greater than 0"));
        }
        if self.arbiter.event_history == 0 {
            return Err(anyhow!("arbiter.event_history must be greater than 0"));
        }
        if self.arbiter.default_resource.trim().is_empty() {
            return Err(anyhow!("arbiter.default_resource must not be empty"));
        }
        if let Some(blank) = self.arbiter.resources.iter().find(|r| r.trim().is_empty()) {
            return Err(anyhow!("Invalid resource name: '{}'", blank));
        }
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            // Arbiter settings
            "arbiter.resources" => Ok(self.arbiter.resources.join(", ")),
            "arbiter.default_resource" => Ok(self.arbiter.default_resource.clone()),
            "arbiter.reminder_delay_secs" => Ok(self.arbiter.reminder_delay_secs.to_string()),
            "arbiter.command_buffer" => Ok(self.arbiter.command_buffer.to_string()),
            "arbiter.event_history" => Ok(self.arbiter.event_history.to_string()),

            // Gateway settings
            "gateway.kind" => Ok(self.gateway.kind.to_string()),
            "gateway.channel" => Ok(self.gateway.channel.clone()),
            "gateway.api_base_url" => Ok(self.gateway.api_base_url.clone()),
            "gateway.timeout_secs" => Ok(self.gateway.timeout_secs.to_string()),

            // Token (never stored; report where it comes from)
            "gateway.bot_token" => match crate::gateway::slack::resolve_token() {
                Some(_) => Ok("(set via environment)".to_string()),
                None => Ok(
                    "(not set - use STAGELOCK_SLACK_TOKEN or SLACK_BOT_TOKEN env var)".to_string(),
                ),
            },

            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `stagelock config list` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "arbiter.resources" => {
                let resources: Vec<String> = value
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                if resources.is_empty() {
                    return Err(anyhow!("At least one resource must be configured"));
                }
                self.arbiter.resources = resources;
            }
            "arbiter.default_resource" => {
                let value = value.trim();
                if value.is_empty() {
                    return Err(anyhow!("Default resource must not be empty"));
                }
                self.arbiter.default_resource = value.to_string();
            }
            "arbiter.reminder_delay_secs" => {
                let secs: u64 = value
                    .parse()
                    .with_context(|| format!("Invalid reminder_delay_secs value: {}", value))?;
                if secs == 0 {
                    return Err(anyhow!("Reminder delay must be greater than 0"));
                }
                self.arbiter.reminder_delay_secs = secs;
            }
            "arbiter.command_buffer" => {
                let size: usize = value
                    .parse()
                    .with_context(|| format!("Invalid command_buffer value: {}", value))?;
                if size == 0 {
                    return Err(anyhow!("Command buffer must be greater than 0"));
                }
                self.arbiter.command_buffer = size;
            }
            "arbiter.event_history" => {
                let size: usize = value
                    .parse()
                    .with_context(|| format!("Invalid event_history value: {}", value))?;
                if size == 0 {
                    return Err(anyhow!("Event history must be greater than 0"));
                }
                self.arbiter.event_history = size;
            }

            "gateway.kind" => {
                self.gateway.kind = GatewayKind::parse(value).ok_or_else(|| {
                    anyhow!(
                        "Invalid gateway kind: {}. Valid options: console, slack, recording",
                        value
                    )
                })?;
            }
            "gateway.channel" => {
                self.gateway.channel = value.trim().to_string();
            }
            "gateway.api_base_url" => {
                if !value.starts_with("http://") && !value.starts_with("https://") {
                    return Err(anyhow!("API base URL must start with http:// or https://"));
                }
                self.gateway.api_base_url = value.trim_end_matches('/').to_string();
            }
            "gateway.timeout_secs" => {
                self.gateway.timeout_secs = value
                    .parse()
                    .with_context(|| format!("Invalid timeout_secs value: {}", value))?;
            }

            "gateway.bot_token" => {
                return Err(anyhow!(
                    "Bot tokens cannot be stored in configuration for security. \
                     Set the STAGELOCK_SLACK_TOKEN or SLACK_BOT_TOKEN environment variable instead."
                ));
            }

            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `stagelock config list` to see available keys.",
                    key
                ));
            }
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        let keys = vec![
            "arbiter.resources",
            "arbiter.default_resource",
            "arbiter.reminder_delay_secs",
            "arbiter.command_buffer",
            "arbiter.event_history",
            "gateway.kind",
            "gateway.channel",
            "gateway.api_base_url",
            "gateway.timeout_secs",
            "gateway.bot_token",
        ];

        keys.into_iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}
