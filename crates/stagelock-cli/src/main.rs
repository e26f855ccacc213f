//! Stagelock CLI - shared resource arbitration for chat teams

use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use stagelock_core::config::{Config, GatewayKind};
use stagelock_core::domain::arbiter::{
    Arbiter, ArbiterHandle, ArbiterSettings, ControllerSnapshot,
};
use stagelock_core::domain::events::{InMemoryEventStore, StoredEvent};
use stagelock_core::gateway::{self, DispatchStats, Dispatcher};
use stagelock_core::interaction::parse_line;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

#[derive(Parser)]
#[command(name = "stagelock")]
#[command(author, version, about = "Take turns on shared resources", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum GatewayArg {
    Console,
    Slack,
    Recording,
}

impl From<GatewayArg> for GatewayKind {
    fn from(arg: GatewayArg) -> Self {
        match arg {
            GatewayArg::Console => GatewayKind::Console,
            GatewayArg::Slack => GatewayKind::Slack,
            GatewayArg::Recording => GatewayKind::Recording,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the arbiter, reading interactions from stdin
    Serve {
        /// Resource to arbitrate (repeatable; overrides configuration)
        #[arg(short, long = "resource")]
        resources: Vec<String>,
        /// Messaging gateway
        #[arg(short, long)]
        gateway: Option<GatewayArg>,
        /// Seconds before a holder is reminded that others are waiting
        #[arg(long)]
        reminder_secs: Option<u64>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a configuration value
    Get { key: String },
    /// Set a configuration value
    Set { key: String, value: String },
    /// List all configuration values
    List,
    /// Reset configuration to defaults
    Reset,
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Logs go to stderr; stdout belongs to the console gateway
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("stagelock=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            resources,
            gateway,
            reminder_secs,
        } => {
            let mut config = Config::load()?;
            apply_overrides(&mut config, resources, gateway, reminder_secs)?;
            cmd_serve(config, cli.format, cli.quiet).await
        }

        Commands::Config { action } => cmd_config(action, cli.format, cli.quiet),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// Final report of a `serve` run
#[derive(Debug, Serialize)]
struct ServeSummary {
    interactions: u64,
    rejected: u64,
    delivery: DispatchStats,
    /// Latest delivery failures still held in the event history
    recent_failures: Vec<StoredEvent>,
    resources: Vec<ControllerSnapshot>,
}

/// Delivery failures shown in the summary
const RECENT_FAILURES: usize = 10;

fn apply_overrides(
    config: &mut Config,
    resources: Vec<String>,
    gateway: Option<GatewayArg>,
    reminder_secs: Option<u64>,
) -> anyhow::Result<()> {
    if let Some(first) = resources.first() {
        if !resources.contains(&config.arbiter.default_resource) {
            config.arbiter.default_resource = first.clone();
        }
        config.arbiter.resources = resources;
    }
    if let Some(gateway) = gateway {
        config.gateway.kind = gateway.into();
    }
    if let Some(secs) = reminder_secs {
        config.arbiter.reminder_delay_secs = secs;
    }
    config.validate()?;
    Ok(())
}

async fn cmd_serve(config: Config, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    let gateway = gateway::build(&config.gateway)?;
    let events = Arc::new(InMemoryEventStore::with_capacity(config.arbiter.event_history));
    let (dispatcher, dispatch_task) = Dispatcher::spawn(gateway, events.clone());
    let (arbiter, arbiter_task) = Arbiter::spawn(
        ArbiterSettings::from(&config.arbiter),
        dispatcher,
        events.clone(),
    );

    arbiter.post_initial_status().await?;
    info!(
        gateway = config.gateway.kind.as_str(),
        default_resource = %config.arbiter.default_resource,
        "Serving interactions from stdin"
    );

    let shutdown = arbiter.shutdown_token();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C");
            signal_token.cancel();
        }
    });

    let default_resource = config.arbiter.default_resource.clone();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut interactions = 0u64;
    let mut rejected = 0u64;

    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else { break };
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        interactions += 1;
        if !handle_line(&arbiter, line, &default_resource).await? {
            rejected += 1;
        }
    }

    arbiter.shutdown();
    let resources = arbiter_task.await?;
    drop(arbiter);
    let delivery = dispatch_task.await?;

    let summary = ServeSummary {
        interactions,
        rejected,
        delivery,
        recent_failures: events.recent_by_type("delivery_failed", RECENT_FAILURES),
        resources,
    };
    print_summary(&summary, format, quiet)?;
    Ok(())
}

/// Submit one inbound line; returns false if it was rejected
async fn handle_line(
    arbiter: &ArbiterHandle,
    line: &str,
    default_resource: &str,
) -> anyhow::Result<bool> {
    let event = match parse_line(line, default_resource) {
        Ok(event) => event,
        Err(e) => {
            arbiter.reject(default_resource, &e.to_string()).await;
            return Ok(false);
        }
    };

    match arbiter
        .submit(event.resource.clone(), event.action, event.actor.clone())
        .await
    {
        Ok(decision) => {
            if decision.is_noop() {
                debug!(
                    resource = %event.resource,
                    actor = %event.actor,
                    action = %event.action,
                    "Ignored"
                );
            }
            Ok(true)
        }
        Err(e) if !e.is_recoverable() => Err(e.into()),
        Err(e) => {
            if let Some(suggestion) = e.suggestion() {
                warn!(code = e.code(), suggestion = %suggestion, "{}", e);
            }
            arbiter.reject(&event.resource, &e.to_string()).await;
            Ok(false)
        }
    }
}

fn print_summary(summary: &ServeSummary, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(summary)?);
        }
        OutputFormat::Text => {
            if quiet {
                return Ok(());
            }
            println!();
            println!(
                "Processed {} interactions ({} rejected)",
                summary.interactions, summary.rejected
            );
            println!(
                "Delivered {} messages ({} failed)",
                summary.delivery.delivered, summary.delivery.failed
            );
            for snapshot in &summary.resources {
                println!("  {}", describe(snapshot));
            }
            if !summary.recent_failures.is_empty() {
                println!("Recent delivery failures:");
                for event in &summary.recent_failures {
                    println!("  {}", describe_failure(event));
                }
            }
        }
    }
    Ok(())
}

fn describe(snapshot: &ControllerSnapshot) -> String {
    let mut line = match &snapshot.holder {
        Some(holder) => format!("{}: taken by {}", snapshot.resource, holder),
        None => format!("{}: free", snapshot.resource),
    };
    if !snapshot.queue.is_empty() {
        let queue: Vec<&str> = snapshot.queue.iter().map(|u| u.as_str()).collect();
        line.push_str(&format!(", queue: {}", queue.join(", ")));
    }
    line
}

fn describe_failure(event: &StoredEvent) -> String {
    let field = |name: &str| {
        event
            .data
            .as_ref()
            .and_then(|d| d.get(name))
            .and_then(|v| v.as_str())
            .unwrap_or("?")
            .to_string()
    };
    format!(
        "{} [{}] {}: {}",
        event.created_at.format("%H:%M:%S"),
        event.resource,
        field("target"),
        field("error")
    )
}

fn cmd_config(action: ConfigAction, format: OutputFormat, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            let items = config.list()?;
            match format {
                OutputFormat::Json => {
                    let map: serde_json::Map<String, serde_json::Value> = items
                        .into_iter()
                        .map(|(k, v)| (k, serde_json::Value::String(v)))
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&map)?);
                }
                OutputFormat::Text => {
                    for (key, value) in items {
                        println!("{} = {}", key, value);
                    }
                }
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            if !quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}
