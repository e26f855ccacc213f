//! Arbiter actor
//!
//! A single task owns every [`ResourceController`] and its
//! [`ReminderScheduler`]. Interactions and timer expiries both arrive as
//! [`Command`]s on one bounded queue and are applied strictly in arrival
//! order, so no state is ever shared between tasks. Outbound messages go to
//! the dispatcher without waiting for delivery.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::controller::ResourceController;
use super::event::ArbiterEvent;
use super::notice::{direct_text, notice_text, status_view};
use super::reminder::{ReminderDue, ReminderOutcome, ReminderScheduler};
use super::types::{ActionKind, ControllerSnapshot, Decision, DirectNotice, UserId};
use crate::config::ArbiterConfig;
use crate::domain::events::{DomainEvent, EventPublisher};
use crate::error::{Error, Result};
use crate::gateway::{DispatcherHandle, Outbound};

/// Work items consumed by the arbiter loop
#[derive(Debug)]
pub enum Command {
    Submit {
        resource: String,
        action: ActionKind,
        actor: UserId,
        reply: oneshot::Sender<Result<Decision>>,
    },
    Snapshot {
        resource: String,
        reply: oneshot::Sender<Result<ControllerSnapshot>>,
    },
    SnapshotAll {
        reply: oneshot::Sender<Vec<ControllerSnapshot>>,
    },
    /// Post the current status of every resource
    PostStatus { reply: oneshot::Sender<usize> },
    ReminderDue(ReminderDue),
}

impl From<ReminderDue> for Command {
    fn from(due: ReminderDue) -> Self {
        Self::ReminderDue(due)
    }
}

/// Settings the arbiter loop runs with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArbiterSettings {
    pub resources: Vec<String>,
    pub reminder_delay: Duration,
    pub command_buffer: usize,
}

impl ArbiterSettings {
    pub fn new(resources: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            resources: resources.into_iter().map(Into::into).collect(),
            reminder_delay: super::reminder::DEFAULT_REMINDER_DELAY,
            command_buffer: 256,
        }
    }

    pub fn with_reminder_delay(mut self, delay: Duration) -> Self {
        self.reminder_delay = delay;
        self
    }
}

impl From<&ArbiterConfig> for ArbiterSettings {
    fn from(config: &ArbiterConfig) -> Self {
        Self {
            resources: config.all_resources(),
            reminder_delay: config.reminder_delay(),
            command_buffer: config.command_buffer.max(1),
        }
    }
}

struct Slot {
    controller: ResourceController,
    reminder: ReminderScheduler,
}

/// The serial owner of all arbitration state
pub struct Arbiter {
    slots: BTreeMap<String, Slot>,
    reminder_delay: Duration,
    rx: mpsc::Receiver<Command>,
    /// Handed to reminder timers; weak so the loop ends once handles are gone
    timer_tx: mpsc::WeakSender<Command>,
    dispatcher: DispatcherHandle,
    events: Arc<dyn EventPublisher>,
    shutdown: CancellationToken,
}

/// Cloneable client of a running [`Arbiter`]
#[derive(Clone)]
pub struct ArbiterHandle {
    tx: mpsc::Sender<Command>,
    events: Arc<dyn EventPublisher>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for ArbiterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArbiterHandle")
            .field("closed", &self.tx.is_closed())
            .finish_non_exhaustive()
    }
}

impl Arbiter {
    /// Start the arbiter loop
    ///
    /// The returned task resolves to the final snapshots once the loop stops,
    /// either through [`ArbiterHandle::shutdown`] or when every handle is
    /// dropped.
    pub fn spawn(
        settings: ArbiterSettings,
        dispatcher: DispatcherHandle,
        events: Arc<dyn EventPublisher>,
    ) -> (ArbiterHandle, JoinHandle<Vec<ControllerSnapshot>>) {
        let (tx, rx) = mpsc::channel(settings.command_buffer.max(1));
        let shutdown = CancellationToken::new();

        let slots = settings
            .resources
            .iter()
            .map(|name| {
                (
                    name.clone(),
                    Slot {
                        controller: ResourceController::new(name.clone()),
                        reminder: ReminderScheduler::new(name.clone(), settings.reminder_delay),
                    },
                )
            })
            .collect();

        let arbiter = Self {
            slots,
            reminder_delay: settings.reminder_delay,
            rx,
            timer_tx: tx.downgrade(),
            dispatcher,
            events: events.clone(),
            shutdown: shutdown.clone(),
        };

        let task = tokio::spawn(arbiter.run());
        let handle = ArbiterHandle {
            tx,
            events,
            shutdown,
        };
        (handle, task)
    }

    async fn run(mut self) -> Vec<ControllerSnapshot> {
        info!(
            resources = ?self.slots.keys().collect::<Vec<_>>(),
            reminder_delay_secs = self.reminder_delay.as_secs(),
            "Arbiter started"
        );

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    self.drain().await;
                    break;
                }
                command = self.rx.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
            }
        }

        for slot in self.slots.values_mut() {
            slot.reminder.cancel();
        }
        let snapshots = self.snapshots();
        info!(resources = snapshots.len(), "Arbiter stopped");
        snapshots
    }

    /// Apply whatever was queued before shutdown
    async fn drain(&mut self) {
        self.rx.close();
        while let Some(command) = self.rx.recv().await {
            match command {
                // Timers are being torn down with the loop.
                Command::ReminderDue(_) => {}
                command => self.handle(command).await,
            }
        }
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Submit {
                resource,
                action,
                actor,
                reply,
            } => {
                let result = self.submit(&resource, action, &actor).await;
                // The caller may have stopped waiting.
                let _ = reply.send(result);
            }
            Command::Snapshot { resource, reply } => {
                let result = self
                    .slots
                    .get(&resource)
                    .map(|slot| slot.controller.snapshot())
                    .ok_or(Error::ResourceNotFound(resource));
                let _ = reply.send(result);
            }
            Command::SnapshotAll { reply } => {
                let _ = reply.send(self.snapshots());
            }
            Command::PostStatus { reply } => {
                for slot in self.slots.values() {
                    self.dispatcher.send(Outbound::Status(status_view(&slot.controller)));
                }
                let _ = reply.send(self.slots.len());
            }
            Command::ReminderDue(due) => self.reminder_due(due).await,
        }
    }

    async fn submit(
        &mut self,
        resource: &str,
        action: ActionKind,
        actor: &UserId,
    ) -> Result<Decision> {
        let slot = self
            .slots
            .get_mut(resource)
            .ok_or_else(|| Error::ResourceNotFound(resource.to_string()))?;

        let decision = slot.controller.apply(action, actor);
        if decision.is_noop() {
            debug!(resource, actor = %actor, action = %action, "No-op action");
            return Ok(decision);
        }

        if let Some(notice) = &decision.notice {
            self.dispatcher.send(Outbound::Notice {
                resource: resource.to_string(),
                text: notice_text(resource, notice),
            });
        }
        for message in &decision.direct_messages {
            self.dispatcher.send(Outbound::Direct {
                resource: resource.to_string(),
                to: message.to.clone(),
                text: direct_text(resource, &message.notice, self.reminder_delay),
            });
        }
        self.dispatcher.send(Outbound::Status(status_view(&slot.controller)));

        if decision.cancel_timer {
            slot.reminder.cancel();
        }
        if decision.rearm_timer {
            match (slot.controller.holder(), self.timer_tx.upgrade()) {
                (Some(holder), Some(sink)) => {
                    slot.reminder.arm(holder.clone(), sink);
                }
                (None, _) => {
                    warn!(resource, "Rearm requested without a holder");
                }
                (_, None) => {
                    debug!(resource, "Arbiter closing, reminder not armed");
                }
            }
        }

        info!(
            resource,
            actor = %actor,
            action = %action,
            state = %slot.controller.state(),
            queue_len = slot.controller.queue_len(),
            "Action applied"
        );

        if let Some(notice) = &decision.notice {
            self.publish(&ArbiterEvent::from_notice(resource, action, notice)).await;
        }
        Ok(decision)
    }

    async fn reminder_due(&mut self, due: ReminderDue) {
        let Some(slot) = self.slots.get_mut(&due.resource) else {
            warn!(resource = %due.resource, "Reminder for unknown resource");
            return;
        };

        match slot.reminder.check(&due, &slot.controller) {
            ReminderOutcome::Remind(holder) => {
                info!(resource = %due.resource, holder = %holder, "Reminding holder");
                self.dispatcher.send(Outbound::Direct {
                    resource: due.resource.clone(),
                    to: holder.clone(),
                    text: direct_text(&due.resource, &DirectNotice::Reminder, self.reminder_delay),
                });
                self.publish(&ArbiterEvent::reminder_sent(&due.resource, &holder)).await;
            }
            ReminderOutcome::NoContention => {
                debug!(
                    resource = %due.resource,
                    holder = %due.holder,
                    "Nobody waiting, no reminder"
                );
            }
            ReminderOutcome::Stale => {
                debug!(
                    resource = %due.resource,
                    holder = %due.holder,
                    generation = due.generation,
                    "Stale reminder ignored"
                );
                self.publish(&ArbiterEvent::reminder_stale(
                    &due.resource,
                    &due.holder,
                    due.generation,
                ))
                .await;
            }
        }
    }

    fn snapshots(&self) -> Vec<ControllerSnapshot> {
        self.slots
            .values()
            .map(|slot| slot.controller.snapshot())
            .collect()
    }

    async fn publish(&self, event: &dyn DomainEvent) {
        if let Err(e) = self.events.publish(event).await {
            warn!(error = %e, event_type = event.event_type(), "Failed to publish event");
        }
    }
}

impl ArbiterHandle {
    async fn request<T>(&self, command: Command, rx: oneshot::Receiver<T>) -> Result<T> {
        self.tx
            .send(command)
            .await
            .map_err(|_| Error::ArbiterUnavailable("arbiter is not running".to_string()))?;
        rx.await
            .map_err(|_| Error::ArbiterUnavailable("arbiter stopped before replying".to_string()))
    }

    /// Apply one action and wait for the resulting decision
    pub async fn submit(
        &self,
        resource: impl Into<String>,
        action: ActionKind,
        actor: UserId,
    ) -> Result<Decision> {
        let (reply, rx) = oneshot::channel();
        let command = Command::Submit {
            resource: resource.into(),
            action,
            actor,
            reply,
        };
        self.request(command, rx).await?
    }

    pub async fn snapshot(&self, resource: impl Into<String>) -> Result<ControllerSnapshot> {
        let (reply, rx) = oneshot::channel();
        let command = Command::Snapshot {
            resource: resource.into(),
            reply,
        };
        self.request(command, rx).await?
    }

    /// Snapshots of every resource, ordered by name
    pub async fn snapshots(&self) -> Result<Vec<ControllerSnapshot>> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::SnapshotAll { reply }, rx).await
    }

    /// Post the status message of every resource; returns how many were posted
    pub async fn post_initial_status(&self) -> Result<usize> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::PostStatus { reply }, rx).await
    }

    /// Record an interaction that never reached a controller
    pub async fn reject(&self, resource: &str, reason: &str) {
        warn!(resource, reason, "Interaction rejected");
        let event = ArbiterEvent::interaction_rejected(resource, reason);
        if let Err(e) = self.events.publish(&event).await {
            warn!(error = %e, "Failed to record rejected interaction");
        }
    }

    /// Stop the loop after the commands already queued
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
