//! Reminder scheduler
//!
//! Owns the single one-shot timer of a resource. The timer task never touches
//! controller state: when it expires it only posts a [`ReminderDue`] into the
//! owner's command queue, and the owner calls [`ReminderScheduler::check`]
//! from its own serial loop.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::controller::ResourceController;
use super::types::{LockState, UserId};

/// Default delay before a holder is reminded
pub const DEFAULT_REMINDER_DELAY: Duration = Duration::from_secs(30);

/// Work item posted when a reminder timer expires
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderDue {
    pub resource: String,
    pub holder: UserId,
    pub generation: u64,
}

/// What an expired reminder turned out to mean
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReminderOutcome {
    /// Still held by the same user with people waiting
    Remind(UserId),
    /// Still held, but nobody is waiting
    NoContention,
    /// The handoff it was armed for is over
    Stale,
}

#[derive(Debug)]
struct ArmedReminder {
    holder: UserId,
    generation: u64,
    handle: JoinHandle<()>,
}

/// One cancellable, reschedulable timer tied to the current holder
#[derive(Debug)]
pub struct ReminderScheduler {
    resource: String,
    delay: Duration,
    generation: u64,
    armed: Option<ArmedReminder>,
}

impl ReminderScheduler {
    pub fn new(resource: impl Into<String>, delay: Duration) -> Self {
        Self {
            resource: resource.into(),
            delay,
            generation: 0,
            armed: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Holder the live timer was armed for
    pub fn armed_for(&self) -> Option<&UserId> {
        self.armed.as_ref().map(|a| &a.holder)
    }

    /// Arm a timer for `holder`, replacing any live one
    ///
    /// Must be called from within a tokio runtime.
    pub fn arm<T>(&mut self, holder: UserId, sink: mpsc::Sender<T>) -> u64
    where
        T: From<ReminderDue> + Send + 'static,
    {
        self.cancel();

        self.generation += 1;
        let generation = self.generation;
        let due = ReminderDue {
            resource: self.resource.clone(),
            holder: holder.clone(),
            generation,
        };
        let delay = self.delay;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // The owner may already be gone during shutdown.
            let _ = sink.send(T::from(due)).await;
        });

        debug!(
            resource = %self.resource,
            holder = %holder,
            generation,
            delay_secs = delay.as_secs(),
            "Reminder armed"
        );

        self.armed = Some(ArmedReminder {
            holder,
            generation,
            handle,
        });
        generation
    }

    /// Cancel the live timer, if any
    pub fn cancel(&mut self) {
        if let Some(armed) = self.armed.take() {
            armed.handle.abort();
            debug!(
                resource = %self.resource,
                holder = %armed.holder,
                generation = armed.generation,
                "Reminder cancelled"
            );
        }
    }

    /// Re-validate an expired timer against current state
    ///
    /// Consumes the live timer when `due` belongs to it.
    pub fn check(&mut self, due: &ReminderDue, controller: &ResourceController) -> ReminderOutcome {
        let live = self
            .armed
            .as_ref()
            .is_some_and(|armed| armed.generation == due.generation);
        if !live {
            return ReminderOutcome::Stale;
        }
        self.armed = None;

        if controller.state() != LockState::Taken || !controller.is_holder(&due.holder) {
            return ReminderOutcome::Stale;
        }

        if controller.queue_len() == 0 {
            return ReminderOutcome::NoContention;
        }

        ReminderOutcome::Remind(due.holder.clone())
    }
}

impl Drop for ReminderScheduler {
    fn drop(&mut self) {
        if let Some(armed) = self.armed.take() {
            armed.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::arbiter::types::ActionKind;

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn scheduler() -> ReminderScheduler {
        ReminderScheduler::new("staging", Duration::from_secs(30))
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_delay() {
        let (tx, mut rx) = mpsc::channel::<ReminderDue>(4);
        let mut reminders = scheduler();
        let generation = reminders.arm(user("A"), tx);

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(2)).await;
        let due = rx.recv().await.expect("reminder should fire");
        assert_eq!(due.holder, user("A"));
        assert_eq!(due.generation, generation);
        assert_eq!(due.resource, "staging");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_fire() {
        let (tx, mut rx) = mpsc::channel::<ReminderDue>(4);
        let mut reminders = scheduler();
        reminders.arm(user("A"), tx);
        reminders.cancel();
        assert!(!reminders.is_armed());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_previous_timer() {
        let (tx, mut rx) = mpsc::channel::<ReminderDue>(4);
        let mut reminders = scheduler();
        reminders.arm(user("A"), tx.clone());
        tokio::time::sleep(Duration::from_secs(20)).await;
        let second = reminders.arm(user("B"), tx);
        assert_eq!(reminders.armed_for(), Some(&user("B")));

        tokio::time::sleep(Duration::from_secs(31)).await;
        let due = rx.recv().await.expect("second reminder should fire");
        assert_eq!(due.holder, user("B"));
        assert_eq!(due.generation, second);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_check_reminds_with_contention() {
        let (tx, _rx) = mpsc::channel::<ReminderDue>(4);
        let mut controller = ResourceController::new("staging");
        controller.apply(ActionKind::Acquire, &user("A"));
        controller.apply(ActionKind::Enqueue, &user("B"));

        let mut reminders = scheduler();
        let generation = reminders.arm(user("A"), tx);
        let due = ReminderDue {
            resource: "staging".to_string(),
            holder: user("A"),
            generation,
        };

        assert_eq!(
            reminders.check(&due, &controller),
            ReminderOutcome::Remind(user("A"))
        );
        assert!(!reminders.is_armed());
    }

    #[tokio::test]
    async fn test_check_without_contention() {
        let (tx, _rx) = mpsc::channel::<ReminderDue>(4);
        let mut controller = ResourceController::new("staging");
        controller.apply(ActionKind::Acquire, &user("A"));

        let mut reminders = scheduler();
        let generation = reminders.arm(user("A"), tx);
        let due = ReminderDue {
            resource: "staging".to_string(),
            holder: user("A"),
            generation,
        };

        assert_eq!(
            reminders.check(&due, &controller),
            ReminderOutcome::NoContention
        );
    }

    #[tokio::test]
    async fn test_check_stale_after_handoff() {
        let (tx, _rx) = mpsc::channel::<ReminderDue>(4);
        let mut controller = ResourceController::new("staging");
        controller.apply(ActionKind::Acquire, &user("A"));
        controller.apply(ActionKind::Enqueue, &user("B"));

        let mut reminders = scheduler();
        let generation = reminders.arm(user("A"), tx);
        controller.apply(ActionKind::Override, &user("C"));

        let due = ReminderDue {
            resource: "staging".to_string(),
            holder: user("A"),
            generation,
        };
        assert_eq!(reminders.check(&due, &controller), ReminderOutcome::Stale);
    }

    #[tokio::test]
    async fn test_check_stale_generation() {
        let (tx, _rx) = mpsc::channel::<ReminderDue>(4);
        let mut controller = ResourceController::new("staging");
        controller.apply(ActionKind::Acquire, &user("A"));
        controller.apply(ActionKind::Enqueue, &user("B"));

        let mut reminders = scheduler();
        let old = reminders.arm(user("A"), tx.clone());
        reminders.arm(user("A"), tx);

        let due = ReminderDue {
            resource: "staging".to_string(),
            holder: user("A"),
            generation: old,
        };
        assert_eq!(reminders.check(&due, &controller), ReminderOutcome::Stale);
        assert!(reminders.is_armed());
    }
}
