//! Resource controller
//!
//! The state machine deciding who holds a resource and who waits for it.
//! A controller never performs I/O: each call to [`ResourceController::apply`]
//! mutates state completely or not at all and describes the outbound effects
//! in the returned [`Decision`].

use std::collections::VecDeque;

use tracing::debug;

use super::types::{
    ActionKind, ControllerSnapshot, Decision, DirectMessage, DirectNotice, LockState, Notice,
    UserId,
};

/// Holder and wait list for one named resource
#[derive(Debug, Clone)]
pub struct ResourceController {
    resource: String,
    state: LockState,
    holder: Option<UserId>,
    queue: VecDeque<UserId>,
}

impl ResourceController {
    /// Create a controller for a free resource
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            state: LockState::Free,
            holder: None,
            queue: VecDeque::new(),
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn state(&self) -> LockState {
        self.state
    }

    pub fn holder(&self) -> Option<&UserId> {
        self.holder.as_ref()
    }

    pub fn queue(&self) -> impl ExactSizeIterator<Item = &UserId> {
        self.queue.iter()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_holder(&self, user: &UserId) -> bool {
        self.holder.as_ref() == Some(user)
    }

    pub fn is_queued(&self, user: &UserId) -> bool {
        self.queue.contains(user)
    }

    /// Position in the queue, 0 being next in line
    pub fn queue_position(&self, user: &UserId) -> Option<usize> {
        self.queue.iter().position(|u| u == user)
    }

    /// Whether the user may join the back of the queue
    pub fn can_queue(&self, user: &UserId) -> bool {
        !self.is_holder(user) && !self.is_queued(user)
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        ControllerSnapshot {
            resource: self.resource.clone(),
            state: self.state,
            holder: self.holder.clone(),
            queue: self.queue.iter().cloned().collect(),
        }
    }

    /// Apply one action on behalf of `actor`
    pub fn apply(&mut self, action: ActionKind, actor: &UserId) -> Decision {
        let decision = match action {
            ActionKind::Acquire => self.acquire(actor),
            ActionKind::Release => self.release(actor),
            ActionKind::Enqueue => self.enqueue(actor),
            ActionKind::JumpQueue => self.jump_queue(actor),
            ActionKind::Override => self.override_holder(actor),
        };

        debug!(
            resource = %self.resource,
            action = %action,
            actor = %actor,
            state = %self.state,
            queue_len = self.queue.len(),
            noop = decision.is_noop(),
            "Applied action"
        );

        decision
    }

    fn acquire(&mut self, actor: &UserId) -> Decision {
        if self.state == LockState::Taken {
            return Decision::noop();
        }

        self.take(actor);
        Decision::with_notice(Notice::Took(actor.clone())).rearm()
    }

    fn release(&mut self, actor: &UserId) -> Decision {
        if self.is_holder(actor) {
            let decision = Decision::with_notice(Notice::Released(actor.clone())).cancel();

            return match self.queue.pop_front() {
                Some(next) => {
                    self.holder = Some(next.clone());
                    decision
                        .message(DirectMessage::new(next, DirectNotice::HandedOver))
                        .rearm()
                }
                None => {
                    self.state = LockState::Free;
                    self.holder = None;
                    decision
                }
            };
        }

        if self.remove_from_queue(actor) {
            return Decision::with_notice(Notice::RemovedFromQueue(actor.clone()));
        }

        Decision::noop()
    }

    fn enqueue(&mut self, actor: &UserId) -> Decision {
        if !self.can_queue(actor) {
            return Decision::noop();
        }

        self.queue.push_back(actor.clone());
        Decision::with_notice(Notice::AddedToQueue(actor.clone()))
    }

    fn jump_queue(&mut self, actor: &UserId) -> Decision {
        if self.is_holder(actor) {
            return Decision::noop();
        }

        match self.queue.front() {
            None => return Decision::noop(),
            Some(front) if front == actor => return Decision::noop(),
            Some(_) => {}
        }

        self.remove_from_queue(actor);
        self.queue.push_front(actor.clone());
        Decision::with_notice(Notice::MovedToFront(actor.clone()))
    }

    fn override_holder(&mut self, actor: &UserId) -> Decision {
        if self.is_holder(actor) {
            return Decision::noop();
        }

        let previous = self.holder.take();
        self.take(actor);

        let decision = Decision::with_notice(Notice::Took(actor.clone()))
            .cancel()
            .rearm();

        match previous {
            Some(previous) => decision.message(DirectMessage::new(
                previous,
                DirectNotice::Stolen { by: actor.clone() },
            )),
            None => decision,
        }
    }

    /// Make `actor` the holder, dropping any queue entry it had
    fn take(&mut self, actor: &UserId) {
        self.state = LockState::Taken;
        self.holder = Some(actor.clone());
        self.remove_from_queue(actor);
    }

    /// Remove `user` from the queue; returns whether it was present
    fn remove_from_queue(&mut self, user: &UserId) -> bool {
        match self.queue_position(user) {
            Some(index) => {
                self.queue.remove(index);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn user(id: &str) -> UserId {
        UserId::new(id).expect("valid user id")
    }

    fn queue_of(controller: &ResourceController) -> Vec<&str> {
        controller.queue().map(UserId::as_str).collect()
    }

    fn taken_by(holder: &str, queued: &[&str]) -> ResourceController {
        let mut controller = ResourceController::new("staging");
        controller.apply(ActionKind::Acquire, &user(holder));
        for q in queued {
            controller.apply(ActionKind::Enqueue, &user(q));
        }
        controller
    }

    #[test]
    fn test_initial_state_is_free() {
        let controller = ResourceController::new("staging");
        assert_eq!(controller.state(), LockState::Free);
        assert!(controller.holder().is_none());
        assert_eq!(controller.queue_len(), 0);
    }

    #[test]
    fn test_acquire_when_free() {
        let mut controller = ResourceController::new("staging");
        let decision = controller.apply(ActionKind::Acquire, &user("A"));

        assert_eq!(controller.state(), LockState::Taken);
        assert_eq!(controller.holder(), Some(&user("A")));
        assert_eq!(decision.notice, Some(Notice::Took(user("A"))));
        assert!(decision.rearm_timer);
        assert!(!decision.cancel_timer);
        assert!(decision.direct_messages.is_empty());
    }

    #[test]
    fn test_acquire_when_taken_is_noop() {
        let mut controller = taken_by("A", &["B"]);
        let before = controller.snapshot();

        let by_other = controller.apply(ActionKind::Acquire, &user("C"));
        let by_holder = controller.apply(ActionKind::Acquire, &user("A"));

        assert!(by_other.is_noop());
        assert!(by_holder.is_noop());
        assert_eq!(controller.snapshot(), before);
    }

    #[test]
    fn test_release_hands_over_to_queue_front() {
        let mut controller = taken_by("A", &["B", "C"]);
        let decision = controller.apply(ActionKind::Release, &user("A"));

        assert_eq!(controller.state(), LockState::Taken);
        assert_eq!(controller.holder(), Some(&user("B")));
        assert_eq!(queue_of(&controller), vec!["C"]);
        assert_eq!(decision.notice, Some(Notice::Released(user("A"))));
        assert_eq!(
            decision.direct_messages,
            vec![DirectMessage::new(user("B"), DirectNotice::HandedOver)]
        );
        assert!(decision.cancel_timer);
        assert!(decision.rearm_timer);
    }

    #[test]
    fn test_release_with_empty_queue_frees() {
        let mut controller = taken_by("A", &[]);
        let decision = controller.apply(ActionKind::Release, &user("A"));

        assert_eq!(controller.state(), LockState::Free);
        assert!(controller.holder().is_none());
        assert_eq!(decision.notice, Some(Notice::Released(user("A"))));
        assert!(decision.cancel_timer);
        assert!(!decision.rearm_timer);
    }

    #[test]
    fn test_release_while_queued_leaves_queue() {
        let mut controller = taken_by("A", &["B", "C"]);
        let decision = controller.apply(ActionKind::Release, &user("B"));

        assert_eq!(controller.holder(), Some(&user("A")));
        assert_eq!(queue_of(&controller), vec!["C"]);
        assert_eq!(decision.notice, Some(Notice::RemovedFromQueue(user("B"))));
        assert!(!decision.cancel_timer);
        assert!(!decision.rearm_timer);
    }

    #[test]
    fn test_release_by_stranger_is_noop() {
        let mut controller = taken_by("A", &["B"]);
        let before = controller.snapshot();
        assert!(controller.apply(ActionKind::Release, &user("Z")).is_noop());
        assert_eq!(controller.snapshot(), before);

        let mut free = ResourceController::new("staging");
        assert!(free.apply(ActionKind::Release, &user("Z")).is_noop());
        assert_eq!(free.state(), LockState::Free);
    }

    #[test]
    fn test_enqueue_rejects_holder_and_duplicates() {
        let mut controller = taken_by("A", &["B"]);

        assert!(controller.apply(ActionKind::Enqueue, &user("A")).is_noop());
        assert!(controller.apply(ActionKind::Enqueue, &user("B")).is_noop());
        assert_eq!(queue_of(&controller), vec!["B"]);

        let decision = controller.apply(ActionKind::Enqueue, &user("C"));
        assert_eq!(decision.notice, Some(Notice::AddedToQueue(user("C"))));
        assert_eq!(queue_of(&controller), vec!["B", "C"]);
    }

    #[test]
    fn test_jump_queue_moves_to_front() {
        let mut controller = taken_by("A", &["B", "C"]);
        let decision = controller.apply(ActionKind::JumpQueue, &user("C"));

        assert_eq!(decision.notice, Some(Notice::MovedToFront(user("C"))));
        assert_eq!(queue_of(&controller), vec!["C", "B"]);
    }

    #[test]
    fn test_jump_queue_from_outside_the_queue() {
        let mut controller = taken_by("A", &["B"]);
        let decision = controller.apply(ActionKind::JumpQueue, &user("D"));

        assert_eq!(decision.notice, Some(Notice::MovedToFront(user("D"))));
        assert_eq!(queue_of(&controller), vec!["D", "B"]);
    }

    #[test]
    fn test_jump_queue_on_empty_queue_is_noop() {
        let mut controller = taken_by("A", &[]);
        let before = controller.snapshot();
        assert!(controller.apply(ActionKind::JumpQueue, &user("B")).is_noop());
        assert_eq!(controller.snapshot(), before);

        let mut free = ResourceController::new("staging");
        assert!(free.apply(ActionKind::JumpQueue, &user("B")).is_noop());
    }

    #[test]
    fn test_jump_queue_noops() {
        let mut controller = taken_by("A", &["B", "C"]);
        assert!(controller.apply(ActionKind::JumpQueue, &user("B")).is_noop());
        assert!(controller.apply(ActionKind::JumpQueue, &user("A")).is_noop());
        assert_eq!(queue_of(&controller), vec!["B", "C"]);
    }

    #[test]
    fn test_override_steals_from_holder() {
        let mut controller = taken_by("A", &["B"]);
        let decision = controller.apply(ActionKind::Override, &user("C"));

        assert_eq!(controller.holder(), Some(&user("C")));
        assert_eq!(queue_of(&controller), vec!["B"]);
        assert_eq!(decision.notice, Some(Notice::Took(user("C"))));
        assert_eq!(
            decision.direct_messages,
            vec![DirectMessage::new(
                user("A"),
                DirectNotice::Stolen { by: user("C") }
            )]
        );
        assert!(decision.cancel_timer);
        assert!(decision.rearm_timer);
    }

    #[test]
    fn test_override_by_queued_user_leaves_queue() {
        let mut controller = taken_by("A", &["B", "C"]);
        controller.apply(ActionKind::Override, &user("C"));

        assert_eq!(controller.holder(), Some(&user("C")));
        assert_eq!(queue_of(&controller), vec!["B"]);
    }

    #[test]
    fn test_override_by_holder_is_noop() {
        let mut controller = taken_by("A", &["B"]);
        assert!(controller.apply(ActionKind::Override, &user("A")).is_noop());
        assert_eq!(controller.holder(), Some(&user("A")));
    }

    #[test]
    fn test_override_when_free_takes_without_dm() {
        let mut controller = ResourceController::new("staging");
        let decision = controller.apply(ActionKind::Override, &user("A"));

        assert_eq!(controller.state(), LockState::Taken);
        assert_eq!(controller.holder(), Some(&user("A")));
        assert!(decision.direct_messages.is_empty());
        assert!(decision.rearm_timer);
    }

    #[test]
    fn test_acquire_by_queued_user_on_free_resource() {
        let mut controller = ResourceController::new("staging");
        controller.apply(ActionKind::Enqueue, &user("B"));
        controller.apply(ActionKind::Enqueue, &user("C"));
        assert_eq!(controller.state(), LockState::Free);

        controller.apply(ActionKind::Acquire, &user("C"));
        assert_eq!(controller.holder(), Some(&user("C")));
        assert_eq!(queue_of(&controller), vec!["B"]);
    }

    #[test]
    fn test_full_walkthrough() {
        let mut controller = ResourceController::new("staging");

        controller.apply(ActionKind::Acquire, &user("A"));
        controller.apply(ActionKind::Enqueue, &user("B"));
        controller.apply(ActionKind::Enqueue, &user("C"));
        assert_eq!(queue_of(&controller), vec!["B", "C"]);

        controller.apply(ActionKind::JumpQueue, &user("C"));
        assert_eq!(queue_of(&controller), vec!["C", "B"]);

        let decision = controller.apply(ActionKind::Release, &user("A"));
        assert_eq!(controller.holder(), Some(&user("C")));
        assert_eq!(queue_of(&controller), vec!["B"]);
        assert_eq!(decision.direct_messages[0].to, user("C"));
    }

    fn arb_action() -> impl Strategy<Value = ActionKind> {
        prop::sample::select(ActionKind::ALL.to_vec())
    }

    fn arb_user() -> impl Strategy<Value = UserId> {
        prop::sample::select(vec!["U1", "U2", "U3", "U4", "U5"]).prop_map(user)
    }

    proptest! {
        #[test]
        fn prop_queue_invariants_hold(
            steps in prop::collection::vec((arb_action(), arb_user()), 0..64)
        ) {
            let mut controller = ResourceController::new("staging");

            for (action, actor) in &steps {
                controller.apply(*action, actor);

                let queue: Vec<&UserId> = controller.queue().collect();
                let mut deduped = queue.clone();
                deduped.sort();
                deduped.dedup();
                prop_assert_eq!(deduped.len(), queue.len());

                match controller.state() {
                    LockState::Taken => {
                        let holder = controller.holder();
                        prop_assert!(holder.is_some());
                        prop_assert!(!queue.iter().any(|u| Some(*u) == holder));
                    }
                    LockState::Free => {
                        prop_assert!(controller.holder().is_none());
                    }
                }
            }
        }

        #[test]
        fn prop_release_hands_to_previous_front(
            steps in prop::collection::vec((arb_action(), arb_user()), 0..32)
        ) {
            let mut controller = ResourceController::new("staging");
            for (action, actor) in &steps {
                controller.apply(*action, actor);
            }

            if let Some(holder) = controller.holder().cloned() {
                let front = controller.queue().next().cloned();
                controller.apply(ActionKind::Release, &holder);
                prop_assert_eq!(controller.holder().cloned(), front.clone());
                if let Some(front) = front {
                    prop_assert!(!controller.is_queued(&front));
                }
            }
        }
    }
}
