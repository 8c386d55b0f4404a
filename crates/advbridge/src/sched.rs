// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cooperative pending-event bookkeeping.
//!
//! The bridge runs on an external run-to-completion dispatcher: every
//! handler executes fully on one logical thread before the next one runs,
//! so ring writes and drains never interleave partially. This module keeps
//! that contract visible - pending work is an explicit [`EventSet`] per
//! registered task rather than free-floating bitmask arithmetic.
//!
//! A handler receives its task's pending set and returns the unprocessed
//! remainder, which is re-queued for a later tick; a handler is free to
//! process one event class per invocation and hand the rest back.

/// One schedulable condition.
///
/// Discriminants are bit positions inside an [`EventSet`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum Event {
    /// Ring crossed the high watermark; drain eagerly
    DataReady = 1 << 0,

    /// Inbound data arrived on the peer socket
    MessageReceived = 1 << 1,

    /// Start the scan device / first discovery cycle
    StartDevice = 1 << 2,
}

/// Set of pending events for one task.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EventSet(u16);

impl EventSet {
    /// The empty set.
    pub const EMPTY: EventSet = EventSet(0);

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn contains(&self, ev: Event) -> bool {
        self.0 & ev as u16 != 0
    }

    pub fn insert(&mut self, ev: Event) {
        self.0 |= ev as u16;
    }

    /// Remove `ev` and report whether it was present.
    pub fn take(&mut self, ev: Event) -> bool {
        let present = self.contains(ev);
        self.0 &= !(ev as u16);
        present
    }

    /// Union with another set (used to re-queue an unprocessed remainder).
    pub fn merge(&mut self, other: EventSet) {
        self.0 |= other.0;
    }
}

/// Task identifier handed out at registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskId(usize);

/// Serial event dispatcher state.
///
/// Owns one pending set per registered task. The owner drains tasks one at
/// a time: take a set, run the handler to completion, merge back whatever
/// the handler did not process.
#[derive(Debug, Default)]
pub struct Scheduler {
    pending: Vec<EventSet>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task and return its id.
    pub fn register(&mut self) -> TaskId {
        self.pending.push(EventSet::EMPTY);
        TaskId(self.pending.len() - 1)
    }

    /// Mark an event pending for a task.
    pub fn post(&mut self, task: TaskId, ev: Event) {
        self.pending[task.0].insert(ev);
    }

    /// Take the whole pending set for a task, leaving it empty.
    pub fn take(&mut self, task: TaskId) -> EventSet {
        std::mem::take(&mut self.pending[task.0])
    }

    /// Re-queue a handler's unprocessed remainder.
    pub fn requeue(&mut self, task: TaskId, remainder: EventSet) {
        self.pending[task.0].merge(remainder);
    }

    /// Check whether any task has pending work.
    pub fn has_pending(&self) -> bool {
        self.pending.iter().any(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_set_basics() {
        let mut set = EventSet::EMPTY;
        assert!(set.is_empty());

        set.insert(Event::DataReady);
        set.insert(Event::StartDevice);
        assert!(set.contains(Event::DataReady));
        assert!(!set.contains(Event::MessageReceived));

        assert!(set.take(Event::DataReady));
        assert!(!set.take(Event::DataReady));
        assert!(!set.is_empty());
        assert!(set.take(Event::StartDevice));
        assert!(set.is_empty());
    }

    #[test]
    fn test_insert_is_idempotent() {
        let mut set = EventSet::EMPTY;
        set.insert(Event::DataReady);
        set.insert(Event::DataReady);
        assert!(set.take(Event::DataReady));
        assert!(set.is_empty());
    }

    #[test]
    fn test_scheduler_post_take() {
        let mut sched = Scheduler::new();
        let a = sched.register();
        let b = sched.register();

        sched.post(a, Event::DataReady);
        assert!(sched.has_pending());

        // Tasks are independent.
        assert!(sched.take(b).is_empty());
        let set = sched.take(a);
        assert!(set.contains(Event::DataReady));

        // Taking clears.
        assert!(!sched.has_pending());
        assert!(sched.take(a).is_empty());
    }

    #[test]
    fn test_requeue_remainder() {
        let mut sched = Scheduler::new();
        let task = sched.register();

        sched.post(task, Event::DataReady);
        sched.post(task, Event::MessageReceived);

        let mut set = sched.take(task);
        // Handler processes one class and hands the rest back.
        assert!(set.take(Event::DataReady));
        sched.requeue(task, set);

        let set = sched.take(task);
        assert!(set.contains(Event::MessageReceived));
        assert!(!set.contains(Event::DataReady));
    }
}
