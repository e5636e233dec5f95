// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Discrete-event scheduler

use net::time::SimTime;
use priority_queue::PriorityQueue;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::time::Duration;

/// Handle to a scheduled event
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u64);

/// A queue of events ordered by simulated time.
///
/// Events scheduled for the same time are popped in the order they were scheduled. Popping an
/// event advances the clock to its time; the clock never goes backwards.
#[derive(Debug)]
pub struct Scheduler<E> {
    now: SimTime,
    seq: u64,
    queue: PriorityQueue<EventId, Reverse<(SimTime, EventId)>>,
    events: HashMap<EventId, E>,
}

impl<E> Default for Scheduler<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Scheduler<E> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            now: SimTime::ZERO,
            seq: 0,
            queue: PriorityQueue::new(),
            events: HashMap::new(),
        }
    }

    #[must_use]
    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Number of pending events
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Schedule `event` at `at`. Times in the past are moved to the current time.
    pub fn schedule_at(&mut self, at: SimTime, event: E) -> EventId {
        let at = at.max(self.now);
        let id = EventId(self.seq);
        self.seq += 1;
        self.queue.push(id, Reverse((at, id)));
        self.events.insert(id, event);
        id
    }

    /// Schedule `event` after `delay`
    pub fn schedule_in(&mut self, delay: Duration, event: E) -> EventId {
        self.schedule_at(self.now + delay, event)
    }

    /// Remove a pending event. Returns the event, or `None` if it already ran or was cancelled.
    pub fn cancel(&mut self, id: EventId) -> Option<E> {
        self.queue.remove(&id);
        self.events.remove(&id)
    }

    /// Time of the next event
    #[must_use]
    pub fn peek_time(&self) -> Option<SimTime> {
        self.queue.peek().map(|(_, Reverse((at, _)))| *at)
    }

    /// Pop the next event, advancing the clock to its time
    pub fn pop(&mut self) -> Option<(SimTime, E)> {
        while let Some((id, Reverse((at, _)))) = self.queue.pop() {
            if let Some(event) = self.events.remove(&id) {
                self.now = at;
                return Some((at, event));
            }
        }
        None
    }

    /// Move the clock forward to `at`, if no event is pending before
    pub fn advance_to(&mut self, at: SimTime) {
        if self.peek_time().is_none_or(|next| next >= at) {
            self.now = self.now.max(at);
        }
    }
}

#[cfg(test)]
mod test {
    use super::Scheduler;
    use net::time::SimTime;
    use std::time::Duration;

    #[test]
    fn time_order_with_fifo_ties() {
        let mut sched = Scheduler::new();
        sched.schedule_at(SimTime::from_secs(2), "b");
        sched.schedule_at(SimTime::from_secs(1), "a");
        sched.schedule_at(SimTime::from_secs(2), "c");
        sched.schedule_at(SimTime::from_secs(2), "d");
        let order: Vec<_> = std::iter::from_fn(|| sched.pop()).collect();
        assert_eq!(
            order,
            vec![
                (SimTime::from_secs(1), "a"),
                (SimTime::from_secs(2), "b"),
                (SimTime::from_secs(2), "c"),
                (SimTime::from_secs(2), "d"),
            ]
        );
        assert_eq!(sched.now(), SimTime::from_secs(2));
    }

    #[test]
    fn cancel_and_relative_scheduling() {
        let mut sched = Scheduler::new();
        sched.schedule_at(SimTime::from_secs(1), 1);
        let cancelled = sched.schedule_at(SimTime::from_secs(1), 2);
        assert_eq!(sched.cancel(cancelled), Some(2));
        assert_eq!(sched.cancel(cancelled), None);
        assert_eq!(sched.len(), 1);

        assert_eq!(sched.pop(), Some((SimTime::from_secs(1), 1)));
        sched.schedule_in(Duration::from_millis(500), 3);
        // the past is now
        sched.schedule_at(SimTime::ZERO, 4);
        assert_eq!(sched.peek_time(), Some(SimTime::from_secs(1)));
        assert_eq!(sched.pop(), Some((SimTime::from_secs(1), 4)));
        assert_eq!(sched.pop(), Some((SimTime::from_millis(1500), 3)));
        assert!(sched.is_empty());
        assert_eq!(sched.pop(), None);
    }
}
