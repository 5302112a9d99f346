//! One-shot timers on loop time.
//!
//! Timers are plain data: scheduling one returns a [`TimerToken`], and the
//! loop asks for due timers once per frame with [`TimerQueue::drain_due`].
//! Nothing sleeps, so tests drive timers by passing whatever `now` they
//! like.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::time::Duration;

/// Handle to a scheduled timer. Cancelling an already fired or cancelled
/// timer is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(u64);

/// A queue of one-shot timers carrying a payload `K`.
#[derive(Debug)]
pub struct TimerQueue<K> {
    heap: BinaryHeap<Reverse<(Duration, TimerToken)>>,
    /// Live timers. Cancelled entries stay in the heap and are skipped.
    pending: HashMap<TimerToken, K>,
    next_token: u64,
}

impl<K> TimerQueue<K> {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            pending: HashMap::new(),
            next_token: 1,
        }
    }

    /// Schedules `key` to fire at loop time `at`.
    pub fn schedule(&mut self, at: Duration, key: K) -> TimerToken {
        let token = TimerToken(self.next_token);
        self.next_token += 1;
        self.heap.push(Reverse((at, token)));
        self.pending.insert(token, key);
        token
    }

    /// Cancels a timer. Returns its payload if it had not fired yet.
    pub fn cancel(&mut self, token: TimerToken) -> Option<K> {
        self.pending.remove(&token)
    }

    /// Whether the timer is still waiting to fire.
    pub fn is_pending(&self, token: TimerToken) -> bool {
        self.pending.contains_key(&token)
    }

    /// Removes and returns every timer due at or before `now`, earliest
    /// first. Timers with equal deadlines fire in scheduling order.
    pub fn drain_due(&mut self, now: Duration) -> Vec<(TimerToken, K)> {
        let mut due = Vec::new();
        while let Some(Reverse((at, token))) = self.heap.peek().copied() {
            if at > now {
                break;
            }
            self.heap.pop();
            if let Some(key) = self.pending.remove(&token) {
                due.push((token, key));
            }
        }
        due
    }

    /// Deadline of the earliest live timer.
    pub fn next_deadline(&mut self) -> Option<Duration> {
        while let Some(Reverse((at, token))) = self.heap.peek().copied() {
            if self.pending.contains_key(&token) {
                return Some(at);
            }
            self.heap.pop();
        }
        None
    }

    /// Number of live timers.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// `true` if no timer is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drops every pending timer.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.pending.clear();
    }
}

impl<K> Default for TimerQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_drain_due_returns_only_expired_in_order() {
        let mut timers = TimerQueue::new();
        timers.schedule(ms(300), "c");
        timers.schedule(ms(100), "a");
        timers.schedule(ms(200), "b");

        let due: Vec<_> =
            timers.drain_due(ms(250)).into_iter().map(|(_, k)| k).collect();
        assert_eq!(due, vec!["a", "b"]);
        assert_eq!(timers.len(), 1);
    }

    #[test]
    fn test_cancel_prevents_firing() {
        let mut timers = TimerQueue::new();
        let token = timers.schedule(ms(100), 1);
        assert_eq!(timers.cancel(token), Some(1));
        assert!(!timers.is_pending(token));
        assert!(timers.drain_due(ms(1_000)).is_empty());
    }

    #[test]
    fn test_cancel_after_fire_is_noop() {
        let mut timers = TimerQueue::new();
        let token = timers.schedule(ms(10), ());
        assert_eq!(timers.drain_due(ms(10)).len(), 1);
        assert_eq!(timers.cancel(token), None);
    }

    #[test]
    fn test_equal_deadlines_fire_in_schedule_order() {
        let mut timers = TimerQueue::new();
        timers.schedule(ms(50), "first");
        timers.schedule(ms(50), "second");
        let due: Vec<_> =
            timers.drain_due(ms(50)).into_iter().map(|(_, k)| k).collect();
        assert_eq!(due, vec!["first", "second"]);
    }

    #[test]
    fn test_next_deadline_skips_cancelled() {
        let mut timers = TimerQueue::new();
        let early = timers.schedule(ms(10), ());
        timers.schedule(ms(40), ());
        timers.cancel(early);
        assert_eq!(timers.next_deadline(), Some(ms(40)));
    }
}
