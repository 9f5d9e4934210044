//! # Cooperative Timers
//!
//! Deadlines keyed by whatever owns them (a seeker/hider pair, a discovery
//! id, a seeker). Nothing fires on its own: the room polls [`TimerWheel::due`]
//! from its tick. Re-scheduling a key replaces its deadline.

use std::collections::HashMap;
use std::hash::Hash;

use lurk_shared::TimestampMs;

#[derive(Clone, Copy, Debug)]
struct Deadline {
    at: TimestampMs,
    seq: u64,
}

/// Set of cancellable deadlines.
#[derive(Clone, Debug)]
pub struct TimerWheel<K> {
    deadlines: HashMap<K, Deadline>,
    next_seq: u64,
}

impl<K> Default for TimerWheel<K> {
    fn default() -> Self {
        Self {
            deadlines: HashMap::new(),
            next_seq: 0,
        }
    }
}

impl<K: Eq + Hash + Clone> TimerWheel<K> {
    /// Empty wheel.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets (or replaces) the deadline of `key`.
    pub fn schedule(&mut self, key: K, at: TimestampMs) {
        self.next_seq += 1;
        self.deadlines.insert(
            key,
            Deadline {
                at,
                seq: self.next_seq,
            },
        );
    }

    /// Cancels `key`. Returns `false` if it was not scheduled.
    pub fn cancel(&mut self, key: &K) -> bool {
        self.deadlines.remove(key).is_some()
    }

    /// Cancels every key matching `pred`. Returns how many were removed.
    pub fn cancel_where(&mut self, mut pred: impl FnMut(&K) -> bool) -> usize {
        let before = self.deadlines.len();
        self.deadlines.retain(|k, _| !pred(k));
        before - self.deadlines.len()
    }

    /// True if `key` has a pending deadline.
    #[must_use]
    pub fn is_scheduled(&self, key: &K) -> bool {
        self.deadlines.contains_key(key)
    }

    /// Deadline of `key`, if scheduled.
    #[must_use]
    pub fn deadline(&self, key: &K) -> Option<TimestampMs> {
        self.deadlines.get(key).map(|d| d.at)
    }

    /// Earliest pending deadline.
    #[must_use]
    pub fn next_due(&self) -> Option<TimestampMs> {
        self.deadlines.values().map(|d| d.at).min()
    }

    /// Removes and returns every key due at `now`, earliest first
    /// (scheduling order breaks ties).
    pub fn due(&mut self, now: TimestampMs) -> Vec<K> {
        let mut fired: Vec<(K, Deadline)> = self
            .deadlines
            .iter()
            .filter(|(_, d)| d.at <= now)
            .map(|(k, d)| (k.clone(), *d))
            .collect();
        if fired.is_empty() {
            return Vec::new();
        }
        fired.sort_by_key(|(_, d)| (d.at, d.seq));
        for (key, _) in &fired {
            self.deadlines.remove(key);
        }
        fired.into_iter().map(|(k, _)| k).collect()
    }

    /// Pending deadlines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    /// True if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }

    /// Drops every deadline.
    pub fn clear(&mut self) {
        self.deadlines.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_due_in_deadline_order() {
        let mut timers = TimerWheel::new();
        timers.schedule("late", 300);
        timers.schedule("early", 100);
        timers.schedule("tie", 100);
        timers.schedule("future", 1_000);

        assert!(timers.due(99).is_empty());
        assert_eq!(timers.due(300), vec!["early", "tie", "late"]);
        assert_eq!(timers.len(), 1);
        assert_eq!(timers.next_due(), Some(1_000));
    }

    #[test]
    fn test_reschedule_and_cancel() {
        let mut timers = TimerWheel::new();
        timers.schedule(1u32, 100);
        timers.schedule(1u32, 500);
        assert!(timers.due(100).is_empty());
        assert_eq!(timers.deadline(&1), Some(500));

        timers.schedule(2u32, 100);
        timers.schedule(3u32, 100);
        assert_eq!(timers.cancel_where(|k| *k >= 2), 2);
        assert!(timers.cancel(&1));
        assert!(!timers.cancel(&1));
        assert!(timers.is_empty());
    }
}
