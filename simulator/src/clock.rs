//! Logical clock that releases scheduled events in timestamp order.
//!
//! Events scheduled for the same instant are released in the order they were scheduled, so a
//! run is fully determined by its seed. There is no notion of wall-clock time: popping an event
//! simply advances [Clock::now] to its timestamp.
//!
//! Time saturates at [Duration::MAX]: delays too large to represent schedule events there
//! instead of overflowing.

use std::{cmp::Ordering, collections::BinaryHeap, time::Duration};

struct Alarm<E> {
    time: Duration,
    sequence: u64,
    event: E,
}

impl<E> PartialEq for Alarm<E> {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.sequence == other.sequence
    }
}

impl<E> Eq for Alarm<E> {}

impl<E> PartialOrd for Alarm<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Alarm<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse the ordering for min-heap
        other
            .time
            .cmp(&self.time)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Priority queue of pending events keyed by simulated time.
pub struct Clock<E> {
    now: Duration,
    sequence: u64,
    alarms: BinaryHeap<Alarm<E>>,
}

impl<E> Default for Clock<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clock<E> {
    /// Create an empty clock at time zero.
    pub fn new() -> Self {
        Self {
            now: Duration::ZERO,
            sequence: 0,
            alarms: BinaryHeap::new(),
        }
    }

    /// Timestamp of the most recently released event.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Schedule `event` to be released at `time`.
    ///
    /// # Panics
    ///
    /// Panics if `time` is earlier than [Clock::now] (events can never be delivered in the past).
    pub fn schedule(&mut self, time: Duration, event: E) {
        assert!(
            time >= self.now,
            "cannot schedule event at {time:?} before {:?}",
            self.now
        );
        let sequence = self.sequence;
        self.sequence += 1;
        self.alarms.push(Alarm {
            time,
            sequence,
            event,
        });
    }

    /// Schedule `event` to be released `delay` after [Clock::now] (or at [Duration::MAX] if that
    /// is earlier).
    pub fn schedule_after(&mut self, delay: Duration, event: E) {
        self.schedule(self.now.saturating_add(delay), event);
    }

    /// Remove the earliest event and advance [Clock::now] to its timestamp.
    pub fn next(&mut self) -> Option<(Duration, E)> {
        let alarm = self.alarms.pop()?;
        self.now = alarm.time;
        Some((alarm.time, alarm.event))
    }

    /// Timestamp of the earliest pending event.
    pub fn peek_time(&self) -> Option<Duration> {
        self.alarms.peek().map(|alarm| alarm.time)
    }

    /// Returns `true` if no events are pending.
    pub fn is_empty(&self) -> bool {
        self.alarms.is_empty()
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.alarms.len()
    }
}

/// Convert a number of seconds into a [Duration], saturating at [Duration::MAX].
pub fn saturating_secs(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}
