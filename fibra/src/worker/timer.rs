use crate::utils::Slab;
use crate::worker::core::Slot;

use std::collections::BTreeMap;
use std::time::Instant;

/// Deadline-ordered timer registrations of one worker.
///
/// Slots sharing a deadline are grouped into one bucket with an active
/// count. Cancellation is lazy: a source that loses its event round only
/// decrements the count, and buckets that reach zero are swept without
/// firing on a later pass. No search-and-remove ever happens.
pub(crate) struct TimerSet {
    buckets: BTreeMap<Instant, TimerBucket>,
}

/// The slot indices registered for one deadline.
pub(crate) struct TimerBucket {
    pub(crate) slots: Vec<usize>,
    /// Number of registrations not yet cancelled.
    pub(crate) active: usize,
}

impl TimerSet {
    pub(crate) fn new() -> Self {
        Self {
            buckets: BTreeMap::new(),
        }
    }

    /// Registers `slot` to fire at `deadline`.
    pub(crate) fn register(&mut self, deadline: Instant, slot: usize) {
        let bucket = self.buckets.entry(deadline).or_insert_with(|| TimerBucket {
            slots: Vec::new(),
            active: 0,
        });

        bucket.slots.push(slot);
        bucket.active += 1;
    }

    /// Lazily cancels one registration at `deadline`.
    ///
    /// The slot index stays in its bucket; it is freed when the bucket
    /// fires or is swept. A bucket that already fired is gone, which is
    /// fine: the cancelled slot lost its race either way.
    pub(crate) fn cancel(&mut self, deadline: Instant) {
        if let Some(bucket) = self.buckets.get_mut(&deadline) {
            bucket.active = bucket.active.saturating_sub(1);
        }
    }

    /// Earliest pending deadline, if any.
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.buckets.keys().next().copied()
    }

    /// Removes and returns the earliest bucket if its deadline passed.
    ///
    /// At most one bucket fires per scheduling pass; the next pass picks
    /// up the following one with a zero timeout.
    pub(crate) fn take_first_due(&mut self, now: Instant) -> Option<TimerBucket> {
        let deadline = self.next_deadline()?;
        if now < deadline {
            return None;
        }
        self.buckets.remove(&deadline)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Drops leading buckets whose registrations were all cancelled,
    /// freeing their slots without firing anything.
    pub(crate) fn sweep(&mut self, arena: &mut Slab<Slot>) {
        loop {
            let deadline = match self.buckets.first_key_value() {
                Some((deadline, bucket)) if bucket.active == 0 => *deadline,
                _ => break,
            };

            let bucket = self.buckets.remove(&deadline).unwrap();
            for slot in bucket.slots {
                if arena.has(slot) {
                    arena.remove(slot);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::core::Slot;

    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    fn slot() -> Slot {
        Slot {
            cell: Rc::new(RefCell::new(None)),
            event_index: 0,
        }
    }

    #[test]
    fn earliest_deadline_first() {
        let mut arena = Slab::new(4);
        let mut timers = TimerSet::new();
        let base = Instant::now();

        let a = arena.insert(slot());
        let b = arena.insert(slot());
        let c = arena.insert(slot());

        timers.register(base + Duration::from_millis(10), a);
        timers.register(base + Duration::from_millis(5), b);
        timers.register(base + Duration::from_millis(20), c);

        let late = base + Duration::from_millis(50);
        let order: Vec<usize> = std::iter::from_fn(|| timers.take_first_due(late))
            .map(|bucket| bucket.slots[0])
            .collect();

        assert_eq!(order, vec![b, a, c]);
        assert!(timers.is_empty());
    }

    #[test]
    fn not_due_buckets_stay() {
        let mut arena = Slab::new(1);
        let mut timers = TimerSet::new();
        let deadline = Instant::now() + Duration::from_secs(60);

        timers.register(deadline, arena.insert(slot()));

        assert!(timers.take_first_due(Instant::now()).is_none());
        assert_eq!(timers.next_deadline(), Some(deadline));
    }

    #[test]
    fn cancelled_bucket_is_swept_without_firing() {
        let mut arena = Slab::new(2);
        let mut timers = TimerSet::new();
        let deadline = Instant::now() + Duration::from_millis(5);

        let index = arena.insert(slot());
        timers.register(deadline, index);
        timers.cancel(deadline);

        timers.sweep(&mut arena);

        assert!(timers.is_empty());
        assert!(!arena.has(index));
    }

    #[test]
    fn sweep_stops_at_first_active_bucket() {
        let mut arena = Slab::new(2);
        let mut timers = TimerSet::new();
        let base = Instant::now();

        let cancelled = arena.insert(slot());
        let live = arena.insert(slot());
        timers.register(base + Duration::from_millis(1), cancelled);
        timers.register(base + Duration::from_millis(2), live);
        timers.cancel(base + Duration::from_millis(1));

        timers.sweep(&mut arena);

        assert!(!arena.has(cancelled));
        assert!(arena.has(live));
        assert_eq!(timers.next_deadline(), Some(base + Duration::from_millis(2)));
    }
}
