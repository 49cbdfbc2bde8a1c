//! Fixed-size ring of time buckets.
//!
//! # Responsibilities
//! - Map monotonic time onto a ring of `buckets` slots of equal width
//! - Reset a slot lazily when time has moved past the bucket it holds
//! - Aggregate only the slots that still fall inside the window
//!
//! A slot remembers the absolute bucket number it was last written for, so a
//! reader never has to sweep the ring to expire old data: anything older than
//! `buckets` bucket-widths is simply skipped.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Upper bound on buckets per window.
pub const MAX_ROLLING_BUCKETS: usize = 10_000;

#[derive(Debug)]
struct Slot<B> {
    /// Bucket number since the window epoch, `None` until first written.
    index: Option<u64>,
    value: B,
}

/// A time-windowed ring of `B` buckets.
#[derive(Debug)]
pub struct RollingWindow<B> {
    epoch: Instant,
    bucket_width: Duration,
    slots: Mutex<Vec<Slot<B>>>,
}

impl<B: Default> RollingWindow<B> {
    /// Create a window spanning `window`, split into `buckets` buckets.
    ///
    /// The bucket count is clamped to `1..=MAX_ROLLING_BUCKETS`, and buckets
    /// are never narrower than one millisecond.
    pub fn new(window: Duration, buckets: usize) -> Self {
        let buckets = buckets.clamp(1, MAX_ROLLING_BUCKETS);
        let divisor = u32::try_from(buckets).unwrap_or(u32::MAX);
        let bucket_width = (window / divisor).max(Duration::from_millis(1));
        let slots = (0..buckets)
            .map(|_| Slot {
                index: None,
                value: B::default(),
            })
            .collect();

        Self {
            epoch: Instant::now(),
            bucket_width,
            slots: Mutex::new(slots),
        }
    }

    /// Number of buckets in the ring.
    pub fn bucket_count(&self) -> usize {
        self.lock().len()
    }

    /// Width of a single bucket.
    pub fn bucket_width(&self) -> Duration {
        self.bucket_width
    }

    /// Total span covered by the ring.
    pub fn window(&self) -> Duration {
        self.bucket_width * self.bucket_count() as u32
    }

    /// Mutate the bucket for the current instant, rotating it if stale.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut B),
    {
        let mut slots = self.lock();
        // Read the clock under the lock so concurrent writers rotate in order.
        let now = self.current_index();
        let len = slots.len() as u64;
        let slot = &mut slots[(now % len) as usize];
        if slot.index != Some(now) {
            slot.index = Some(now);
            slot.value = B::default();
        }
        f(&mut slot.value);
    }

    /// Fold over every bucket still inside the window.
    pub fn fold<A, F>(&self, init: A, mut f: F) -> A
    where
        F: FnMut(A, &B) -> A,
    {
        let slots = self.lock();
        let now = self.current_index();
        let len = slots.len() as u64;
        slots
            .iter()
            .filter(|slot| matches!(slot.index, Some(i) if i <= now && now - i < len))
            .fold(init, |acc, slot| f(acc, &slot.value))
    }

    /// Zero every bucket.
    pub fn reset(&self) {
        let mut slots = self.lock();
        for slot in slots.iter_mut() {
            slot.index = None;
            slot.value = B::default();
        }
    }

    fn current_index(&self) -> u64 {
        let elapsed = Instant::now().saturating_duration_since(self.epoch);
        (elapsed.as_nanos() / self.bucket_width.as_nanos()) as u64
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Slot<B>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
