//! Executor pool: bounded concurrency per circuit.
//!
//! # Responsibilities
//! - Hand out at most `capacity` tickets at a time
//! - Fail fast when saturated (never queue)
//! - Return a ticket exactly once, whatever path the command exits by
//! - Track executions, rejections and peak concurrency over the rolling window

use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use serde::Serialize;

use crate::observability::metrics;
use crate::resilience::error::GuardError;
use crate::rolling::RollingWindow;

/// Hard ceiling on tickets per pool, whatever the configuration says.
pub const MAX_CONCURRENT_CEILING: usize = 1000;

#[derive(Debug, Default)]
struct PoolBucket {
    executed: u64,
    rejected: u64,
    max_active: usize,
}

/// Rolling pool statistics.
#[derive(Debug)]
pub struct PoolMetrics {
    window: RollingWindow<PoolBucket>,
}

impl PoolMetrics {
    fn new(window: Duration, buckets: usize) -> Self {
        Self {
            window: RollingWindow::new(window, buckets),
        }
    }

    fn record_acquired(&self, active: usize) {
        self.window.update(|b| b.max_active = b.max_active.max(active));
    }

    fn record_executed(&self) {
        self.window.update(|b| b.executed += 1);
    }

    fn record_rejected(&self) {
        self.window.update(|b| b.rejected += 1);
    }

    pub fn executed(&self) -> u64 {
        self.window.fold(0, |acc, b| acc + b.executed)
    }

    pub fn rejected(&self) -> u64 {
        self.window.fold(0, |acc, b| acc + b.rejected)
    }

    /// Highest number of tickets held at once within the window.
    pub fn max_active(&self) -> usize {
        self.window.fold(0, |acc, b| acc.max(b.max_active))
    }

    pub fn reset(&self) {
        self.window.reset();
    }
}

/// Point-in-time view of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolSnapshot {
    pub capacity: usize,
    pub in_use: usize,
    pub executed: u64,
    pub rejected: u64,
    pub max_active: usize,
}

/// A fixed set of interchangeable tickets for one circuit.
#[derive(Debug)]
pub struct ExecutorPool {
    name: String,
    capacity: usize,
    in_use: AtomicUsize,
    metrics: PoolMetrics,
}

impl ExecutorPool {
    /// Create a pool; `max_concurrent` is clamped to [`MAX_CONCURRENT_CEILING`].
    pub fn new(name: &str, max_concurrent: usize, window: Duration, buckets: usize) -> Self {
        let capacity = max_concurrent.min(MAX_CONCURRENT_CEILING);
        if capacity < max_concurrent {
            tracing::warn!(
                circuit = %name,
                requested = max_concurrent,
                capacity,
                "Executor pool capacity clamped to ceiling"
            );
        }

        Self {
            name: name.to_string(),
            capacity,
            in_use: AtomicUsize::new(0),
            metrics: PoolMetrics::new(window, buckets),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tickets currently held.
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    pub fn metrics(&self) -> &PoolMetrics {
        &self.metrics
    }

    /// Take a ticket without waiting.
    pub fn acquire(self: &Arc<Self>) -> Result<Ticket, GuardError> {
        let mut prev = self.in_use.load(Ordering::Acquire);
        loop {
            if prev >= self.capacity {
                self.metrics.record_rejected();
                tracing::debug!(circuit = %self.name, capacity = self.capacity, "Executor pool exhausted");
                return Err(GuardError::MaxConcurrency);
            }
            match self.in_use.compare_exchange_weak(
                prev,
                prev + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(x) => prev = x,
            }
        }

        let active = prev + 1;
        self.metrics.record_acquired(active);
        metrics::record_pool_in_use(&self.name, active);

        Ok(Ticket { pool: self.clone() })
    }

    fn release(&self) {
        let active = self.in_use.fetch_sub(1, Ordering::AcqRel) - 1;
        self.metrics.record_executed();
        metrics::record_pool_in_use(&self.name, active);
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            capacity: self.capacity,
            in_use: self.in_use(),
            executed: self.metrics.executed(),
            rejected: self.metrics.rejected(),
            max_active: self.metrics.max_active(),
        }
    }
}

/// One unit of pool capacity; returned to the pool when dropped.
#[derive(Debug)]
pub struct Ticket {
    pool: Arc<ExecutorPool>,
}

impl Ticket {
    /// Return the ticket now instead of at end of scope.
    pub fn release(self) {
        drop(self);
    }
}

impl Deref for Ticket {
    type Target = ExecutorPool;
    fn deref(&self) -> &Self::Target {
        &self.pool
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.pool.release();
    }
}
