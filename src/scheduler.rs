// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Tick-driven timeout scheduler.
//!
//! An ordered task list keyed by absolute expiry, protected by a single
//! lock. A dedicated timer thread calls [`TimeoutScheduler::tick`]
//! periodically; due tasks run *outside* the lock, in expiry order, ties
//! broken by schedule order.
//!
//! Guarantees:
//! - a task runs at most once;
//! - `cancel` racing with `tick` never double-fires and never deadlocks.
//!
//! Task bodies must not re-enter the scheduler synchronously; a task that
//! needs to reschedule does so from the caller after `tick` returns.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

type Task = Box<dyn FnOnce() + Send>;

/// Handle for a scheduled task, used to cancel it.
///
/// Cancellation is idempotent: cancelling an already-fired or
/// already-cancelled task is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutHandle {
    key: (u64, u64),
}

struct Inner {
    // Keyed (absolute expiry ms, schedule seq) so BTreeMap iteration order
    // is exactly the required firing order.
    tasks: BTreeMap<(u64, u64), Task>,
    next_seq: u64,
}

/// Ordered pending-task list driven by an external tick.
pub struct TimeoutScheduler {
    inner: Mutex<Inner>,
}

impl TimeoutScheduler {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                tasks: BTreeMap::new(),
                next_seq: 0,
            }),
        }
    }

    /// Schedule `task` to fire `delay_ms` from now.
    pub fn schedule(&self, delay_ms: u64, task: impl FnOnce() + Send + 'static) -> TimeoutHandle {
        self.schedule_at(now_millis().saturating_add(delay_ms), task)
    }

    /// Schedule `task` at an absolute expiry, in `now_millis` time.
    pub fn schedule_at(&self, expiry_ms: u64, task: impl FnOnce() + Send + 'static) -> TimeoutHandle {
        let mut inner = self.inner.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        let key = (expiry_ms, seq);
        inner.tasks.insert(key, Box::new(task));
        TimeoutHandle { key }
    }

    /// Remove a pending task. Returns whether it was still pending.
    pub fn cancel(&self, handle: TimeoutHandle) -> bool {
        self.inner.lock().tasks.remove(&handle.key).is_some()
    }

    /// Pop and run every task whose expiry is `<= now`.
    ///
    /// Due tasks are collected under the lock and executed after it is
    /// released, so a task body may schedule against other locks freely.
    pub fn tick(&self, now: u64) {
        let mut due: Vec<Task> = Vec::new();
        {
            let mut inner = self.inner.lock();
            while let Some(entry) = inner.tasks.first_entry() {
                if entry.key().0 > now {
                    break;
                }
                due.push(entry.remove());
            }
        }
        if !due.is_empty() {
            log::trace!("[TimeoutScheduler] firing {} task(s)", due.len());
        }
        for task in due {
            task();
        }
    }

    /// Number of tasks still pending.
    pub fn pending(&self) -> usize {
        self.inner.lock().tasks.len()
    }
}

impl Default for TimeoutScheduler {
    fn default() -> Self {
        Self::new()
    }
}
