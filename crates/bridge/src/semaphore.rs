// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Counting wakeup semaphore used to rouse the owning thread from background work.
//!
//! There is no POSIX semaphore in `std`; a `Mutex<bool> + Condvar` is the idiomatic
//! substitute. The flag collapses any number of `notify` calls between two
//! `timedwait` calls into exactly one wake, which is the semaphore's whole point: the
//! owning thread cares that *something* happened, not how many times.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// Construction-time configuration, mirroring the teacher's small `*Config` structs
/// rather than a bare constructor parameter.
#[derive(Debug, Clone, Copy)]
pub struct SemaphoreConfig {
    /// Used by `timedwait` when no explicit duration is given. The original's literal
    /// default is zero whole seconds, 100 milliseconds.
    pub default_timeout: Duration,
}

impl Default for SemaphoreConfig {
    fn default() -> Self {
        Self { default_timeout: Duration::new(0, 100_000_000) }
    }
}

pub struct WakeupSemaphore {
    notified: Mutex<bool>,
    condvar: Condvar,
    default_timeout: Duration,
}

impl WakeupSemaphore {
    pub fn new(config: SemaphoreConfig) -> Self {
        Self { notified: Mutex::new(false), condvar: Condvar::new(), default_timeout: config.default_timeout }
    }

    /// Idempotent: many calls between two `timedwait`s still produce exactly one wake.
    /// Safe from any thread.
    pub fn notify(&self) {
        let mut notified = self.notified.lock();
        if !*notified {
            *notified = true;
            self.condvar.notify_one();
        }
    }

    /// Waits using this semaphore's configured default timeout. Main-thread-only, not
    /// reentrant (callers are expected to use this from a single owning-thread loop).
    pub fn timedwait(&self) -> bool {
        self.timedwait_for(self.default_timeout)
    }

    /// Waits up to `(secs, nanos)`, normalizing an overlong nanosecond component into
    /// whole seconds instead of panicking on it (`Duration::new` would otherwise be
    /// handed a value it can represent either way, but the normalization matches the
    /// documented "insane values do not crash" contract explicitly rather than by
    /// accident of `Duration`'s own tolerance).
    pub fn timedwait_secs_ns(&self, secs: u64, nanos: u64) -> bool {
        let overflow_secs = nanos / 1_000_000_000;
        let nanos = (nanos % 1_000_000_000) as u32;
        self.timedwait_for(Duration::new(secs.saturating_add(overflow_secs), nanos))
    }

    /// Returns `true` if woken by a notify (consuming it), `false` on timeout. Spurious
    /// wakes from the underlying condvar are absorbed here rather than surfaced: a
    /// `parking_lot::Condvar` wait never returns spuriously per its own contract, but
    /// we still re-check the flag after waking rather than trusting the wait result
    /// alone, since the flag is the actual source of truth.
    pub fn timedwait_for(&self, timeout: Duration) -> bool {
        let mut notified = self.notified.lock();
        if *notified {
            *notified = false;
            return true;
        }
        self.condvar.wait_for(&mut notified, timeout);
        let woke = *notified;
        *notified = false;
        woke
    }
}

#[cfg(test)]
#[path = "semaphore_tests.rs"]
mod tests;
