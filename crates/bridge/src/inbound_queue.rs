// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! MPSC inbound queue of type-erased payloads.
//!
//! Producers on any thread push with [`InboundQueue::try_push`]; the consumer runs on
//! the owning thread and drains with [`InboundQueue::pop`] or [`InboundQueue::handle_all`].
//!
//! Two regions back the queue: a mutex-protected `inbound` region that producers
//! contend, and a `cache` region touched only by the consumer. A successful `pop`
//! swaps the whole `inbound` region into `cache` in O(1) under one lock acquisition,
//! then drains `cache` without re-locking until it runs dry. `cache` is guarded by its
//! own mutex purely so the type is `Sync` — in practice only the consumer thread ever
//! touches it, so that lock is never contended.

use std::any::TypeId;
use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use cascade_support::Erased;

use crate::semaphore::WakeupSemaphore;

type Handler = Arc<dyn Fn(Erased) + Send + Sync>;

pub struct InboundQueue {
    inbound: Mutex<VecDeque<(Erased, TypeId)>>,
    cache: Mutex<VecDeque<(Erased, TypeId)>>,
    handlers: RwLock<HashMap<TypeId, Handler>>,
    wakeup: Arc<WakeupSemaphore>,
}

impl InboundQueue {
    pub fn new(wakeup: Arc<WakeupSemaphore>) -> Self {
        Self {
            inbound: Mutex::new(VecDeque::new()),
            cache: Mutex::new(VecDeque::new()),
            handlers: RwLock::new(HashMap::new()),
            wakeup,
        }
    }

    /// Registers a per-type handler, replacing any previous handler for `T`.
    pub fn set_handler<T: std::any::Any + Send + Sync + 'static>(
        &self,
        f: impl Fn(Arc<T>) + Send + Sync + 'static,
    ) {
        self.handlers.write().insert(
            TypeId::of::<T>(),
            Arc::new(move |payload: Erased| {
                if let Some(value) = payload.downcast::<T>() {
                    f(value);
                }
            }),
        );
    }

    /// Pushes a payload from any thread. Rejects (returns `false`) a payload with
    /// outstanding aliases: the producer must hand over a uniquely-owned reference so
    /// nothing can mutate it concurrently via a second handle after the hand-off.
    /// Every accepted push notifies the wakeup semaphore.
    pub fn try_push(&self, payload: Erased) -> bool {
        if payload.ref_count() != 1 {
            tracing::warn!("inbound queue: rejected payload with outstanding aliases");
            return false;
        }
        let type_id = payload.type_id();
        self.inbound.lock().push_back((payload, type_id));
        self.wakeup.notify();
        true
    }

    /// Pops one payload without blocking the consumer thread. Tries the cache first;
    /// on a cache miss, tries (never blocks on) the inbound lock. If a producer holds
    /// it, returns `None`, re-notifies the semaphore so the wake is not wasted, and
    /// yields.
    pub fn pop(&self) -> Option<Erased> {
        if let Some((item, _)) = self.cache.lock().pop_front() {
            return Some(item);
        }
        match self.inbound.try_lock() {
            Some(mut inbound) => {
                if inbound.is_empty() {
                    return None;
                }
                std::mem::swap(&mut *self.cache.lock(), &mut inbound);
                drop(inbound);
                self.cache.lock().pop_front().map(|(item, _)| item)
            }
            None => {
                self.wakeup.notify();
                std::thread::yield_now();
                None
            }
        }
    }

    /// Drains the queue fully, dispatching each element to its registered per-type
    /// handler. Unregistered types are dropped with a warning. Handler panics are
    /// caught and logged; the drain continues. Returns the number of elements handled.
    pub fn handle_all(&self) -> usize {
        let mut count = 0;
        while let Some((item, type_id)) = self.next_blocking() {
            self.dispatch_one(item, type_id);
            count += 1;
        }
        count
    }

    /// Like `pop`'s cache-then-inbound path, but takes the inbound lock (rather than
    /// `try_lock`) since `handle_all` is an intentional full drain, not a
    /// never-block-the-consumer poll.
    fn next_blocking(&self) -> Option<(Erased, TypeId)> {
        if let Some(item) = self.cache.lock().pop_front() {
            return Some(item);
        }
        let mut inbound = self.inbound.lock();
        if inbound.is_empty() {
            return None;
        }
        std::mem::swap(&mut *self.cache.lock(), &mut inbound);
        drop(inbound);
        self.cache.lock().pop_front()
    }

    fn dispatch_one(&self, item: Erased, type_id: TypeId) {
        let handler = self.handlers.read().get(&type_id).cloned();
        match handler {
            Some(f) => {
                if catch_unwind(AssertUnwindSafe(|| f(item))).is_err() {
                    tracing::debug!("inbound queue: handler panicked, continuing");
                }
            }
            None => tracing::warn!("inbound queue: dropping payload with no registered handler"),
        }
    }

    /// `blocking = true` acquires the inbound lock for an exact count; `blocking =
    /// false` returns the cache size plus the inbound size only if uncontested,
    /// otherwise just the cache size (a best-effort read, matching the non-blocking
    /// contract).
    pub fn size(&self, blocking: bool) -> usize {
        let cache_len = self.cache.lock().len();
        if blocking {
            cache_len + self.inbound.lock().len()
        } else {
            match self.inbound.try_lock() {
                Some(inbound) => cache_len + inbound.len(),
                None => cache_len,
            }
        }
    }

    /// Purges both regions and all handler registrations.
    pub fn clear(&self) {
        self.cache.lock().clear();
        self.inbound.lock().clear();
        self.handlers.write().clear();
    }
}

#[cfg(test)]
#[path = "inbound_queue_tests.rs"]
mod tests;
