// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deferred dispatcher: a single-threaded priority FIFO that turns "fire handler"
//! decisions into cooperatively scheduled invocations.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

/// Dispatch priority. `Norm` is the default, matching the original's "absence means
/// normal priority" encoding — we still give it an explicit variant because an enum
/// with a `Default` impl reads better in Rust than reproducing an absence-encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Priority {
    Low,
    Norm,
    High,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Norm
    }
}

/// A weak reference to a scheduled callable. Invalidated (dropped) targets no-op
/// instead of running when the dispatcher gets to them.
pub type Entry = Weak<dyn Fn() + Send + Sync>;

/// A queued unit of work: either a weak-referenced, possibly-repeating handler entry
/// (the engine's use) or an owned one-shot callable with no invalidation concept (the
/// bridge's use, posting a background task's outcome back onto the owning thread).
enum QueueItem {
    Weak(Entry),
    Once(Box<dyn FnOnce() + Send>),
}

struct DispatcherInner {
    high: Mutex<VecDeque<QueueItem>>,
    norm: Mutex<VecDeque<QueueItem>>,
    low: Mutex<VecDeque<QueueItem>>,
    loop_req: Box<dyn Fn() + Send + Sync>,
}

/// A handle onto a [`Dispatcher`]'s queues that does not keep the dispatcher itself
/// alive. Scheduling code can hold onto one across shutdown: calling
/// [`LivenessToken::request_run`] after every `Dispatcher` clone has been dropped is
/// a documented no-op rather than a crash, which is the whole point of a liveness
/// token separate from the dispatcher's own memory (see module docs).
#[derive(Clone)]
pub struct LivenessToken(Weak<DispatcherInner>);

impl LivenessToken {
    /// Whether the dispatcher this token was taken from is still alive.
    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }

    /// Ask the dispatcher's host to run it soon, if the dispatcher still exists.
    pub fn request_run(&self) {
        if let Some(inner) = self.0.upgrade() {
            (inner.loop_req)();
        }
    }
}

/// Single-threaded priority FIFO of zero-arg callables.
///
/// Cloning a `Dispatcher` is cheap and shares the same underlying queues (it is an
/// `Arc` handle), matching the way the teacher's `Scheduler` is passed around as
/// `Arc<Mutex<Scheduler>>` rather than being duplicated.
#[derive(Clone)]
pub struct Dispatcher(Arc<DispatcherInner>);

impl Dispatcher {
    /// `loop_req` is the host hook invoked on a 0→1 transition of the queues: "please
    /// arrange for `run_all` to be called again on the owning thread soon".
    pub fn new(loop_req: impl Fn() + Send + Sync + 'static) -> Self {
        Self(Arc::new(DispatcherInner {
            high: Mutex::new(VecDeque::new()),
            norm: Mutex::new(VecDeque::new()),
            low: Mutex::new(VecDeque::new()),
            loop_req: Box::new(loop_req),
        }))
    }

    /// A weak-referenced handle safe to retain past this dispatcher's destruction.
    pub fn liveness_token(&self) -> LivenessToken {
        LivenessToken(Arc::downgrade(&self.0))
    }

    fn queue(&self, priority: Priority) -> &Mutex<VecDeque<QueueItem>> {
        match priority {
            Priority::High => &self.0.high,
            Priority::Norm => &self.0.norm,
            Priority::Low => &self.0.low,
        }
    }

    /// Enqueues a weak reference to a callable at the given priority. If the target
    /// has since been invalidated (its owning `Arc` dropped), the entry silently
    /// no-ops when the dispatcher gets to it.
    pub fn post(&self, f: Entry, priority: Priority) {
        let was_empty = !self.has_msg();
        self.queue(priority).lock().push_back(QueueItem::Weak(f));
        if was_empty {
            (self.0.loop_req)();
        }
    }

    /// Enqueues an owned, run-exactly-once callable. Unlike [`Dispatcher::post`] there
    /// is no invalidation story here: nothing else holds this closure, so it always
    /// runs when the dispatcher gets to it. Used by the bridge crate to hand a
    /// background task's outcome back to the owning thread without requiring the
    /// caller to keep an `Arc` alive just to satisfy `post`'s weak-reference contract.
    pub fn post_once(&self, f: impl FnOnce() + Send + 'static, priority: Priority) {
        let was_empty = !self.has_msg();
        self.queue(priority).lock().push_back(QueueItem::Once(Box::new(f)));
        if was_empty {
            (self.0.loop_req)();
        }
    }

    /// Drains HIGH fully, then NORM fully, then at most one LOW entry. If anything
    /// remains afterward, asks the host to re-hook rather than looping further here
    /// — this is what throttles LOW messages to one per host-invocation slot.
    pub fn run_all(&self) {
        self.drain_all(Priority::High);
        self.drain_all(Priority::Norm);
        self.drain_one(Priority::Low);
        if self.has_msg() {
            (self.0.loop_req)();
        }
    }

    fn drain_all(&self, priority: Priority) {
        loop {
            let entry = self.queue(priority).lock().pop_front();
            match entry {
                Some(item) => self.invoke(item),
                None => break,
            }
        }
    }

    fn drain_one(&self, priority: Priority) {
        if let Some(item) = self.queue(priority).lock().pop_front() {
            self.invoke(item);
        }
    }

    fn invoke(&self, entry: QueueItem) {
        let panicked = match entry {
            QueueItem::Weak(weak) => match weak.upgrade() {
                Some(f) => catch_unwind(AssertUnwindSafe(|| f())).is_err(),
                None => false,
            },
            QueueItem::Once(f) => catch_unwind(AssertUnwindSafe(move || f())).is_err(),
        };
        if panicked {
            tracing::debug!("dispatcher: scheduled callable panicked, continuing");
        }
    }

    pub fn n_msg(&self, priority: Priority) -> usize {
        self.queue(priority).lock().len()
    }

    pub fn has_msg(&self) -> bool {
        self.n_msg(Priority::High) + self.n_msg(Priority::Norm) + self.n_msg(Priority::Low) > 0
    }

    /// Always `true` while this handle exists; kept for parity with the original
    /// contract's `isValid()` — a live `Dispatcher` value is, by construction,
    /// always backed by live queues.
    pub fn is_valid(&self) -> bool {
        true
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
