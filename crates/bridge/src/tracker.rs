// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker-completion tracker: launches background tasks and polls their results back
//! onto the owning thread.
//!
//! `entry_fn` runs on a background worker and returns a `bool`; `back_fn` runs on the
//! owning thread once `handle_finished_tasks` observes the result. The two concrete
//! schedulers below (`AsyncScheduler`, `PoolScheduler`) differ only in how `entry_fn`
//! gets a thread to run on.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use parking_lot::{Condvar, Mutex};

use crate::error::BridgeError;
use crate::semaphore::WakeupSemaphore;

type Entry = Box<dyn FnOnce() -> bool + Send + 'static>;
type Back = Box<dyn FnOnce(bool) + Send + 'static>;

#[derive(Clone)]
struct TaskSlot(Arc<Mutex<Option<bool>>>);

impl TaskSlot {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(None)))
    }

    fn set(&self, result: bool) {
        *self.0.lock() = Some(result);
    }

    fn poll(&self) -> Option<bool> {
        self.0.lock().take()
    }
}

/// Implemented by the concrete schedulers. `spawn` runs `entry` to completion on
/// whatever background thread the scheduler provides and returns a slot the tracker
/// polls for the result.
pub trait TaskScheduler: Send + Sync {
    fn spawn(&self, entry: Entry) -> TaskSlotHandle;
}

/// Opaque handle returned by a scheduler; only the tracker polls it.
pub struct TaskSlotHandle(TaskSlot);

fn run_entry_catching_panics(entry: Entry) -> bool {
    catch_unwind(AssertUnwindSafe(entry)).unwrap_or_else(|_| {
        tracing::debug!("worker-completion tracker: entry_fn panicked, treating as failure");
        false
    })
}

/// One OS thread per submitted task. Destruction blocks until every outstanding task
/// has completed, matching the documented contract exactly.
pub struct AsyncScheduler {
    wakeup: Arc<WakeupSemaphore>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl AsyncScheduler {
    pub fn new(wakeup: Arc<WakeupSemaphore>) -> Self {
        Self { wakeup, handles: Mutex::new(Vec::new()) }
    }
}

impl TaskScheduler for AsyncScheduler {
    fn spawn(&self, entry: Entry) -> TaskSlotHandle {
        let slot = TaskSlot::new();
        let slot2 = slot.clone();
        let wakeup = self.wakeup.clone();
        let handle = thread::spawn(move || {
            let result = run_entry_catching_panics(entry);
            slot2.set(result);
            wakeup.notify();
        });
        self.handles.lock().push(handle);
        TaskSlotHandle(slot)
    }
}

impl Drop for AsyncScheduler {
    fn drop(&mut self) {
        for handle in self.handles.get_mut().drain(..) {
            let _ = handle.join();
        }
    }
}

/// Builder-style configuration for [`PoolScheduler`], matching the teacher's small
/// `*Config` struct convention.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub workers: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

struct Job {
    entry: Entry,
    slot: TaskSlot,
}

struct PoolState {
    queue: Mutex<VecDeque<Job>>,
    condvar: Condvar,
    stop: AtomicBool,
    done: AtomicUsize,
}

/// Fixed worker pool; submissions queue on an internal task queue guarded by a
/// mutex+condvar. Destruction sets the stop flag, broadcasts, and joins all workers.
pub struct PoolScheduler {
    state: Arc<PoolState>,
    wakeup: Arc<WakeupSemaphore>,
    workers: Vec<JoinHandle<()>>,
}

impl PoolScheduler {
    pub fn new(config: PoolConfig, wakeup: Arc<WakeupSemaphore>) -> Self {
        let n = if config.workers == 0 {
            tracing::warn!("pool scheduler: 0 workers requested, coercing to 1");
            1
        } else {
            config.workers
        };
        let state = Arc::new(PoolState {
            queue: Mutex::new(VecDeque::new()),
            condvar: Condvar::new(),
            stop: AtomicBool::new(false),
            done: AtomicUsize::new(0),
        });
        let workers = (0..n)
            .map(|_| {
                let state = state.clone();
                let wakeup = wakeup.clone();
                thread::spawn(move || pool_worker_loop(state, wakeup))
            })
            .collect();
        Self { state, wakeup, workers }
    }

    /// Number of tasks this pool has completed so far, across all workers.
    pub fn completed_count(&self) -> usize {
        self.state.done.load(Ordering::SeqCst)
    }
}

fn pool_worker_loop(state: Arc<PoolState>, wakeup: Arc<WakeupSemaphore>) {
    loop {
        let mut queue = state.queue.lock();
        let job = loop {
            if let Some(job) = queue.pop_front() {
                break job;
            }
            if state.stop.load(Ordering::SeqCst) {
                return;
            }
            // Spurious wakes just re-check the condition above; no special handling.
            state.condvar.wait(&mut queue);
        };
        drop(queue);

        let result = run_entry_catching_panics(job.entry);
        job.slot.set(result);
        state.done.fetch_add(1, Ordering::SeqCst);
        wakeup.notify();
    }
}

impl TaskScheduler for PoolScheduler {
    fn spawn(&self, entry: Entry) -> TaskSlotHandle {
        let slot = TaskSlot::new();
        let job = Job { entry, slot: slot.clone() };
        self.state.queue.lock().push_back(job);
        self.state.condvar.notify_one();
        TaskSlotHandle(slot)
    }
}

impl Drop for PoolScheduler {
    fn drop(&mut self) {
        // The stop flag is observed under the same mutex that guards the queue, so a
        // notify issued here is never lost to a worker that is mid-check.
        {
            let _queue = self.state.queue.lock();
            self.state.stop.store(true, Ordering::SeqCst);
        }
        self.state.condvar.notify_all();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

struct PendingTask {
    slot: TaskSlot,
    back_fn: Back,
}

/// Stores future/back-fn pairs submitted via `new_task` and drains completed ones on
/// the owning thread.
pub struct WorkerCompletionTracker<S: TaskScheduler> {
    scheduler: S,
    pending: Mutex<Vec<PendingTask>>,
    created_on: ThreadId,
}

impl<S: TaskScheduler> WorkerCompletionTracker<S> {
    pub fn new(scheduler: S) -> Self {
        Self { scheduler, pending: Mutex::new(Vec::new()), created_on: thread::current().id() }
    }

    /// Submits a task: `entry_fn` runs on a background worker, `back_fn` runs on the
    /// owning thread once `handle_finished_tasks` observes completion.
    pub fn new_task(
        &self,
        entry_fn: impl FnOnce() -> bool + Send + 'static,
        back_fn: impl FnOnce(bool) + Send + 'static,
    ) {
        let slot = self.scheduler.spawn(Box::new(entry_fn));
        self.pending.lock().push(PendingTask { slot: slot.0, back_fn: Box::new(back_fn) });
    }

    /// `Option`-accepting variant realizing the documented "null entry_fn/back_fn is
    /// rejected" contract. Rust closures can never be null, so this exists purely for
    /// callers that assemble the pair dynamically and want the same rejection
    /// semantics rather than a type error.
    pub fn try_new_task(
        &self,
        entry_fn: Option<impl FnOnce() -> bool + Send + 'static>,
        back_fn: Option<impl FnOnce(bool) + Send + 'static>,
    ) -> Result<(), BridgeError> {
        let entry_fn = entry_fn.ok_or_else(|| {
            tracing::warn!("worker-completion tracker: rejected null entry_fn");
            BridgeError::NullEntryFn
        })?;
        let back_fn = back_fn.ok_or_else(|| {
            tracing::warn!("worker-completion tracker: rejected null back_fn");
            BridgeError::NullBackFn
        })?;
        self.new_task(entry_fn, back_fn);
        Ok(())
    }

    /// Drains by polling each stored future non-blockingly; for each ready one, invokes
    /// `back_fn(result)` on the owning thread. Returns the number handled. Only ever
    /// call this from the owning thread.
    pub fn handle_finished_tasks(&self) -> usize {
        let mut pending = self.pending.lock();
        let mut still_pending = Vec::with_capacity(pending.len());
        let mut finished = Vec::new();
        for task in pending.drain(..) {
            match task.slot.poll() {
                Some(result) => finished.push((task.back_fn, result)),
                None => still_pending.push(task),
            }
        }
        *pending = still_pending;
        drop(pending);

        let n = finished.len();
        for (back_fn, result) in finished {
            if catch_unwind(AssertUnwindSafe(|| back_fn(result))).is_err() {
                tracing::debug!("worker-completion tracker: back_fn panicked, continuing");
            }
        }
        n
    }

    /// Cheap re-entrancy guard: `true` iff called from the thread that constructed
    /// this tracker. Intended for defensive assertions at call sites, not for hot-path
    /// branching.
    pub fn in_my_main_th(&self) -> bool {
        thread::current().id() == self.created_on
    }
}

#[cfg(test)]
#[path = "tracker_tests.rs"]
mod tests;
