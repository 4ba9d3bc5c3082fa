// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! cascade-bridge: the cross-thread handoff layer between background workers and the
//! owning thread that drives [`cascade_core::Engine`] and [`cascade_core::Dispatcher`].
//!
//! Three pieces, composed by the host's main loop as `{drain tracker; drain inbound
//! queue; drain dispatcher; timedwait}`:
//!
//! - [`WakeupSemaphore`] rouses the owning thread, collapsing bursts of notifies.
//! - [`InboundQueue`] carries type-erased payloads from any thread to the owning
//!   thread's per-type handlers.
//! - [`WorkerCompletionTracker`] runs background tasks and polls their results back.
//!
//! [`via_dispatcher`] lifts a tracker's `back_fn(bool)` into the dispatcher's priority
//! FIFO, so background completions observe the same ordering as everything else.

pub mod error;
pub mod inbound_queue;
pub mod semaphore;
pub mod tracker;
pub mod via_dispatcher;

pub use error::BridgeError;
pub use inbound_queue::InboundQueue;
pub use semaphore::{SemaphoreConfig, WakeupSemaphore};
pub use tracker::{AsyncScheduler, PoolConfig, PoolScheduler, TaskScheduler, WorkerCompletionTracker};
pub use via_dispatcher::via_dispatcher;
