// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bridge helper that lifts a worker-completion `back_fn(bool)` into the dispatcher's
//! priority FIFO, so a background completion is never observed by application code
//! ahead of the engine's own handler ordering.

use std::sync::Arc;

use cascade_core::{Dispatcher, Priority};

/// Wraps `back_fn` so that, when invoked by the tracker on the owning thread, it
/// instead posts a zero-arg call to `dispatcher` at `priority`. `back_fn` itself only
/// runs once the dispatcher gets to that posted entry.
pub fn via_dispatcher(
    dispatcher: Dispatcher,
    priority: Priority,
    back_fn: impl Fn(bool) + Send + Sync + 'static,
) -> impl Fn(bool) + Send + Sync + 'static {
    let back_fn = Arc::new(back_fn);
    move |result: bool| {
        let dispatcher = dispatcher.clone();
        let back_fn = back_fn.clone();
        dispatcher.post_once(move || back_fn(result), priority);
    }
}

#[cfg(test)]
#[path = "via_dispatcher_tests.rs"]
mod tests;
