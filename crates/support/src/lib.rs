// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Trivial stand-ins for the collaborators the propagation engine treats as external:
//! a type-erased shared-ownership data handle and a process-wide object registry.
//!
//! Neither of the three cores (`cascade-core`, `cascade-bridge`) depends on the
//! registry internally — it exists only as a convenience for host applications.

pub mod erased;
pub mod registry;

pub use erased::Erased;
pub use registry::ObjectRegistry;
