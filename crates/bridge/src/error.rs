// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy for the cross-thread handoff layer.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BridgeError {
    #[error("entry function passed to new_task must not be a no-op placeholder")]
    NullEntryFn,
    #[error("back function passed to new_task must not be a no-op placeholder")]
    NullBackFn,
}
