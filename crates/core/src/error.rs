// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy for the propagation core.
//!
//! Every variant here corresponds to a "constraint violation" or "invalid argument"
//! row of the error taxonomy: a local, recoverable failure. Lookup misses
//! (unknown event/name) are not represented here — they return `Option`/`bool`
//! per the engine's contract, since "unknown returns false/None" is documented
//! behavior, not a failure to propagate.

use crate::event_id::EventId;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("event {0:?} would create a self-loop")]
    SelfLoop(EventId),
    #[error("edge {from:?} -> {to:?} would create a cycle")]
    WouldCycle { from: EventId, to: EventId },
    #[error("handler already set for {0:?}")]
    HandlerExists(EventId),
    #[error("multi-handler alias {0:?} already names an event")]
    AliasExists(String),
    #[error("duplicate multi-handler name {0:?} on {1:?}")]
    DuplicateHandlerName(String, EventId),
    #[error("write-protect cannot be enabled: data already present on {0:?}")]
    WriteProtectWithData(EventId),
    #[error("cross-use of protected/unprotected data API on {0:?}")]
    ProtectionMismatch(EventId),
    #[error("null handler passed to {0}")]
    NullHandler(&'static str),
}
