// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn none_is_sentinel() {
    assert!(EventId::NONE.is_none());
    assert!(EventId::default().is_none());
}

#[test]
fn constructed_ids_are_not_none() {
    assert!(!EventId::new(0).is_none());
    assert!(!EventId::new(41).is_none());
}

#[test]
fn ordering_follows_index() {
    assert!(EventId::new(1) < EventId::new(2));
}

#[test]
fn debug_shows_none_distinctly() {
    assert_eq!(format!("{:?}", EventId::NONE), "EventId(NONE)");
    assert_eq!(format!("{:?}", EventId::new(3)), "EventId(3)");
}
