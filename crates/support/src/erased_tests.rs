// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn downcast_matching_type_succeeds() {
    let e = Erased::new(42u32);
    assert_eq!(*e.downcast::<u32>().unwrap(), 42);
}

#[test]
fn downcast_mismatched_type_returns_none() {
    let e = Erased::new(42u32);
    assert!(e.downcast::<String>().is_none());
}

#[test]
fn is_reports_runtime_type() {
    let e = Erased::new("hello".to_string());
    assert!(e.is::<String>());
    assert!(!e.is::<u32>());
}

#[test]
fn clone_shares_ownership() {
    let e = Erased::new(vec![1, 2, 3]);
    assert_eq!(e.ref_count(), 1);
    let e2 = e.clone();
    assert_eq!(e.ref_count(), 2);
    drop(e2);
    assert_eq!(e.ref_count(), 1);
}

#[test]
fn type_id_distinguishes_concrete_types() {
    let a = Erased::new(1u32);
    let b = Erased::new("x".to_string());
    assert_ne!(a.type_id(), b.type_id());
    assert_eq!(a.type_id(), Erased::new(2u32).type_id());
}

#[test]
fn replacement_by_new_value_is_independent() {
    let a = Erased::new(1u32);
    let b = Erased::new(2u32);
    assert_eq!(*a.downcast::<u32>().unwrap(), 1);
    assert_eq!(*b.downcast::<u32>().unwrap(), 2);
}
