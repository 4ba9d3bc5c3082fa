// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};

fn counting_hook() -> (Box<dyn Fn() + Send + Sync>, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    (Box::new(move || { c.fetch_add(1, Ordering::SeqCst); }), count)
}

#[test]
fn post_triggers_hook_only_on_0_to_1_transition() {
    let (hook, hook_calls) = counting_hook();
    let d = Dispatcher::new(move || hook());
    let f: Arc<dyn Fn() + Send + Sync> = Arc::new(|| {});
    d.post(Arc::downgrade(&f), Priority::Norm);
    d.post(Arc::downgrade(&f), Priority::Norm);
    d.post(Arc::downgrade(&f), Priority::Norm);
    assert_eq!(hook_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn run_all_drains_high_before_norm_before_low() {
    let d = Dispatcher::new(|| {});
    let order = Arc::new(Mutex::new(Vec::new()));
    let mut keep_alive = Vec::new();
    let mut post = |label: &'static str, p: Priority| {
        let order = order.clone();
        let f: Arc<dyn Fn() + Send + Sync> = Arc::new(move || order.lock().push(label));
        d.post(Arc::downgrade(&f), p);
        keep_alive.push(f);
    };
    post("low1", Priority::Low);
    post("norm1", Priority::Norm);
    post("high1", Priority::High);
    post("norm2", Priority::Norm);
    post("high2", Priority::High);

    d.run_all();
    assert_eq!(*order.lock(), vec!["high1", "high2", "norm1", "norm2", "low1"]);
}

#[test]
fn low_priority_throttled_to_one_per_run_all() {
    let d = Dispatcher::new(|| {});
    let order = Arc::new(Mutex::new(Vec::new()));
    let mut keep_alive = Vec::new();
    for label in ["low1", "low2", "low3"] {
        let order = order.clone();
        let f: Arc<dyn Fn() + Send + Sync> = Arc::new(move || order.lock().push(label));
        d.post(Arc::downgrade(&f), Priority::Low);
        keep_alive.push(f);
    }

    d.run_all();
    assert_eq!(*order.lock(), vec!["low1"]);
    d.run_all();
    assert_eq!(*order.lock(), vec!["low1", "low2"]);
    d.run_all();
    assert_eq!(*order.lock(), vec!["low1", "low2", "low3"]);
}

#[test]
fn invalidated_entry_no_ops_instead_of_running() {
    let d = Dispatcher::new(|| {});
    let ran = Arc::new(AtomicUsize::new(0));
    {
        let ran = ran.clone();
        let f: Arc<dyn Fn() + Send + Sync> = Arc::new(move || { ran.fetch_add(1, Ordering::SeqCst); });
        d.post(Arc::downgrade(&f), Priority::Norm);
        // `f` dropped here: the posted weak reference dangles.
    }
    d.run_all();
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[test]
fn panicking_entry_does_not_stop_the_drain() {
    let d = Dispatcher::new(|| {});
    let ran = Arc::new(AtomicUsize::new(0));
    let panics: Arc<dyn Fn() + Send + Sync> = Arc::new(|| panic!("boom"));
    let ran2 = ran.clone();
    let good: Arc<dyn Fn() + Send + Sync> = Arc::new(move || { ran2.fetch_add(1, Ordering::SeqCst); });
    d.post(Arc::downgrade(&panics), Priority::Norm);
    d.post(Arc::downgrade(&good), Priority::Norm);
    d.run_all();
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[test]
fn liveness_token_no_ops_after_dispatcher_dropped() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls2 = calls.clone();
    let d = Dispatcher::new(move || { calls2.fetch_add(1, Ordering::SeqCst); });
    let token = d.liveness_token();
    assert!(token.is_alive());
    drop(d);
    assert!(!token.is_alive());
    token.request_run();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn post_once_runs_the_owned_callable_exactly_once() {
    let d = Dispatcher::new(|| {});
    let ran = Arc::new(AtomicUsize::new(0));
    let ran2 = ran.clone();
    d.post_once(move || { ran2.fetch_add(1, Ordering::SeqCst); }, Priority::Norm);
    d.run_all();
    assert_eq!(ran.load(Ordering::SeqCst), 1);
    d.run_all();
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

#[test]
fn n_msg_and_has_msg_report_queue_state() {
    let d = Dispatcher::new(|| {});
    assert!(!d.has_msg());
    let f: Arc<dyn Fn() + Send + Sync> = Arc::new(|| {});
    d.post(Arc::downgrade(&f), Priority::High);
    assert!(d.has_msg());
    assert_eq!(d.n_msg(Priority::High), 1);
    assert_eq!(d.n_msg(Priority::Low), 0);
}
