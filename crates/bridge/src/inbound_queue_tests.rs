// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::semaphore::SemaphoreConfig;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex as StdMutex;
use std::thread;
use std::time::Duration;

fn queue() -> InboundQueue {
    InboundQueue::new(Arc::new(WakeupSemaphore::new(SemaphoreConfig::default())))
}

#[test]
fn push_then_pop_round_trips_a_value() {
    let q = queue();
    assert!(q.try_push(Erased::new(42u32)));
    let popped = q.pop().unwrap();
    assert_eq!(*popped.downcast::<u32>().unwrap(), 42);
}

#[test]
fn pop_on_empty_queue_returns_none() {
    let q = queue();
    assert!(q.pop().is_none());
}

#[test]
fn try_push_rejects_aliased_payload() {
    let q = queue();
    let payload = Erased::new(1u32);
    let _alias = payload.clone();
    assert!(!q.try_push(payload));
    assert_eq!(q.size(true), 0);
}

#[test]
fn push_order_is_preserved_by_a_single_producer() {
    let q = queue();
    for i in 0..5u32 {
        assert!(q.try_push(Erased::new(i)));
    }
    let mut seen = Vec::new();
    while let Some(item) = q.pop() {
        seen.push(*item.downcast::<u32>().unwrap());
    }
    assert_eq!(seen, vec![0, 1, 2, 3, 4]);
}

#[test]
fn handle_all_dispatches_to_registered_handler_and_drops_unregistered() {
    let q = queue();
    let seen = Arc::new(StdMutex::new(Vec::new()));
    let seen2 = seen.clone();
    q.set_handler::<u32>(move |v| seen2.lock().unwrap().push(*v));

    assert!(q.try_push(Erased::new(7u32)));
    assert!(q.try_push(Erased::new("unregistered".to_string())));
    assert!(q.try_push(Erased::new(8u32)));

    let handled = q.handle_all();
    assert_eq!(handled, 3);
    assert_eq!(*seen.lock().unwrap(), vec![7, 8]);
}

#[test]
fn panicking_handler_does_not_stop_the_drain() {
    let q = queue();
    let calls = Arc::new(AtomicUsize::new(0));
    q.set_handler::<&'static str>(|_| panic!("boom"));
    let calls2 = calls.clone();
    q.set_handler::<u32>(move |_| { calls2.fetch_add(1, Ordering::SeqCst); });

    assert!(q.try_push(Erased::new("trigger")));
    assert!(q.try_push(Erased::new(1u32)));
    assert_eq!(q.handle_all(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn clear_purges_both_regions_and_handlers() {
    let q = queue();
    let calls = Arc::new(AtomicUsize::new(0));
    let c = calls.clone();
    q.set_handler::<u32>(move |_| { c.fetch_add(1, Ordering::SeqCst); });
    q.try_push(Erased::new(1u32));
    q.clear();
    assert_eq!(q.size(true), 0);
    q.try_push(Erased::new(2u32));
    assert_eq!(q.handle_all(), 1);
    // handler was cleared too, so nothing was recorded despite the dispatch.
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn multiple_producer_threads_preserve_each_producers_own_order() {
    let q = Arc::new(queue());
    let mut handles = Vec::new();
    for producer in 0..4u32 {
        let q = q.clone();
        handles.push(thread::spawn(move || {
            for i in 0..50u32 {
                while !q.try_push(Erased::new((producer, i))) {
                    thread::yield_now();
                }
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }

    let mut last_seen = [None; 4];
    let mut total = 0;
    loop {
        match q.pop() {
            Some(item) => {
                let (producer, i) = *item.downcast::<(u32, u32)>().unwrap();
                if let Some(prev) = last_seen[producer as usize] {
                    assert!(i > prev, "producer {producer} delivered out of order");
                }
                last_seen[producer as usize] = Some(i);
                total += 1;
            }
            None => {
                if total == 200 {
                    break;
                }
                thread::sleep(Duration::from_millis(1));
            }
        }
    }
}
