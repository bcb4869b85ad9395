// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crossbeam_queue::SegQueue;
use rivulet_core::{ActionQueue, WorkInProgress};
use rivulet_test_utils::TestScheduler;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

const THREADS: usize = 8;
const PER_THREAD: usize = 2_000;

#[test]
fn test_drain_delivers_every_contribution_with_a_single_worker() {
    // Arrange
    let wip = Arc::new(WorkInProgress::new());
    let queue = Arc::new(SegQueue::new());
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let inside = Arc::new(AtomicUsize::new(0));
    let max_inside = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(THREADS));

    // Act
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let (wip, queue, delivered) = (wip.clone(), queue.clone(), delivered.clone());
            let (inside, max_inside, barrier) = (inside.clone(), max_inside.clone(), barrier.clone());
            thread::spawn(move || {
                barrier.wait();
                for i in 0..PER_THREAD {
                    queue.push(t * PER_THREAD + i);
                    wip.drain(|| {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_inside.fetch_max(now, Ordering::SeqCst);
                        while let Some(v) = queue.pop() {
                            delivered.lock().unwrap().push(v);
                        }
                        inside.fetch_sub(1, Ordering::SeqCst);
                        ControlFlow::Continue(())
                    });
                }
            })
        })
        .collect();
    handles.into_iter().for_each(|h| h.join().unwrap());

    // Assert
    let mut delivered = delivered.lock().unwrap().clone();
    assert_eq!(delivered.len(), THREADS * PER_THREAD);
    assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    assert!(!wip.is_active());

    delivered.sort_unstable();
    assert_eq!(delivered, (0..THREADS * PER_THREAD).collect::<Vec<_>>());
}

#[test]
fn test_drain_preserves_program_order_of_each_producer() {
    // Arrange
    let wip = Arc::new(WorkInProgress::new());
    let queue = Arc::new(SegQueue::new());
    let delivered = Arc::new(Mutex::new(Vec::new()));

    // Act
    let handles: Vec<_> = (0..4)
        .map(|t| {
            let (wip, queue, delivered) = (wip.clone(), queue.clone(), delivered.clone());
            thread::spawn(move || {
                for i in 0..500 {
                    queue.push((t, i));
                    wip.drain(|| {
                        while let Some(v) = queue.pop() {
                            delivered.lock().unwrap().push(v);
                        }
                        ControlFlow::Continue(())
                    });
                }
            })
        })
        .collect();
    handles.into_iter().for_each(|h| h.join().unwrap());

    // Assert
    let delivered = delivered.lock().unwrap();
    for t in 0..4 {
        let own: Vec<_> = delivered.iter().filter(|(p, _)| *p == t).map(|(_, i)| *i).collect();
        assert_eq!(own, (0..500).collect::<Vec<_>>());
    }
}

#[test]
fn test_drain_break_discards_remaining_work() {
    // Arrange
    let wip = WorkInProgress::new();
    let queue = SegQueue::new();
    (1..=5).for_each(|v| queue.push(v));
    let mut delivered = Vec::new();

    // Act
    wip.drain(|| {
        while let Some(v) = queue.pop() {
            delivered.push(v);
            if v == 2 {
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    });
    queue.push(6);
    let reopened = wip.drain(|| {
        while let Some(v) = queue.pop() {
            delivered.push(v);
        }
        ControlFlow::Continue(())
    });

    // Assert
    assert_eq!(delivered, vec![1, 2]);
    assert!(!reopened);
    assert!(wip.is_active());
}

#[test]
fn test_action_queue_runs_actions_in_fifo_order() {
    // Arrange
    let queue = ActionQueue::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    // Act
    for i in 0..5 {
        let log = log.clone();
        queue.enqueue(move || log.lock().unwrap().push(i));
    }
    queue.try_drain();

    // Assert
    assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    assert!(queue.is_empty());
}

#[test]
fn test_action_queue_reentrant_execute_does_not_recurse() {
    // Arrange
    let queue = Arc::new(ActionQueue::new());
    let log = Arc::new(Mutex::new(Vec::new()));

    // Act
    let (inner_queue, inner_log) = (queue.clone(), log.clone());
    queue.execute(move || {
        inner_log.lock().unwrap().push("outer start");
        let nested_log = inner_log.clone();
        inner_queue.execute(move || nested_log.lock().unwrap().push("nested"));
        inner_log.lock().unwrap().push("outer end");
    });

    // Assert
    assert_eq!(*log.lock().unwrap(), vec!["outer start", "outer end", "nested"]);
}

#[test]
fn test_action_queue_cancel_drops_pending_actions() {
    // Arrange
    let queue = ActionQueue::new();
    let ran = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
        let ran = ran.clone();
        queue.enqueue(move || {
            ran.fetch_add(1, Ordering::SeqCst);
        });
    }

    // Act
    queue.cancel();
    queue.try_drain();
    let late = ran.clone();
    queue.execute(move || {
        late.fetch_add(1, Ordering::SeqCst);
    });

    // Assert
    assert_eq!(ran.load(Ordering::SeqCst), 0);
    assert!(queue.is_cancelled());
    assert!(queue.is_empty());
}

#[test]
fn test_action_queue_drains_on_scheduler() {
    // Arrange
    let scheduler = TestScheduler::new();
    let queue = Arc::new(ActionQueue::new());
    let ran = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
        let ran = ran.clone();
        queue.enqueue(move || {
            ran.fetch_add(1, Ordering::SeqCst);
        });
    }

    // Act
    let token = queue.try_drain_on(&scheduler);
    let second = queue.try_drain_on(&scheduler);

    // Assert
    assert!(token.is_some());
    assert!(second.is_none());
    assert_eq!(ran.load(Ordering::SeqCst), 0);

    scheduler.advance_by(Duration::ZERO);
    assert_eq!(ran.load(Ordering::SeqCst), 3);
}
