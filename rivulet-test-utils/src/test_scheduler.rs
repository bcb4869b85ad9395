// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Scheduler with a virtual clock.

use parking_lot::Mutex;
use rivulet_core::{CancellationToken, Scheduler, Task};
use std::time::Duration;

struct Scheduled {
    due: Duration,
    seq: u64,
    task: Task,
    token: CancellationToken,
}

#[derive(Default)]
struct Clock {
    now: Duration,
    seq: u64,
    queue: Vec<Scheduled>,
}

/// A [`Scheduler`] whose time only moves when the test says so.
///
/// Tasks never run inside `schedule`; they run on the thread calling
/// [`advance_by`](Self::advance_by), in due-time order (ties in scheduling
/// order), with the clock set to their due time.
///
/// ```rust
/// use rivulet_core::Scheduler;
/// use rivulet_test_utils::TestScheduler;
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let scheduler = TestScheduler::new();
/// let ran = Arc::new(AtomicBool::new(false));
/// let flag = ran.clone();
///
/// scheduler.schedule(Box::new(move || flag.store(true, Ordering::SeqCst)), Duration::from_secs(5));
///
/// scheduler.advance_by(Duration::from_secs(4));
/// assert!(!ran.load(Ordering::SeqCst));
///
/// scheduler.advance_by(Duration::from_secs(1));
/// assert!(ran.load(Ordering::SeqCst));
/// ```
#[derive(Default)]
pub struct TestScheduler {
    clock: Mutex<Clock>,
}

impl TestScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves the clock forward, running every task that falls due.
    pub fn advance_by(&self, delta: Duration) {
        let target = self.clock.lock().now + delta;

        while let Some(next) = self.pop_due(target) {
            if !next.token.is_cancelled() {
                (next.task)();
            }
        }

        let mut clock = self.clock.lock();
        if clock.now < target {
            clock.now = target;
        }
    }

    /// Runs the tasks due at the current time.
    pub fn trigger(&self) {
        self.advance_by(Duration::ZERO);
    }

    /// Number of tasks waiting, cancelled ones included.
    pub fn pending(&self) -> usize {
        self.clock.lock().queue.len()
    }

    fn pop_due(&self, target: Duration) -> Option<Scheduled> {
        let mut clock = self.clock.lock();
        let index = clock
            .queue
            .iter()
            .enumerate()
            .filter(|(_, s)| s.due <= target)
            .min_by_key(|(_, s)| (s.due, s.seq))
            .map(|(i, _)| i)?;
        let next = clock.queue.swap_remove(index);
        clock.now = next.due;
        Some(next)
    }
}

impl Scheduler for TestScheduler {
    fn schedule(&self, task: Task, delay: Duration) -> CancellationToken {
        let token = CancellationToken::new();
        let mut clock = self.clock.lock();
        let due = clock.now + delay;
        clock.seq += 1;
        let seq = clock.seq;
        clock.queue.push(Scheduled {
            due,
            seq,
            task,
            token: token.clone(),
        });
        token
    }

    fn now(&self) -> Duration {
        self.clock.lock().now
    }
}
