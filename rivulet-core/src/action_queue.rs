// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Serialized executor for closures.
//!
//! Actions enqueued from any thread run one at a time, in FIFO order, on whichever
//! thread wins the drain. Reentrant `enqueue` + `try_drain` from inside an action
//! does not recurse: the new action runs after the current one returns.

use crate::{CancellationToken, Scheduler, WorkInProgress};
use crossbeam_queue::SegQueue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type Action = Box<dyn FnOnce() + Send + 'static>;

/// Queue of actions with single-worker execution.
#[derive(Default)]
pub struct ActionQueue {
    wip: WorkInProgress,
    queue: SegQueue<Action>,
    cancelled: AtomicBool,
}

impl ActionQueue {
    /// An empty, active queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an action. Dropped silently once the queue is cancelled.
    pub fn enqueue<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if !self.is_cancelled() {
            self.queue.push(Box::new(action));
        }
    }

    /// Enqueues `action` and drains on the calling thread.
    pub fn execute<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(action);
        self.try_drain();
    }

    /// Runs queued actions if no other thread is doing so.
    pub fn try_drain(&self) {
        if self.is_cancelled() || !self.wip.enter() {
            return;
        }
        self.run_loop();
    }

    /// Like [`try_drain`](Self::try_drain) but runs the loop on `scheduler`.
    ///
    /// Returns `None` if another worker is already active, otherwise the token of
    /// the scheduled drain. Cancelling that token does not cancel the queue.
    pub fn try_drain_on(self: &Arc<Self>, scheduler: &dyn Scheduler) -> Option<CancellationToken> {
        if self.is_cancelled() || !self.wip.enter() {
            return None;
        }
        let this = Arc::clone(self);
        Some(scheduler.schedule_now(Box::new(move || this.run_loop())))
    }

    /// Stops execution and discards pending actions.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            self.clear();
        }
    }

    /// Returns `true` once cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Number of actions waiting to run.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Returns `true` if nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn run_loop(&self) {
        loop {
            if self.is_cancelled() {
                self.clear();
                return;
            }
            if let Some(action) = self.queue.pop() {
                action();
            }
            if self.wip.leave(1) == 0 {
                // Actions enqueued without a matching drain wait for the next one
                if self.queue.is_empty() || !self.wip.enter() {
                    return;
                }
            }
        }
    }

    fn clear(&self) {
        while self.queue.pop().is_some() {}
    }
}

impl std::fmt::Debug for ActionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionQueue")
            .field("pending", &self.len())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
