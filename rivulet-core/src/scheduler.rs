// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::CancellationToken;
use std::time::Duration;

/// Unit of work handed to a scheduler.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Time and deferred execution, provided by the embedding runtime.
///
/// The core never sleeps or blocks; anything time-based goes through this trait.
/// `rivulet-runtime` implements it on tokio and `rivulet-test-utils` provides a
/// virtual clock.
pub trait Scheduler: Send + Sync {
    /// Runs `task` after `delay`. Cancelling the returned token before the task
    /// starts prevents it from running.
    fn schedule(&self, task: Task, delay: Duration) -> CancellationToken;

    /// Monotonic time since the scheduler's epoch.
    fn now(&self) -> Duration;

    /// Runs `task` as soon as possible.
    fn schedule_now(&self, task: Task) -> CancellationToken {
        self.schedule(task, Duration::ZERO)
    }
}
