// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use futures::future::{select, Either};
use rivulet_core::{CancellationToken, Scheduler, Task};
use std::pin::pin;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::Instant;

/// [`Scheduler`] spawning one tokio task per scheduled job.
///
/// Each job sleeps for its delay, racing the sleep against its cancellation
/// token; a job cancelled before it wakes up never runs. Time is measured from
/// the moment the scheduler was created, on tokio's clock.
#[derive(Clone, Debug)]
pub struct TokioScheduler {
    handle: Handle,
    epoch: Instant,
}

impl TokioScheduler {
    /// Schedules onto the runtime behind `handle`.
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            epoch: Instant::now(),
        }
    }

    /// Schedules onto the runtime the caller is running in, if any.
    pub fn try_current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, task: Task, delay: Duration) -> CancellationToken {
        let token = CancellationToken::new();
        let guard = token.clone();

        self.handle.spawn(async move {
            let sleep = pin!(tokio::time::sleep(delay));
            let cancelled = pin!(guard.cancelled());
            if let Either::Left(_) = select(sleep, cancelled).await {
                if !guard.is_cancelled() {
                    task();
                }
            }
        });

        token
    }

    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }
}
