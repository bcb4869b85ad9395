// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! The serialization primitive every coordinator is built on.
//!
//! Any number of threads may contribute work (push to a queue, flip a flag) and
//! then call [`WorkInProgress::enter`]. Exactly one of them wins and becomes the
//! worker; the others return immediately. Because each contributor publishes its
//! work *before* incrementing the counter, the worker is guaranteed to observe it:
//! leaving with a non-zero remainder sends the worker round the loop again.
//!
//! ```
//! use rivulet_core::WorkInProgress;
//! use std::ops::ControlFlow;
//!
//! let wip = WorkInProgress::new();
//! let mut passes = 0;
//! assert!(wip.drain(|| {
//!     passes += 1;
//!     ControlFlow::Continue(())
//! }));
//! assert_eq!(passes, 1);
//! assert!(!wip.is_active());
//! ```

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Work-in-progress counter.
#[derive(Debug, Default)]
pub struct WorkInProgress {
    wip: AtomicUsize,
}

impl WorkInProgress {
    /// A counter with no worker.
    pub const fn new() -> Self {
        Self {
            wip: AtomicUsize::new(0),
        }
    }

    /// Registers one contribution. Returns `true` if the caller became the worker.
    #[inline]
    pub fn enter(&self) -> bool {
        self.wip.fetch_add(1, Ordering::AcqRel) == 0
    }

    /// Becomes the worker only if nobody is. A failed attempt registers nothing,
    /// so the caller must publish its work and call [`enter`](Self::enter) instead.
    #[inline]
    pub fn try_enter(&self) -> bool {
        self.wip
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Acknowledges `missed` contributions; returns how many arrived meanwhile.
    ///
    /// The worker keeps ownership while the result is non-zero.
    #[inline]
    pub fn leave(&self, missed: usize) -> usize {
        self.wip.fetch_sub(missed, Ordering::AcqRel) - missed
    }

    /// Returns `true` while a worker owns the loop (or it was closed by `Break`).
    pub fn is_active(&self) -> bool {
        self.wip.load(Ordering::Acquire) != 0
    }

    /// Runs `body` as the worker until no contribution is left.
    ///
    /// Returns `false` without running `body` when another thread is the worker.
    /// If `body` returns `Break` the counter is left held: the loop is closed for
    /// good and later contributions are never drained. Clients use this once a
    /// terminal signal was delivered or the flow was cancelled.
    pub fn drain<F>(&self, mut body: F) -> bool
    where
        F: FnMut() -> ControlFlow<()>,
    {
        if !self.enter() {
            return false;
        }

        let mut missed = 1;
        loop {
            if body().is_break() {
                return true;
            }
            missed = self.leave(missed);
            if missed == 0 {
                return true;
            }
        }
    }

    /// Continues as the worker after a successful [`enter`](Self::enter).
    ///
    /// The caller's own contribution counts as handled; `body` only runs for
    /// contributions that arrived meanwhile. Used by fast paths that emit
    /// directly while holding the loop.
    pub fn resume<F>(&self, mut body: F)
    where
        F: FnMut() -> ControlFlow<()>,
    {
        let mut missed = self.leave(1);
        while missed != 0 {
            if body().is_break() {
                return;
            }
            missed = self.leave(missed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_entrant_is_coalesced_into_running_worker() {
        let wip = WorkInProgress::new();
        let mut passes = 0;

        wip.drain(|| {
            passes += 1;
            if passes == 1 {
                // Contribution arriving while the worker is inside the body
                assert!(!wip.enter());
            }
            ControlFlow::Continue(())
        });

        assert_eq!(passes, 2);
        assert!(!wip.is_active());
    }

    #[test]
    fn resume_runs_only_for_missed_contributions() {
        let wip = WorkInProgress::new();
        let mut passes = 0;

        assert!(wip.enter());
        wip.resume(|| {
            passes += 1;
            ControlFlow::Continue(())
        });
        assert_eq!(passes, 0);

        assert!(wip.try_enter());
        assert!(!wip.try_enter());
        assert!(!wip.enter());
        wip.resume(|| {
            passes += 1;
            ControlFlow::Continue(())
        });
        assert_eq!(passes, 1);
        assert!(!wip.is_active());
    }

    #[test]
    fn break_keeps_loop_closed() {
        let wip = WorkInProgress::new();
        wip.drain(|| ControlFlow::Break(()));

        let mut ran = false;
        assert!(!wip.drain(|| {
            ran = true;
            ControlFlow::Continue(())
        }));
        assert!(!ran);
    }
}
