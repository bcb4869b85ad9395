// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use parking_lot::Mutex;
use rivulet_core::demand::{self, UNBOUNDED};
use rivulet_core::{Subscription, SubscriptionRef, WorkInProgress};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

/// Downstream-facing subscription whose upstream can be swapped.
///
/// Outstanding demand survives the swap: whatever the downstream requested and
/// the previous upstream did not deliver (see [`produced`](Self::produced)) is
/// requested from the next one. Calls from different threads are merged
/// through a [`WorkInProgress`] loop; requests to the upstream are issued after
/// leaving it.
#[derive(Default)]
pub struct SubscriptionArbiter {
    wip: WorkInProgress,
    actual: Mutex<Option<SubscriptionRef>>,
    requested: AtomicI64,
    missed_subscription: Mutex<Option<SubscriptionRef>>,
    missed_requested: AtomicI64,
    missed_produced: AtomicI64,
    cancelled: AtomicBool,
    unbounded: AtomicBool,
}

impl SubscriptionArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the current upstream and requests the outstanding demand from it.
    ///
    /// The previous upstream is not cancelled. After [`cancel`](Subscription::cancel)
    /// the new one is cancelled right away.
    pub fn set_subscription(&self, subscription: SubscriptionRef) {
        if self.is_cancelled() {
            subscription.cancel();
            return;
        }

        if self.wip.try_enter() {
            *self.actual.lock() = Some(subscription.clone());
            let requested = self.requested.load(Ordering::Acquire);
            self.leave();
            if requested != 0 {
                subscription.request(requested);
            }
            return;
        }

        *self.missed_subscription.lock() = Some(subscription);
        self.drain();
    }

    /// Records `n` items delivered by the current upstream.
    pub fn produced(&self, n: i64) {
        if n <= 0 || self.unbounded.load(Ordering::Acquire) {
            return;
        }

        if self.wip.try_enter() {
            let requested = self.requested.load(Ordering::Acquire);
            if requested != UNBOUNDED {
                self.requested
                    .store(Self::subtract(requested, n), Ordering::Release);
            }
            self.leave();
            return;
        }

        demand::add_demand(&self.missed_produced, n);
        self.drain();
    }

    /// Returns `true` once demand saturated to [`UNBOUNDED`].
    pub fn is_unbounded(&self) -> bool {
        self.unbounded.load(Ordering::Acquire)
    }

    fn subtract(requested: i64, produced: i64) -> i64 {
        let remaining = requested - produced;
        if remaining < 0 {
            warn!("arbiter: {produced} items produced with {requested} requested");
            return 0;
        }
        remaining
    }

    fn leave(&self) {
        if self.wip.leave(1) != 0 {
            self.drain_loop();
        }
    }

    fn drain(&self) {
        if self.wip.enter() {
            self.drain_loop();
        }
    }

    fn drain_loop(&self) {
        let mut missed = 1;
        let mut request_amount = 0i64;
        let mut request_target: Option<SubscriptionRef> = None;

        loop {
            let missed_subscription = self.missed_subscription.lock().take();
            let missed_requested = self.missed_requested.swap(0, Ordering::AcqRel);
            let missed_produced = self.missed_produced.swap(0, Ordering::AcqRel);

            if self.cancelled.load(Ordering::Acquire) {
                if let Some(actual) = self.actual.lock().take() {
                    actual.cancel();
                }
                if let Some(subscription) = missed_subscription {
                    subscription.cancel();
                }
            } else {
                let mut requested = self.requested.load(Ordering::Acquire);
                if requested != UNBOUNDED {
                    requested = demand::add_cap(requested, missed_requested);
                    if requested == UNBOUNDED {
                        self.unbounded.store(true, Ordering::Release);
                    } else {
                        requested = Self::subtract(requested, missed_produced);
                    }
                    self.requested.store(requested, Ordering::Release);
                }

                match missed_subscription {
                    Some(subscription) => {
                        *self.actual.lock() = Some(subscription.clone());
                        if requested != 0 {
                            request_amount = demand::add_cap(request_amount, requested);
                            request_target = Some(subscription);
                        }
                    }
                    None if missed_requested != 0 => {
                        if let Some(actual) = self.actual.lock().clone() {
                            request_amount = demand::add_cap(request_amount, missed_requested);
                            request_target = Some(actual);
                        }
                    }
                    None => {}
                }
            }

            missed = self.wip.leave(missed);
            if missed == 0 {
                if let Some(target) = request_target {
                    if request_amount != 0 {
                        target.request(request_amount);
                    }
                }
                return;
            }
        }
    }
}

impl Subscription for SubscriptionArbiter {
    fn request(&self, n: i64) {
        if !demand::validate(n) || self.unbounded.load(Ordering::Acquire) {
            return;
        }

        if self.wip.try_enter() {
            let requested = self.requested.load(Ordering::Acquire);
            if requested != UNBOUNDED {
                let total = demand::add_cap(requested, n);
                self.requested.store(total, Ordering::Release);
                if total == UNBOUNDED {
                    self.unbounded.store(true, Ordering::Release);
                }
            }
            let actual = self.actual.lock().clone();
            self.leave();
            if let Some(actual) = actual {
                actual.request(n);
            }
            return;
        }

        demand::add_demand(&self.missed_requested, n);
        self.drain();
    }

    fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            self.drain();
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
