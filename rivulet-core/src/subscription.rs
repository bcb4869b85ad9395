// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! The request/cancel half of the protocol.

use crate::demand::{self, UNBOUNDED};
use crate::{hooks, ProtocolViolation};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

/// Handle a subscriber uses to pull items and to stop the flow.
///
/// Both methods may be called from any thread, concurrently with emission.
/// Neither may block or panic.
pub trait Subscription: Send + Sync {
    /// Adds `n` to the outstanding demand.
    ///
    /// `n == 0` is a no-op, a negative `n` is a protocol violation reported to the
    /// undeliverable sink. Demand saturates at [`UNBOUNDED`].
    fn request(&self, n: i64);

    /// Stops the flow. Idempotent; a callback already running may still finish.
    fn cancel(&self);

    /// Returns `true` once `cancel` has been called.
    fn is_cancelled(&self) -> bool;
}

/// Shared, type-erased subscription handle.
pub type SubscriptionRef = Arc<dyn Subscription>;

impl<S> Subscription for Arc<S>
where
    S: Subscription + ?Sized,
{
    fn request(&self, n: i64) {
        (**self).request(n);
    }

    fn cancel(&self) {
        (**self).cancel();
    }

    fn is_cancelled(&self) -> bool {
        (**self).is_cancelled()
    }
}

/// Subscription handed out by sources that terminate inside `subscribe`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptySubscription;

impl EmptySubscription {
    /// Convenience constructor returning a shared handle.
    pub fn shared() -> SubscriptionRef {
        Arc::new(Self)
    }
}

impl Subscription for EmptySubscription {
    fn request(&self, n: i64) {
        demand::validate(n);
    }

    fn cancel(&self) {}

    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Subscription that is already cancelled; handed to late or rejected subscribers.
#[derive(Debug, Default, Clone, Copy)]
pub struct CancelledSubscription;

impl CancelledSubscription {
    pub fn shared() -> SubscriptionRef {
        Arc::new(Self)
    }
}

impl Subscription for CancelledSubscription {
    fn request(&self, n: i64) {
        demand::validate(n);
    }

    fn cancel(&self) {}

    fn is_cancelled(&self) -> bool {
        true
    }
}

/// The state every subscription owns: outstanding demand plus a cancelled flag.
#[derive(Debug, Default)]
pub struct Demand {
    requested: AtomicI64,
    cancelled: AtomicBool,
}

impl Demand {
    /// No demand, not cancelled.
    pub const fn new() -> Self {
        Self {
            requested: AtomicI64::new(0),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Validates and adds `n`; returns the previous demand, or `None` if `n` was
    /// rejected or the subscription is cancelled.
    pub fn request(&self, n: i64) -> Option<i64> {
        if !demand::validate(n) || self.is_cancelled() {
            return None;
        }
        Some(demand::add_demand(&self.requested, n))
    }

    /// Records `n` emitted items and returns the remaining demand.
    pub fn produced(&self, n: i64) -> i64 {
        if n == 0 {
            return self.current();
        }
        demand::produced(&self.requested, n)
    }

    /// Current outstanding demand.
    pub fn current(&self) -> i64 {
        self.requested.load(Ordering::Acquire)
    }

    /// Returns `true` once demand saturated to [`UNBOUNDED`].
    pub fn is_unbounded(&self) -> bool {
        self.current() == UNBOUNDED
    }

    /// Sets the cancelled flag; returns `true` for the call that flipped it.
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::AcqRel)
    }

    /// Returns `true` once cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// A subscription that exists before its upstream does.
///
/// Requests and a cancel issued before [`set`](Self::set) are remembered and
/// replayed onto the real subscription when it arrives. Setting a second
/// subscription cancels the newcomer and reports a
/// [`ProtocolViolation::DuplicateSubscription`]: the first one wins.
///
/// Cancelling drops the reference to the upstream, and so does
/// [`release`](Self::release) once the upstream has terminated. Subscribers keep
/// their upstream in one of these, so this is where the subscriber/subscription
/// reference cycle is broken.
#[derive(Default)]
pub struct DeferredSubscription {
    actual: Mutex<Option<SubscriptionRef>>,
    set: AtomicBool,
    missed_requested: AtomicI64,
    cancelled: AtomicBool,
}

impl DeferredSubscription {
    /// Creates an empty deferred handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches the real upstream. Returns `false` if one was already attached.
    pub fn set(&self, subscription: SubscriptionRef) -> bool {
        if self.set.swap(true, Ordering::AcqRel) {
            subscription.cancel();
            warn!("duplicate on_subscribe: cancelling the second subscription");
            hooks::on_undeliverable(ProtocolViolation::DuplicateSubscription.into());
            return false;
        }

        if self.cancelled.load(Ordering::Acquire) {
            subscription.cancel();
            return true;
        }

        *self.actual.lock() = Some(subscription.clone());

        // `cancel` may have run between the check above and the store
        if self.cancelled.load(Ordering::Acquire) {
            if let Some(actual) = self.take() {
                actual.cancel();
            }
            return true;
        }

        let missed = self.missed_requested.swap(0, Ordering::AcqRel);
        if missed > 0 {
            subscription.request(missed);
        }
        true
    }

    /// Returns `true` once an upstream has been attached.
    pub fn is_set(&self) -> bool {
        self.set.load(Ordering::Acquire)
    }

    /// Forgets the upstream without cancelling it. Later requests are dropped.
    pub fn release(&self) {
        drop(self.take());
    }

    fn current(&self) -> Option<SubscriptionRef> {
        self.actual.lock().clone()
    }

    fn take(&self) -> Option<SubscriptionRef> {
        self.actual.lock().take()
    }
}

impl Subscription for DeferredSubscription {
    fn request(&self, n: i64) {
        if !demand::validate(n) {
            return;
        }

        if let Some(actual) = self.current() {
            actual.request(n);
            return;
        }

        demand::add_demand(&self.missed_requested, n);

        // `set` may have run between the check above and the add
        if let Some(actual) = self.current() {
            let missed = self.missed_requested.swap(0, Ordering::AcqRel);
            if missed > 0 {
                actual.request(missed);
            }
        }
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(actual) = self.take() {
            actual.cancel();
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for DeferredSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredSubscription")
            .field("set", &self.is_set())
            .field("missed_requested", &self.missed_requested.load(Ordering::Acquire))
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
