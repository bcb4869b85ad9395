// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Demand-accounting emission loop.
//!
//! Sits between a producer that may push faster than requested and a subscriber
//! with bounded demand. Produced items are buffered in an [`OverflowQueue`]; each
//! drain pass emits while there is demand, items, and no cancellation. When demand
//! runs out first the remaining items stay buffered for the next `request`.
//!
//! The loop is policy-agnostic: whether a full buffer drops, evicts, or fails with
//! `MissingBackpressure` is decided by the queue's [`OverflowPolicy`].

use crate::{
    hooks, DeferredSubscription, Demand, Offer, OverflowPolicy, OverflowQueue, RivuletError,
    Subscriber, SubscriberRef, Subscription, SubscriptionRef, WorkInProgress,
};
use parking_lot::Mutex;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Buffered, demand-driven emitter.
///
/// As a [`Subscriber`] it accepts items from an upstream (requesting everything);
/// as a [`Subscription`] it is what the downstream requests from and cancels.
pub struct EmissionLoop<T> {
    downstream: SubscriberRef<T>,
    queue: OverflowQueue<T>,
    demand: Demand,
    wip: WorkInProgress,
    done: AtomicBool,
    error: Mutex<Option<RivuletError>>,
    delay_error: bool,
    upstream: DeferredSubscription,
    weak_self: Weak<Self>,
}

impl<T: Send + 'static> EmissionLoop<T> {
    /// Creates a loop that buffers up to `capacity` items under `policy`.
    ///
    /// With `delay_error` an error is delivered only after every item buffered
    /// before it; otherwise it overtakes them and the buffer is discarded.
    pub fn new(
        downstream: SubscriberRef<T>,
        capacity: usize,
        policy: OverflowPolicy,
        delay_error: bool,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            downstream,
            queue: OverflowQueue::new(capacity, policy),
            demand: Demand::new(),
            wip: WorkInProgress::new(),
            done: AtomicBool::new(false),
            error: Mutex::new(None),
            delay_error,
            upstream: DeferredSubscription::new(),
            weak_self: weak_self.clone(),
        })
    }

    /// Hands this loop to the downstream as its subscription.
    pub fn start(self: &Arc<Self>) {
        self.downstream.on_subscribe(self.clone());
    }

    /// Buffers one item and drains. Returns `false` if it was not accepted.
    ///
    /// Under [`OverflowPolicy::Error`] a full buffer terminates the loop with
    /// `MissingBackpressure` and cancels the upstream.
    pub fn offer(&self, value: T) -> bool {
        if self.is_done() || self.demand.is_cancelled() {
            return false;
        }

        let accepted = match self.queue.offer(value) {
            Offer::Accepted => true,
            Offer::EvictedOldest(_) => {
                trace!("emission loop evicted its oldest item");
                true
            }
            Offer::DroppedNewest(_) => {
                trace!("emission loop dropped an item");
                false
            }
            Offer::Overflow(_) => {
                self.upstream.cancel();
                self.fail(RivuletError::missing_backpressure(format!(
                    "emission loop buffer full ({} items)",
                    self.queue.capacity().unwrap_or_default()
                )));
                return false;
            }
        };

        self.drain();
        accepted
    }

    /// Records a terminal error; it is delivered by the drain.
    ///
    /// After a terminal signal or a downstream cancel the error goes to
    /// [`hooks::on_undeliverable`] instead.
    pub fn fail(&self, error: RivuletError) {
        {
            let mut slot = self.error.lock();
            if self.done.load(Ordering::Acquire) || self.demand.is_cancelled() {
                self.done.store(true, Ordering::Release);
                drop(slot);
                hooks::on_undeliverable(error);
                return;
            }
            *slot = Some(error);
            self.done.store(true, Ordering::Release);
        }
        self.drain();
    }

    /// Records completion; delivered once the buffer is empty.
    pub fn finish(&self) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        self.drain();
    }

    /// Returns `true` once a terminal signal was recorded.
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Outstanding downstream demand.
    pub fn requested(&self) -> i64 {
        self.demand.current()
    }

    /// Number of items waiting for demand.
    pub fn buffered(&self) -> usize {
        self.queue.len()
    }

    fn drain(&self) {
        self.wip.drain(|| self.drain_pass());
    }

    fn drain_pass(&self) -> ControlFlow<()> {
        let requested = self.demand.current();
        let mut emitted = 0i64;

        loop {
            if self.demand.is_cancelled() {
                self.queue.clear();
                // A failure recorded while the cancel was in flight
                if let Some(error) = self.error.lock().take() {
                    hooks::on_undeliverable(error);
                }
                return ControlFlow::Break(());
            }

            let done = self.is_done();
            if done && !self.delay_error {
                if let Some(error) = self.error.lock().take() {
                    self.queue.clear();
                    self.terminate_with(Some(error));
                    return ControlFlow::Break(());
                }
            }

            if emitted == requested {
                if done && self.queue.is_empty() {
                    self.terminate_with(self.error.lock().take());
                    return ControlFlow::Break(());
                }
                break;
            }

            match self.queue.poll() {
                Some(value) => {
                    self.downstream.on_next(value);
                    emitted += 1;
                }
                None => {
                    if done {
                        self.terminate_with(self.error.lock().take());
                        return ControlFlow::Break(());
                    }
                    break;
                }
            }
        }

        self.demand.produced(emitted);
        ControlFlow::Continue(())
    }

    fn terminate_with(&self, error: Option<RivuletError>) {
        self.demand.cancel();
        match error {
            Some(error) => self.downstream.on_error(error),
            None => self.downstream.on_complete(),
        }
    }
}

impl<T: Send + 'static> Subscription for EmissionLoop<T> {
    fn request(&self, n: i64) {
        if self.demand.request(n).is_some() {
            self.drain();
        }
    }

    fn cancel(&self) {
        if self.demand.cancel() {
            self.upstream.cancel();
            // Clears the buffer if no drain is running
            self.drain();
        }
    }

    fn is_cancelled(&self) -> bool {
        self.demand.is_cancelled()
    }
}

impl<T: Send + 'static> Subscriber<T> for EmissionLoop<T> {
    fn on_subscribe(&self, subscription: SubscriptionRef) {
        if !self.upstream.set(subscription) {
            return;
        }
        if let Some(this) = self.weak_self.upgrade() {
            this.start();
        }
        self.upstream.request(crate::demand::UNBOUNDED);
    }

    fn on_next(&self, value: T) {
        self.offer(value);
    }

    fn on_error(&self, error: RivuletError) {
        self.upstream.release();
        self.fail(error);
    }

    fn on_complete(&self) {
        self.upstream.release();
        self.finish();
    }
}
