// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use super::MergeConfig;
use crate::Mapper;
use crossbeam_queue::SegQueue;
use parking_lot::Mutex;
use rivulet_core::demand::UNBOUNDED;
use rivulet_core::{
    hooks, DeferredSubscription, Demand, OverflowPolicy, OverflowQueue, PublisherRef,
    RivuletError, Subscriber, SubscriberRef, Subscription, SubscriptionRef, WorkInProgress,
};
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

#[derive(Default)]
struct ErrorState {
    errors: Vec<RivuletError>,
    terminated: bool,
}

/// Shared state of one merge subscription.
///
/// Only the drain worker calls the downstream; inners and the outer just
/// publish into queues and flags, then ask for a drain.
pub(super) struct MergeCoordinator<T> {
    downstream: SubscriberRef<T>,
    config: MergeConfig,
    demand: Demand,
    wip: WorkInProgress,
    outer: DeferredSubscription,
    outer_done: AtomicBool,
    inners: Mutex<Vec<Arc<InnerSubscriber<T>>>>,
    pending: SegQueue<PublisherRef<T>>,
    active: AtomicUsize,
    next_id: AtomicUsize,
    rotation: AtomicUsize,
    errors: Mutex<ErrorState>,
    failed: AtomicBool,
    weak_self: Weak<Self>,
}

impl<T: Send + 'static> MergeCoordinator<T> {
    pub(super) fn new(downstream: SubscriberRef<T>, config: MergeConfig) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            downstream,
            config,
            demand: Demand::new(),
            wip: WorkInProgress::new(),
            outer: DeferredSubscription::new(),
            outer_done: AtomicBool::new(false),
            inners: Mutex::new(Vec::new()),
            pending: SegQueue::new(),
            active: AtomicUsize::new(0),
            next_id: AtomicUsize::new(0),
            rotation: AtomicUsize::new(0),
            errors: Mutex::new(ErrorState::default()),
            failed: AtomicBool::new(false),
            weak_self: weak_self.clone(),
        })
    }

    pub(super) fn start(self: &Arc<Self>) {
        self.downstream.on_subscribe(self.clone());
    }

    fn on_outer_subscribe(&self, subscription: SubscriptionRef) {
        if !self.outer.set(subscription) {
            return;
        }
        let initial = if self.config.is_bounded() {
            i64::try_from(self.config.max_concurrency).unwrap_or(UNBOUNDED)
        } else {
            UNBOUNDED
        };
        self.outer.request(initial);
    }

    fn on_source(&self, source: PublisherRef<T>) {
        if self.is_stopped() {
            return;
        }
        if self.try_acquire_slot() {
            self.subscribe_inner(source);
        } else {
            self.pending.push(source);
            self.drain();
        }
    }

    fn on_outer_error(&self, error: RivuletError) {
        self.outer.release();
        self.add_error(error);
        self.outer_done.store(true, Ordering::Release);
        self.drain();
    }

    fn on_outer_complete(&self) {
        self.outer.release();
        self.outer_done.store(true, Ordering::Release);
        self.drain();
    }

    fn try_acquire_slot(&self) -> bool {
        let max = self.config.max_concurrency;
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |active| {
                (active < max).then_some(active + 1)
            })
            .is_ok()
    }

    /// Subscribes `source` on a slot the caller already holds.
    fn subscribe_inner(&self, source: PublisherRef<T>) {
        let Some(parent) = self.weak_self.upgrade() else {
            return;
        };
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::new(InnerSubscriber::new(id, parent, &self.config));
        self.inners.lock().push(inner.clone());

        // A cancel racing with the push above either saw the inner or is seen here
        if self.is_stopped() {
            inner.upstream.cancel();
        }

        trace!("merge: subscribing inner {id}");
        source.subscribe(inner);
    }

    fn inner_next(&self, inner: &InnerSubscriber<T>, value: T) {
        if self.is_stopped() {
            return;
        }

        if !self.wip.try_enter() {
            self.enqueue(inner, value);
            self.drain();
            return;
        }

        let requested = self.demand.current();
        if requested > 0 && inner.queue.is_empty() {
            self.downstream.on_next(value);
            self.demand.produced(1);
            inner.consumed_one();
        } else {
            self.enqueue(inner, value);
            if self.drain_pass().is_break() {
                return;
            }
        }
        self.wip.resume(|| self.drain_pass());
    }

    fn enqueue(&self, inner: &InnerSubscriber<T>, value: T) {
        if inner.queue.offer(value).is_overflow() {
            warn!("merge: inner {} emitted beyond its prefetch", inner.id);
            inner.upstream.cancel();
            self.add_error(RivuletError::missing_backpressure(
                "merge inner queue is full",
            ));
            inner.done.store(true, Ordering::Release);
        }
    }

    fn inner_error(&self, inner: &InnerSubscriber<T>, error: RivuletError) {
        // Recorded before `done` so the drain never completes without it
        self.add_error(error);
        inner.done.store(true, Ordering::Release);
        self.drain();
    }

    fn inner_complete(&self, inner: &InnerSubscriber<T>) {
        inner.done.store(true, Ordering::Release);
        self.drain();
    }

    fn add_error(&self, error: RivuletError) {
        let mut state = self.errors.lock();
        if state.terminated || (!self.config.delay_errors && !state.errors.is_empty()) {
            drop(state);
            hooks::on_undeliverable(error);
            return;
        }
        state.errors.push(error);
        drop(state);

        if !self.config.delay_errors {
            self.failed.store(true, Ordering::Release);
            self.cancel_sources();
        }
    }

    fn is_stopped(&self) -> bool {
        self.demand.is_cancelled() || self.failed.load(Ordering::Acquire)
    }

    fn cancel_sources(&self) {
        self.outer.cancel();
        let inners = self.inners.lock().clone();
        for inner in inners {
            inner.upstream.cancel();
        }
    }

    fn clear(&self) {
        let inners = std::mem::take(&mut *self.inners.lock());
        for inner in inners {
            inner.upstream.cancel();
            inner.queue.clear();
        }
        while self.pending.pop().is_some() {}
    }

    fn take_errors(&self) -> Vec<RivuletError> {
        let mut state = self.errors.lock();
        state.terminated = true;
        std::mem::take(&mut state.errors)
    }

    fn drain(&self) {
        self.wip.drain(|| self.drain_pass());
    }

    /// Returns `true` if the merge is over; delivers the fail-fast error if one is pending.
    fn check_terminated(&self) -> bool {
        if self.demand.is_cancelled() {
            self.clear();
            for error in self.take_errors() {
                hooks::on_undeliverable(error);
            }
            return true;
        }

        if !self.config.delay_errors && self.failed.load(Ordering::Acquire) {
            let error = self.take_errors().into_iter().next();
            self.demand.cancel();
            self.cancel_sources();
            self.clear();
            if let Some(error) = error {
                self.downstream.on_error(error);
            }
            return true;
        }
        false
    }

    fn drain_pass(&self) -> ControlFlow<()> {
        if self.check_terminated() {
            return ControlFlow::Break(());
        }

        let requested = self.demand.current();
        let mut emitted = 0i64;
        let inners = self.inners.lock().clone();
        let count = inners.len();
        let mut finished = Vec::new();

        if count > 0 {
            let start = self.rotation.fetch_add(1, Ordering::Relaxed) % count;
            for offset in 0..count {
                let inner = &inners[(start + offset) % count];
                while emitted != requested {
                    if self.check_terminated() {
                        return ControlFlow::Break(());
                    }
                    let Some(value) = inner.queue.poll() else {
                        break;
                    };
                    self.downstream.on_next(value);
                    emitted += 1;
                    inner.consumed_one();
                }
                if inner.is_finished() {
                    finished.push(inner.clone());
                }
            }
        }
        self.demand.produced(emitted);

        if !finished.is_empty() {
            self.retire(&finished);
        }
        self.subscribe_pending();

        if self.check_terminated() {
            return ControlFlow::Break(());
        }

        if self.outer_done.load(Ordering::Acquire)
            && self.active.load(Ordering::Acquire) == 0
            && self.pending.is_empty()
        {
            let errors = self.take_errors();
            self.demand.cancel();
            if errors.is_empty() {
                self.downstream.on_complete();
            } else {
                self.downstream.on_error(RivuletError::composite(errors));
            }
            return ControlFlow::Break(());
        }

        ControlFlow::Continue(())
    }

    /// Removes finished inners and hands their slots to waiting sources.
    fn retire(&self, finished: &[Arc<InnerSubscriber<T>>]) {
        self.inners
            .lock()
            .retain(|inner| !finished.iter().any(|f| Arc::ptr_eq(inner, f)));

        let mut replenish = 0i64;
        for inner in finished {
            trace!("merge: inner {} finished", inner.id);
            inner.upstream.release();
            match self.pending.pop() {
                Some(source) => self.subscribe_inner(source),
                None => {
                    self.active.fetch_sub(1, Ordering::AcqRel);
                    replenish += 1;
                }
            }
        }

        if replenish > 0 && self.config.is_bounded() && !self.outer_done.load(Ordering::Acquire)
        {
            self.outer.request(replenish);
        }
    }

    /// Fills slots that freed up before a source was parked.
    fn subscribe_pending(&self) {
        while !self.pending.is_empty() && self.try_acquire_slot() {
            match self.pending.pop() {
                Some(source) => self.subscribe_inner(source),
                None => {
                    self.active.fetch_sub(1, Ordering::AcqRel);
                    break;
                }
            }
        }
    }
}

impl<T: Send + 'static> Subscription for MergeCoordinator<T> {
    fn request(&self, n: i64) {
        if self.demand.request(n).is_some() {
            self.drain();
        }
    }

    fn cancel(&self) {
        if self.demand.cancel() {
            self.cancel_sources();
            self.drain();
        }
    }

    fn is_cancelled(&self) -> bool {
        self.demand.is_cancelled()
    }
}

/// Subscriber attached to one inner publisher.
struct InnerSubscriber<T> {
    id: usize,
    parent: Arc<MergeCoordinator<T>>,
    queue: OverflowQueue<T>,
    upstream: DeferredSubscription,
    done: AtomicBool,
    prefetch: i64,
    limit: usize,
    consumed: AtomicUsize,
}

impl<T: Send + 'static> InnerSubscriber<T> {
    fn new(id: usize, parent: Arc<MergeCoordinator<T>>, config: &MergeConfig) -> Self {
        Self {
            id,
            parent,
            queue: OverflowQueue::new(config.prefetch, OverflowPolicy::Error),
            upstream: DeferredSubscription::new(),
            done: AtomicBool::new(false),
            prefetch: i64::try_from(config.prefetch).unwrap_or(UNBOUNDED),
            limit: config.limit(),
            consumed: AtomicUsize::new(0),
        }
    }

    /// Called by the drain worker only.
    fn consumed_one(&self) {
        let consumed = self.consumed.load(Ordering::Relaxed) + 1;
        if consumed == self.limit {
            self.consumed.store(0, Ordering::Relaxed);
            self.upstream
                .request(i64::try_from(self.limit).unwrap_or(UNBOUNDED));
        } else {
            self.consumed.store(consumed, Ordering::Relaxed);
        }
    }

    fn is_finished(&self) -> bool {
        self.done.load(Ordering::Acquire) && self.queue.is_empty()
    }
}

impl<T: Send + 'static> Subscriber<T> for InnerSubscriber<T> {
    fn on_subscribe(&self, subscription: SubscriptionRef) {
        if self.upstream.set(subscription) {
            self.upstream.request(self.prefetch);
        }
    }

    fn on_next(&self, value: T) {
        self.parent.inner_next(self, value);
    }

    fn on_error(&self, error: RivuletError) {
        self.parent.inner_error(self, error);
    }

    fn on_complete(&self) {
        self.parent.inner_complete(self);
    }
}

/// Subscriber attached to the publisher of sources.
pub(super) struct OuterSubscriber<T, U> {
    coordinator: Arc<MergeCoordinator<U>>,
    mapper: Mapper<T, U>,
}

impl<T, U> OuterSubscriber<T, U> {
    pub(super) fn new(coordinator: Arc<MergeCoordinator<U>>, mapper: Mapper<T, U>) -> Self {
        Self {
            coordinator,
            mapper,
        }
    }
}

impl<T, U> Subscriber<T> for OuterSubscriber<T, U>
where
    T: Send + 'static,
    U: Send + 'static,
{
    fn on_subscribe(&self, subscription: SubscriptionRef) {
        self.coordinator.on_outer_subscribe(subscription);
    }

    fn on_next(&self, value: T) {
        self.coordinator.on_source((self.mapper)(value));
    }

    fn on_error(&self, error: RivuletError) {
        self.coordinator.on_outer_error(error);
    }

    fn on_complete(&self) {
        self.coordinator.on_outer_complete();
    }
}
