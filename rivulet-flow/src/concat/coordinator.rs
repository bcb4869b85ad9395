// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use super::{ConcatConfig, SubscriptionArbiter};
use crate::Mapper;
use parking_lot::Mutex;
use rivulet_core::{
    hooks, DeferredSubscription, OverflowPolicy, OverflowQueue, PublisherRef, RivuletError,
    SerializedSubscriber, Subscriber, SubscriberRef, Subscription, SubscriptionRef,
    WorkInProgress,
};
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

/// Shared state of one concat subscription.
///
/// Sources are prefetched from the outer publisher into a bounded queue, but
/// only one of them is subscribed at a time. The drain loop switches to the
/// next source once the running one has terminated, so a long chain of
/// synchronous sources never recurses.
pub(super) struct ConcatCoordinator<T> {
    downstream: Arc<SerializedSubscriber<T>>,
    config: ConcatConfig,
    arbiter: SubscriptionArbiter,
    sources: OverflowQueue<PublisherRef<T>>,
    wip: WorkInProgress,
    outer: DeferredSubscription,
    outer_done: AtomicBool,
    active: AtomicBool,
    consumed: AtomicUsize,
    errors: Mutex<Vec<RivuletError>>,
    terminated: AtomicBool,
    cancelled: AtomicBool,
    weak_self: Weak<Self>,
}

impl<T: Send + 'static> ConcatCoordinator<T> {
    pub(super) fn new(downstream: SubscriberRef<T>, config: ConcatConfig) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            downstream: SerializedSubscriber::from_ref(downstream),
            config,
            arbiter: SubscriptionArbiter::new(),
            sources: OverflowQueue::new(config.prefetch, OverflowPolicy::Error),
            wip: WorkInProgress::new(),
            outer: DeferredSubscription::new(),
            outer_done: AtomicBool::new(false),
            active: AtomicBool::new(false),
            consumed: AtomicUsize::new(0),
            errors: Mutex::new(Vec::new()),
            terminated: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            weak_self: weak_self.clone(),
        })
    }

    pub(super) fn start(self: &Arc<Self>) {
        self.downstream.on_subscribe(self.clone());
    }

    fn on_outer_subscribe(&self, subscription: SubscriptionRef) {
        if self.outer.set(subscription) {
            self.outer
                .request(i64::try_from(self.config.prefetch).unwrap_or(i64::MAX));
        }
    }

    fn on_source(&self, source: PublisherRef<T>) {
        if self.sources.offer(source).is_overflow() {
            warn!("concat: outer emitted beyond its prefetch");
            self.outer.cancel();
            self.fail(RivuletError::missing_backpressure(
                "concat source queue is full",
            ));
            return;
        }
        self.drain();
    }

    fn on_outer_error(&self, error: RivuletError) {
        self.outer.release();
        if self.config.delay_errors {
            self.collect_error(error);
            self.outer_done.store(true, Ordering::Release);
            self.drain();
        } else {
            self.fail(error);
        }
    }

    fn on_outer_complete(&self) {
        self.outer.release();
        self.outer_done.store(true, Ordering::Release);
        self.drain();
    }

    fn inner_next(&self, value: T) {
        self.downstream.on_next(value);
    }

    fn inner_error(&self, error: RivuletError, produced: i64) {
        if self.config.delay_errors {
            self.collect_error(error);
            self.inner_complete(produced);
        } else {
            self.fail(error);
        }
    }

    fn inner_complete(&self, produced: i64) {
        self.arbiter.produced(produced);
        self.active.store(false, Ordering::Release);
        self.drain();
    }

    /// Keeps an error for the end, or hands it to the sink once the concat is over.
    fn collect_error(&self, error: RivuletError) {
        let mut errors = self.errors.lock();
        if self.cancelled.load(Ordering::Acquire) || self.terminated.load(Ordering::Acquire) {
            drop(errors);
            hooks::on_undeliverable(error);
            return;
        }
        errors.push(error);
    }

    /// Fail-fast termination; everything still running is cancelled.
    fn fail(&self, error: RivuletError) {
        if self.terminated.swap(true, Ordering::AcqRel) || self.cancelled.load(Ordering::Acquire)
        {
            hooks::on_undeliverable(error);
            return;
        }
        self.outer.cancel();
        self.arbiter.cancel();
        self.downstream.on_error(error);
        self.drain();
    }

    /// Asks the outer for more sources once enough were consumed.
    fn source_consumed(&self) {
        let limit = self.config.limit();
        let consumed = self.consumed.load(Ordering::Relaxed) + 1;
        if consumed == limit {
            self.consumed.store(0, Ordering::Relaxed);
            self.outer.request(i64::try_from(limit).unwrap_or(i64::MAX));
        } else {
            self.consumed.store(consumed, Ordering::Relaxed);
        }
    }

    fn drain(&self) {
        self.wip.drain(|| self.drain_pass());
    }

    fn drain_pass(&self) -> ControlFlow<()> {
        loop {
            if self.cancelled.load(Ordering::Acquire) || self.terminated.load(Ordering::Acquire)
            {
                self.sources.clear();
                self.arbiter.cancel();
                let errors = std::mem::take(&mut *self.errors.lock());
                for error in errors {
                    hooks::on_undeliverable(error);
                }
                return ControlFlow::Break(());
            }

            if self.active.load(Ordering::Acquire) {
                return ControlFlow::Continue(());
            }

            let outer_done = self.outer_done.load(Ordering::Acquire);
            match self.sources.poll() {
                Some(source) => {
                    self.source_consumed();
                    let Some(parent) = self.weak_self.upgrade() else {
                        return ControlFlow::Break(());
                    };
                    self.active.store(true, Ordering::Release);
                    source.subscribe(Arc::new(ConcatInner {
                        parent,
                        produced: AtomicI64::new(0),
                    }));
                }
                None if outer_done => {
                    if !self.terminated.swap(true, Ordering::AcqRel) {
                        let errors = std::mem::take(&mut *self.errors.lock());
                        if errors.is_empty() {
                            self.downstream.on_complete();
                        } else {
                            self.downstream.on_error(RivuletError::composite(errors));
                        }
                    }
                    self.arbiter.cancel();
                    return ControlFlow::Break(());
                }
                None => return ControlFlow::Continue(()),
            }
        }
    }
}

impl<T: Send + 'static> Subscription for ConcatCoordinator<T> {
    fn request(&self, n: i64) {
        self.arbiter.request(n);
    }

    fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            self.arbiter.cancel();
            self.outer.cancel();
            self.drain();
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Subscriber attached to the currently running source.
struct ConcatInner<T> {
    parent: Arc<ConcatCoordinator<T>>,
    produced: AtomicI64,
}

impl<T: Send + 'static> Subscriber<T> for ConcatInner<T> {
    fn on_subscribe(&self, subscription: SubscriptionRef) {
        self.parent.arbiter.set_subscription(subscription);
    }

    fn on_next(&self, value: T) {
        self.produced.fetch_add(1, Ordering::Relaxed);
        self.parent.inner_next(value);
    }

    fn on_error(&self, error: RivuletError) {
        self.parent
            .inner_error(error, self.produced.load(Ordering::Relaxed));
    }

    fn on_complete(&self) {
        self.parent
            .inner_complete(self.produced.load(Ordering::Relaxed));
    }
}

/// Subscriber attached to the publisher of sources.
pub(super) struct OuterSubscriber<T, U> {
    coordinator: Arc<ConcatCoordinator<U>>,
    mapper: Mapper<T, U>,
}

impl<T, U> OuterSubscriber<T, U> {
    pub(super) fn new(coordinator: Arc<ConcatCoordinator<U>>, mapper: Mapper<T, U>) -> Self {
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
