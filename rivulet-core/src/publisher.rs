// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Producer side of the protocol and operator composition.

use crate::{
    DeferredSubscription, EmissionLoop, LambdaSubscriber, OverflowPolicy, Result, RivuletError,
    Subscriber, SubscriberRef, SubscriptionRef,
};
use std::marker::PhantomData;
use std::sync::Arc;

/// A source of signals.
///
/// `subscribe` calls `on_subscribe` on the subscriber before any other callback.
/// Cold publishers start a fresh run per subscriber; hot ones share theirs.
pub trait Publisher<T>: Send + Sync {
    fn subscribe(&self, subscriber: SubscriberRef<T>);
}

/// Shared, type-erased publisher.
pub type PublisherRef<T> = Arc<dyn Publisher<T>>;

impl<T, P> Publisher<T> for Arc<P>
where
    P: Publisher<T> + ?Sized,
{
    fn subscribe(&self, subscriber: SubscriberRef<T>) {
        (**self).subscribe(subscriber);
    }
}

/// A transformation expressed as `downstream -> upstream`.
///
/// Applying an operator to the subscriber that wants `Down` items yields the
/// subscriber that must be handed to a `Publisher<Up>`.
pub trait Operator<Up, Down>: Send + Sync {
    fn apply(&self, downstream: SubscriberRef<Down>) -> SubscriberRef<Up>;
}

impl<Up, Down, F> Operator<Up, Down> for F
where
    F: Fn(SubscriberRef<Down>) -> SubscriberRef<Up> + Send + Sync,
{
    fn apply(&self, downstream: SubscriberRef<Down>) -> SubscriberRef<Up> {
        self(downstream)
    }
}

/// Publisher produced by [`PublisherExt::lift`].
pub struct Lift<P, O, Up> {
    source: P,
    operator: O,
    _upstream: PhantomData<fn(Up)>,
}

impl<P, O, Up, Down> Publisher<Down> for Lift<P, O, Up>
where
    P: Publisher<Up>,
    O: Operator<Up, Down>,
{
    fn subscribe(&self, subscriber: SubscriberRef<Down>) {
        self.source.subscribe(self.operator.apply(subscriber));
    }
}

/// Publisher produced by [`PublisherExt::on_backpressure_buffer`].
pub struct OnBackpressureBuffer<P> {
    source: P,
    capacity: usize,
    policy: OverflowPolicy,
    delay_error: bool,
}

impl<T, P> Publisher<T> for OnBackpressureBuffer<P>
where
    T: Send + 'static,
    P: Publisher<T>,
{
    fn subscribe(&self, subscriber: SubscriberRef<T>) {
        let emission = EmissionLoop::new(subscriber, self.capacity, self.policy, self.delay_error);
        self.source.subscribe(emission);
    }
}

/// Forwards everything and remembers the upstream so `subscribe_with` can hand it out.
struct CapturingSubscriber<T> {
    actual: SubscriberRef<T>,
    handle: Arc<DeferredSubscription>,
}

impl<T> Subscriber<T> for CapturingSubscriber<T> {
    fn on_subscribe(&self, subscription: SubscriptionRef) {
        if self.handle.set(subscription.clone()) {
            self.actual.on_subscribe(subscription);
        }
    }

    fn on_next(&self, value: T) {
        self.actual.on_next(value);
    }

    fn on_error(&self, error: RivuletError) {
        self.actual.on_error(error);
    }

    fn on_complete(&self) {
        self.actual.on_complete();
    }
}

/// Subscription and composition helpers available on every publisher.
pub trait PublisherExt<T>: Publisher<T> + Sized
where
    T: Send + 'static,
{
    /// Subscribes `subscriber` and returns a handle onto its subscription.
    ///
    /// The handle is usable immediately, even if the publisher hands over its
    /// subscription later (cancel and requests are replayed when it does).
    fn subscribe_with<S>(&self, subscriber: S) -> SubscriptionRef
    where
        S: Subscriber<T> + 'static,
    {
        let handle = Arc::new(DeferredSubscription::new());
        self.subscribe(Arc::new(CapturingSubscriber {
            actual: Arc::new(subscriber),
            handle: handle.clone(),
        }));
        handle
    }

    /// Subscribes a [`LambdaSubscriber`] and returns it as the disposable.
    fn subscribe_lambda(&self, subscriber: LambdaSubscriber<T>) -> Arc<LambdaSubscriber<T>> {
        let subscriber = Arc::new(subscriber);
        self.subscribe(subscriber.clone());
        subscriber
    }

    /// Requests everything and calls `on_next` per item. Errors go to the sink.
    fn subscribe_fn<F>(&self, on_next: F) -> Arc<LambdaSubscriber<T>>
    where
        F: Fn(T) -> Result<()> + Send + Sync + 'static,
    {
        self.subscribe_lambda(LambdaSubscriber::new(on_next))
    }

    /// Applies a `downstream -> upstream` operator.
    fn lift<Down, O>(self, operator: O) -> Lift<Self, O, T>
    where
        O: Operator<T, Down>,
    {
        Lift {
            source: self,
            operator,
            _upstream: PhantomData,
        }
    }

    /// Decouples an upstream that ignores demand from the downstream with a
    /// buffer of `capacity` items handled by `policy`.
    fn on_backpressure_buffer(
        self,
        capacity: usize,
        policy: OverflowPolicy,
    ) -> OnBackpressureBuffer<Self> {
        OnBackpressureBuffer {
            source: self,
            capacity,
            policy,
            delay_error: false,
        }
    }

    /// Like [`on_backpressure_buffer`](Self::on_backpressure_buffer), but an
    /// upstream error waits until the buffered items were delivered.
    fn on_backpressure_buffer_delay_error(
        self,
        capacity: usize,
        policy: OverflowPolicy,
    ) -> OnBackpressureBuffer<Self> {
        OnBackpressureBuffer {
            source: self,
            capacity,
            policy,
            delay_error: true,
        }
    }

    fn boxed(self) -> PublisherRef<T>
    where
        Self: 'static,
    {
        Arc::new(self)
    }
}

impl<T, P> PublisherExt<T> for P
where
    T: Send + 'static,
    P: Publisher<T>,
{
}
