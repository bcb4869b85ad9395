// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Basic cold sources.
//!
//! Every source here honors demand: nothing is emitted beyond what was requested.
//! [`create`] is push-based instead: it feeds an [`EmissionLoop`] that buffers
//! under an explicit [`OverflowPolicy`].

use crate::{
    DeferredSubscription, Demand, EmissionLoop, EmptySubscription, OverflowPolicy, Publisher,
    RivuletError, SubscriberRef, Subscription, WorkInProgress,
};
use parking_lot::Mutex;
use std::iter::Peekable;
use std::marker::PhantomData;
use std::ops::ControlFlow;
use std::sync::Arc;

/// Publisher over a cloneable iterable; every subscriber gets its own iterator.
#[derive(Clone)]
pub struct FromIter<I> {
    iterable: I,
}

/// Emits the items of `iterable`, then completes.
pub fn from_iter<I>(iterable: I) -> FromIter<I>
where
    I: IntoIterator + Clone + Send + Sync,
{
    FromIter { iterable }
}

/// Emits `count` consecutive integers starting at `start`.
///
/// A negative `count` is treated as zero; the range stops at `i64::MAX`.
pub fn range(start: i64, count: i64) -> FromIter<std::ops::Range<i64>> {
    let end = start.saturating_add(count.max(0));
    from_iter(start..end)
}

/// Emits `value` once, then completes.
pub fn just<T>(value: T) -> FromIter<std::iter::Once<T>>
where
    T: Clone + Send + Sync,
{
    from_iter(std::iter::once(value))
}

impl<I> Publisher<I::Item> for FromIter<I>
where
    I: IntoIterator + Clone + Send + Sync,
    I::IntoIter: Send + 'static,
    I::Item: Send + 'static,
{
    fn subscribe(&self, subscriber: SubscriberRef<I::Item>) {
        let subscription = Arc::new(IterSubscription {
            iter: Mutex::new(self.iterable.clone().into_iter().peekable()),
            downstream: subscriber,
            demand: Demand::new(),
            wip: WorkInProgress::new(),
        });
        subscription.downstream.on_subscribe(subscription.clone());
        // Completes an empty iterator without waiting for demand
        subscription.drain();
    }
}

struct IterSubscription<It: Iterator> {
    iter: Mutex<Peekable<It>>,
    downstream: SubscriberRef<It::Item>,
    demand: Demand,
    wip: WorkInProgress,
}

impl<It> IterSubscription<It>
where
    It: Iterator + Send,
    It::Item: Send,
{
    fn drain(&self) {
        self.wip.drain(|| {
            let requested = self.demand.current();
            let mut emitted = 0i64;

            loop {
                if self.demand.is_cancelled() {
                    return ControlFlow::Break(());
                }

                let next = {
                    let mut iter = self.iter.lock();
                    if iter.peek().is_none() {
                        None
                    } else if emitted == requested {
                        break;
                    } else {
                        iter.next()
                    }
                };

                match next {
                    Some(value) => {
                        self.downstream.on_next(value);
                        emitted += 1;
                    }
                    None => {
                        self.demand.cancel();
                        self.downstream.on_complete();
                        return ControlFlow::Break(());
                    }
                }
            }

            self.demand.produced(emitted);
            ControlFlow::Continue(())
        });
    }
}

impl<It> Subscription for IterSubscription<It>
where
    It: Iterator + Send,
    It::Item: Send,
{
    fn request(&self, n: i64) {
        if self.demand.request(n).is_some() {
            self.drain();
        }
    }

    fn cancel(&self) {
        self.demand.cancel();
    }

    fn is_cancelled(&self) -> bool {
        self.demand.is_cancelled()
    }
}

/// Completes immediately.
pub struct Empty<T>(PhantomData<fn() -> T>);

impl<T> Clone for Empty<T> {
    fn clone(&self) -> Self {
        Empty(PhantomData)
    }
}

pub fn empty<T>() -> Empty<T> {
    Empty(PhantomData)
}

impl<T> Publisher<T> for Empty<T> {
    fn subscribe(&self, subscriber: SubscriberRef<T>) {
        subscriber.on_subscribe(EmptySubscription::shared());
        subscriber.on_complete();
    }
}

/// Fails immediately with a clone of the given error.
pub struct ErrorSource<T> {
    error: RivuletError,
    _item: PhantomData<fn() -> T>,
}

pub fn error<T>(error: RivuletError) -> ErrorSource<T> {
    ErrorSource {
        error,
        _item: PhantomData,
    }
}

impl<T> Publisher<T> for ErrorSource<T> {
    fn subscribe(&self, subscriber: SubscriberRef<T>) {
        subscriber.on_subscribe(EmptySubscription::shared());
        subscriber.on_error(self.error.clone());
    }
}

/// Never signals anything after `on_subscribe`.
pub struct Never<T>(PhantomData<fn() -> T>);

pub fn never<T>() -> Never<T> {
    Never(PhantomData)
}

impl<T> Publisher<T> for Never<T> {
    fn subscribe(&self, subscriber: SubscriberRef<T>) {
        subscriber.on_subscribe(Arc::new(DeferredSubscription::new()));
    }
}

/// Push-style handle passed to the [`create`] callback.
///
/// Clones share the same emission loop, so an emitter may be moved to other
/// threads; signals are delivered serialized.
pub struct Emitter<T> {
    emission: Arc<EmissionLoop<T>>,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            emission: self.emission.clone(),
        }
    }
}

impl<T: Send + 'static> Emitter<T> {
    /// Pushes one item. Returns `false` if it was dropped or the flow is over.
    pub fn next(&self, value: T) -> bool {
        self.emission.offer(value)
    }

    pub fn error(&self, error: RivuletError) {
        self.emission.fail(error);
    }

    pub fn complete(&self) {
        self.emission.finish();
    }

    /// Downstream demand not yet satisfied.
    pub fn requested(&self) -> i64 {
        self.emission.requested()
    }

    pub fn is_cancelled(&self) -> bool {
        self.emission.is_cancelled()
    }
}

/// Publisher produced by [`create`].
pub struct Create<T, F> {
    producer: F,
    capacity: usize,
    policy: OverflowPolicy,
    _item: PhantomData<fn() -> T>,
}

/// Bridges a push-style producer into the demand protocol.
///
/// `producer` runs once per subscriber, after `on_subscribe`. Items pushed beyond
/// the downstream demand wait in a buffer of `capacity` items; what happens when
/// it is full is decided by `policy`. An error waits behind the items buffered
/// before it.
///
/// ```
/// use rivulet_core::{source, OverflowPolicy, PublisherExt};
/// use std::sync::{Arc, Mutex};
///
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = seen.clone();
///
/// source::create(OverflowPolicy::Unbounded, 16, |emitter: source::Emitter<i32>| {
///     (1..=3).for_each(|v| {
///         emitter.next(v);
///     });
///     emitter.complete();
/// })
/// .subscribe_fn(move |v: i32| {
///     sink.lock().unwrap().push(v);
///     Ok(())
/// });
///
/// assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
/// ```
pub fn create<T, F>(policy: OverflowPolicy, capacity: usize, producer: F) -> Create<T, F>
where
    F: Fn(Emitter<T>) + Send + Sync,
{
    Create {
        producer,
        capacity,
        policy,
        _item: PhantomData,
    }
}

impl<T, F> Publisher<T> for Create<T, F>
where
    T: Send + 'static,
    F: Fn(Emitter<T>) + Send + Sync,
{
    fn subscribe(&self, subscriber: SubscriberRef<T>) {
        let emission = EmissionLoop::new(subscriber, self.capacity, self.policy, true);
        emission.start();
        (self.producer)(Emitter { emission });
    }
}
