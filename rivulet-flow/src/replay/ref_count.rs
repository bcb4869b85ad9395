// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Automatic connection management for [`ConnectableFlow`].

use super::connectable::{ConnectableFlow, Connection};
use parking_lot::Mutex;
use rivulet_core::{
    DeferredSubscription, Publisher, RivuletError, Subscriber, SubscriberRef, Subscription,
    SubscriptionRef,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

struct RefState<T> {
    subscribers: usize,
    generation: u64,
    connection: Option<Connection<T>>,
}

struct RefCountInner<T, P> {
    connectable: ConnectableFlow<T, P>,
    state: Mutex<RefState<T>>,
}

impl<T, P> RefCountInner<T, P>
where
    T: Clone + Send + Sync + 'static,
    P: Publisher<T> + 'static,
{
    fn release(&self) {
        let connection = {
            let mut state = self.state.lock();
            state.subscribers = state.subscribers.saturating_sub(1);
            if state.subscribers == 0 {
                state.connection.take()
            } else {
                None
            }
        };
        if let Some(connection) = connection {
            connection.dispose();
        }
    }
}

/// Publisher returned by [`ConnectableFlow::ref_count`].
///
/// The first subscriber connects; when the last one cancels or terminates, the
/// connection is disposed, and the next subscriber starts a new one.
pub struct RefCount<T, P> {
    inner: Arc<RefCountInner<T, P>>,
}

impl<T, P> Clone for RefCount<T, P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, P> RefCount<T, P>
where
    T: Clone + Send + Sync + 'static,
    P: Publisher<T> + 'static,
{
    pub(super) fn new(connectable: ConnectableFlow<T, P>) -> Self {
        Self {
            inner: Arc::new(RefCountInner {
                connectable,
                state: Mutex::new(RefState {
                    subscribers: 0,
                    generation: 0,
                    connection: None,
                }),
            }),
        }
    }

    /// Subscribers currently counted.
    pub fn subscriber_count(&self) -> usize {
        self.inner.state.lock().subscribers
    }

    /// Returns `true` while a connection is held.
    pub fn is_connected(&self) -> bool {
        self.inner.state.lock().connection.is_some()
    }
}

impl<T, P> Publisher<T> for RefCount<T, P>
where
    T: Clone + Send + Sync + 'static,
    P: Publisher<T> + 'static,
{
    fn subscribe(&self, subscriber: SubscriberRef<T>) {
        let generation = {
            let mut state = self.inner.state.lock();
            state.subscribers += 1;
            if state.subscribers == 1 {
                state.generation += 1;
                Some(state.generation)
            } else {
                None
            }
        };

        let parent = self.inner.clone();
        self.inner
            .connectable
            .subscribe(Arc::new_cyclic(|weak_self| RefCountSubscriber {
                actual: subscriber,
                parent,
                upstream: DeferredSubscription::new(),
                released: AtomicBool::new(false),
                weak_self: weak_self.clone(),
            }));

        let Some(generation) = generation else {
            return;
        };
        let connection = self.inner.connectable.connect();
        let dispose = {
            let mut state = self.inner.state.lock();
            if state.generation == generation && state.subscribers > 0 {
                state.connection = Some(connection.clone());
                false
            } else {
                // Everyone left while connecting; a newer generation reuses the log
                state.subscribers == 0
            }
        };
        if dispose {
            connection.dispose();
        }
    }
}

struct RefCountSubscriber<T, P> {
    actual: SubscriberRef<T>,
    parent: Arc<RefCountInner<T, P>>,
    upstream: DeferredSubscription,
    released: AtomicBool,
    weak_self: Weak<Self>,
}

impl<T, P> RefCountSubscriber<T, P>
where
    T: Clone + Send + Sync + 'static,
    P: Publisher<T> + 'static,
{
    fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.parent.release();
        }
    }
}

impl<T, P> Subscriber<T> for RefCountSubscriber<T, P>
where
    T: Clone + Send + Sync + 'static,
    P: Publisher<T> + 'static,
{
    fn on_subscribe(&self, subscription: SubscriptionRef) {
        if !self.upstream.set(subscription) {
            return;
        }
        if let Some(this) = self.weak_self.upgrade() {
            self.actual.on_subscribe(this);
        }
    }

    fn on_next(&self, value: T) {
        self.actual.on_next(value);
    }

    fn on_error(&self, error: RivuletError) {
        self.upstream.release();
        self.release();
        self.actual.on_error(error);
    }

    fn on_complete(&self) {
        self.upstream.release();
        self.release();
        self.actual.on_complete();
    }
}

impl<T, P> Subscription for RefCountSubscriber<T, P>
where
    T: Clone + Send + Sync + 'static,
    P: Publisher<T> + 'static,
{
    fn request(&self, n: i64) {
        self.upstream.request(n);
    }

    fn cancel(&self) {
        self.upstream.cancel();
        self.release();
    }

    fn is_cancelled(&self) -> bool {
        self.upstream.is_cancelled()
    }
}

/// Publisher returned by [`ConnectableFlow::auto_connect`].
///
/// Connects once the given number of subscribers has arrived and then stays
/// connected; the connection is available through [`connection`](Self::connection).
pub struct AutoConnect<T, P> {
    connectable: ConnectableFlow<T, P>,
    threshold: usize,
    subscribed: AtomicUsize,
    connection: Mutex<Option<Connection<T>>>,
}

impl<T, P> AutoConnect<T, P>
where
    T: Clone + Send + Sync + 'static,
    P: Publisher<T> + 'static,
{
    pub(super) fn new(connectable: ConnectableFlow<T, P>, threshold: usize) -> Self {
        let connection = (threshold == 0).then(|| connectable.connect());
        Self {
            connectable,
            threshold,
            subscribed: AtomicUsize::new(0),
            connection: Mutex::new(connection),
        }
    }

    /// The connection, once made.
    pub fn connection(&self) -> Option<Connection<T>> {
        self.connection.lock().clone()
    }
}

impl<T, P> Publisher<T> for AutoConnect<T, P>
where
    T: Clone + Send + Sync + 'static,
    P: Publisher<T> + 'static,
{
    fn subscribe(&self, subscriber: SubscriberRef<T>) {
        self.connectable.subscribe(subscriber);
        if self.subscribed.fetch_add(1, Ordering::AcqRel) + 1 == self.threshold {
            let connection = self.connectable.connect();
            *self.connection.lock() = Some(connection);
        }
    }
}
