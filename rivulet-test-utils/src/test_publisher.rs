// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Hot publisher driven by hand from the test body.

use parking_lot::Mutex;
use rivulet_core::{demand, Demand, Publisher, RivuletError, SubscriberRef, Subscription};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A hot source the test pushes into with [`emit`](Self::emit).
///
/// Items go to every subscriber that has not cancelled, whether or not it
/// requested them: this is how tests play an upstream that ignores demand.
/// What each subscriber did request is logged and can be inspected.
///
/// Subscribers arriving after [`complete`](Self::complete) or
/// [`error`](Self::error) receive the terminal signal right away.
pub struct TestPublisher<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    subscribers: Mutex<Vec<Arc<TestSubscription<T>>>>,
    terminal: Mutex<Option<Option<RivuletError>>>,
    subscribe_count: AtomicUsize,
    log: Arc<RequestLog>,
}

#[derive(Default)]
struct RequestLog {
    requests: Mutex<Vec<i64>>,
    cancels: AtomicUsize,
}

struct TestSubscription<T> {
    downstream: SubscriberRef<T>,
    demand: Demand,
    log: Arc<RequestLog>,
}

impl<T> Subscription for TestSubscription<T> {
    fn request(&self, n: i64) {
        if demand::validate(n) {
            self.log.requests.lock().push(n);
            self.demand.request(n);
        }
    }

    fn cancel(&self) {
        if self.demand.cancel() {
            self.log.cancels.fetch_add(1, Ordering::AcqRel);
        }
    }

    fn is_cancelled(&self) -> bool {
        self.demand.is_cancelled()
    }
}

impl<T> Clone for TestPublisher<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Default for TestPublisher<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TestPublisher<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                subscribers: Mutex::new(Vec::new()),
                terminal: Mutex::new(None),
                subscribe_count: AtomicUsize::new(0),
                log: Arc::new(RequestLog::default()),
            }),
        }
    }

    fn live(&self) -> Vec<Arc<TestSubscription<T>>> {
        self.inner
            .subscribers
            .lock()
            .iter()
            .filter(|s| !s.is_cancelled())
            .cloned()
            .collect()
    }

    pub fn error(&self, error: RivuletError) {
        *self.inner.terminal.lock() = Some(Some(error.clone()));
        let subscribers = std::mem::take(&mut *self.inner.subscribers.lock());
        for subscriber in subscribers {
            if !subscriber.is_cancelled() {
                subscriber.downstream.on_error(error.clone());
            }
        }
    }

    /// Fails every subscriber, cancelled ones included.
    ///
    /// Plays an upstream whose failure was already on its way when the
    /// cancel arrived.
    pub fn error_despite_cancel(&self, error: RivuletError) {
        *self.inner.terminal.lock() = Some(Some(error.clone()));
        let subscribers = std::mem::take(&mut *self.inner.subscribers.lock());
        for subscriber in subscribers {
            subscriber.downstream.on_error(error.clone());
        }
    }

    pub fn complete(&self) {
        *self.inner.terminal.lock() = Some(None);
        let subscribers = std::mem::take(&mut *self.inner.subscribers.lock());
        for subscriber in subscribers {
            if !subscriber.is_cancelled() {
                subscriber.downstream.on_complete();
            }
        }
    }

    /// Subscribers that have not cancelled (and have not been terminated).
    pub fn subscriber_count(&self) -> usize {
        self.live().len()
    }

    pub fn has_subscribers(&self) -> bool {
        self.subscriber_count() > 0
    }

    /// Total number of `subscribe` calls, terminated and cancelled ones included.
    pub fn subscribe_count(&self) -> usize {
        self.inner.subscribe_count.load(Ordering::Acquire)
    }

    /// Every positive `request(n)` amount, across all subscribers, in call order.
    pub fn requests(&self) -> Vec<i64> {
        self.inner.log.requests.lock().clone()
    }

    /// Sum of all requests, saturating at [`demand::UNBOUNDED`].
    pub fn total_requested(&self) -> i64 {
        self.requests().into_iter().fold(0, demand::add_cap)
    }

    /// Number of subscriptions that were cancelled.
    pub fn cancel_count(&self) -> usize {
        self.inner.log.cancels.load(Ordering::Acquire)
    }
}

impl<T: Clone> TestPublisher<T> {
    /// Delivers `value` to every live subscriber. Returns how many received it.
    pub fn emit(&self, value: T) -> usize {
        let live = self.live();
        for subscriber in &live {
            subscriber.demand.produced(1);
            subscriber.downstream.on_next(value.clone());
        }
        live.len()
    }

    pub fn emit_all<I>(&self, values: I)
    where
        I: IntoIterator<Item = T>,
    {
        for value in values {
            self.emit(value);
        }
    }
}

impl<T: Send + 'static> Publisher<T> for TestPublisher<T> {
    fn subscribe(&self, subscriber: SubscriberRef<T>) {
        self.inner.subscribe_count.fetch_add(1, Ordering::AcqRel);
        let subscription = Arc::new(TestSubscription {
            downstream: subscriber.clone(),
            demand: Demand::new(),
            log: self.inner.log.clone(),
        });

        let terminal = self.inner.terminal.lock().clone();
        match terminal {
            Some(terminal) => {
                subscriber.on_subscribe(subscription);
                match terminal {
                    Some(error) => subscriber.on_error(error),
                    None => subscriber.on_complete(),
                }
            }
            None => {
                self.inner.subscribers.lock().push(subscription.clone());
                subscriber.on_subscribe(subscription);
            }
        }
    }
}
