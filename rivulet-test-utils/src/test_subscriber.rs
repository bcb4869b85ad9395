// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Recording subscriber with demand control and protocol checks.

use event_listener::{Event, Listener};
use parking_lot::Mutex;
use rivulet_core::{
    DeferredSubscription, RivuletError, Signal, Subscriber, Subscription, SubscriptionRef,
    UNBOUNDED,
};
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A subscriber that records every signal it receives.
///
/// Besides the values and the terminal signal it tracks what a well-behaved
/// producer must never do: call it twice at the same time, call it after a
/// terminal signal, or call `on_subscribe` more than once.
///
/// ```rust
/// use rivulet_core::{source, Publisher};
/// use rivulet_test_utils::TestSubscriber;
///
/// let ts = TestSubscriber::<i64>::new(2);
/// source::range(1, 5).subscribe(ts.clone());
///
/// ts.assert_values(&[1, 2]).assert_not_complete();
///
/// ts.request(10);
/// ts.assert_values(&[1, 2, 3, 4, 5]).assert_complete();
/// ```
pub struct TestSubscriber<T> {
    initial_request: i64,
    request_per_item: i64,
    cancel_after: Option<usize>,
    upstream: DeferredSubscription,
    signals: Mutex<Vec<Signal<T>>>,
    subscribe_calls: AtomicUsize,
    terminals: AtomicUsize,
    after_terminal: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    changed: Event,
}

impl<T: Send + 'static> TestSubscriber<T> {
    /// Requests `initial_request` items on subscribe (nothing if it is 0).
    pub fn new(initial_request: i64) -> Arc<Self> {
        Arc::new(Self::with_settings(initial_request, 0, None))
    }

    /// Requests everything on subscribe.
    pub fn unbounded() -> Arc<Self> {
        Self::new(UNBOUNDED)
    }

    /// Requests one item on subscribe and one more after each item.
    pub fn one_by_one() -> Arc<Self> {
        Arc::new(Self::with_settings(1, 1, None))
    }

    /// Requests everything and cancels from inside the `count`-th `on_next`.
    pub fn cancelling_after(count: usize) -> Arc<Self> {
        Arc::new(Self::with_settings(UNBOUNDED, 0, Some(count)))
    }

    fn with_settings(
        initial_request: i64,
        request_per_item: i64,
        cancel_after: Option<usize>,
    ) -> Self {
        Self {
            initial_request,
            request_per_item,
            cancel_after,
            upstream: DeferredSubscription::new(),
            signals: Mutex::new(Vec::new()),
            subscribe_calls: AtomicUsize::new(0),
            terminals: AtomicUsize::new(0),
            after_terminal: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            changed: Event::new(),
        }
    }

    /// Requests `n` more items. Works before the subscription arrived too.
    pub fn request(&self, n: i64) {
        self.upstream.request(n);
    }

    pub fn cancel(&self) {
        self.upstream.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.upstream.is_cancelled()
    }

    /// Returns `true` once `on_subscribe` was called.
    pub fn is_subscribed(&self) -> bool {
        self.subscribe_calls.load(Ordering::Acquire) > 0
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscribe_calls.load(Ordering::Acquire)
    }

    /// Number of items received.
    pub fn value_count(&self) -> usize {
        self.signals.lock().iter().filter(|s| s.is_next()).count()
    }

    /// Errors received (more than one means the producer misbehaved).
    pub fn errors(&self) -> Vec<RivuletError> {
        self.signals
            .lock()
            .iter()
            .filter_map(|s| match s {
                Signal::Error(e) => Some(e.clone()),
                _ => None,
            })
            .collect()
    }

    /// The first error received, if any.
    pub fn error(&self) -> Option<RivuletError> {
        self.errors().into_iter().next()
    }

    /// Number of `on_complete` calls.
    pub fn completions(&self) -> usize {
        self.signals
            .lock()
            .iter()
            .filter(|s| matches!(s, Signal::Complete))
            .count()
    }

    /// Returns `true` once a terminal signal was received.
    pub fn is_terminated(&self) -> bool {
        self.terminals.load(Ordering::Acquire) > 0
    }

    /// Highest number of callbacks observed running at the same time.
    pub fn max_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::Acquire)
    }

    /// Blocks until a terminal signal arrived or `timeout` elapsed.
    pub fn await_terminal(&self, timeout: Duration) -> bool {
        self.await_until(timeout, || self.is_terminated())
    }

    /// Blocks until at least `count` items arrived or `timeout` elapsed.
    pub fn await_count(&self, count: usize, timeout: Duration) -> bool {
        self.await_until(timeout, || self.value_count() >= count)
    }

    fn await_until(&self, timeout: Duration, condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if condition() {
                return true;
            }
            let listener = self.changed.listen();
            if condition() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            listener.wait_timeout(deadline - now);
        }
    }

    fn enter(&self) {
        let in_flight = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::AcqRel);
        if self.is_terminated() {
            self.after_terminal.fetch_add(1, Ordering::AcqRel);
        }
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
        self.changed.notify(usize::MAX);
    }

    fn record(&self, signal: Signal<T>) -> usize {
        let mut signals = self.signals.lock();
        signals.push(signal);
        signals.iter().filter(|s| s.is_next()).count()
    }
}

impl<T: Clone + Send + 'static> TestSubscriber<T> {
    /// Items received, in order.
    pub fn values(&self) -> Vec<T> {
        self.signals
            .lock()
            .iter()
            .filter_map(|s| match s {
                Signal::Next(v) => Some(v.clone()),
                _ => None,
            })
            .collect()
    }

    /// Every signal received, in order.
    pub fn signals(&self) -> Vec<Signal<T>> {
        self.signals.lock().clone()
    }
}

impl<T> TestSubscriber<T>
where
    T: Clone + PartialEq + Debug + Send + 'static,
{
    #[track_caller]
    pub fn assert_values(&self, expected: &[T]) -> &Self {
        assert_eq!(self.values(), expected, "values mismatch");
        self
    }
}

impl<T: Send + 'static> TestSubscriber<T> {
    #[track_caller]
    pub fn assert_value_count(&self, expected: usize) -> &Self {
        assert_eq!(self.value_count(), expected, "value count mismatch");
        self
    }

    #[track_caller]
    pub fn assert_complete(&self) -> &Self {
        assert_eq!(self.completions(), 1, "expected exactly one on_complete");
        assert!(self.errors().is_empty(), "unexpected error: {:?}", self.error());
        self
    }

    #[track_caller]
    pub fn assert_not_complete(&self) -> &Self {
        assert_eq!(self.completions(), 0, "unexpected on_complete");
        self
    }

    #[track_caller]
    pub fn assert_no_errors(&self) -> &Self {
        assert!(self.errors().is_empty(), "unexpected error: {:?}", self.error());
        self
    }

    /// Asserts exactly one error was received and it satisfies `predicate`.
    #[track_caller]
    pub fn assert_error<P>(&self, predicate: P) -> &Self
    where
        P: FnOnce(&RivuletError) -> bool,
    {
        let errors = self.errors();
        assert_eq!(errors.len(), 1, "expected exactly one error, got {errors:?}");
        assert!(predicate(&errors[0]), "error did not match: {:?}", errors[0]);
        assert_eq!(self.completions(), 0, "on_complete alongside on_error");
        self
    }

    /// Asserts exactly one error whose message contains `fragment`.
    #[track_caller]
    pub fn assert_error_message(&self, fragment: &str) -> &Self {
        self.assert_error(|e| e.to_string().contains(fragment))
    }

    #[track_caller]
    pub fn assert_not_terminated(&self) -> &Self {
        assert!(!self.is_terminated(), "unexpected terminal signal");
        self
    }

    /// Asserts the protocol was honored: one `on_subscribe`, at most one terminal
    /// signal with nothing after it, and no overlapping callbacks.
    #[track_caller]
    pub fn assert_well_formed(&self) -> &Self {
        assert_eq!(self.subscribe_count(), 1, "on_subscribe must be called exactly once");
        assert!(self.terminals.load(Ordering::Acquire) <= 1, "more than one terminal signal");
        assert_eq!(
            self.after_terminal.load(Ordering::Acquire),
            0,
            "signals received after the terminal signal"
        );
        assert!(self.max_concurrency() <= 1, "overlapping callbacks");
        self
    }
}

impl<T: Send + 'static> Subscriber<T> for TestSubscriber<T> {
    fn on_subscribe(&self, subscription: SubscriptionRef) {
        self.enter();
        self.subscribe_calls.fetch_add(1, Ordering::AcqRel);
        self.leave();

        // Outside the in-flight window: a synchronous source emits from in here
        if self.upstream.set(subscription) && self.initial_request > 0 {
            self.upstream.request(self.initial_request);
        }
    }

    fn on_next(&self, value: T) {
        self.enter();
        let count = self.record(Signal::Next(value));
        self.leave();

        if self.cancel_after == Some(count) {
            self.upstream.cancel();
        } else if self.request_per_item > 0 {
            self.upstream.request(self.request_per_item);
        }
    }

    fn on_error(&self, error: RivuletError) {
        self.enter();
        self.record(Signal::Error(error));
        self.terminals.fetch_add(1, Ordering::AcqRel);
        self.leave();
    }

    fn on_complete(&self) {
        self.enter();
        self.record(Signal::Complete);
        self.terminals.fetch_add(1, Ordering::AcqRel);
        self.leave();
    }
}
