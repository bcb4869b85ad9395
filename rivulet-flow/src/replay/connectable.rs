// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use super::buffer::{Cursor, ReplayBuffer, ReplayPolicy};
use super::ref_count::{AutoConnect, RefCount};
use parking_lot::Mutex;
use rivulet_core::{
    hooks, DeferredSubscription, Demand, Publisher, RivuletError, Scheduler, Signal, Subscriber,
    SubscriberRef, Subscription, SubscriptionRef, WorkInProgress, UNBOUNDED,
};
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// One connection's worth of state: the log, who reads it, and the upstream.
pub(super) struct ReplayState<T> {
    buffer: ReplayBuffer<T>,
    subscribers: Mutex<Vec<Arc<ReplaySubscription<T>>>>,
    upstream: DeferredSubscription,
    connected: AtomicBool,
    disposed: AtomicBool,
}

impl<T: Clone + Send + Sync + 'static> ReplayState<T> {
    fn new(buffer: ReplayBuffer<T>) -> Arc<Self> {
        Arc::new(Self {
            buffer,
            subscribers: Mutex::new(Vec::new()),
            upstream: DeferredSubscription::new(),
            connected: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        })
    }

    fn add(&self, subscription: Arc<ReplaySubscription<T>>) {
        self.subscribers.lock().push(subscription);
    }

    fn remove(&self, subscription: &ReplaySubscription<T>) {
        self.subscribers
            .lock()
            .retain(|s| !std::ptr::eq(Arc::as_ptr(s), subscription));
    }

    fn push(&self, signal: Signal<T>) -> bool {
        if !self.buffer.append(signal) {
            return false;
        }
        self.dispatch();
        true
    }

    /// Lets every subscriber catch up with the log.
    fn dispatch(&self) {
        let subscribers = self.subscribers.lock().clone();
        for subscriber in subscribers {
            subscriber.drain();
        }
    }

    /// Terminates the log from outside. A log that already holds a terminal keeps it.
    fn terminate(&self, signal: Signal<T>) -> bool {
        if !self.buffer.append(signal) {
            return false;
        }
        self.upstream.cancel();
        self.dispatch();
        true
    }
}

impl<T: Clone + Send + Sync + 'static> Subscriber<T> for ReplayState<T> {
    fn on_subscribe(&self, subscription: SubscriptionRef) {
        if self.upstream.set(subscription) {
            self.upstream.request(UNBOUNDED);
        }
    }

    fn on_next(&self, value: T) {
        self.push(Signal::Next(value));
    }

    fn on_error(&self, error: RivuletError) {
        self.upstream.release();
        if !self.buffer.append(Signal::Error(error.clone())) {
            hooks::on_undeliverable(error);
            return;
        }
        self.dispatch();
    }

    fn on_complete(&self) {
        self.upstream.release();
        self.push(Signal::Complete);
    }
}

/// A subscriber's view of the log: its own cursor and its own demand.
struct ReplaySubscription<T> {
    downstream: SubscriberRef<T>,
    cursor: Mutex<Cursor<T>>,
    demand: Demand,
    wip: WorkInProgress,
    state: Weak<ReplayState<T>>,
}

impl<T: Clone + Send + Sync + 'static> ReplaySubscription<T> {
    fn drain(&self) {
        self.wip.drain(|| self.drain_pass());
    }

    fn drain_pass(&self) -> ControlFlow<()> {
        if self.demand.is_cancelled() {
            return ControlFlow::Break(());
        }

        let requested = self.demand.current();
        let mut emitted = 0i64;
        let mut cursor = self.cursor.lock().clone();

        loop {
            if self.demand.is_cancelled() {
                return ControlFlow::Break(());
            }
            match cursor.peek() {
                None => break,
                Some(Signal::Next(value)) => {
                    if emitted == requested {
                        break;
                    }
                    let value = value.clone();
                    cursor.advance();
                    self.downstream.on_next(value);
                    emitted += 1;
                }
                // Terminals go out whether or not there is demand
                Some(terminal) => {
                    let terminal = terminal.clone();
                    self.detach();
                    terminal.deliver(&*self.downstream);
                    return ControlFlow::Break(());
                }
            }
        }

        *self.cursor.lock() = cursor;
        self.demand.produced(emitted);
        ControlFlow::Continue(())
    }

    fn detach(&self) {
        self.demand.cancel();
        if let Some(state) = self.state.upgrade() {
            state.remove(self);
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Subscription for ReplaySubscription<T> {
    fn request(&self, n: i64) {
        if self.demand.request(n).is_some() {
            self.drain();
        }
    }

    fn cancel(&self) {
        if self.demand.cancel() {
            if let Some(state) = self.state.upgrade() {
                state.remove(self);
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.demand.is_cancelled()
    }
}

struct Shared<T> {
    policy: ReplayPolicy,
    scheduler: Option<Arc<dyn Scheduler>>,
    current: Mutex<Arc<ReplayState<T>>>,
}

impl<T: Clone + Send + Sync + 'static> Shared<T> {
    fn new(policy: ReplayPolicy, scheduler: Option<Arc<dyn Scheduler>>) -> Self {
        let state = Self::fresh(policy, scheduler.as_ref());
        Self {
            policy,
            scheduler,
            current: Mutex::new(state),
        }
    }

    fn fresh(policy: ReplayPolicy, scheduler: Option<&Arc<dyn Scheduler>>) -> Arc<ReplayState<T>> {
        let buffer = match scheduler {
            Some(scheduler) => ReplayBuffer::with_scheduler(policy, scheduler.clone()),
            None => ReplayBuffer::new(policy),
        };
        ReplayState::new(buffer)
    }

    fn current(&self) -> Arc<ReplayState<T>> {
        self.current.lock().clone()
    }

    /// Installs a fresh state unless `expected` was already replaced.
    fn reset(&self, expected: &Arc<ReplayState<T>>) {
        let fresh = Self::fresh(self.policy, self.scheduler.as_ref());
        let previous = {
            let mut current = self.current.lock();
            if !Arc::ptr_eq(&current, expected) {
                return;
            }
            std::mem::replace(&mut *current, fresh)
        };
        drop(previous);
    }
}

/// A multicasting publisher that starts its upstream on [`connect`](Self::connect).
///
/// Subscribers share one upstream subscription and one signal log. Each of them
/// starts from the oldest signal the [`ReplayPolicy`] retains and is then served
/// at its own pace: the upstream is requested without bound, and a slow
/// subscriber only holds back the part of the log it has not read yet.
///
/// The terminal signal stays in the log. Subscribers arriving after it get the
/// retained values and the terminal, and connecting again does not resubscribe
/// to the upstream. Only [`Connection::dispose`] starts over with an empty log.
pub struct ConnectableFlow<T, P> {
    source: Arc<P>,
    shared: Arc<Shared<T>>,
}

impl<T, P> Clone for ConnectableFlow<T, P> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            shared: self.shared.clone(),
        }
    }
}

impl<T, P> ConnectableFlow<T, P>
where
    T: Clone + Send + Sync + 'static,
    P: Publisher<T> + 'static,
{
    /// Time-based policies measure age with the system clock.
    pub fn new(source: P, policy: ReplayPolicy) -> Self {
        Self {
            source: Arc::new(source),
            shared: Arc::new(Shared::new(policy, None)),
        }
    }

    /// Time-based policies measure age with `scheduler`.
    pub fn with_scheduler(source: P, policy: ReplayPolicy, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            source: Arc::new(source),
            shared: Arc::new(Shared::new(policy, Some(scheduler))),
        }
    }

    pub fn policy(&self) -> ReplayPolicy {
        self.shared.policy
    }

    /// Subscribes to the upstream, once. Further calls return the same connection.
    pub fn connect(&self) -> Connection<T> {
        let state = self.shared.current();
        if !state.connected.swap(true, Ordering::AcqRel) {
            if state.buffer.is_terminated() {
                debug!("replay: log already terminated, upstream not subscribed");
            } else {
                debug!("replay: connecting upstream");
                self.source.subscribe(state.clone());
            }
        }
        Connection {
            shared: self.shared.clone(),
            state,
        }
    }

    /// Returns `true` between [`connect`](Self::connect) and the matching dispose.
    pub fn is_connected(&self) -> bool {
        self.shared.current().connected.load(Ordering::Acquire)
    }

    /// Subscribers currently reading the log.
    pub fn subscriber_count(&self) -> usize {
        self.shared.current().subscribers.lock().len()
    }

    pub fn has_subscribers(&self) -> bool {
        self.subscriber_count() > 0
    }

    /// Signals a new subscriber would receive, terminal included.
    pub fn cached_event_count(&self) -> usize {
        self.shared.current().buffer.event_count()
    }

    /// Returns `true` once the log holds a terminal signal.
    pub fn is_terminated(&self) -> bool {
        self.shared.current().buffer.is_terminated()
    }

    /// Completes every current and future subscriber and cancels the upstream.
    ///
    /// Has no effect when the log already holds a terminal signal.
    pub fn complete(&self) -> bool {
        self.shared.current().terminate(Signal::Complete)
    }

    /// Fails every current and future subscriber and cancels the upstream.
    ///
    /// Has no effect when the log already holds a terminal signal.
    pub fn complete_with_error(&self, error: RivuletError) -> bool {
        self.shared.current().terminate(Signal::Error(error))
    }

    /// Connects once `subscribers` subscribers have arrived; `0` connects now.
    pub fn auto_connect(&self, subscribers: usize) -> AutoConnect<T, P> {
        AutoConnect::new(self.clone(), subscribers)
    }

    /// Connects on the first subscriber and disposes when the last one leaves.
    pub fn ref_count(&self) -> RefCount<T, P> {
        RefCount::new(self.clone())
    }
}

impl<T, P> Publisher<T> for ConnectableFlow<T, P>
where
    T: Clone + Send + Sync + 'static,
    P: Publisher<T> + 'static,
{
    fn subscribe(&self, subscriber: SubscriberRef<T>) {
        let state = self.shared.current();
        let subscription = Arc::new(ReplaySubscription {
            downstream: subscriber,
            cursor: Mutex::new(state.buffer.head()),
            demand: Demand::new(),
            wip: WorkInProgress::new(),
            state: Arc::downgrade(&state),
        });
        subscription.downstream.on_subscribe(subscription.clone());
        if subscription.demand.is_cancelled() {
            return;
        }
        // Signals appended before this point are picked up by the drain below
        state.add(subscription.clone());
        if subscription.demand.is_cancelled() {
            state.remove(&subscription);
            return;
        }
        subscription.drain();
    }
}

/// Handle on one connection of a [`ConnectableFlow`].
pub struct Connection<T> {
    shared: Arc<Shared<T>>,
    state: Arc<ReplayState<T>>,
}

impl<T> Clone for Connection<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            state: self.state.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Connection<T> {
    /// Cancels the upstream and resets the flow to an empty, unconnected log.
    ///
    /// Subscribers of the disposed connection are left where they are: they get
    /// nothing more. Disposing twice, or after a newer connection was made, only
    /// affects this connection.
    pub fn dispose(&self) {
        if self.state.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("replay: disposing connection");
        self.state.upstream.cancel();
        self.shared.reset(&self.state);
    }

    pub fn is_disposed(&self) -> bool {
        self.state.disposed.load(Ordering::Acquire)
    }
}

impl<T> std::fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("disposed", &self.state.disposed.load(Ordering::Acquire))
            .finish()
    }
}
