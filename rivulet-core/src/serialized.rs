// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Serialized emitter.
//!
//! Wraps a subscriber so that signals arriving concurrently from several producer
//! threads are delivered one at a time, in the order they were enqueued. The
//! terminal rule is enforced here: after the first terminal signal is delivered,
//! everything else is discarded and late errors go to the undeliverable sink.

use crate::{hooks, Signal, Subscriber, SubscriberRef, SubscriptionRef, WorkInProgress};
use crate::RivuletError;
use crossbeam_queue::SegQueue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Subscriber adapter serializing concurrent `on_next`/`on_error`/`on_complete`.
///
/// # Example
///
/// ```
/// use rivulet_core::{SerializedSubscriber, Subscriber};
/// use rivulet_test_utils::TestSubscriber;
/// use std::sync::Arc;
/// use std::thread;
///
/// let ts = TestSubscriber::<u32>::unbounded();
/// let serialized = SerializedSubscriber::new(ts.clone());
///
/// let handles: Vec<_> = (0..4)
///     .map(|t| {
///         let s = serialized.clone();
///         thread::spawn(move || (0..100).for_each(|i| s.on_next(t * 100 + i)))
///     })
///     .collect();
/// handles.into_iter().for_each(|h| h.join().unwrap());
/// serialized.on_complete();
///
/// assert_eq!(ts.values().len(), 400);
/// assert_eq!(ts.max_concurrency(), 1);
/// ```
pub struct SerializedSubscriber<T> {
    actual: SubscriberRef<T>,
    queue: SegQueue<Signal<T>>,
    wip: WorkInProgress,
    done: AtomicBool,
}

impl<T: Send + 'static> SerializedSubscriber<T> {
    /// Wraps `actual`.
    pub fn new<S>(actual: S) -> Arc<Self>
    where
        S: Subscriber<T> + 'static,
    {
        Self::from_ref(Arc::new(actual))
    }

    /// Wraps an already shared subscriber.
    pub fn from_ref(actual: SubscriberRef<T>) -> Arc<Self> {
        Arc::new(Self {
            actual,
            queue: SegQueue::new(),
            wip: WorkInProgress::new(),
            done: AtomicBool::new(false),
        })
    }

    /// Returns `true` once a terminal signal was delivered.
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    fn emit(&self, signal: Signal<T>) {
        if self.is_done() {
            Self::discard(signal);
            return;
        }
        self.queue.push(signal);
        self.drain();
    }

    fn drain(&self) {
        self.wip.drain(|| {
            while let Some(signal) = self.queue.pop() {
                if self.is_done() {
                    Self::discard(signal);
                    continue;
                }
                if signal.is_terminal() {
                    self.done.store(true, Ordering::Release);
                }
                signal.deliver(&*self.actual);
            }
            std::ops::ControlFlow::Continue(())
        });
    }

    fn discard(signal: Signal<T>) {
        match signal {
            Signal::Error(error) => hooks::on_undeliverable(error),
            Signal::Next(_) => trace!("serialized subscriber dropped on_next after terminal"),
            Signal::Complete => {}
        }
    }
}

impl<T: Send + 'static> Subscriber<T> for SerializedSubscriber<T> {
    fn on_subscribe(&self, subscription: SubscriptionRef) {
        self.actual.on_subscribe(subscription);
    }

    fn on_next(&self, value: T) {
        self.emit(Signal::Next(value));
    }

    fn on_error(&self, error: RivuletError) {
        self.emit(Signal::Error(error));
    }

    fn on_complete(&self) {
        self.emit(Signal::Complete);
    }
}
