// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::{
    hooks, ProtocolViolation, RivuletError, Subscriber, SubscriberRef, Subscription,
    SubscriptionRef,
};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Guards a subscriber that may misbehave, or be fed by a producer that does.
///
/// - a second `on_subscribe` is cancelled and reported;
/// - signals before `on_subscribe`, `on_next` after a terminal, and second
///   terminals are dropped and reported;
/// - a panic inside `on_subscribe`/`on_next` cancels the upstream and becomes the
///   terminal error; a panic inside a terminal callback goes to the sink.
///
/// All reports go to [`hooks::on_undeliverable`]. Calls must still arrive
/// serialized; wrap the producer side in a
/// [`SerializedSubscriber`](crate::SerializedSubscriber) if they do not.
pub struct SafeSubscriber<T> {
    actual: SubscriberRef<T>,
    upstream: OnceLock<SubscriptionRef>,
    done: AtomicBool,
}

impl<T: Send + 'static> SafeSubscriber<T> {
    pub fn new(actual: SubscriberRef<T>) -> Arc<Self> {
        Arc::new(Self {
            actual,
            upstream: OnceLock::new(),
            done: AtomicBool::new(false),
        })
    }

    /// Returns `true` once a terminal signal was accepted.
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    fn cancel_upstream(&self) {
        if let Some(upstream) = self.upstream.get() {
            upstream.cancel();
        }
    }

    fn violation(&self, violation: ProtocolViolation) {
        warn!("subscriber contract broken: {violation}");
        hooks::on_undeliverable(violation.into());
    }

    fn fail_from_callback(&self, error: RivuletError) {
        self.cancel_upstream();
        if self.done.swap(true, Ordering::AcqRel) {
            hooks::on_undeliverable(error);
            return;
        }
        let handed_over = error.clone();
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| self.actual.on_error(error))) {
            hooks::on_undeliverable(RivuletError::composite(vec![
                handed_over,
                panic_error("on_error", payload.as_ref()),
            ]));
        }
    }
}

impl<T: Send + 'static> Subscriber<T> for SafeSubscriber<T> {
    fn on_subscribe(&self, subscription: SubscriptionRef) {
        if self.upstream.set(subscription.clone()).is_err() {
            subscription.cancel();
            self.violation(ProtocolViolation::DuplicateSubscription);
            return;
        }

        let result = catch_unwind(AssertUnwindSafe(|| self.actual.on_subscribe(subscription)));
        if let Err(payload) = result {
            self.fail_from_callback(panic_error("on_subscribe", payload.as_ref()));
        }
    }

    fn on_next(&self, value: T) {
        if self.is_done() {
            self.violation(ProtocolViolation::NextAfterTerminal);
            return;
        }
        if self.upstream.get().is_none() {
            self.done.store(true, Ordering::Release);
            self.violation(ProtocolViolation::SignalBeforeSubscribe);
            return;
        }

        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| self.actual.on_next(value))) {
            self.fail_from_callback(panic_error("on_next", payload.as_ref()));
        }
    }

    fn on_error(&self, error: RivuletError) {
        if self.done.swap(true, Ordering::AcqRel) {
            hooks::on_undeliverable(error);
            return;
        }
        if self.upstream.get().is_none() {
            self.violation(ProtocolViolation::SignalBeforeSubscribe);
            hooks::on_undeliverable(error);
            return;
        }

        let handed_over = error.clone();
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| self.actual.on_error(error))) {
            hooks::on_undeliverable(RivuletError::composite(vec![
                handed_over,
                panic_error("on_error", payload.as_ref()),
            ]));
        }
    }

    fn on_complete(&self) {
        if self.done.swap(true, Ordering::AcqRel) {
            self.violation(ProtocolViolation::TerminalAfterTerminal);
            return;
        }
        if self.upstream.get().is_none() {
            self.violation(ProtocolViolation::SignalBeforeSubscribe);
            return;
        }

        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| self.actual.on_complete())) {
            hooks::on_undeliverable(panic_error("on_complete", payload.as_ref()));
        }
    }
}

fn panic_error(callback: &str, payload: &(dyn Any + Send)) -> RivuletError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    RivuletError::stream_error(format!("{callback} panicked: {message}"))
}
