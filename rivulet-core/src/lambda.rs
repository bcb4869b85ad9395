// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Closure-based subscriber.

use crate::demand::UNBOUNDED;
use crate::{
    hooks, DeferredSubscription, ProtocolViolation, Result, RivuletError, Subscriber,
    Subscription, SubscriptionRef,
};
use std::sync::atomic::{AtomicBool, Ordering};

type NextFn<T> = Box<dyn Fn(T) -> Result<()> + Send + Sync>;
type ErrorFn = Box<dyn Fn(RivuletError) -> Result<()> + Send + Sync>;
type CompleteFn = Box<dyn Fn() -> Result<()> + Send + Sync>;

/// Subscriber built from closures.
///
/// `on_next` is fallible: an `Err` cancels the upstream and is delivered to the
/// error closure as if the upstream had failed. Without an error closure, errors
/// go to the undeliverable sink. Failures of the error or completion closures,
/// and any signal arriving after termination, go to the sink as well.
///
/// The subscriber doubles as its own disposable: [`Subscription::cancel`]
/// cancels the upstream, before or after it arrived.
///
/// ```
/// use rivulet_core::{source, LambdaSubscriber, PublisherExt};
/// use std::sync::atomic::{AtomicI64, Ordering};
/// use std::sync::Arc;
///
/// let sum = Arc::new(AtomicI64::new(0));
/// let acc = sum.clone();
///
/// source::range(1, 4).subscribe_lambda(LambdaSubscriber::new(move |v: i64| {
///     acc.fetch_add(v, Ordering::Relaxed);
///     Ok(())
/// }));
///
/// assert_eq!(sum.load(Ordering::Relaxed), 1 + 2 + 3 + 4);
/// ```
pub struct LambdaSubscriber<T> {
    on_next: NextFn<T>,
    on_error: Option<ErrorFn>,
    on_complete: Option<CompleteFn>,
    initial_request: i64,
    upstream: DeferredSubscription,
    done: AtomicBool,
}

impl<T: Send + 'static> LambdaSubscriber<T> {
    /// Subscriber that requests everything and forwards items to `on_next`.
    pub fn new<F>(on_next: F) -> Self
    where
        F: Fn(T) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            on_next: Box::new(on_next),
            on_error: None,
            on_complete: None,
            initial_request: UNBOUNDED,
            upstream: DeferredSubscription::new(),
            done: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn with_on_error<F>(mut self, on_error: F) -> Self
    where
        F: Fn(RivuletError) -> Result<()> + Send + Sync + 'static,
    {
        self.on_error = Some(Box::new(on_error));
        self
    }

    #[must_use]
    pub fn with_on_complete<F>(mut self, on_complete: F) -> Self
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        self.on_complete = Some(Box::new(on_complete));
        self
    }

    /// Amount requested when the upstream arrives. Values below 1 request nothing.
    #[must_use]
    pub fn with_initial_request(mut self, n: i64) -> Self {
        self.initial_request = n.max(0);
        self
    }

    /// Returns `true` if an error closure was supplied.
    pub fn has_custom_on_error(&self) -> bool {
        self.on_error.is_some()
    }

    /// Returns `true` once terminated or cancelled.
    pub fn is_disposed(&self) -> bool {
        self.done.load(Ordering::Acquire) || self.upstream.is_cancelled()
    }

    fn terminate_with_error(&self, error: RivuletError) {
        match &self.on_error {
            Some(on_error) => {
                if let Err(failure) = on_error(error.clone()) {
                    hooks::on_undeliverable(RivuletError::composite(vec![error, failure]));
                }
            }
            None => hooks::on_undeliverable(error),
        }
    }
}

impl<T: Send + 'static> Subscriber<T> for LambdaSubscriber<T> {
    fn on_subscribe(&self, subscription: SubscriptionRef) {
        if self.upstream.set(subscription) && self.initial_request > 0 {
            self.upstream.request(self.initial_request);
        }
    }

    fn on_next(&self, value: T) {
        if self.done.load(Ordering::Acquire) {
            hooks::on_undeliverable(ProtocolViolation::NextAfterTerminal.into());
            return;
        }
        if self.upstream.is_cancelled() {
            return;
        }

        if let Err(error) = (self.on_next)(value) {
            self.upstream.cancel();
            if !self.done.swap(true, Ordering::AcqRel) {
                self.terminate_with_error(error);
            }
        }
    }

    fn on_error(&self, error: RivuletError) {
        if self.done.swap(true, Ordering::AcqRel) {
            hooks::on_undeliverable(error);
            return;
        }
        self.upstream.release();
        self.terminate_with_error(error);
    }

    fn on_complete(&self) {
        if self.done.swap(true, Ordering::AcqRel) {
            hooks::on_undeliverable(ProtocolViolation::TerminalAfterTerminal.into());
            return;
        }
        self.upstream.release();
        if let Some(on_complete) = &self.on_complete {
            if let Err(failure) = on_complete() {
                hooks::on_undeliverable(failure);
            }
        }
    }
}

impl<T: Send + 'static> Subscription for LambdaSubscriber<T> {
    fn request(&self, n: i64) {
        self.upstream.request(n);
    }

    fn cancel(&self) {
        self.upstream.cancel();
    }

    fn is_cancelled(&self) -> bool {
        self.upstream.is_cancelled()
    }
}
