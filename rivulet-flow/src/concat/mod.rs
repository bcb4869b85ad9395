// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Running publishers one after another.
//!
//! The outer publisher is asked for `prefetch` sources ahead of time, but only
//! one source is subscribed at a time; the next one starts once the current one
//! has completed. Downstream demand not satisfied by a finished source is
//! carried over to the next one by a [`SubscriptionArbiter`].
//!
//! # Example
//!
//! ```
//! use rivulet_core::{source, PublisherExt};
//! use rivulet_flow::{concat, ConcatConfig};
//! use std::sync::{Arc, Mutex};
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = seen.clone();
//!
//! concat(
//!     vec![source::range(1, 2), source::range(5, 2), source::range(9, 1)],
//!     ConcatConfig::default(),
//! )
//! .subscribe_fn(move |v: i64| {
//!     sink.lock().unwrap().push(v);
//!     Ok(())
//! });
//!
//! assert_eq!(*seen.lock().unwrap(), vec![1, 2, 5, 6, 9]);
//! ```

mod arbiter;
mod coordinator;

pub use arbiter::SubscriptionArbiter;

use crate::Mapper;
use coordinator::{ConcatCoordinator, OuterSubscriber};
use rivulet_core::source::{self, FromIter};
use rivulet_core::{Publisher, PublisherRef, SubscriberRef};
use std::sync::Arc;

/// Sources requested from the outer publisher ahead of time by default.
pub const DEFAULT_CONCAT_PREFETCH: usize = 2;

/// Options of a concat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcatConfig {
    /// Sources requested from the outer publisher ahead of time.
    pub prefetch: usize,
    /// Keep going after a source fails; errors are delivered at the end.
    pub delay_errors: bool,
}

impl Default for ConcatConfig {
    fn default() -> Self {
        Self {
            prefetch: DEFAULT_CONCAT_PREFETCH,
            delay_errors: false,
        }
    }
}

impl ConcatConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values below 1 are raised to 1.
    #[must_use]
    pub fn with_prefetch(mut self, prefetch: usize) -> Self {
        self.prefetch = prefetch.max(1);
        self
    }

    #[must_use]
    pub fn with_delay_errors(mut self, delay_errors: bool) -> Self {
        self.delay_errors = delay_errors;
        self
    }

    pub(crate) fn limit(&self) -> usize {
        (self.prefetch - self.prefetch / 4).max(1)
    }
}

/// Publisher produced by [`concat`] and [`ConcatMapExt::concat_map`].
pub struct ConcatMap<S, T, U> {
    source: S,
    mapper: Mapper<T, U>,
    config: ConcatConfig,
}

impl<S, T, U> Publisher<U> for ConcatMap<S, T, U>
where
    S: Publisher<T>,
    T: Send + 'static,
    U: Send + 'static,
{
    fn subscribe(&self, subscriber: SubscriberRef<U>) {
        let coordinator = ConcatCoordinator::new(subscriber, self.config);
        coordinator.start();
        self.source.subscribe(Arc::new(OuterSubscriber::new(
            coordinator,
            self.mapper.clone(),
        )));
    }
}

/// Emits the items of every source in turn.
pub fn concat<T, P>(sources: Vec<P>, config: ConcatConfig) -> ConcatMap<FromIter<Vec<P>>, P, T>
where
    T: Send + 'static,
    P: Publisher<T> + Clone + 'static,
{
    source::from_iter(sources).concat_map(|source: P| source, config)
}

/// [`concat`] that runs every source even after failures and reports the
/// errors at the end.
pub fn concat_delay_error<T, P>(
    sources: Vec<P>,
    config: ConcatConfig,
) -> ConcatMap<FromIter<Vec<P>>, P, T>
where
    T: Send + 'static,
    P: Publisher<T> + Clone + 'static,
{
    concat(sources, config.with_delay_errors(true))
}

/// Extension trait providing the `concat_map` operator.
pub trait ConcatMapExt<T>: Publisher<T> + Sized
where
    T: Send + 'static,
{
    /// Maps every item to a publisher and emits their output one after another.
    fn concat_map<U, P, F>(self, mapper: F, config: ConcatConfig) -> ConcatMap<Self, T, U>
    where
        U: Send + 'static,
        P: Publisher<U> + 'static,
        F: Fn(T) -> P + Send + Sync + 'static,
    {
        ConcatMap {
            source: self,
            mapper: Arc::new(move |item: T| Arc::new(mapper(item)) as PublisherRef<U>),
            config,
        }
    }
}

impl<T, S> ConcatMapExt<T> for S
where
    T: Send + 'static,
    S: Publisher<T>,
{
}
