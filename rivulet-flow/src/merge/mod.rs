// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Flattening many publishers into one, subscribing to several at a time.
//!
//! Every inner publisher gets a bounded prefetch queue. Items are handed
//! downstream in the order each inner produced them; how items of different
//! inners interleave is not specified. At most `max_concurrency` inners are
//! subscribed at once, the rest wait in line and the outer publisher is only
//! asked for a new source when a slot frees up.
//!
//! With `max_concurrency == 1` the output is the same as [`concat`](crate::concat).
//!
//! # Example
//!
//! ```
//! use rivulet_core::{source, PublisherExt};
//! use rivulet_flow::{merge, MergeConfig};
//! use std::sync::{Arc, Mutex};
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = seen.clone();
//!
//! merge(
//!     vec![source::range(1, 3), source::range(10, 2)],
//!     MergeConfig::default().with_max_concurrency(1),
//! )
//! .subscribe_fn(move |v: i64| {
//!     sink.lock().unwrap().push(v);
//!     Ok(())
//! });
//!
//! assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 10, 11]);
//! ```
//!
//! # Errors
//!
//! By default the first error cancels every other inner and the outer, and is
//! delivered at the next drain step; items still queued are discarded. With
//! `delay_errors` every source runs to its end and the errors are delivered
//! together (as a composite when there are several).

mod coordinator;

use crate::Mapper;
use coordinator::{MergeCoordinator, OuterSubscriber};
use rivulet_core::source::{self, FromIter};
use rivulet_core::{config, Publisher, PublisherRef, SubscriberRef};
use std::sync::Arc;

/// Options of a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeConfig {
    /// Maximum number of inner publishers subscribed at the same time.
    pub max_concurrency: usize,
    /// Items requested from each inner ahead of downstream demand.
    pub prefetch: usize,
    /// Hold errors back until every source has terminated.
    pub delay_errors: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            max_concurrency: usize::MAX,
            prefetch: config::buffer_size(),
            delay_errors: false,
        }
    }
}

impl MergeConfig {
    /// Unbounded concurrency, default prefetch, fail fast.
    pub fn new() -> Self {
        Self::default()
    }

    /// Values below 1 are raised to 1.
    #[must_use]
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
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

    pub(crate) fn is_bounded(&self) -> bool {
        self.max_concurrency != usize::MAX
    }

    /// Consumed items after which an inner is asked for more.
    pub(crate) fn limit(&self) -> usize {
        (self.prefetch - self.prefetch / 4).max(1)
    }
}

/// Publisher produced by [`merge`] and [`FlatMapExt::flat_map`].
pub struct FlatMap<S, T, U> {
    source: S,
    mapper: Mapper<T, U>,
    config: MergeConfig,
}

impl<S, T, U> Publisher<U> for FlatMap<S, T, U>
where
    S: Publisher<T>,
    T: Send + 'static,
    U: Send + 'static,
{
    fn subscribe(&self, subscriber: SubscriberRef<U>) {
        let coordinator = MergeCoordinator::new(subscriber, self.config);
        coordinator.start();
        self.source.subscribe(Arc::new(OuterSubscriber::new(
            coordinator,
            self.mapper.clone(),
        )));
    }
}

/// Merges `sources`, subscribing to at most `config.max_concurrency` at once.
pub fn merge<T, P>(sources: Vec<P>, config: MergeConfig) -> FlatMap<FromIter<Vec<P>>, P, T>
where
    T: Send + 'static,
    P: Publisher<T> + Clone + 'static,
{
    source::from_iter(sources).flat_map(|source: P| source, config)
}

/// [`merge`] that holds errors back until every source has terminated.
pub fn merge_delay_error<T, P>(
    sources: Vec<P>,
    config: MergeConfig,
) -> FlatMap<FromIter<Vec<P>>, P, T>
where
    T: Send + 'static,
    P: Publisher<T> + Clone + 'static,
{
    merge(sources, config.with_delay_errors(true))
}

/// Extension trait providing the `flat_map` operator.
pub trait FlatMapExt<T>: Publisher<T> + Sized
where
    T: Send + 'static,
{
    /// Maps every item to a publisher and merges their output.
    fn flat_map<U, P, F>(self, mapper: F, config: MergeConfig) -> FlatMap<Self, T, U>
    where
        U: Send + 'static,
        P: Publisher<U> + 'static,
        F: Fn(T) -> P + Send + Sync + 'static,
    {
        FlatMap {
            source: self,
            mapper: Arc::new(move |item: T| Arc::new(mapper(item)) as PublisherRef<U>),
            config,
        }
    }
}

impl<T, S> FlatMapExt<T> for S
where
    T: Send + 'static,
    S: Publisher<T>,
{
}
