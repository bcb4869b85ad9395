// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

#![allow(clippy::multiple_crate_versions, clippy::doc_markdown)]

//! Reactive streams with backpressure.
//!
//! A [`Publisher`] produces signals for a [`Subscriber`], which controls the
//! flow through a [`Subscription`]: nothing is delivered beyond what was
//! requested, and cancelling stops the source. On top of that protocol this
//! crate offers:
//!
//! - **merging**: [`merge`] and [`flat_map`](FlatMapExt::flat_map), running
//!   several sources at once with a concurrency bound;
//! - **concatenation**: [`concat`] and [`concat_map`](ConcatMapExt::concat_map);
//! - **multicasting**: [`replay`](ReplayExt::replay), [`publish`](ReplayExt::publish)
//!   and [`cache`](ReplayExt::cache), sharing one upstream between subscribers.
//!
//! Errors that cannot reach a subscriber go to the process-wide sink in [`hooks`].
//!
//! # Example
//!
//! ```
//! use rivulet::prelude::*;
//! use std::sync::{Arc, Mutex};
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = seen.clone();
//!
//! let shared = source::range(1, 3)
//!     .flat_map(|v: i64| source::range(v * 10, 2), MergeConfig::default())
//!     .replay(ReplayPolicy::Unbounded);
//! shared.connect();
//!
//! shared.subscribe_fn(move |v: i64| {
//!     sink.lock().unwrap().push(v);
//!     Ok(())
//! });
//!
//! assert_eq!(*seen.lock().unwrap(), vec![10, 11, 20, 21, 30, 31]);
//! ```

pub use rivulet_core::{
    config, demand, hooks, source, ActionQueue, CancellationToken, CancelledSubscription,
    DeferredSubscription, Demand, EmissionLoop, EmptySubscription, IntoRivuletError,
    LambdaSubscriber, Lift, Offer, Operator, OverflowPolicy, OverflowQueue, ProtocolViolation,
    Publisher, PublisherExt, PublisherRef, Result, ResultExt, RivuletError, SafeSubscriber,
    Scheduler, SerializedSubscriber, Signal, Subscriber, SubscriberRef, Subscription,
    SubscriptionRef, Task, WorkInProgress, UNBOUNDED,
};
pub use rivulet_flow::{
    concat, concat_delay_error, merge, merge_delay_error, AutoConnect, Cache, ConcatConfig,
    ConcatMapExt, ConnectableFlow, Connection, FlatMapExt, MergeConfig, RefCount, ReplayBuffer,
    ReplayExt, ReplayPolicy, SubscriptionArbiter, DEFAULT_CONCAT_PREFETCH,
};

#[cfg(feature = "runtime-tokio")]
pub use rivulet_runtime::TokioScheduler;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        concat, merge, source, ConcatConfig, ConcatMapExt, FlatMapExt, MergeConfig, Publisher,
        PublisherExt, ReplayExt, ReplayPolicy, RivuletError, Subscriber, Subscription,
    };
}
