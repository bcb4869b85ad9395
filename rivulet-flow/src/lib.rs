// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

#![allow(clippy::multiple_crate_versions, clippy::doc_markdown)]

//! Coordinators that combine and share rivulet publishers.
//!
//! # Operator Categories
//!
//! ### Combination
//!
//! - **[`merge`] / [`flat_map`](FlatMapExt::flat_map)**: runs up to `max_concurrency`
//!   sources at once and interleaves their items under downstream demand.
//! - **[`concat`] / [`concat_map`](ConcatMapExt::concat_map)**: runs sources one
//!   after another, carrying unmet demand over with a [`SubscriptionArbiter`].
//!
//! ### Multicasting
//!
//! - **[`replay`](ReplayExt::replay)**: a [`ConnectableFlow`] backed by a signal log.
//! - **[`publish`](ReplayExt::publish)**: the same without history.
//! - **[`cache`](ReplayExt::cache)**: replay everything, connected on first use.
//! - **[`ref_count`](ConnectableFlow::ref_count)** and
//!   **[`auto_connect`](ConnectableFlow::auto_connect)**: connection management.
//!
//! Every coordinator delivers through a serialized subscriber, honours demand,
//! and reports errors it cannot deliver to [`rivulet_core::hooks`].

#[macro_use]
mod logging;

pub mod concat;
pub mod merge;
pub mod replay;

use rivulet_core::PublisherRef;
use std::sync::Arc;

/// Type-erased item-to-publisher function shared by the flattening operators.
pub(crate) type Mapper<T, U> = Arc<dyn Fn(T) -> PublisherRef<U> + Send + Sync>;

pub use concat::{
    concat, concat_delay_error, ConcatConfig, ConcatMap, ConcatMapExt, SubscriptionArbiter,
    DEFAULT_CONCAT_PREFETCH,
};
pub use merge::{merge, merge_delay_error, FlatMap, FlatMapExt, MergeConfig};
pub use replay::{
    AutoConnect, Cache, ConnectableFlow, Connection, ReplayBuffer, ReplayExt, ReplayPolicy,
    RefCount,
};
