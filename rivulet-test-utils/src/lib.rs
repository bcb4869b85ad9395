// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Test utilities and fixtures for the rivulet workspace.
//!
//! Designed for use in development and testing only, not for production code.
//!
//! # Key Types
//!
//! - [`TestSubscriber`] records signals, controls demand and checks the
//!   subscriber protocol (single `on_subscribe`, single terminal, no overlap).
//! - [`TestPublisher`] is a hot source driven by hand, ignoring demand on purpose.
//! - [`TestScheduler`] is a virtual-clock [`Scheduler`](rivulet_core::Scheduler).
//! - [`UndeliverableCapture`] collects what reaches the global error sink.
//!
//! ```rust
//! use rivulet_core::Publisher;
//! use rivulet_test_utils::{TestPublisher, TestSubscriber};
//!
//! let publisher = TestPublisher::<i32>::new();
//! let ts = TestSubscriber::<i32>::unbounded();
//! publisher.subscribe(ts.clone());
//!
//! publisher.emit_all([1, 2, 3]);
//! publisher.complete();
//!
//! ts.assert_values(&[1, 2, 3]).assert_complete().assert_well_formed();
//! ```

#![allow(clippy::multiple_crate_versions, clippy::doc_markdown)]
pub mod fixtures;
pub mod test_publisher;
pub mod test_scheduler;
pub mod test_subscriber;
pub mod undeliverable;

pub use fixtures::{boom, source_failed, values_then_error, TestError};
pub use test_publisher::TestPublisher;
pub use test_scheduler::TestScheduler;
pub use test_subscriber::TestSubscriber;
pub use undeliverable::UndeliverableCapture;
