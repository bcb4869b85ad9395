// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

#![allow(clippy::multiple_crate_versions, clippy::doc_markdown)]

//! Subscribe/request/cancel protocol and the concurrency primitives every
//! rivulet operator is built on.
//!
//! - [`Subscriber`], [`Subscription`] and [`Publisher`] define the protocol.
//! - [`WorkInProgress`] is the drain loop: many threads contribute, one delivers.
//! - [`SerializedSubscriber`] and [`EmissionLoop`] apply it to signal delivery
//!   and to demand accounting.
//! - [`hooks`] is where errors without a live subscriber end up.

#[macro_use]
mod logging;

pub mod action_queue;
pub mod cancellation_token;
pub mod config;
pub mod demand;
pub mod drain;
pub mod emission;
pub mod error;
pub mod hooks;
pub mod lambda;
pub mod publisher;
pub mod queue;
pub mod safe_subscriber;
pub mod scheduler;
pub mod serialized;
pub mod signal;
pub mod source;
pub mod subscriber;
pub mod subscription;

pub use self::action_queue::ActionQueue;
pub use self::cancellation_token::CancellationToken;
pub use self::demand::UNBOUNDED;
pub use self::drain::WorkInProgress;
pub use self::emission::EmissionLoop;
pub use self::error::{IntoRivuletError, ProtocolViolation, Result, ResultExt, RivuletError};
pub use self::lambda::LambdaSubscriber;
pub use self::publisher::{
    Lift, OnBackpressureBuffer, Operator, Publisher, PublisherExt, PublisherRef,
};
pub use self::queue::{Offer, OverflowPolicy, OverflowQueue};
pub use self::safe_subscriber::SafeSubscriber;
pub use self::scheduler::{Scheduler, Task};
pub use self::serialized::SerializedSubscriber;
pub use self::signal::Signal;
pub use self::subscriber::{Subscriber, SubscriberRef};
pub use self::subscription::{
    CancelledSubscription, DeferredSubscription, Demand, EmptySubscription, Subscription,
    SubscriptionRef,
};
