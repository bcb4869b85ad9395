// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Sharing one upstream between many subscribers, with history.
//!
//! [`ReplayExt::replay`] turns a publisher into a [`ConnectableFlow`]: nothing
//! happens upstream until [`connect`](ConnectableFlow::connect), after which
//! every signal goes into a log that current and later subscribers read at
//! their own pace. [`ReplayExt::publish`] keeps no values, only the terminal,
//! and [`ReplayExt::cache`] keeps everything and connects by itself.
//!
//! # Example
//!
//! ```
//! use rivulet_core::{source, PublisherExt};
//! use rivulet_flow::{ReplayExt, ReplayPolicy};
//! use std::sync::{Arc, Mutex};
//!
//! let flow = source::range(1, 5).replay(ReplayPolicy::Size(2));
//! flow.connect();
//!
//! let late = Arc::new(Mutex::new(Vec::new()));
//! let sink = late.clone();
//! flow.subscribe_fn(move |v: i64| {
//!     sink.lock().unwrap().push(v);
//!     Ok(())
//! });
//!
//! assert_eq!(*late.lock().unwrap(), vec![4, 5]);
//! assert_eq!(flow.cached_event_count(), 3);
//! ```

mod buffer;
mod cache;
mod connectable;
mod ref_count;

pub use buffer::{Cursor, ReplayBuffer, ReplayPolicy};
pub use cache::Cache;
pub use connectable::{ConnectableFlow, Connection};
pub use ref_count::{AutoConnect, RefCount};

use rivulet_core::{Publisher, Scheduler};
use std::sync::Arc;

/// Extension trait providing the multicasting operators.
pub trait ReplayExt<T>: Publisher<T> + Sized + 'static
where
    T: Clone + Send + Sync + 'static,
{
    /// Multicasts through a log that keeps what `policy` allows.
    fn replay(self, policy: ReplayPolicy) -> ConnectableFlow<T, Self> {
        ConnectableFlow::new(self, policy)
    }

    /// [`replay`](Self::replay) measuring age on `scheduler`'s clock.
    fn replay_with_scheduler(
        self,
        policy: ReplayPolicy,
        scheduler: Arc<dyn Scheduler>,
    ) -> ConnectableFlow<T, Self> {
        ConnectableFlow::with_scheduler(self, policy, scheduler)
    }

    /// Multicasts without history: late subscribers only see the terminal.
    fn publish(self) -> ConnectableFlow<T, Self> {
        ConnectableFlow::new(self, ReplayPolicy::Size(0))
    }

    /// Subscribes on first use and replays everything to every subscriber.
    fn cache(self) -> Cache<T, Self> {
        Cache::new(self)
    }
}

impl<T, P> ReplayExt<T> for P
where
    T: Clone + Send + Sync + 'static,
    P: Publisher<T> + 'static,
{
}
