// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use super::buffer::ReplayPolicy;
use super::connectable::ConnectableFlow;
use rivulet_core::{Publisher, RivuletError, SubscriberRef};
use std::sync::atomic::{AtomicBool, Ordering};

/// Publisher returned by [`ReplayExt::cache`](super::ReplayExt::cache).
///
/// Subscribes to its source on the first subscriber, keeps everything, and
/// never lets go of the upstream: later subscribers, including those arriving
/// after the terminal, see the whole history.
pub struct Cache<T, P> {
    connectable: ConnectableFlow<T, P>,
    connected: AtomicBool,
}

impl<T, P> Cache<T, P>
where
    T: Clone + Send + Sync + 'static,
    P: Publisher<T> + 'static,
{
    pub(super) fn new(source: P) -> Self {
        Self {
            connectable: ConnectableFlow::new(source, ReplayPolicy::Unbounded),
            connected: AtomicBool::new(false),
        }
    }

    /// Returns `true` once the source was subscribed.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn has_subscribers(&self) -> bool {
        self.connectable.has_subscribers()
    }

    pub fn subscriber_count(&self) -> usize {
        self.connectable.subscriber_count()
    }

    /// Signals cached so far, terminal included.
    pub fn cached_event_count(&self) -> usize {
        self.connectable.cached_event_count()
    }

    pub fn is_terminated(&self) -> bool {
        self.connectable.is_terminated()
    }

    /// See [`ConnectableFlow::complete`].
    pub fn complete(&self) -> bool {
        self.connectable.complete()
    }

    /// See [`ConnectableFlow::complete_with_error`].
    pub fn complete_with_error(&self, error: RivuletError) -> bool {
        self.connectable.complete_with_error(error)
    }
}

impl<T, P> Publisher<T> for Cache<T, P>
where
    T: Clone + Send + Sync + 'static,
    P: Publisher<T> + 'static,
{
    fn subscribe(&self, subscriber: SubscriberRef<T>) {
        self.connectable.subscribe(subscriber);
        if !self.connected.swap(true, Ordering::AcqRel) {
            self.connectable.connect();
        }
    }
}
