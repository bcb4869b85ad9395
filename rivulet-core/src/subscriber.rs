// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::{RivuletError, SubscriptionRef};
use std::sync::Arc;

/// Consumer side of the protocol.
///
/// The calls a subscriber receives always follow
/// `on_subscribe (on_next)* (on_error | on_complete)?`:
///
/// - `on_subscribe` exactly once, before anything else;
/// - at most one terminal call, and nothing after it;
/// - never two calls at the same time.
///
/// Producers that cannot guarantee the last rule on their own wrap the subscriber
/// in a [`SerializedSubscriber`](crate::SerializedSubscriber).
///
/// Methods take `&self` so a subscriber can be shared between the producer that
/// feeds it and the code that owns it; state lives behind atomics or short locks.
pub trait Subscriber<T>: Send + Sync {
    /// Receives the handle used to request items and to cancel.
    fn on_subscribe(&self, subscription: SubscriptionRef);

    /// Receives one item. Never called for more items than were requested.
    fn on_next(&self, value: T);

    /// Terminal error.
    fn on_error(&self, error: RivuletError);

    /// Terminal completion.
    fn on_complete(&self);
}

/// Shared, type-erased subscriber.
pub type SubscriberRef<T> = Arc<dyn Subscriber<T>>;

impl<T, S> Subscriber<T> for Arc<S>
where
    S: Subscriber<T> + ?Sized,
{
    fn on_subscribe(&self, subscription: SubscriptionRef) {
        (**self).on_subscribe(subscription);
    }

    fn on_next(&self, value: T) {
        (**self).on_next(value);
    }

    fn on_error(&self, error: RivuletError) {
        (**self).on_error(error);
    }

    fn on_complete(&self) {
        (**self).on_complete();
    }
}
