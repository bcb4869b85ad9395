// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Lock-free buffer with an explicit overflow policy.
//!
//! Every bounded buffer in the library is an [`OverflowQueue`]. What happens when
//! a producer ignores demand and the buffer is full is decided per instance by
//! its [`OverflowPolicy`], never implicitly.

use crossbeam_queue::{ArrayQueue, SegQueue};

/// What a full buffer does with one more item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Never full.
    Unbounded,
    /// Reject the item; the owner signals `MissingBackpressure`.
    #[default]
    Error,
    /// Discard the incoming item.
    DropNewest,
    /// Evict the oldest buffered item to make room (keep latest).
    DropOldest,
}

/// Outcome of [`OverflowQueue::offer`].
#[derive(Debug, PartialEq, Eq)]
pub enum Offer<T> {
    /// The item was buffered.
    Accepted,
    /// The buffer was full and the incoming item was discarded.
    DroppedNewest(T),
    /// The item was buffered after evicting this older one.
    EvictedOldest(T),
    /// The buffer was full and the policy is [`OverflowPolicy::Error`].
    Overflow(T),
}

impl<T> Offer<T> {
    /// Returns `true` if the offered item is now in the buffer.
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Offer::Accepted | Offer::EvictedOldest(_))
    }

    /// Returns `true` if the owner must fail with `MissingBackpressure`.
    pub const fn is_overflow(&self) -> bool {
        matches!(self, Offer::Overflow(_))
    }
}

enum Storage<T> {
    Bounded(ArrayQueue<T>),
    Unbounded(SegQueue<T>),
}

/// Multi-producer queue shared by the emission loop and the coordinators.
pub struct OverflowQueue<T> {
    storage: Storage<T>,
    policy: OverflowPolicy,
}

impl<T> OverflowQueue<T> {
    /// Creates a queue holding at most `capacity` items (at least one).
    ///
    /// With [`OverflowPolicy::Unbounded`] the capacity is ignored.
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let storage = match policy {
            OverflowPolicy::Unbounded => Storage::Unbounded(SegQueue::new()),
            _ => Storage::Bounded(ArrayQueue::new(capacity.max(1))),
        };
        Self { storage, policy }
    }

    /// A queue that never overflows.
    pub fn unbounded() -> Self {
        Self::new(0, OverflowPolicy::Unbounded)
    }

    /// Buffers `item` according to the policy.
    pub fn offer(&self, item: T) -> Offer<T> {
        match &self.storage {
            Storage::Unbounded(queue) => {
                queue.push(item);
                Offer::Accepted
            }
            Storage::Bounded(queue) => match self.policy {
                OverflowPolicy::DropOldest => match queue.force_push(item) {
                    Some(evicted) => Offer::EvictedOldest(evicted),
                    None => Offer::Accepted,
                },
                OverflowPolicy::DropNewest => match queue.push(item) {
                    Ok(()) => Offer::Accepted,
                    Err(item) => Offer::DroppedNewest(item),
                },
                OverflowPolicy::Error | OverflowPolicy::Unbounded => match queue.push(item) {
                    Ok(()) => Offer::Accepted,
                    Err(item) => Offer::Overflow(item),
                },
            },
        }
    }

    /// Removes the oldest item.
    pub fn poll(&self) -> Option<T> {
        match &self.storage {
            Storage::Bounded(queue) => queue.pop(),
            Storage::Unbounded(queue) => queue.pop(),
        }
    }

    /// Number of buffered items.
    pub fn len(&self) -> usize {
        match &self.storage {
            Storage::Bounded(queue) => queue.len(),
            Storage::Unbounded(queue) => queue.len(),
        }
    }

    /// Returns `true` if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        match &self.storage {
            Storage::Bounded(queue) => queue.is_empty(),
            Storage::Unbounded(queue) => queue.is_empty(),
        }
    }

    /// Maximum number of items, `None` when unbounded.
    pub fn capacity(&self) -> Option<usize> {
        match &self.storage {
            Storage::Bounded(queue) => Some(queue.capacity()),
            Storage::Unbounded(_) => None,
        }
    }

    /// The overflow policy this queue was built with.
    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Drops every buffered item.
    pub fn clear(&self) {
        while self.poll().is_some() {}
    }
}

impl<T> std::fmt::Debug for OverflowQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverflowQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_policy_reports_overflow_and_keeps_contents() {
        let queue = OverflowQueue::new(2, OverflowPolicy::Error);
        assert!(queue.offer(1).is_accepted());
        assert!(queue.offer(2).is_accepted());
        assert_eq!(queue.offer(3), Offer::Overflow(3));
        assert_eq!(queue.poll(), Some(1));
        assert_eq!(queue.poll(), Some(2));
    }

    #[test]
    fn drop_newest_discards_incoming() {
        let queue = OverflowQueue::new(1, OverflowPolicy::DropNewest);
        queue.offer("a");
        assert_eq!(queue.offer("b"), Offer::DroppedNewest("b"));
        assert_eq!(queue.poll(), Some("a"));
    }

    #[test]
    fn drop_oldest_keeps_latest() {
        let queue = OverflowQueue::new(2, OverflowPolicy::DropOldest);
        queue.offer(1);
        queue.offer(2);
        assert_eq!(queue.offer(3), Offer::EvictedOldest(1));
        assert_eq!(queue.poll(), Some(2));
        assert_eq!(queue.poll(), Some(3));
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let queue = OverflowQueue::<u8>::new(0, OverflowPolicy::Error);
        assert_eq!(queue.capacity(), Some(1));
        assert!(OverflowQueue::<u8>::unbounded().capacity().is_none());
    }
}
