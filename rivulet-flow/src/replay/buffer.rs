// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Append-only signal log shared by the subscribers of a replaying flow.
//!
//! The log is a singly linked list. Trimming only moves the head forward: a
//! subscriber lagging behind keeps its part of the chain alive through its
//! [`Cursor`], so it never sees a gap, and since a cursor only moves forward it
//! never sees a duplicate either.

use parking_lot::Mutex;
use rivulet_core::{Scheduler, Signal};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

/// Which values a replay buffer keeps for late subscribers.
///
/// The terminal signal is always kept, whatever the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplayPolicy {
    /// Keep everything.
    #[default]
    Unbounded,
    /// Keep the latest `n` values. `Size(0)` replays nothing but the terminal.
    Size(usize),
    /// Keep values younger than the window.
    Time(Duration),
    /// Keep at most `n` values, all younger than the window.
    SizeAndTime(usize, Duration),
}

impl ReplayPolicy {
    fn max_size(&self) -> Option<usize> {
        match self {
            Self::Size(n) | Self::SizeAndTime(n, _) => Some(*n),
            Self::Unbounded | Self::Time(_) => None,
        }
    }

    fn max_age(&self) -> Option<Duration> {
        match self {
            Self::Time(age) | Self::SizeAndTime(_, age) => Some(*age),
            Self::Unbounded | Self::Size(_) => None,
        }
    }
}

struct Node<T> {
    signal: Option<Signal<T>>,
    stamp: Duration,
    next: OnceLock<Arc<Node<T>>>,
}

impl<T> Node<T> {
    fn new(signal: Option<Signal<T>>, stamp: Duration) -> Arc<Self> {
        Arc::new(Self {
            signal,
            stamp,
            next: OnceLock::new(),
        })
    }
}

impl<T> Drop for Node<T> {
    // Unlinks iteratively; a long chain would otherwise overflow the stack
    fn drop(&mut self) {
        let mut next = self.next.take();
        while let Some(node) = next {
            next = match Arc::try_unwrap(node) {
                Ok(mut node) => node.next.take(),
                Err(_) => None,
            };
        }
    }
}

/// A subscriber's position in the log: everything after it is still to deliver.
pub struct Cursor<T> {
    node: Arc<Node<T>>,
}

impl<T> Clone for Cursor<T> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
        }
    }
}

impl<T> Cursor<T> {
    /// The next signal to deliver, if one was appended.
    pub fn peek(&self) -> Option<&Signal<T>> {
        self.node.next.get().and_then(|node| node.signal.as_ref())
    }

    /// Moves past the signal returned by [`peek`](Self::peek).
    pub fn advance(&mut self) -> bool {
        match self.node.next.get() {
            Some(next) => {
                let next = next.clone();
                self.node = next;
                true
            }
            None => false,
        }
    }
}

enum Clock {
    Scheduler(Arc<dyn Scheduler>),
    System(Instant),
}

impl Clock {
    fn now(&self) -> Duration {
        match self {
            Self::Scheduler(scheduler) => scheduler.now(),
            Self::System(epoch) => epoch.elapsed(),
        }
    }
}

struct Log<T> {
    /// Last trimmed node; its successor is the oldest retained signal.
    head: Arc<Node<T>>,
    tail: Arc<Node<T>>,
    values: usize,
    terminated: bool,
}

/// Signal log with a retention policy.
///
/// Appending takes a short lock; reading happens through cursors, without it.
pub struct ReplayBuffer<T> {
    policy: ReplayPolicy,
    clock: Clock,
    log: Mutex<Log<T>>,
}

impl<T> ReplayBuffer<T> {
    /// Time-based policies measure age with the system clock.
    pub fn new(policy: ReplayPolicy) -> Self {
        Self::with_clock(policy, Clock::System(Instant::now()))
    }

    /// Time-based policies measure age with `scheduler`.
    pub fn with_scheduler(policy: ReplayPolicy, scheduler: Arc<dyn Scheduler>) -> Self {
        Self::with_clock(policy, Clock::Scheduler(scheduler))
    }

    fn with_clock(policy: ReplayPolicy, clock: Clock) -> Self {
        let sentinel = Node::new(None, Duration::ZERO);
        Self {
            policy,
            clock,
            log: Mutex::new(Log {
                head: sentinel.clone(),
                tail: sentinel,
                values: 0,
                terminated: false,
            }),
        }
    }

    pub fn policy(&self) -> ReplayPolicy {
        self.policy
    }

    /// Appends `signal`. Returns `false` once a terminal signal is in the log:
    /// the first terminal wins and nothing is appended after it.
    pub fn append(&self, signal: Signal<T>) -> bool {
        let now = self.clock.now();
        let mut log = self.log.lock();
        if log.terminated {
            return false;
        }

        let is_next = signal.is_next();
        let node = Node::new(Some(signal), now);
        // The tail's successor is only ever set here, under the lock
        let _ = log.tail.next.set(node.clone());
        log.tail = node;

        if is_next {
            log.values += 1;
        } else {
            log.terminated = true;
        }
        self.trim(&mut log, now);
        true
    }

    /// Cursor positioned before the oldest retained signal.
    pub fn head(&self) -> Cursor<T> {
        let now = self.clock.now();
        let mut log = self.log.lock();
        self.trim(&mut log, now);
        Cursor {
            node: log.head.clone(),
        }
    }

    /// Retained values.
    pub fn len(&self) -> usize {
        self.log.lock().values
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retained signals, terminal included.
    pub fn event_count(&self) -> usize {
        let log = self.log.lock();
        log.values + usize::from(log.terminated)
    }

    /// Returns `true` once a terminal signal was appended.
    pub fn is_terminated(&self) -> bool {
        self.log.lock().terminated
    }

    fn trim(&self, log: &mut Log<T>, now: Duration) {
        let max_size = self.policy.max_size();
        let max_age = self.policy.max_age();
        if max_size.is_none() && max_age.is_none() {
            return;
        }

        loop {
            let Some(oldest) = log.head.next.get() else {
                break;
            };
            if !matches!(oldest.signal, Some(Signal::Next(_))) {
                break;
            }
            let over_size = max_size.is_some_and(|max| log.values > max);
            let expired = max_age.is_some_and(|age| now.saturating_sub(oldest.stamp) >= age);
            if !(over_size || expired) {
                break;
            }
            let oldest = oldest.clone();
            log.head = oldest;
            log.values -= 1;
        }
    }
}
