// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::{RivuletError, Subscriber};

/// One event of a reactive sequence.
///
/// This is the node stored by every queue in the library (serialized subscribers,
/// coordinators, the replay log). Per producer, signals are kept in program order.
#[derive(Debug, Clone)]
pub enum Signal<T> {
    /// A value
    Next(T),
    /// Terminal error
    Error(RivuletError),
    /// Terminal completion
    Complete,
}

impl<T: PartialEq> PartialEq for Signal<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Signal::Next(a), Signal::Next(b)) => a == b,
            (Signal::Complete, Signal::Complete) => true,
            _ => false, // Errors are never equal
        }
    }
}

impl<T> Signal<T> {
    /// Returns `true` for `Error` and `Complete`.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Signal::Error(_) | Signal::Complete)
    }

    /// Returns `true` if this is a `Next`.
    pub const fn is_next(&self) -> bool {
        matches!(self, Signal::Next(_))
    }

    /// Converts into the carried value, discarding terminals.
    pub fn into_next(self) -> Option<T> {
        match self {
            Signal::Next(v) => Some(v),
            _ => None,
        }
    }

    /// Calls the matching method of `subscriber`.
    pub fn deliver<S>(self, subscriber: &S)
    where
        S: Subscriber<T> + ?Sized,
    {
        match self {
            Signal::Next(v) => subscriber.on_next(v),
            Signal::Error(e) => subscriber.on_error(e),
            Signal::Complete => subscriber.on_complete(),
        }
    }
}

impl<T> From<Result<T, RivuletError>> for Signal<T> {
    fn from(result: Result<T, RivuletError>) -> Self {
        match result {
            Ok(v) => Signal::Next(v),
            Err(e) => Signal::Error(e),
        }
    }
}
