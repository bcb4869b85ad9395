// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Fixture errors and sources.

use rivulet_core::{source, IntoRivuletError, OverflowPolicy, Publisher, RivuletError};

/// Errors raised on purpose by tests.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TestError {
    #[error("boom: {0}")]
    Boom(String),

    #[error("source {0} failed")]
    SourceFailed(usize),
}

/// A user error carrying [`TestError::Boom`].
pub fn boom(message: &str) -> RivuletError {
    TestError::Boom(message.to_string()).into_rivulet()
}

/// A user error carrying [`TestError::SourceFailed`].
pub fn source_failed(index: usize) -> RivuletError {
    TestError::SourceFailed(index).into_rivulet()
}

/// Cold source emitting `values` and then failing with `error`.
///
/// Honors demand: the error is delivered after the last value was requested.
pub fn values_then_error<T>(values: Vec<T>, error: RivuletError) -> impl Publisher<T>
where
    T: Clone + Send + Sync + 'static,
{
    let capacity = values.len().max(1);
    source::create(OverflowPolicy::Error, capacity, move |emitter| {
        for value in values.iter().cloned() {
            emitter.next(value);
        }
        emitter.error(error.clone());
    })
}
