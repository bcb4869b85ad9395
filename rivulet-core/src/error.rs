// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Error types for the rivulet reactive library
//!
//! Every error that travels through a pipeline is a [`RivuletError`]. The enum
//! separates the kinds the protocol cares about: errors signaled by an upstream,
//! protocol violations that can only be reported to the undeliverable-error sink,
//! user callback failures, and backpressure overflow.
//!
//! # Examples
//!
//! ```
//! use rivulet_core::{RivuletError, Result};
//!
//! fn process_data() -> Result<()> {
//!     Err(RivuletError::stream_error("Stream not ready"))
//! }
//! ```

use std::sync::Arc;

/// Breaches of the subscriber/subscription contract.
///
/// These are never delivered to the subscriber that caused them; they are routed
/// to the undeliverable-error sink instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolViolation {
    /// `on_subscribe` was called a second time on the same logical subscriber.
    #[error("subscription already set")]
    DuplicateSubscription,

    /// `on_next` arrived after a terminal signal.
    #[error("on_next after terminal signal")]
    NextAfterTerminal,

    /// `on_next` or a terminal signal arrived before `on_subscribe`.
    #[error("signal received before on_subscribe")]
    SignalBeforeSubscribe,

    /// A second terminal signal arrived.
    #[error("terminal signal after terminal signal")]
    TerminalAfterTerminal,

    /// `request(n)` with a negative amount.
    #[error("request amount must be positive, got {0}")]
    NonPositiveRequest(i64),
}

/// Root error type for all rivulet operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum RivuletError {
    /// Error signaled by a producer as a normal terminal event
    #[error("Stream processing error: {context}")]
    StreamProcessingError {
        /// Description of what went wrong
        context: String,
    },

    /// Error returned by user code (a callback or a producer)
    #[error("User error: {0}")]
    UserError(#[source] Arc<dyn std::error::Error + Send + Sync>),

    /// Several errors collected while running in delay-error mode
    #[error("Composite error: {count} errors")]
    CompositeError {
        /// Number of errors that occurred
        count: usize,
        /// The individual errors, in arrival order
        errors: Vec<RivuletError>,
    },

    /// A bounded buffer could not accept an item because the producer ignored demand
    #[error("Missing backpressure: {context}")]
    MissingBackpressure {
        /// Which buffer overflowed
        context: String,
    },

    /// Breach of the subscribe/request/cancel contract
    #[error("Protocol violation: {0}")]
    ProtocolViolation(#[from] ProtocolViolation),
}

impl RivuletError {
    /// Create a stream processing error with the given context
    pub fn stream_error(context: impl Into<String>) -> Self {
        Self::StreamProcessingError {
            context: context.into(),
        }
    }

    /// Wrap a user error
    pub fn user_error(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::UserError(Arc::new(error))
    }

    /// Create a backpressure overflow error for the named buffer
    pub fn missing_backpressure(context: impl Into<String>) -> Self {
        Self::MissingBackpressure {
            context: context.into(),
        }
    }

    /// Aggregate errors collected in delay-error mode.
    ///
    /// Nested composites are flattened and a single error is returned as-is, so the
    /// result is only a `CompositeError` when more than one distinct error occurred.
    ///
    /// # Examples
    ///
    /// ```
    /// use rivulet_core::RivuletError;
    ///
    /// let one = RivuletError::composite(vec![RivuletError::stream_error("a")]);
    /// assert!(!one.is_composite());
    ///
    /// let two = RivuletError::composite(vec![
    ///     RivuletError::stream_error("a"),
    ///     RivuletError::stream_error("b"),
    /// ]);
    /// assert!(matches!(two, RivuletError::CompositeError { count: 2, .. }));
    /// ```
    pub fn composite(errors: Vec<RivuletError>) -> Self {
        let mut flat = Vec::with_capacity(errors.len());
        for error in errors {
            match error {
                Self::CompositeError { errors, .. } => flat.extend(errors),
                other => flat.push(other),
            }
        }

        if flat.len() == 1 {
            if let Some(single) = flat.pop() {
                return single;
            }
        }

        Self::CompositeError {
            count: flat.len(),
            errors: flat,
        }
    }

    /// Returns `true` for the delay-error aggregate.
    #[must_use]
    pub const fn is_composite(&self) -> bool {
        matches!(self, Self::CompositeError { .. })
    }

    /// Returns `true` for contract breaches routed to the undeliverable sink.
    #[must_use]
    pub const fn is_protocol_violation(&self) -> bool {
        matches!(self, Self::ProtocolViolation(_))
    }

    /// Returns `true` for backpressure overflow.
    #[must_use]
    pub const fn is_missing_backpressure(&self) -> bool {
        matches!(self, Self::MissingBackpressure { .. })
    }

    /// The individual errors carried by this error: the composite's members, or itself.
    #[must_use]
    pub fn flatten(&self) -> Vec<RivuletError> {
        match self {
            Self::CompositeError { errors, .. } => errors.clone(),
            other => vec![other.clone()],
        }
    }
}

/// Specialized Result type for rivulet operations
pub type Result<T> = std::result::Result<T, RivuletError>;

/// Extension trait for converting errors into `RivuletError`
pub trait IntoRivuletError {
    /// Convert this error into a `RivuletError` with additional context
    fn into_rivulet_error(self, context: &str) -> RivuletError;

    /// Convert this error into a `RivuletError` without additional context
    fn into_rivulet(self) -> RivuletError
    where
        Self: Sized,
    {
        self.into_rivulet_error("")
    }
}

impl<E: std::error::Error + Send + Sync + 'static> IntoRivuletError for E {
    fn into_rivulet_error(self, context: &str) -> RivuletError {
        if context.is_empty() {
            RivuletError::user_error(self)
        } else {
            RivuletError::stream_error(format!("{context}: {self}"))
        }
    }
}

/// Helper trait for adding context to `Result`s
pub trait ResultExt<T> {
    /// Add context to an error
    ///
    /// # Errors
    /// Returns `Err(RivuletError)` if the underlying result is `Err`.
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context to an error using a closure (lazy evaluation)
    ///
    /// # Errors
    /// Returns `Err(RivuletError)` if the underlying result is `Err`.
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<RivuletError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.with_context(|| context.into())
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| match e.into() {
            RivuletError::UserError(inner) => RivuletError::StreamProcessingError {
                context: format!("{}: {inner}", f()),
            },
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_flattens_nested_composites() {
        let inner = RivuletError::composite(vec![
            RivuletError::stream_error("a"),
            RivuletError::stream_error("b"),
        ]);
        let outer = RivuletError::composite(vec![inner, RivuletError::stream_error("c")]);

        assert!(matches!(outer, RivuletError::CompositeError { count: 3, .. }));
        assert_eq!(outer.flatten().len(), 3);
    }

    #[test]
    fn protocol_violation_converts_into_root_error() {
        let err: RivuletError = ProtocolViolation::NonPositiveRequest(-1).into();
        assert!(err.is_protocol_violation());
        assert_eq!(
            err.to_string(),
            "Protocol violation: request amount must be positive, got -1"
        );
    }

    #[test]
    fn context_rewrites_user_errors_only() {
        let parsed: Result<u8> = "x".parse::<u8>().map_err(RivuletError::user_error);
        let err = parsed.context("reading limit").unwrap_err();
        assert!(matches!(err, RivuletError::StreamProcessingError { .. }));
        assert!(err.to_string().starts_with("Stream processing error: reading limit: "));

        let overflow: Result<()> = Err(RivuletError::missing_backpressure("queue"));
        let err = overflow.with_context(|| "ignored".to_string()).unwrap_err();
        assert!(err.is_missing_backpressure());
    }

    #[test]
    fn into_rivulet_error_keeps_the_source_without_context() {
        let plain = "x".parse::<u8>().unwrap_err().into_rivulet();
        assert!(matches!(plain, RivuletError::UserError(_)));

        let described = "x".parse::<u8>().unwrap_err().into_rivulet_error("port");
        assert!(described.to_string().contains("port: "));
    }
}
