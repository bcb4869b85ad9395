// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Process-wide sink for errors that cannot reach a live subscriber.
//!
//! Protocol violations, errors raised after a subscriber already terminated or
//! cancelled, and failures of a terminal callback all end up here. Every error in
//! the library is either delivered to a subscriber exactly once or handed to this
//! sink exactly once.
//!
//! ```
//! use rivulet_core::{hooks, RivuletError};
//! use std::sync::{Arc, Mutex};
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = seen.clone();
//! hooks::set_undeliverable_handler(move |e| sink.lock().unwrap().push(e.to_string()));
//!
//! hooks::on_undeliverable(RivuletError::stream_error("late"));
//! hooks::reset_undeliverable_handler();
//!
//! assert_eq!(seen.lock().unwrap().len(), 1);
//! ```

use crate::RivuletError;
use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

type UndeliverableHandler = Arc<dyn Fn(RivuletError) + Send + Sync>;

static HANDLER: RwLock<Option<UndeliverableHandler>> = parking_lot::const_rwlock(None);

/// Installs the handler invoked for undeliverable errors, replacing any previous one.
pub fn set_undeliverable_handler<F>(handler: F)
where
    F: Fn(RivuletError) + Send + Sync + 'static,
{
    let previous = HANDLER.write().replace(Arc::new(handler));
    if previous.is_some() {
        debug!("replaced the undeliverable error handler");
    }
}

/// Restores the default handler, which logs the error.
pub fn reset_undeliverable_handler() {
    *HANDLER.write() = None;
}

/// Returns `true` if a custom handler is installed.
#[must_use]
pub fn has_undeliverable_handler() -> bool {
    HANDLER.read().is_some()
}

/// Routes an error that has no live subscriber to the installed handler.
///
/// Never panics: a panicking handler is caught and the error is logged instead.
pub fn on_undeliverable(error: RivuletError) {
    let handler = HANDLER.read().clone();

    match handler {
        Some(handler) => {
            let message = error.to_string();
            if catch_unwind(AssertUnwindSafe(|| handler(error))).is_err() {
                error!("undeliverable error handler panicked while handling: {message}");
            }
        }
        None => {
            error!("undeliverable error: {error}");
        }
    }
}
