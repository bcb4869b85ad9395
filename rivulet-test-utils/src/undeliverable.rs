// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Capturing the process-wide undeliverable-error sink in tests.

use parking_lot::{Mutex, MutexGuard};
use rivulet_core::{hooks, RivuletError};
use std::sync::Arc;

static SINK_GUARD: Mutex<()> = parking_lot::const_mutex(());

/// Collects undeliverable errors for as long as it is alive.
///
/// The sink is global, so captures are serialized: a second `install` blocks
/// until the first capture is dropped. Dropping restores the default handler.
///
/// ```rust
/// use rivulet_core::{hooks, RivuletError};
/// use rivulet_test_utils::UndeliverableCapture;
///
/// let capture = UndeliverableCapture::install();
/// hooks::on_undeliverable(RivuletError::stream_error("late"));
///
/// assert_eq!(capture.len(), 1);
/// ```
pub struct UndeliverableCapture {
    errors: Arc<Mutex<Vec<RivuletError>>>,
    _guard: MutexGuard<'static, ()>,
}

impl UndeliverableCapture {
    pub fn install() -> Self {
        let guard = SINK_GUARD.lock();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = errors.clone();
        hooks::set_undeliverable_handler(move |e| sink.lock().push(e));
        Self {
            errors,
            _guard: guard,
        }
    }

    /// Errors captured so far, in arrival order.
    pub fn errors(&self) -> Vec<RivuletError> {
        self.errors.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.errors.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.lock().is_empty()
    }

    /// Removes and returns the captured errors.
    pub fn take(&self) -> Vec<RivuletError> {
        std::mem::take(&mut *self.errors.lock())
    }

    #[track_caller]
    pub fn assert_empty(&self) {
        let errors = self.errors();
        assert!(errors.is_empty(), "unexpected undeliverable errors: {errors:?}");
    }

    /// Asserts exactly one error was captured and returns it.
    #[track_caller]
    pub fn assert_single(&self) -> RivuletError {
        let mut errors = self.errors();
        assert_eq!(errors.len(), 1, "expected one undeliverable error, got {errors:?}");
        errors.remove(0)
    }
}

impl Drop for UndeliverableCapture {
    fn drop(&mut self) {
        hooks::reset_undeliverable_handler();
    }
}
