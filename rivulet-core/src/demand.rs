// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Outstanding-demand arithmetic.
//!
//! Demand is a signed 64-bit counter that saturates at [`UNBOUNDED`]. Once a
//! counter reaches it, emission is no longer demand-checked and `produced` leaves
//! it alone.

use crate::{hooks, ProtocolViolation};
use std::sync::atomic::{AtomicI64, Ordering};

/// Sentinel for "no flow control".
pub const UNBOUNDED: i64 = i64::MAX;

/// Checks a `request(n)` amount.
///
/// Returns `true` for `n > 0`. `request(0)` is a silent no-op; a negative amount is
/// reported to the undeliverable sink and ignored.
pub fn validate(n: i64) -> bool {
    if n > 0 {
        return true;
    }
    if n < 0 {
        warn!("rejected request({n})");
        hooks::on_undeliverable(ProtocolViolation::NonPositiveRequest(n).into());
    }
    false
}

/// Adds two non-negative demands, saturating at [`UNBOUNDED`].
pub const fn add_cap(a: i64, b: i64) -> i64 {
    a.saturating_add(b)
}

/// Atomically adds `n` to `counter`, returning the previous value.
pub fn add_demand(counter: &AtomicI64, n: i64) -> i64 {
    match counter.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
        if current == UNBOUNDED {
            None
        } else {
            Some(add_cap(current, n))
        }
    }) {
        Ok(previous) | Err(previous) => previous,
    }
}

/// Atomically subtracts `n` emitted items from `counter`, returning the new value.
///
/// Unbounded counters are left untouched. A result below zero means a producer
/// emitted more than was requested; it is clamped to zero.
pub fn produced(counter: &AtomicI64, n: i64) -> i64 {
    match counter.fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
        if current == UNBOUNDED {
            None
        } else {
            Some((current - n).max(0))
        }
    }) {
        Ok(previous) => (previous - n).max(0),
        Err(unbounded) => unbounded,
    }
}
