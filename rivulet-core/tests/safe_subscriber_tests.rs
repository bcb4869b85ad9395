// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use rivulet_core::{
    ProtocolViolation, Publisher, RivuletError, SafeSubscriber, Subscriber, SubscriberRef,
    SubscriptionRef,
};
use rivulet_test_utils::{boom, TestPublisher, TestSubscriber, UndeliverableCapture};
use std::sync::Arc;

struct PanicsOn {
    value: i32,
    inner: Arc<TestSubscriber<i32>>,
}

impl Subscriber<i32> for PanicsOn {
    fn on_subscribe(&self, subscription: SubscriptionRef) {
        self.inner.on_subscribe(subscription);
    }

    fn on_next(&self, value: i32) {
        if value == self.value {
            panic!("cannot handle {value}");
        }
        self.inner.on_next(value);
    }

    fn on_error(&self, error: RivuletError) {
        self.inner.on_error(error);
    }

    fn on_complete(&self) {
        self.inner.on_complete();
    }
}

#[test]
fn test_duplicate_on_subscribe_cancels_newcomer() {
    // Arrange
    let capture = UndeliverableCapture::install();
    let ts = TestSubscriber::<i32>::unbounded();
    let safe = SafeSubscriber::new(ts.clone());
    let first = TestPublisher::<i32>::new();
    let second = TestPublisher::<i32>::new();

    // Act
    first.subscribe(safe.clone());
    second.subscribe(safe.clone());

    // Assert
    assert_eq!(ts.subscribe_count(), 1);
    assert_eq!(first.cancel_count(), 0);
    assert_eq!(second.cancel_count(), 1);
    assert!(matches!(
        capture.assert_single(),
        RivuletError::ProtocolViolation(ProtocolViolation::DuplicateSubscription)
    ));
}

#[test]
fn test_signals_after_terminal_are_dropped_and_reported() {
    // Arrange
    let capture = UndeliverableCapture::install();
    let ts = TestSubscriber::<i32>::unbounded();
    let safe = SafeSubscriber::new(ts.clone());
    let upstream = TestPublisher::<i32>::new();
    upstream.subscribe(safe.clone());

    // Act
    safe.on_next(1);
    safe.on_complete();
    safe.on_next(2);
    safe.on_complete();
    safe.on_error(boom("late"));

    // Assert
    ts.assert_values(&[1]).assert_complete().assert_well_formed();
    assert!(safe.is_done());
    let errors = capture.errors();
    assert_eq!(errors.len(), 3);
    assert!(matches!(
        errors[0],
        RivuletError::ProtocolViolation(ProtocolViolation::NextAfterTerminal)
    ));
    assert!(matches!(
        errors[1],
        RivuletError::ProtocolViolation(ProtocolViolation::TerminalAfterTerminal)
    ));
    assert_eq!(errors[2].to_string(), "User error: boom: late");
}

#[test]
fn test_signal_before_subscribe_is_a_violation() {
    // Arrange
    let capture = UndeliverableCapture::install();
    let ts = TestSubscriber::<i32>::unbounded();
    let safe = SafeSubscriber::new(ts.clone());

    // Act
    safe.on_next(1);

    // Assert
    ts.assert_values(&[]);
    assert!(matches!(
        capture.assert_single(),
        RivuletError::ProtocolViolation(ProtocolViolation::SignalBeforeSubscribe)
    ));
}

#[test]
fn test_panicking_on_next_becomes_terminal_error() {
    // Arrange
    let capture = UndeliverableCapture::install();
    let ts = TestSubscriber::<i32>::unbounded();
    let panicky: SubscriberRef<i32> = Arc::new(PanicsOn {
        value: 2,
        inner: ts.clone(),
    });
    let safe = SafeSubscriber::new(panicky);
    let upstream = TestPublisher::<i32>::new();
    upstream.subscribe(safe.clone());

    // Act
    upstream.emit_all([1, 2, 3]);

    // Assert
    ts.assert_values(&[1])
        .assert_error_message("on_next panicked: cannot handle 2")
        .assert_well_formed();
    assert_eq!(upstream.cancel_count(), 1);
    capture.assert_empty();
}

#[test]
fn test_cancel_through_safe_subscriber_reaches_upstream() {
    // Arrange
    let capture = UndeliverableCapture::install();
    let ts = TestSubscriber::<i32>::unbounded();
    let upstream = TestPublisher::<i32>::new();
    upstream.subscribe(SafeSubscriber::new(ts.clone()));

    // Act
    ts.cancel();
    upstream.emit(1);

    // Assert
    assert!(ts.is_cancelled());
    assert_eq!(upstream.cancel_count(), 1);
    ts.assert_values(&[]);
    capture.assert_empty();
}
