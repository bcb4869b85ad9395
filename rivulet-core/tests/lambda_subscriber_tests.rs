// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use rivulet_core::{
    source, LambdaSubscriber, ProtocolViolation, PublisherExt, RivuletError, Subscriber,
    Subscription,
};
use rivulet_test_utils::{boom, TestPublisher, UndeliverableCapture};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[test]
fn test_on_next_failure_cancels_upstream_and_reaches_on_error() -> anyhow::Result<()> {
    // Arrange
    let capture = UndeliverableCapture::install();
    let upstream = TestPublisher::<i32>::new();
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();

    let lambda = upstream.subscribe_lambda(
        LambdaSubscriber::new(|v: i32| {
            if v == 2 {
                Err(boom("rejected 2"))
            } else {
                Ok(())
            }
        })
        .with_on_error(move |e| {
            sink.lock().unwrap().push(e.to_string());
            Ok(())
        }),
    );

    // Act
    upstream.emit_all([1, 2, 3]);

    // Assert
    assert_eq!(*errors.lock().unwrap(), vec!["User error: boom: rejected 2"]);
    assert_eq!(upstream.cancel_count(), 1);
    assert!(lambda.is_disposed());
    capture.assert_empty();
    Ok(())
}

#[test]
fn test_missing_on_error_routes_to_sink() {
    // Arrange
    let capture = UndeliverableCapture::install();

    // Act
    let lambda = source::error::<i32>(boom("nobody listens")).subscribe_fn(|_| Ok(()));

    // Assert
    assert!(!lambda.has_custom_on_error());
    assert!(lambda.is_disposed());
    let error = capture.assert_single();
    assert_eq!(error.to_string(), "User error: boom: nobody listens");
}

#[test]
fn test_failing_on_error_reports_both_errors() {
    // Arrange
    let capture = UndeliverableCapture::install();

    // Act
    source::error::<i32>(boom("first")).subscribe_lambda(
        LambdaSubscriber::new(|_| Ok(())).with_on_error(|_| Err(boom("second"))),
    );

    // Assert
    let error = capture.assert_single();
    let messages: Vec<_> = error.flatten().iter().map(ToString::to_string).collect();
    assert_eq!(messages, vec!["User error: boom: first", "User error: boom: second"]);
}

#[test]
fn test_failing_on_complete_routes_to_sink() {
    // Arrange
    let capture = UndeliverableCapture::install();

    // Act
    source::empty::<i32>().subscribe_lambda(
        LambdaSubscriber::new(|_| Ok(())).with_on_complete(|| Err(boom("complete failed"))),
    );

    // Assert
    assert_eq!(capture.assert_single().to_string(), "User error: boom: complete failed");
}

#[test]
fn test_signals_after_termination_are_reported() {
    // Arrange
    let capture = UndeliverableCapture::install();
    let completions = Arc::new(AtomicUsize::new(0));
    let counter = completions.clone();
    let lambda = Arc::new(LambdaSubscriber::new(|_: i32| Ok(())).with_on_complete(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }));
    lambda.on_subscribe(rivulet_core::EmptySubscription::shared());

    // Act
    lambda.on_complete();
    lambda.on_next(1);
    lambda.on_complete();
    lambda.on_error(boom("late"));

    // Assert
    assert_eq!(completions.load(Ordering::SeqCst), 1);
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
fn test_dispose_before_subscribe_cancels_on_arrival() {
    // Arrange
    let capture = UndeliverableCapture::install();
    let upstream = TestPublisher::<i32>::new();
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let lambda = Arc::new(LambdaSubscriber::new(move |_: i32| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }));

    // Act
    lambda.cancel();
    rivulet_core::Publisher::subscribe(&upstream, lambda.clone());
    upstream.emit(1);

    // Assert
    assert!(lambda.is_disposed());
    assert_eq!(upstream.cancel_count(), 1);
    assert_eq!(seen.load(Ordering::SeqCst), 0);
    capture.assert_empty();
}

#[test]
fn test_initial_request_limits_upstream_demand() {
    // Arrange
    let capture = UndeliverableCapture::install();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();

    // Act
    let lambda = source::range(0, 10).subscribe_lambda(
        LambdaSubscriber::new(move |v: i64| {
            log.lock().unwrap().push(v);
            Ok(())
        })
        .with_initial_request(3),
    );

    // Assert
    assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    lambda.request(2);
    assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    assert!(!lambda.is_disposed());
    capture.assert_empty();
}
