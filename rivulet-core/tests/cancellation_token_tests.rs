// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use futures::executor::block_on;
use rivulet_core::{CancellationToken, Subscription};
use std::thread;
use std::time::Duration;

#[test]
fn test_cancelled_future_resolves_after_cancel_from_another_thread() {
    // Arrange
    let token = CancellationToken::new();
    let canceller = token.clone();

    // Act
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(10));
        canceller.cancel();
    });
    block_on(token.cancelled());

    // Assert
    assert!(token.is_cancelled());
    handle.join().unwrap();
}

#[test]
fn test_cancelled_future_is_ready_on_cancelled_token() {
    // Arrange
    let token = CancellationToken::new();
    token.cancel();

    // Act
    block_on(token.cancelled());

    // Assert
    assert!(token.is_cancelled());
}

#[test]
fn test_wait_timeout_returns_false_when_not_cancelled() {
    // Arrange
    let token = CancellationToken::new();

    // Act
    let cancelled = token.wait_timeout(Duration::from_millis(5));

    // Assert
    assert!(!cancelled);
}

#[test]
fn test_cancel_through_subscription_is_idempotent() {
    // Arrange
    let token = CancellationToken::new();
    let subscription: &dyn Subscription = &token;

    // Act
    subscription.cancel();
    subscription.cancel();

    // Assert
    assert!(subscription.is_cancelled());
    assert!(token.clone().is_cancelled());
}
