// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use rivulet_core::{source, Publisher, PublisherExt, RivuletError, SubscriberRef};
use rivulet_test_utils::{boom, TestSubscriber};

#[test]
fn test_range_emits_count_values_then_completes() {
    // Arrange
    let ts = TestSubscriber::<i64>::unbounded();

    // Act
    source::range(5, 3).subscribe(ts.clone());

    // Assert
    ts.assert_values(&[5, 6, 7]).assert_complete().assert_well_formed();
}

#[test]
fn test_range_with_negative_count_is_empty() {
    // Arrange
    let ts = TestSubscriber::<i64>::new(0);

    // Act
    source::range(1, -4).subscribe(ts.clone());

    // Assert
    ts.assert_values(&[]).assert_complete();
}

#[test]
fn test_range_stops_at_max_value() {
    // Arrange
    let ts = TestSubscriber::<i64>::unbounded();

    // Act
    source::range(i64::MAX - 2, 10).subscribe(ts.clone());

    // Assert
    ts.assert_values(&[i64::MAX - 2, i64::MAX - 1]).assert_complete();
}

#[test]
fn test_from_iter_completes_eagerly_after_last_requested_item() {
    // Arrange
    let ts = TestSubscriber::<&str>::new(2);

    // Act
    source::from_iter(vec!["a", "b"]).subscribe(ts.clone());

    // Assert
    ts.assert_values(&["a", "b"]).assert_complete();
}

#[test]
fn test_from_iter_is_cold() {
    // Arrange
    let publisher = source::from_iter(vec![1, 2, 3]);
    let first = TestSubscriber::<i32>::unbounded();
    let second = TestSubscriber::<i32>::new(1);

    // Act
    publisher.subscribe(first.clone());
    publisher.subscribe(second.clone());

    // Assert
    first.assert_values(&[1, 2, 3]).assert_complete();
    second.assert_values(&[1]).assert_not_complete();
}

#[test]
fn test_one_by_one_consumer_does_not_recurse() {
    // Arrange
    let ts = TestSubscriber::<i64>::one_by_one();

    // Act
    source::range(0, 10_000).subscribe(ts.clone());

    // Assert
    ts.assert_value_count(10_000).assert_complete().assert_well_formed();
}

#[test]
fn test_cancel_from_on_next_stops_emission() {
    // Arrange
    let ts = TestSubscriber::<i64>::cancelling_after(3);

    // Act
    source::range(0, 100).subscribe(ts.clone());

    // Assert
    ts.assert_values(&[0, 1, 2]).assert_not_terminated();
    assert!(ts.is_cancelled());
}

#[test]
fn test_just_emits_single_value() {
    // Arrange
    let ts = TestSubscriber::<String>::unbounded();

    // Act
    source::just("only".to_string()).subscribe(ts.clone());

    // Assert
    ts.assert_values(&["only".to_string()]).assert_complete();
}

#[test]
fn test_empty_completes_without_request() {
    // Arrange
    let ts = TestSubscriber::<i32>::new(0);

    // Act
    source::empty::<i32>().subscribe(ts.clone());

    // Assert
    ts.assert_values(&[]).assert_complete().assert_well_formed();
}

#[test]
fn test_error_source_fails_every_subscriber() {
    // Arrange
    let publisher = source::error::<i32>(boom("source"));
    let first = TestSubscriber::<i32>::new(0);
    let second = TestSubscriber::<i32>::new(0);

    // Act
    publisher.subscribe(first.clone());
    publisher.subscribe(second.clone());

    // Assert
    first.assert_error_message("boom: source");
    second.assert_error_message("boom: source");
}

#[test]
fn test_never_only_subscribes() {
    // Arrange
    let ts = TestSubscriber::<i32>::unbounded();

    // Act
    source::never::<i32>().subscribe(ts.clone());

    // Assert
    assert!(ts.is_subscribed());
    ts.assert_values(&[]).assert_not_terminated();
}

#[test]
fn test_subscribe_with_returns_cancellable_handle() {
    // Arrange
    let ts = TestSubscriber::<i64>::new(2);

    // Act
    let handle = source::range(0, 10).subscribe_with(ts.clone());
    handle.cancel();
    ts.request(5);

    // Assert
    assert!(handle.is_cancelled());
    ts.assert_values(&[0, 1]).assert_not_terminated();
}

#[test]
fn test_lift_applies_downstream_to_upstream_operator() {
    // Arrange
    struct Doubling {
        downstream: SubscriberRef<i64>,
    }

    impl rivulet_core::Subscriber<i64> for Doubling {
        fn on_subscribe(&self, subscription: rivulet_core::SubscriptionRef) {
            self.downstream.on_subscribe(subscription);
        }

        fn on_next(&self, value: i64) {
            self.downstream.on_next(value * 2);
        }

        fn on_error(&self, error: RivuletError) {
            self.downstream.on_error(error);
        }

        fn on_complete(&self) {
            self.downstream.on_complete();
        }
    }

    let ts = TestSubscriber::<i64>::unbounded();
    let doubled = source::range(1, 3).lift(|downstream: SubscriberRef<i64>| -> SubscriberRef<i64> {
        std::sync::Arc::new(Doubling { downstream })
    });

    // Act
    doubled.subscribe(ts.clone());

    // Assert
    ts.assert_values(&[2, 4, 6]).assert_complete();
}
