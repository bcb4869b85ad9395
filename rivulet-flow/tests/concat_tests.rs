// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use rivulet_core::{source, Publisher, PublisherExt, PublisherRef, RivuletError};
use rivulet_flow::{concat, concat_delay_error, ConcatConfig, ConcatMapExt};
use rivulet_test_utils::{
    boom, source_failed, values_then_error, TestPublisher, TestSubscriber, UndeliverableCapture,
};

#[test]
fn test_concat_subscribes_next_source_only_after_completion() {
    // Arrange
    let (a, b) = (TestPublisher::<i32>::new(), TestPublisher::<i32>::new());
    let ts = TestSubscriber::<i32>::unbounded();
    concat(vec![a.clone(), b.clone()], ConcatConfig::default()).subscribe(ts.clone());

    // Act
    a.emit(1);
    let b_before = b.subscribe_count();
    a.complete();
    b.emit(2);
    b.complete();

    // Assert
    assert_eq!(b_before, 0);
    assert_eq!(b.subscribe_count(), 1);
    ts.assert_values(&[1, 2])
        .assert_complete()
        .assert_well_formed();
}

#[test]
fn test_concat_carries_unmet_demand_to_next_source() {
    // Arrange
    let ts = TestSubscriber::<i64>::new(4);

    // Act
    concat(
        vec![source::range(1, 3), source::range(10, 3)],
        ConcatConfig::default(),
    )
    .subscribe(ts.clone());

    // Assert
    ts.assert_values(&[1, 2, 3, 10]).assert_not_complete();

    ts.request(2);
    ts.assert_values(&[1, 2, 3, 10, 11, 12])
        .assert_complete()
        .assert_well_formed();
}

#[test]
fn test_concat_requests_only_outstanding_demand_from_each_source() {
    // Arrange
    let (a, b) = (TestPublisher::<i32>::new(), TestPublisher::<i32>::new());
    let ts = TestSubscriber::<i32>::new(5);
    concat(vec![a.clone(), b.clone()], ConcatConfig::default()).subscribe(ts.clone());

    // Act
    a.emit_all([1, 2]);
    a.complete();

    // Assert
    assert_eq!(a.requests(), vec![5]);
    assert_eq!(b.requests(), vec![3]);
}

#[test]
fn test_concat_fails_fast_and_skips_remaining_sources() {
    // Arrange
    let capture = UndeliverableCapture::install();
    let (a, b) = (TestPublisher::<i32>::new(), TestPublisher::<i32>::new());
    let ts = TestSubscriber::<i32>::unbounded();
    concat(vec![a.clone(), b.clone()], ConcatConfig::default()).subscribe(ts.clone());

    // Act
    a.emit(1);
    a.error(boom("first"));

    // Assert
    ts.assert_values(&[1])
        .assert_error_message("first")
        .assert_well_formed();
    assert_eq!(b.subscribe_count(), 0);
    capture.assert_empty();
}

#[test]
fn test_concat_delay_error_runs_every_source() {
    // Arrange
    let capture = UndeliverableCapture::install();
    let sources: Vec<PublisherRef<i64>> = vec![
        values_then_error(vec![1], source_failed(0)).boxed(),
        source::range(5, 1).boxed(),
        values_then_error(vec![7], source_failed(2)).boxed(),
    ];
    let ts = TestSubscriber::<i64>::unbounded();

    // Act
    concat_delay_error(sources, ConcatConfig::default()).subscribe(ts.clone());

    // Assert
    ts.assert_values(&[1, 5, 7])
        .assert_error(|e| matches!(e, RivuletError::CompositeError { count: 2, .. }))
        .assert_well_formed();
    capture.assert_empty();
}

#[test]
fn test_concat_of_long_synchronous_chain_does_not_recurse() {
    // Arrange
    let sources: Vec<_> = (0..20_000).map(source::just).collect();
    let ts = TestSubscriber::<i32>::unbounded();

    // Act
    concat(sources, ConcatConfig::default()).subscribe(ts.clone());

    // Assert
    assert_eq!(ts.value_count(), 20_000);
    assert_eq!(ts.values()[19_999], 19_999);
    ts.assert_complete();
}

#[test]
fn test_concat_cancel_stops_current_source() {
    // Arrange
    let (a, b) = (TestPublisher::<i32>::new(), TestPublisher::<i32>::new());
    let ts = TestSubscriber::<i32>::unbounded();
    concat(vec![a.clone(), b.clone()], ConcatConfig::default()).subscribe(ts.clone());

    // Act
    a.emit(1);
    ts.cancel();
    a.emit(2);
    a.complete();

    // Assert
    ts.assert_values(&[1]).assert_not_terminated();
    assert_eq!(a.cancel_count(), 1);
    assert_eq!(b.subscribe_count(), 0);
}

#[test]
fn test_concat_cancel_from_on_next_stops_delivery() {
    // Arrange
    let ts = TestSubscriber::<i64>::cancelling_after(3);

    // Act
    concat(
        vec![source::range(1, 5), source::range(10, 5)],
        ConcatConfig::default(),
    )
    .subscribe(ts.clone());

    // Assert
    ts.assert_values(&[1, 2, 3]).assert_not_terminated();
}

#[test]
fn test_concat_outer_overflow_fails_with_missing_backpressure() {
    // Arrange
    let capture = UndeliverableCapture::install();
    let outer = TestPublisher::<i32>::new();
    let inner = TestPublisher::<i32>::new();
    let ts = TestSubscriber::<i32>::unbounded();
    let source = inner.clone();
    outer
        .clone()
        .concat_map(
            move |_: i32| source.clone(),
            ConcatConfig::new().with_prefetch(1),
        )
        .subscribe(ts.clone());

    // Act
    outer.emit_all([1, 2, 3]);

    // Assert
    ts.assert_error(RivuletError::is_missing_backpressure);
    assert_eq!(outer.cancel_count(), 1);
    capture.assert_empty();
}

#[test]
fn test_concat_map_preserves_source_order() {
    // Arrange
    let ts = TestSubscriber::<i64>::unbounded();

    // Act
    source::range(1, 3)
        .concat_map(|v: i64| source::range(v * 10, 2), ConcatConfig::default())
        .subscribe(ts.clone());

    // Assert
    ts.assert_values(&[10, 11, 20, 21, 30, 31])
        .assert_complete()
        .assert_well_formed();
}

#[test]
fn test_concat_of_empty_sources_completes() {
    // Arrange
    let ts = TestSubscriber::<i32>::new(0);

    // Act
    concat(
        vec![source::empty::<i32>(), source::empty()],
        ConcatConfig::default(),
    )
    .subscribe(ts.clone());

    // Assert
    ts.assert_values(&[]).assert_complete();
}

#[test]
fn test_concat_delay_error_from_source_after_cancel_reaches_the_sink() {
    // Arrange
    let capture = UndeliverableCapture::install();
    let a = TestPublisher::<i32>::new();
    let ts = TestSubscriber::<i32>::unbounded();
    concat_delay_error(vec![a.clone()], ConcatConfig::default()).subscribe(ts.clone());

    // Act
    ts.cancel();
    a.error_despite_cancel(boom("late"));

    // Assert
    ts.assert_values(&[]).assert_not_terminated();
    assert!(capture.assert_single().to_string().contains("late"));
}

#[test]
fn test_concat_delay_error_from_outer_after_cancel_reaches_the_sink() {
    // Arrange
    let capture = UndeliverableCapture::install();
    let outer = TestPublisher::<i32>::new();
    let inner = TestPublisher::<i32>::new();
    let ts = TestSubscriber::<i32>::unbounded();
    let source = inner.clone();
    outer
        .clone()
        .concat_map(
            move |_: i32| source.clone(),
            ConcatConfig::new().with_delay_errors(true),
        )
        .subscribe(ts.clone());
    outer.emit(0);

    // Act
    ts.cancel();
    outer.error_despite_cancel(boom("outer late"));

    // Assert
    ts.assert_not_terminated();
    assert!(capture.assert_single().to_string().contains("outer late"));
}

#[test]
fn test_concat_fail_fast_error_after_cancel_reaches_the_sink() {
    // Arrange
    let capture = UndeliverableCapture::install();
    let a = TestPublisher::<i32>::new();
    let ts = TestSubscriber::<i32>::unbounded();
    concat(vec![a.clone()], ConcatConfig::default()).subscribe(ts.clone());

    // Act
    ts.cancel();
    a.error_despite_cancel(boom("late"));

    // Assert
    ts.assert_not_terminated();
    capture.assert_single();
}

#[test]
fn test_concat_never_exceeds_demand_under_concurrent_requests() {
    // Arrange
    let sources: Vec<_> = (0..8).map(|i| source::range(i * 100, 100)).collect();
    let ts = TestSubscriber::<i64>::new(0);
    concat(sources, ConcatConfig::default()).subscribe(ts.clone());

    // Act
    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..150 {
                    ts.request(1);
                }
            });
        }
    });

    // Assert
    assert_eq!(ts.values(), (0..600).collect::<Vec<_>>());
    ts.assert_not_complete();
    assert_eq!(ts.max_concurrency(), 1);

    ts.request(200);
    assert_eq!(ts.value_count(), 800);
    ts.assert_complete().assert_well_formed();
}
