// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use anyhow::Result;
use rivulet::prelude::*;
use rivulet::{PublisherRef, TokioScheduler};
use rivulet_test_utils::{boom, TestPublisher, TestSubscriber, UndeliverableCapture};
use std::sync::{Arc, Barrier};
use std::time::Duration;

#[test]
fn test_concat_of_merges_keeps_group_order() {
    // Arrange
    let first = merge(
        vec![source::range(1, 2), source::range(3, 2)],
        MergeConfig::new().with_max_concurrency(1),
    );
    let second = merge(
        vec![source::range(10, 2), source::range(12, 2)],
        MergeConfig::new().with_max_concurrency(1),
    );
    let groups: Vec<PublisherRef<i64>> = vec![first.boxed(), second.boxed()];
    let ts = TestSubscriber::<i64>::new(3);

    // Act
    concat(groups, ConcatConfig::default()).subscribe(ts.clone());

    // Assert
    ts.assert_values(&[1, 2, 3]).assert_not_complete();
    ts.request(10);
    ts.assert_values(&[1, 2, 3, 4, 10, 11, 12, 13])
        .assert_complete()
        .assert_well_formed();
}

#[test]
fn test_replayed_merge_feeds_late_subscribers() {
    // Arrange
    let (a, b) = (TestPublisher::<i32>::new(), TestPublisher::<i32>::new());
    let shared = merge(vec![a.clone(), b.clone()], MergeConfig::default())
        .replay(ReplayPolicy::Size(3));
    shared.connect();

    // Act
    a.emit(1);
    b.emit(2);
    a.emit(3);
    b.emit(4);
    a.complete();
    b.complete();
    let late = TestSubscriber::<i32>::unbounded();
    shared.subscribe(late.clone());

    // Assert
    late.assert_values(&[2, 3, 4])
        .assert_complete()
        .assert_well_formed();
}

#[test]
fn test_error_in_shared_source_reaches_every_subscriber_once() {
    // Arrange
    let capture = UndeliverableCapture::install();
    let publisher = TestPublisher::<i32>::new();
    let shared = publisher
        .clone()
        .flat_map(|v: i32| source::just(v * 2), MergeConfig::default())
        .publish();
    let (first, second) = (
        TestSubscriber::<i32>::unbounded(),
        TestSubscriber::<i32>::unbounded(),
    );
    shared.subscribe(first.clone());
    shared.subscribe(second.clone());
    shared.connect();

    // Act
    publisher.emit(1);
    publisher.error(boom("upstream"));

    // Assert
    for ts in [&first, &second] {
        ts.assert_values(&[2])
            .assert_error_message("upstream")
            .assert_well_formed();
    }
    capture.assert_empty();
}

#[test]
fn test_many_threads_feeding_a_bounded_merge_stay_serialized() {
    // Arrange
    const THREADS: usize = 8;
    const PER_THREAD: usize = 500;
    let publishers: Vec<TestPublisher<usize>> =
        (0..THREADS).map(|_| TestPublisher::new()).collect();
    let ts = TestSubscriber::<usize>::unbounded();
    merge(
        publishers.clone(),
        MergeConfig::new().with_prefetch(THREADS * PER_THREAD),
    )
    .subscribe(ts.clone());
    let barrier = Arc::new(Barrier::new(THREADS));

    // Act
    std::thread::scope(|scope| {
        for (index, publisher) in publishers.iter().enumerate() {
            let barrier = barrier.clone();
            scope.spawn(move || {
                barrier.wait();
                for v in 0..PER_THREAD {
                    publisher.emit(index * PER_THREAD + v);
                }
                publisher.complete();
            });
        }
    });

    // Assert
    assert_eq!(ts.value_count(), THREADS * PER_THREAD);
    let values = ts.values();
    for index in 0..THREADS {
        let own: Vec<_> = values
            .iter()
            .copied()
            .filter(|v| v / PER_THREAD == index)
            .collect();
        assert_eq!(own, (index * PER_THREAD..(index + 1) * PER_THREAD).collect::<Vec<_>>());
    }
    ts.assert_complete().assert_well_formed();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_time_bounded_replay_on_tokio_clock() -> Result<()> {
    // Arrange
    let scheduler = TokioScheduler::try_current().ok_or_else(|| anyhow::anyhow!("no runtime"))?;
    let publisher = TestPublisher::<i32>::new();
    let shared = publisher
        .clone()
        .replay_with_scheduler(ReplayPolicy::Time(Duration::from_millis(50)), Arc::new(scheduler));
    shared.connect();

    // Act
    publisher.emit(1);
    tokio::time::sleep(Duration::from_millis(120)).await;
    publisher.emit(2);
    let late = TestSubscriber::<i32>::unbounded();
    shared.subscribe(late.clone());

    // Assert
    late.assert_values(&[2]).assert_not_terminated();
    Ok(())
}
