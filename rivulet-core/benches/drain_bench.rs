// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use criterion::{BenchmarkId, Criterion, Throughput};
use rivulet_core::{
    source, OverflowPolicy, Publisher, PublisherExt, RivuletError, SerializedSubscriber,
    Subscriber, SubscriberRef, Subscription, SubscriptionRef,
};
use std::hint::black_box;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

/// Sums what it receives; requests everything.
#[derive(Default)]
struct Summing {
    sum: AtomicU64,
}

impl Subscriber<u64> for Summing {
    fn on_subscribe(&self, subscription: SubscriptionRef) {
        subscription.request(rivulet_core::UNBOUNDED);
    }

    fn on_next(&self, value: u64) {
        self.sum.fetch_add(value, Ordering::Relaxed);
    }

    fn on_error(&self, _error: RivuletError) {}

    fn on_complete(&self) {}
}

pub fn bench_serialized_subscriber(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialized_subscriber");
    const ITEMS: u64 = 10_000;

    for &producers in &[1usize, 2, 4, 8] {
        group.throughput(Throughput::Elements(ITEMS * producers as u64));
        let id = BenchmarkId::from_parameter(format!("producers_{producers}"));
        group.bench_with_input(id, &producers, |bencher, &producers| {
            bencher.iter(|| {
                let summing = Arc::new(Summing::default());
                let serialized = SerializedSubscriber::new(summing.clone());
                let handles: Vec<_> = (0..producers)
                    .map(|_| {
                        let s = serialized.clone();
                        thread::spawn(move || (0..ITEMS).for_each(|v| s.on_next(v)))
                    })
                    .collect();
                handles.into_iter().for_each(|h| h.join().unwrap());
                black_box(summing.sum.load(Ordering::Relaxed));
            });
        });
    }

    group.finish();
}

pub fn bench_emission_loop(c: &mut Criterion) {
    let mut group = c.benchmark_group("emission_loop");
    const ITEMS: i64 = 100_000;
    group.throughput(Throughput::Elements(ITEMS as u64));

    group.bench_function("range_unbounded", |bencher| {
        bencher.iter(|| {
            let summing = Arc::new(Summing::default());
            source::range(0, ITEMS)
                .lift(|down: SubscriberRef<u64>| -> SubscriberRef<i64> { Arc::new(Widen { down }) })
                .subscribe(summing.clone());
            black_box(summing.sum.load(Ordering::Relaxed));
        });
    });

    group.bench_function("create_buffered", |bencher| {
        bencher.iter(|| {
            let summing = Arc::new(Summing::default());
            source::create(OverflowPolicy::Unbounded, 128, |emitter: source::Emitter<u64>| {
                (0..ITEMS as u64).for_each(|v| {
                    emitter.next(v);
                });
                emitter.complete();
            })
            .on_backpressure_buffer(128, OverflowPolicy::DropOldest)
            .subscribe(summing.clone());
            black_box(summing.sum.load(Ordering::Relaxed));
        });
    });

    group.finish();
}

struct Widen {
    down: SubscriberRef<u64>,
}

impl Subscriber<i64> for Widen {
    fn on_subscribe(&self, subscription: SubscriptionRef) {
        self.down.on_subscribe(subscription);
    }

    fn on_next(&self, value: i64) {
        self.down.on_next(value.unsigned_abs());
    }

    fn on_error(&self, error: RivuletError) {
        self.down.on_error(error);
    }

    fn on_complete(&self) {
        self.down.on_complete();
    }
}
