// Copyright 2025 Umberto Gotti <umberto.gotti@umbertogotti.dev>
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

use crate::merge_bench::{bench_concat, bench_merge};
use crate::replay_bench::bench_replay_fan_out;
use criterion::{criterion_group, criterion_main};


criterion_group!(benches, bench_merge, bench_concat, bench_replay_fan_out);
criterion_main!(benches);
