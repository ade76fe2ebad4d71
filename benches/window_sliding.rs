// Copyright 2025 Relcore Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Sliding-frame window aggregate benchmark
//!
//! Run with: cargo bench --bench window_sliding
//!
//! Compares a moving SUM, which removes rows leaving the frame with its
//! inverse transition, against MIN, which has no inverse and restarts the
//! aggregate for every row.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use relcore::catalog::oids::{AGG_MIN_INT8, AGG_SUM_INT8};
use relcore::core::Oid;
use relcore::executor::window::{FrameOptions, WindowFuncDesc};
use relcore::executor::{collect_rows, VecSource};
use relcore::{row, DataType, ExecutionContext, Expr, Row, Value, WindowAgg, WindowAggSpec};
use std::hint::black_box;

const ROW_COUNT: usize = 10_000;

fn input_rows() -> Vec<Row> {
    (0..ROW_COUNT as i64).map(|i| row![i % 97]).collect()
}

fn sliding_spec(aggfnoid: Oid, width: i64) -> WindowAggSpec {
    WindowAggSpec::new()
        .frame(
            FrameOptions::NONDEFAULT
                | FrameOptions::ROWS
                | FrameOptions::BETWEEN
                | FrameOptions::START_OFFSET_PRECEDING
                | FrameOptions::END_CURRENT_ROW,
        )
        .start_offset(Expr::constant(Value::integer(width)))
        .function(WindowFuncDesc::aggregate(
            aggfnoid,
            vec![Expr::outer_var(1, DataType::Integer)],
            DataType::Integer,
        ))
}

fn run(spec: &WindowAggSpec, rows: &[Row]) -> usize {
    let mut op = WindowAgg::new(
        spec.clone(),
        Box::new(VecSource::new(rows.to_vec())),
        ExecutionContext::new(),
    )
    .unwrap();
    collect_rows(&mut op).unwrap().len()
}

fn bench_sliding_frames(c: &mut Criterion) {
    let rows = input_rows();
    let mut group = c.benchmark_group("ROWS n PRECEDING");

    for width in [10i64, 100, 1000] {
        let sum = sliding_spec(AGG_SUM_INT8, width);
        group.bench_with_input(BenchmarkId::new("sum", width), &sum, |b, spec| {
            b.iter(|| black_box(run(spec, &rows)))
        });

        let min = sliding_spec(AGG_MIN_INT8, width);
        group.bench_with_input(BenchmarkId::new("min", width), &min, |b, spec| {
            b.iter(|| black_box(run(spec, &rows)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_sliding_frames);
criterion_main!(benches);
