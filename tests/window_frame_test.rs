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

//! Window Frame Tests
//!
//! Tests ROWS, RANGE and GROUPS frames, exclusion clauses, moving
//! aggregates with inverse transitions and spec fixtures.

use relcore::catalog::oids::*;
use relcore::core::INVALID_OID;
use relcore::executor::window::{
    AggregateSupport, FrameOptions, GroupColumn, InRangeSpec, WindowFuncDesc,
};
use relcore::executor::{collect_rows, ExecutionConfig, VecSource};
use relcore::functions::FinalModify;
use relcore::{
    row, DataType, ErrorCategory, ExecutionContext, Expr, Row, Value, WindowAgg, WindowAggSpec,
};

fn build(spec: WindowAggSpec, input: Vec<Row>) -> WindowAgg {
    WindowAgg::new(spec, Box::new(VecSource::new(input)), ExecutionContext::new())
        .expect("Failed to build window operator")
}

fn last_column(rows: &[Row]) -> Vec<Value> {
    rows.iter()
        .map(|r| r.get(r.len() - 1).cloned().unwrap_or_default())
        .collect()
}

fn ints(values: &[i64]) -> Vec<Value> {
    values.iter().copied().map(Value::integer).collect()
}

fn int_rows(values: &[i64]) -> Vec<Row> {
    values.iter().map(|v| row![*v]).collect()
}

fn sum_of_first() -> WindowFuncDesc {
    WindowFuncDesc::aggregate(
        AGG_SUM_INT8,
        vec![Expr::outer_var(1, DataType::Integer)],
        DataType::Integer,
    )
}

fn rows_between(start: FrameOptions, end: FrameOptions) -> FrameOptions {
    FrameOptions::NONDEFAULT | FrameOptions::ROWS | FrameOptions::BETWEEN | start | end
}

/// Test SUM over ROWS BETWEEN 1 PRECEDING AND 1 FOLLOWING
#[test]
fn test_rows_sliding_sum() {
    let spec = WindowAggSpec::new()
        .frame(rows_between(
            FrameOptions::START_OFFSET_PRECEDING,
            FrameOptions::END_OFFSET_FOLLOWING,
        ))
        .start_offset(Expr::constant(Value::integer(1)))
        .end_offset(Expr::constant(Value::integer(1)))
        .function(sum_of_first());
    let mut op = build(spec, int_rows(&[1, 2, 3, 4, 5]));
    let rows = collect_rows(&mut op).expect("Failed to run window operator");
    assert_eq!(last_column(&rows), ints(&[3, 6, 9, 12, 9]));

    let stats = op.aggregate_stats();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].restarts, 1);
    assert_eq!(stats[0].inverse_calls, 3);
}

/// Test a moving average removes the oldest row instead of restarting
#[test]
fn test_moving_average_uses_inverse_transition() {
    let spec = WindowAggSpec::new()
        .frame(rows_between(
            FrameOptions::START_OFFSET_PRECEDING,
            FrameOptions::END_CURRENT_ROW,
        ))
        .start_offset(Expr::constant(Value::integer(2)))
        .function(WindowFuncDesc::aggregate(
            AGG_AVG_FLOAT8,
            vec![Expr::outer_var(1, DataType::Float)],
            DataType::Float,
        ));
    let input = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]
        .iter()
        .map(|v| row![*v])
        .collect();
    let mut op = build(spec, input);
    let rows = collect_rows(&mut op).expect("Failed to run window operator");

    let averages: Vec<f64> = last_column(&rows)
        .iter()
        .map(|v| v.as_float64().expect("avg is not null"))
        .collect();
    let expected = [1.0, 1.5, 2.0, 3.0, 4.0, 5.0];
    for (got, want) in averages.iter().zip(expected) {
        assert!((got - want).abs() < 1e-9, "got {} want {}", got, want);
    }

    // Rows at positions 3, 4 and 5 each push one row out of the frame
    let stats = op.aggregate_stats();
    assert_eq!(stats[0].inverse_calls, 3);
    assert_eq!(stats[0].inverse_failures, 0);
    assert_eq!(stats[0].restarts, 1);
    assert_eq!(stats[0].forward_calls, 6);
}

/// Test an aggregate without an inverse restarts whenever the head moves
#[test]
fn test_min_restarts_on_moving_head() {
    let spec = WindowAggSpec::new()
        .frame(rows_between(
            FrameOptions::START_OFFSET_PRECEDING,
            FrameOptions::END_CURRENT_ROW,
        ))
        .start_offset(Expr::constant(Value::integer(1)))
        .function(WindowFuncDesc::aggregate(
            AGG_MIN_INT8,
            vec![Expr::outer_var(1, DataType::Integer)],
            DataType::Integer,
        ));
    let mut op = build(spec, int_rows(&[5, 3, 8, 1]));
    let rows = collect_rows(&mut op).expect("Failed to run window operator");
    assert_eq!(last_column(&rows), ints(&[5, 3, 3, 1]));
    let stats = op.aggregate_stats();
    assert_eq!(stats[0].inverse_calls, 0);
    assert_eq!(stats[0].restarts, 3);
}

/// Test EXCLUDE CURRENT ROW over the whole partition
#[test]
fn test_exclude_current_row() {
    let spec = WindowAggSpec::new()
        .frame(
            rows_between(
                FrameOptions::START_UNBOUNDED_PRECEDING,
                FrameOptions::END_UNBOUNDED_FOLLOWING,
            ) | FrameOptions::EXCLUDE_CURRENT_ROW,
        )
        .function(sum_of_first());
    let mut op = build(spec, int_rows(&[10, 20, 30, 40]));
    let rows = collect_rows(&mut op).expect("Failed to run window operator");
    assert_eq!(last_column(&rows), ints(&[90, 80, 70, 60]));
}

/// Test EXCLUDE GROUP and EXCLUDE TIES remove peers of the current row
#[test]
fn test_exclude_group_and_ties() {
    let whole = rows_between(
        FrameOptions::START_UNBOUNDED_PRECEDING,
        FrameOptions::END_UNBOUNDED_FOLLOWING,
    );
    let input = int_rows(&[1, 2, 2, 3]);

    let spec = WindowAggSpec::new()
        .order_by(GroupColumn::new(0, INT8_EQ_OP, F_INT8EQ))
        .frame(whole | FrameOptions::EXCLUDE_GROUP)
        .function(sum_of_first());
    let rows = collect_rows(&mut build(spec, input.clone())).expect("exclude group");
    assert_eq!(last_column(&rows), ints(&[7, 4, 4, 5]));

    let spec = WindowAggSpec::new()
        .order_by(GroupColumn::new(0, INT8_EQ_OP, F_INT8EQ))
        .frame(whole | FrameOptions::EXCLUDE_TIES)
        .function(sum_of_first());
    let rows = collect_rows(&mut build(spec, input)).expect("exclude ties");
    assert_eq!(last_column(&rows), ints(&[8, 6, 6, 8]));
}

/// Test RANGE with an offset uses the in-range support function
#[test]
fn test_range_offset_frame() {
    let spec = WindowAggSpec::new()
        .order_by(GroupColumn::new(0, INT8_EQ_OP, F_INT8EQ))
        .frame(
            FrameOptions::NONDEFAULT
                | FrameOptions::RANGE
                | FrameOptions::BETWEEN
                | FrameOptions::START_OFFSET_PRECEDING
                | FrameOptions::END_CURRENT_ROW,
        )
        .start_offset(Expr::constant(Value::integer(2)))
        .in_range(InRangeSpec {
            func: F_IN_RANGE_INT8,
            collation: INVALID_OID,
            ascending: true,
            nulls_first: false,
        })
        .function(sum_of_first());
    let rows = collect_rows(&mut build(spec, int_rows(&[1, 2, 4, 7, 8])))
        .expect("Failed to run window operator");
    assert_eq!(last_column(&rows), ints(&[1, 3, 6, 7, 15]));
}

/// Test GROUPS frames count peer groups rather than rows
#[test]
fn test_groups_frame() {
    let spec = WindowAggSpec::new()
        .order_by(GroupColumn::new(0, INT8_EQ_OP, F_INT8EQ))
        .frame(
            FrameOptions::NONDEFAULT
                | FrameOptions::GROUPS
                | FrameOptions::BETWEEN
                | FrameOptions::START_OFFSET_PRECEDING
                | FrameOptions::END_CURRENT_ROW,
        )
        .start_offset(Expr::constant(Value::integer(1)))
        .function(sum_of_first());
    let rows = collect_rows(&mut build(spec, int_rows(&[1, 1, 2, 3, 3])))
        .expect("Failed to run window operator");
    assert_eq!(last_column(&rows), ints(&[2, 2, 4, 8, 8]));
}

/// Test frame head and tail never move backward
#[test]
fn test_frame_bounds_are_monotonic() {
    let value = || vec![Expr::outer_var(1, DataType::Integer)];
    let spec = WindowAggSpec::new()
        .frame(rows_between(
            FrameOptions::START_OFFSET_PRECEDING,
            FrameOptions::END_OFFSET_FOLLOWING,
        ))
        .start_offset(Expr::constant(Value::integer(2)))
        .end_offset(Expr::constant(Value::integer(1)))
        .function(WindowFuncDesc::pure(WIN_FIRST_VALUE, value(), DataType::Integer))
        .function(WindowFuncDesc::pure(WIN_LAST_VALUE, value(), DataType::Integer));
    // Input values equal positions, so the frame bounds are read back directly
    let rows = collect_rows(&mut build(spec, int_rows(&[0, 1, 2, 3, 4, 5, 6])))
        .expect("Failed to run window operator");

    let heads: Vec<i64> = rows.iter().filter_map(|r| r.get(1)?.as_int64()).collect();
    let tails: Vec<i64> = rows.iter().filter_map(|r| r.get(2)?.as_int64()).collect();
    assert_eq!(heads, vec![0, 0, 0, 1, 2, 3, 4]);
    assert_eq!(tails, vec![1, 2, 3, 4, 5, 6, 6]);
    assert!(heads.windows(2).all(|w| w[0] <= w[1]));
    assert!(tails.windows(2).all(|w| w[0] <= w[1]));
}

/// Test a sliding ROWS frame matches recomputation from scratch
#[test]
fn test_inverse_transition_matches_recomputation() {
    let values: Vec<i64> = vec![7, -3, 12, 0, 5, 5, -8, 21, 4, 9, -1, 6];
    let width = 4usize;
    let spec = WindowAggSpec::new()
        .frame(rows_between(
            FrameOptions::START_OFFSET_PRECEDING,
            FrameOptions::END_CURRENT_ROW,
        ))
        .start_offset(Expr::constant(Value::integer(width as i64 - 1)))
        .function(sum_of_first())
        .function(WindowFuncDesc::aggregate(
            AGG_COUNT_ANY,
            vec![Expr::outer_var(1, DataType::Integer)],
            DataType::Integer,
        ));
    let mut op = build(spec, int_rows(&values));
    let rows = collect_rows(&mut op).expect("Failed to run window operator");

    for (i, row) in rows.iter().enumerate() {
        let lo = (i + 1).saturating_sub(width);
        let slice = &values[lo..=i];
        assert_eq!(row.get(1), Some(&Value::integer(slice.iter().sum())), "sum at {}", i);
        assert_eq!(
            row.get(2),
            Some(&Value::integer(slice.len() as i64)),
            "count at {}",
            i
        );
    }
    let stats = op.aggregate_stats();
    assert!(stats.iter().all(|s| s.restarts == 1));
    assert!(stats.iter().all(|s| s.inverse_calls == (values.len() - width) as u64));
}

/// Test FILTER only feeds matching rows to the aggregate
#[test]
fn test_aggregate_filter() {
    let positive = Expr::op_resolved(
        INT8_GT_OP,
        F_INT8GT,
        vec![
            Expr::outer_var(1, DataType::Integer),
            Expr::constant(Value::integer(0)),
        ],
        DataType::Boolean,
    );
    let spec = WindowAggSpec::new()
        .frame(rows_between(
            FrameOptions::START_UNBOUNDED_PRECEDING,
            FrameOptions::END_CURRENT_ROW,
        ))
        .function(sum_of_first().with_filter(positive));
    let rows = collect_rows(&mut build(spec, int_rows(&[4, -2, 3, -9])))
        .expect("Failed to run window operator");
    assert_eq!(last_column(&rows), ints(&[4, 4, 7, 7]));
}

/// Test a negative ROWS offset is rejected at the first fetch
#[test]
fn test_negative_offset_rejected() {
    let spec = WindowAggSpec::new()
        .frame(rows_between(
            FrameOptions::START_OFFSET_PRECEDING,
            FrameOptions::END_CURRENT_ROW,
        ))
        .start_offset(Expr::constant(Value::integer(-1)))
        .function(sum_of_first());
    assert!(collect_rows(&mut build(spec, int_rows(&[1, 2]))).is_err());
}

/// Test a large partition spills to disk and still aggregates correctly
#[test]
fn test_partition_spills_under_small_work_mem() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = ExecutionConfig::default()
        .with_work_mem(1024)
        .with_temp_dir(dir.path().to_path_buf());
    let ctx = ExecutionContext::new().with_config(config);
    let spec = WindowAggSpec::new()
        .frame(rows_between(
            FrameOptions::START_UNBOUNDED_PRECEDING,
            FrameOptions::END_UNBOUNDED_FOLLOWING,
        ))
        .function(WindowFuncDesc::aggregate(AGG_COUNT_STAR, vec![], DataType::Integer));
    let input: Vec<Row> = (0..500).map(|v| row![v as i64, "padding padding padding"]).collect();
    let mut op = WindowAgg::new(spec, Box::new(VecSource::new(input)), ctx)
        .expect("Failed to build window operator");
    let rows = collect_rows(&mut op).expect("Failed to run window operator");

    assert_eq!(rows.len(), 500);
    assert!(last_column(&rows).iter().all(|v| *v == Value::integer(500)));
    assert!(op.spill_count() >= 1);
}

/// Test a frame spec survives a JSON fixture round trip
#[test]
fn test_spec_json_fixture() {
    let fixture = r#"{
        "partition_by": [],
        "order_by": [],
        "frame": 18453,
        "start_offset": null,
        "end_offset": null,
        "in_range": null,
        "functions": [],
        "run_condition": null,
        "qual": null,
        "top_window": true
    }"#;
    let mut spec: WindowAggSpec = serde_json::from_str(fixture).expect("Failed to parse fixture");
    // ROWS BETWEEN 1 PRECEDING AND 1 FOLLOWING
    assert_eq!(
        spec.frame,
        rows_between(
            FrameOptions::START_OFFSET_PRECEDING,
            FrameOptions::END_OFFSET_FOLLOWING
        )
    );
    // offsets are missing, so the validating loader refuses it
    assert!(WindowAggSpec::from_json(fixture).is_err());

    spec = spec
        .start_offset(Expr::constant(Value::integer(1)))
        .end_offset(Expr::constant(Value::integer(1)))
        .function(sum_of_first());
    let json = spec.to_json().expect("Failed to serialize spec");
    let back = WindowAggSpec::from_json(&json).expect("Failed to parse spec");
    assert_eq!(back, spec);

    let rows = collect_rows(&mut build(back, int_rows(&[1, 2, 3, 4, 5])))
        .expect("Failed to run window operator");
    assert_eq!(last_column(&rows), ints(&[3, 6, 9, 12, 9]));
}

/// Counting aggregate bound through explicit support functions
fn custom_count(support: AggregateSupport) -> WindowFuncDesc {
    WindowFuncDesc::aggregate(
        AGG_COUNT_ANY,
        vec![Expr::outer_var(1, DataType::Integer)],
        DataType::Integer,
    )
    .with_support(support)
}

fn count_support() -> AggregateSupport {
    AggregateSupport {
        transfn: F_INT8INC,
        invtransfn: Some(F_INT8DEC),
        finalfn: None,
        final_modify: FinalModify::ReadOnly,
        trans_type: DataType::Integer,
        init_value: Some(Value::integer(0)),
    }
}

fn sliding_spec(func: WindowFuncDesc) -> WindowAggSpec {
    WindowAggSpec::new()
        .frame(rows_between(
            FrameOptions::START_OFFSET_PRECEDING,
            FrameOptions::END_CURRENT_ROW,
        ))
        .start_offset(Expr::constant(Value::integer(1)))
        .function(func)
}

/// Test an aggregate whose final function modifies its state is unsupported
#[test]
fn test_state_modifying_final_function_rejected() {
    for final_modify in [FinalModify::Shareable, FinalModify::ReadWrite] {
        let support = AggregateSupport {
            final_modify,
            ..count_support()
        };
        let err = WindowAgg::new(
            sliding_spec(custom_count(support)),
            Box::new(VecSource::new(int_rows(&[1, 2, 3]))),
            ExecutionContext::new(),
        )
        .err()
        .expect("state-modifying final function must be rejected");
        assert_eq!(err.category(), ErrorCategory::Unsupported);
    }
}

/// Test mismatched forward and inverse strictness is unsupported
#[test]
fn test_inverse_strictness_mismatch_rejected() {
    let support = AggregateSupport {
        invtransfn: Some(F_STRING_AGG_TRANSFN),
        ..count_support()
    };
    let err = WindowAgg::new(
        sliding_spec(custom_count(support)),
        Box::new(VecSource::new(int_rows(&[1, 2, 3]))),
        ExecutionContext::new(),
    )
    .err()
    .expect("strictness mismatch must be rejected");
    assert_eq!(err.category(), ErrorCategory::Unsupported);

    let rows = collect_rows(&mut build(
        sliding_spec(custom_count(count_support())),
        int_rows(&[1, 2, 3]),
    ))
    .expect("Failed to run window operator");
    assert_eq!(last_column(&rows), ints(&[1, 2, 2]));
}
