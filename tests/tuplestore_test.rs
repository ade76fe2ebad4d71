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

//! Tuplestore Tests
//!
//! Tests read pointers, marks, trimming and the spill path through the
//! public API.

use relcore::executor::PointerFlags;
use relcore::{row, Row, Tuplestore, TuplestoreConfig, Value};

fn store(work_mem_bytes: usize, dir: Option<&std::path::Path>) -> Tuplestore {
    Tuplestore::new(TuplestoreConfig {
        work_mem_bytes,
        temp_dir: dir.map(|d| d.to_path_buf()),
    })
}

fn fill(ts: &mut Tuplestore, n: i64) {
    for i in 0..n {
        ts.append(row![i, format!("row-{}", i)]).expect("Failed to append");
    }
}

fn first_value(row: Option<Row>) -> Option<i64> {
    row.and_then(|r| r.get(0).and_then(Value::as_int64))
}

/// Test independent pointers see the same sequence
#[test]
fn test_pointers_are_independent() {
    let mut ts = store(1 << 20, None);
    fill(&mut ts, 5);
    let a = ts.alloc_read_pointer(PointerFlags::FORWARD);
    let b = ts.alloc_read_pointer(PointerFlags::BACKWARD);

    ts.select(a).expect("select a");
    assert_eq!(first_value(ts.gettupleslot(true, false).expect("read")), Some(0));
    assert_eq!(first_value(ts.gettupleslot(true, false).expect("read")), Some(1));

    ts.select(b).expect("select b");
    assert!(ts.skiptuples(4, true).expect("skip"));
    assert_eq!(first_value(ts.gettupleslot(true, false).expect("read")), Some(4));
    assert_eq!(first_value(ts.gettupleslot(false, false).expect("read")), Some(4));
    assert_eq!(first_value(ts.gettupleslot(false, false).expect("read")), Some(3));

    assert_eq!(ts.position(a).expect("position"), 2);
    assert_eq!(ts.position(b).expect("position"), 3);
}

/// Test reading past the end returns None and leaves the pointer in place
#[test]
fn test_read_past_end() {
    let mut ts = store(1 << 20, None);
    fill(&mut ts, 2);
    let p = ts.alloc_read_pointer(PointerFlags::FORWARD);
    ts.select(p).expect("select");
    assert!(!ts.skiptuples(5, true).expect("skip"));
    assert!(ts.gettupleslot(true, false).expect("read").is_none());
    assert_eq!(ts.position(p).expect("position"), 2);

    // New rows become visible to a pointer waiting at the end
    ts.append(row![42]).expect("Failed to append");
    assert_eq!(first_value(ts.gettupleslot(true, false).expect("read")), Some(42));
}

/// Test marks bound backward reads and drive trimming
#[test]
fn test_marks_and_trim() {
    let mut ts = store(1 << 20, None);
    fill(&mut ts, 10);
    let p = ts.alloc_read_pointer(PointerFlags::BACKWARD);
    ts.select(p).expect("select");
    assert!(ts.skiptuples(6, true).expect("skip"));
    ts.set_mark(p, 4).expect("set mark");

    assert!(!ts.skiptuples(5, false).expect("skip back"));
    assert_eq!(ts.position(p).expect("position"), 4);
    assert!(ts.set_mark(p, 2).is_err());

    // Pointer 0 is forward-only and sits at 0 until it is moved
    ts.select(0).expect("select 0");
    assert!(ts.skiptuples(10, true).expect("skip"));
    let before = ts.memory_used();
    ts.trim();
    assert_eq!(ts.first_retained(), 4);
    assert!(ts.memory_used() < before);
    assert_eq!(ts.row_count(), 10);

    ts.select(p).expect("select");
    assert_eq!(first_value(ts.gettupleslot(true, false).expect("read")), Some(4));
}

/// Test spilling to a caller-chosen directory keeps every row readable
#[test]
fn test_spill_to_temp_dir() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut ts = store(256, Some(dir.path()));
    let p = ts.alloc_read_pointer(PointerFlags::BACKWARD);
    fill(&mut ts, 100);

    assert!(!ts.in_memory());
    assert_eq!(ts.spill_count(), 1);
    assert_eq!(ts.memory_used(), 0);

    ts.select(p).expect("select");
    let mut seen = Vec::new();
    while let Some(row) = ts.gettupleslot(true, true).expect("read") {
        seen.push(row.get(1).and_then(Value::as_string).expect("text column"));
    }
    assert_eq!(seen.len(), 100);
    assert_eq!(seen[0], "row-0");
    assert_eq!(seen[99], "row-99");

    // Backward reads work on disk too
    assert_eq!(first_value(ts.gettupleslot(false, false).expect("read")), Some(99));
    assert!(ts.skiptuples(50, false).expect("skip back"));
    assert_eq!(first_value(ts.gettupleslot(true, false).expect("read")), Some(49));
}

/// Test clear empties the store but keeps pointers allocated
#[test]
fn test_clear_after_spill() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let mut ts = store(512, Some(dir.path()));
    let p = ts.alloc_read_pointer(PointerFlags::BACKWARD);
    fill(&mut ts, 50);
    assert!(!ts.in_memory());

    ts.clear();
    assert!(ts.in_memory());
    assert_eq!(ts.row_count(), 0);
    assert_eq!(ts.mark(p).expect("mark"), 0);

    fill(&mut ts, 1);
    ts.select(p).expect("select");
    assert_eq!(first_value(ts.gettupleslot(true, false).expect("read")), Some(0));
    assert_eq!(ts.spill_count(), 1);
}

/// Test selecting an unknown pointer fails
#[test]
fn test_unknown_pointer() {
    let mut ts = store(1 << 20, None);
    assert!(ts.select(7).is_err());
    assert!(ts.position(7).is_err());
}
