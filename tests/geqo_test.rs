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

//! Genetic Join Order Tests
//!
//! Tests the genetic orderer's configuration, its operators and planning
//! of join problems above the genetic threshold.

use std::io::Write;

use rand::rngs::StdRng;
use rand::SeedableRng;
use relcore::catalog::oids::INT8_EQ_OP;
use relcore::catalog::{ColumnInfo, RelationInfo};
use relcore::optimizer::geqo::{edge_recombination, order_crossover, select_parents};
use relcore::optimizer::{verify_plan_refs, Effort, PlanKind, Recombination, TargetEntry};
use relcore::{
    plan, CatalogSnapshot, DataType, Expr, GeqoConfig, Plan, PlannerConfig, Query,
};

const CHAIN: u32 = 12;

/// Relations 1..=n where relation i joins relation i+1 on i.b = (i+1).a
fn chain_catalog(n: u32) -> CatalogSnapshot {
    (1..=n).fold(CatalogSnapshot::new(), |cat, relid| {
        let tuples = 100.0 * relid as f64;
        cat.with_relation(
            RelationInfo::new(relid, format!("r{}", relid), (tuples / 50.0).ceil(), tuples)
                .column(ColumnInfo::new("a", DataType::Integer).with_ndistinct(tuples))
                .column(ColumnInfo::new("b", DataType::Integer).with_ndistinct(10.0)),
        )
    })
}

fn chain_query(n: u32) -> Query {
    let mut query = Query::new();
    for relid in 1..=n {
        query = query.relation(relid);
    }
    query = query
        .target(TargetEntry::new(Expr::var(1, 1, DataType::Integer), "first"))
        .target(TargetEntry::new(Expr::var(n, 2, DataType::Integer), "last"));
    for relid in 1..n {
        query = query.filter(Expr::op(
            INT8_EQ_OP,
            vec![
                Expr::var(relid, 2, DataType::Integer),
                Expr::var(relid + 1, 1, DataType::Integer),
            ],
            DataType::Boolean,
        ));
    }
    query
}

fn small_geqo(recombination: Recombination, seed: u64) -> GeqoConfig {
    GeqoConfig {
        pool_size: 24,
        generations: 40,
        random_seed: seed,
        recombination,
        ..GeqoConfig::default()
    }
}

fn scanned_relations(plan: &Plan) -> Vec<u32> {
    let mut out = Vec::new();
    plan.walk(&mut |p| {
        if let PlanKind::SeqScan { relid } | PlanKind::IndexScan { relid, .. } = &p.kind {
            out.push(*relid);
        }
    });
    out.sort_unstable();
    out
}

fn is_permutation(tour: &[usize], n: usize) -> bool {
    let mut sorted = tour.to_vec();
    sorted.sort_unstable();
    sorted == (0..n).collect::<Vec<_>>()
}

/// Test every key of the configuration format
#[test]
fn test_parse_config() {
    let config = GeqoConfig::parse(
        "# genetic search\n\
         Pool_Size = 256\n\
         generations: 500\n\
         effort = high\n\
         selection_bias = 1.75   # between 1.5 and 2\n\
         random_seed = 42\n\
         recombination = ox1\n",
    )
    .expect("parse");
    assert_eq!(config.pool_size, 256);
    assert_eq!(config.generations, 500);
    assert_eq!(config.effort, Effort::High);
    assert_eq!(config.selection_bias, 1.75);
    assert_eq!(config.random_seed, 42);
    assert_eq!(config.recombination, Recombination::Order);
}

/// Test out-of-range values are clamped and unknown keys ignored
#[test]
fn test_parse_clamps_and_ignores() {
    let config = GeqoConfig::parse(
        "pool_size = 5\nselection_bias = 9.0\nthreads = 8\nrecombination = erx\n",
    )
    .expect("parse");
    assert_eq!(config.pool_size, 128);
    assert_eq!(config.selection_bias, 2.0);
    assert_eq!(config.recombination, Recombination::Edge);

    let config = GeqoConfig::parse("pool_size = 100000\nselection_bias = 1.0").expect("parse");
    assert_eq!(config.pool_size, 1024);
    assert_eq!(config.selection_bias, 1.5);

    assert_eq!(GeqoConfig::parse("").expect("parse"), GeqoConfig::default());
}

/// Test malformed lines and values are rejected
#[test]
fn test_parse_errors() {
    assert!(GeqoConfig::parse("pool_size 64").is_err());
    assert!(GeqoConfig::parse("pool_size = many").is_err());
    assert!(GeqoConfig::parse("effort = extreme").is_err());
    assert!(GeqoConfig::parse("recombination = pmx").is_err());
    assert!(GeqoConfig::parse("selection_bias = fast").is_err());
}

/// Test loading the configuration from a file
#[test]
fn test_from_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "effort = low").expect("write");
    writeln!(file, "random_seed = 7").expect("write");
    file.flush().expect("flush");

    let config = GeqoConfig::from_file(file.path()).expect("load");
    assert_eq!(config.effort, Effort::Low);
    assert_eq!(config.random_seed, 7);

    let dir = tempfile::tempdir().expect("temp dir");
    assert!(GeqoConfig::from_file(dir.path().join("missing.conf")).is_err());
}

/// Test derived pool sizes and generation counts
#[test]
fn test_derived_sizes() {
    let config = GeqoConfig::default();
    assert_eq!(config.pool_size_for(2), 128);
    assert_eq!(config.pool_size_for(8), 512);
    assert_eq!(config.pool_size_for(12), 1024);
    assert_eq!(config.generations_for(128), 40 * 7);
    assert_eq!(config.generations_for(1000), 40 * 10);

    let low = GeqoConfig {
        effort: Effort::Low,
        ..GeqoConfig::default()
    };
    assert_eq!(low.generations_for(256), 8);

    let fixed = GeqoConfig {
        pool_size: 50,
        generations: 3,
        ..GeqoConfig::default()
    };
    assert_eq!(fixed.pool_size_for(20), 50);
    assert_eq!(fixed.generations_for(50), 3);
}

/// Test both crossover operators produce permutations
#[test]
fn test_crossover_children_are_permutations() {
    let mut rng = StdRng::seed_from_u64(11);
    let mom: Vec<usize> = (0..10).collect();
    let dad: Vec<usize> = vec![3, 7, 1, 9, 0, 5, 2, 8, 6, 4];
    for _ in 0..50 {
        let (child, failures) = edge_recombination(&mom, &dad, &mut rng);
        assert!(is_permutation(&child, 10), "{:?}", child);
        assert!(failures < 10);

        let child = order_crossover(&mom, &dad, &mut rng);
        assert!(is_permutation(&child, 10), "{:?}", child);
    }

    let (child, failures) = edge_recombination(&mom, &mom, &mut rng);
    assert!(is_permutation(&child, 10));
    assert_eq!(failures, 0);
}

/// Test parent selection returns two distinct ranks inside the pool
#[test]
fn test_parent_selection() {
    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..200 {
        let (a, b) = select_parents(32, 2.0, &mut rng);
        assert!(a < 32 && b < 32);
        assert_ne!(a, b);
    }
    assert_eq!(select_parents(1, 2.0, &mut rng), (0, 0));
}

/// Test a join problem above the threshold is planned by each operator
#[test]
fn test_plan_chain_with_geqo() {
    let cat = chain_catalog(CHAIN);
    let query = chain_query(CHAIN);
    for recombination in [Recombination::Edge, Recombination::Order] {
        let config = PlannerConfig::default().with_geqo_config(small_geqo(recombination, 5));
        let planned = plan(&query, &cat, &config).expect("plan");
        assert_eq!(scanned_relations(&planned.plan), (1..=CHAIN).collect::<Vec<_>>());
        assert_eq!(planned.plan.targetlist.len(), 2);
        verify_plan_refs(&planned.plan).expect("references resolve");
    }
}

/// Test the genetic search is deterministic for a fixed seed
#[test]
fn test_geqo_deterministic() {
    let cat = chain_catalog(CHAIN);
    let query = chain_query(CHAIN);
    let config = PlannerConfig::default().with_geqo_config(small_geqo(Recombination::Edge, 99));
    let first = plan(&query, &cat, &config).expect("plan");
    let second = plan(&query, &cat, &config).expect("plan");
    assert_eq!(first.plan.explain(), second.plan.explain());
    assert_eq!(first.plan.cost, second.plan.cost);
}

/// Test a lowered threshold routes small problems to the genetic search
#[test]
fn test_lowered_threshold() {
    let cat = chain_catalog(5);
    let query = chain_query(5);
    let exhaustive = PlannerConfig::default().with_geqo(false);
    let genetic = PlannerConfig::default()
        .with_geqo_threshold(3)
        .with_geqo_config(small_geqo(Recombination::Order, 1));

    let a = plan(&query, &cat, &exhaustive).expect("plan");
    let b = plan(&query, &cat, &genetic).expect("plan");
    assert_eq!(scanned_relations(&a.plan), vec![1, 2, 3, 4, 5]);
    assert_eq!(scanned_relations(&b.plan), vec![1, 2, 3, 4, 5]);
    verify_plan_refs(&b.plan).expect("references resolve");
}
