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

//! Plan Finalization Tests
//!
//! Tests reference resolution in finished plans, subquery planning into
//! init plans and correlated subplans, and executing a planned window node.

use relcore::catalog::oids::*;
use relcore::catalog::{ColumnInfo, RelationInfo};
use relcore::executor::window::WindowFuncDesc;
use relcore::executor::{collect_rows, VecSource};
use relcore::expr::{ParamKind, SubLink, SubLinkKind, Var, VarNo};
use relcore::optimizer::{
    verify_plan_refs, InitPlan, PlanKind, SortClause, TargetEntry, WindowClause,
};
use relcore::{
    plan, row, CatalogSnapshot, DataType, ExecutionContext, Expr, Plan, PlannerConfig, Query,
    Value, WindowAgg,
};

fn catalog() -> CatalogSnapshot {
    CatalogSnapshot::new()
        .with_relation(
            RelationInfo::new(1, "emp", 1000.0, 100_000.0)
                .column(ColumnInfo::new("id", DataType::Integer).with_ndistinct(100_000.0))
                .column(ColumnInfo::new("dept", DataType::Integer).with_ndistinct(50.0))
                .column(ColumnInfo::new("name", DataType::Text))
                .column(ColumnInfo::new("salary", DataType::Integer)),
        )
        .with_relation(
            RelationInfo::new(2, "dept", 10.0, 50.0)
                .column(ColumnInfo::new("id", DataType::Integer).with_ndistinct(50.0))
                .column(ColumnInfo::new("title", DataType::Text))
                .column(ColumnInfo::new("budget", DataType::Integer)),
        )
}

fn col(relid: u32, attno: i16, typ: DataType) -> Expr {
    Expr::var(relid, attno, typ)
}

fn eq(l: Expr, r: Expr) -> Expr {
    Expr::op(INT8_EQ_OP, vec![l, r], DataType::Boolean)
}

fn join_query() -> Query {
    Query::new()
        .relation(1)
        .relation(2)
        .target(TargetEntry::new(col(1, 3, DataType::Text), "name"))
        .target(TargetEntry::new(col(2, 2, DataType::Text), "title"))
        .target(TargetEntry::new(col(1, 4, DataType::Integer), "salary"))
        .filter(eq(col(1, 2, DataType::Integer), col(2, 1, DataType::Integer)))
}

fn is_join(plan: &Plan) -> bool {
    matches!(
        plan.kind,
        PlanKind::NestLoop { .. } | PlanKind::MergeJoin { .. } | PlanKind::HashJoin { .. }
    )
}

/// Every operator in `plan` has its implementing function resolved
fn assert_opfuncids_resolved(plan: &Plan) {
    plan.walk(&mut |node| {
        for expr in node.exprs() {
            expr.any_node(&mut |e| {
                if let Expr::Op(op) = e {
                    assert!(op.opfuncid.is_some(), "unresolved operator {}", op.opno);
                }
                false
            });
        }
    });
}

/// Test join nodes reference only their children's columns
#[test]
fn test_join_references_resolved() {
    let cat = catalog();
    for config in [
        PlannerConfig::default().with_nestloop(false).with_mergejoin(false),
        PlannerConfig::default().with_hashjoin(false).with_mergejoin(false),
        PlannerConfig::default().with_hashjoin(false).with_nestloop(false),
    ] {
        let planned = plan(&join_query(), &cat, &config).expect("plan");
        verify_plan_refs(&planned.plan).expect("references resolve");
        assert_opfuncids_resolved(&planned.plan);

        planned.plan.walk(&mut |node| {
            if !is_join(node) {
                return;
            }
            for expr in node.exprs() {
                for var in expr.pull_vars() {
                    assert!(
                        matches!(var.varno, VarNo::Outer | VarNo::Inner),
                        "{} references {:?}",
                        node.name(),
                        var.varno
                    );
                }
            }
        });

        let top = &planned.plan;
        assert!(is_join(top));
        let types: Vec<DataType> = top.targetlist.iter().map(|t| t.expr.type_of()).collect();
        assert_eq!(types, vec![DataType::Text, DataType::Text, DataType::Integer]);
        let names: Vec<&str> = top.targetlist.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["name", "title", "salary"]);
    }
}

/// Test hash join clauses carry the hash operator's function
#[test]
fn test_hash_clause_function() {
    let cat = catalog();
    let config = PlannerConfig::default().with_nestloop(false).with_mergejoin(false);
    let planned = plan(&join_query(), &cat, &config).expect("plan");
    match &planned.plan.kind {
        PlanKind::HashJoin {
            hash_clauses,
            hash_op,
            inner,
            ..
        } => {
            assert_eq!(*hash_op, INT8_EQ_OP);
            match &hash_clauses[0] {
                Expr::Op(op) => assert_eq!(op.opfuncid, Some(F_INT8EQ)),
                other => panic!("expected an operator, got {:?}", other),
            }
            assert!(matches!(inner.kind, PlanKind::Hash { .. }));
        }
        other => panic!("expected a hash join, got {:?}", other),
    }
}

/// Test a sort above a join reads the join's output columns
#[test]
fn test_sort_above_join() {
    let cat = catalog();
    let query = join_query().order_by(SortClause::new(2, INT8_LT_OP, INT8_EQ_OP));
    let planned = plan(&query, &cat, &PlannerConfig::default()).expect("plan");
    verify_plan_refs(&planned.plan).expect("references resolve");
    match &planned.plan.kind {
        PlanKind::Sort { child, keys } => {
            assert!(is_join(child));
            match &keys[0].expr {
                Expr::Var(var) => {
                    assert_eq!(var.varno, VarNo::Outer);
                    assert_eq!(var.typ, DataType::Integer);
                }
                other => panic!("expected a column, got {:?}", other),
            }
        }
        other => panic!("expected a sort, got {:?}", other),
    }
}

/// Test a planned window node runs over rows shaped like its input
#[test]
fn test_planned_window_executes() {
    let cat = catalog();
    let query = Query::new()
        .relation(2)
        .target(TargetEntry::new(col(2, 1, DataType::Integer), "id"))
        .target(TargetEntry::new(col(2, 3, DataType::Integer), "budget"))
        .window(
            WindowClause::new()
                .partition_by(SortClause::new(0, INT8_LT_OP, INT8_EQ_OP))
                .order_by(SortClause::new(1, INT8_LT_OP, INT8_EQ_OP))
                .function(WindowFuncDesc::pure(WIN_RANK, vec![], DataType::Integer))
                .function(WindowFuncDesc::aggregate(
                    AGG_SUM_INT8,
                    vec![col(2, 3, DataType::Integer)],
                    DataType::Integer,
                )),
        );
    let planned = plan(&query, &cat, &PlannerConfig::default()).expect("plan");
    verify_plan_refs(&planned.plan).expect("references resolve");
    let spec = match &planned.plan.kind {
        PlanKind::WindowAgg { spec, .. } => spec.clone(),
        other => panic!("expected a window node, got {:?}", other),
    };
    match &spec.functions[1].args[0] {
        Expr::Var(var) => {
            assert_eq!(var.varno, VarNo::Outer);
            assert_eq!(var.attno, 2);
        }
        other => panic!("expected a column, got {:?}", other),
    }

    let input = vec![row![1, 10], row![1, 20], row![1, 20], row![2, 5]];
    let mut op = WindowAgg::new(spec, Box::new(VecSource::new(input)), ExecutionContext::new())
        .expect("Failed to build window operator");
    let rows = collect_rows(&mut op).expect("Failed to run window operator");
    let ranks: Vec<Value> = rows.iter().map(|r| r.get(2).cloned().unwrap_or_default()).collect();
    let sums: Vec<Value> = rows.iter().map(|r| r.get(3).cloned().unwrap_or_default()).collect();
    assert_eq!(ranks, [1, 2, 2, 1].map(Value::integer).to_vec());
    assert_eq!(sums, [10, 50, 50, 5].map(Value::integer).to_vec());
}

/// Test an uncorrelated scalar subquery becomes an init plan
#[test]
fn test_uncorrelated_sublink_init_plan() {
    let cat = catalog();
    let subquery = Query::new()
        .relation(2)
        .target(TargetEntry::new(col(2, 3, DataType::Integer), "budget"))
        .filter(eq(col(2, 1, DataType::Integer), Expr::constant(Value::integer(7))));
    let query = Query::new()
        .relation(1)
        .target(TargetEntry::new(col(1, 3, DataType::Text), "name"))
        .filter(Expr::op(
            INT8_GT_OP,
            vec![
                col(1, 4, DataType::Integer),
                Expr::SubLink(SubLink {
                    kind: SubLinkKind::Expr,
                    testexpr: None,
                    subquery: Box::new(subquery),
                    typ: DataType::Integer,
                }),
            ],
            DataType::Boolean,
        ));
    let planned = plan(&query, &cat, &PlannerConfig::default()).expect("plan");

    assert_eq!(planned.subplans.len(), 1);
    assert_eq!(planned.param_types, vec![DataType::Integer]);
    assert_eq!(planned.plan.set_param, vec![0]);
    assert_eq!(
        planned.plan.init_plans,
        vec![InitPlan {
            plan_id: 0,
            set_param: vec![0]
        }]
    );
    assert!(planned.plan.ext_param.is_empty());

    let mut reads_param = false;
    planned.plan.walk(&mut |node| {
        for expr in node.exprs() {
            reads_param |= expr.any_node(&mut |e| {
                matches!(e, Expr::Param(p) if p.kind == ParamKind::Exec && p.id == 0)
            });
        }
    });
    assert!(reads_param);
    assert!(planned.explain().contains("SubPlan 0"));
}

/// Test a correlated EXISTS becomes a subplan fed by the outer row
#[test]
fn test_correlated_exists_subplan() {
    let cat = catalog();
    let outer_dept = Expr::Var(Var {
        levelsup: 1,
        ..Var::new(1, 2, DataType::Integer)
    });
    let subquery = Query::new()
        .relation(2)
        .target(TargetEntry::new(col(2, 1, DataType::Integer), "id"))
        .filter(eq(col(2, 1, DataType::Integer), outer_dept));
    let query = Query::new()
        .relation(1)
        .target(TargetEntry::new(col(1, 3, DataType::Text), "name"))
        .filter(Expr::SubLink(SubLink {
            kind: SubLinkKind::Exists,
            testexpr: None,
            subquery: Box::new(subquery),
            typ: DataType::Boolean,
        }));
    let planned = plan(&query, &cat, &PlannerConfig::default()).expect("plan");

    assert_eq!(planned.subplans.len(), 1);
    assert!(planned.plan.ext_param.is_empty());
    assert!(planned.plan.init_plans.is_empty());
    assert_eq!(planned.subplans[0].ext_param, vec![0]);

    let mut found = None;
    planned.plan.walk(&mut |node| {
        for expr in node.exprs() {
            expr.any_node(&mut |e| {
                if let Expr::SubPlan(sp) = e {
                    found = Some(sp.clone());
                }
                false
            });
        }
    });
    let subplan = found.expect("subplan in the outer plan");
    assert_eq!(subplan.plan_id, 0);
    assert_eq!(subplan.kind, SubLinkKind::Exists);
    assert_eq!(subplan.par_param, vec![0]);
    assert_eq!(subplan.args, vec![col(1, 2, DataType::Integer)]);
}

/// Test a correlated reference past the outermost level is rejected
#[test]
fn test_dangling_outer_reference() {
    let cat = catalog();
    let query = Query::new()
        .relation(1)
        .target(TargetEntry::new(col(1, 3, DataType::Text), "name"))
        .filter(eq(
            col(1, 2, DataType::Integer),
            Expr::Var(Var {
                levelsup: 1,
                ..Var::new(2, 1, DataType::Integer)
            }),
        ));
    assert!(plan(&query, &cat, &PlannerConfig::default()).is_err());
}
