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

//! Subquery planning and parameter assignment
//!
//! Nested subqueries are planned with an explicit stack of query levels.
//! A column of an enclosing level becomes an executor parameter; the
//! parameter table records which level and column each id stands for and
//! is the only place ids are handed out.
//!
//! A sublink whose plan reads nothing from the level that contains it is
//! turned into an init plan when it yields a single value (`EXPR` and
//! `EXISTS`): it runs once and its result is read through a parameter.
//! Every other sublink becomes a [`SubPlan`] evaluated per row, with the
//! enclosing row's columns passed in as arguments.

use std::collections::BTreeSet;

use tracing::debug;

use crate::core::{DataType, Error, Result};
use crate::expr::{Expr, ParamKind, SubLinkKind, SubPlan, Var};
use crate::optimizer::query::Query;

use super::plan::{InitPlan, Plan};

#[derive(Debug, Clone)]
struct ParamSlot {
    /// Query level (1 = outermost) that supplies the value
    level: usize,
    /// Correlated column, or `None` for an init plan result
    var: Option<Var>,
    typ: DataType,
}

#[derive(Debug, Default)]
struct Frame {
    init_plans: Vec<InitPlan>,
}

/// Planning state shared by all query levels of one statement
#[derive(Debug, Default)]
pub struct SubqueryContext {
    frames: Vec<Frame>,
    params: Vec<ParamSlot>,
    subplans: Vec<Plan>,
}

impl SubqueryContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current query level; 0 before the outermost query is entered
    pub fn level(&self) -> usize {
        self.frames.len()
    }

    pub fn push_level(&mut self) {
        self.frames.push(Frame::default());
    }

    /// Leave the current level, returning the init plans it collected
    pub fn pop_level(&mut self) -> Vec<InitPlan> {
        self.frames.pop().map(|f| f.init_plans).unwrap_or_default()
    }

    /// Type of every parameter, indexed by id
    pub fn param_types(&self) -> Vec<DataType> {
        self.params.iter().map(|p| p.typ).collect()
    }

    pub fn subplan(&self, plan_id: usize) -> Option<&Plan> {
        self.subplans.get(plan_id)
    }

    pub fn into_subplans(self) -> Vec<Plan> {
        self.subplans
    }

    fn param_for_var(&mut self, var: &Var) -> Result<u32> {
        let levelsup = var.levelsup as usize;
        if levelsup >= self.level() {
            return Err(Error::invalid_argument(format!(
                "column {}.{} refers {} levels up from level {}",
                var.orig_relid,
                var.orig_attno,
                levelsup,
                self.level()
            )));
        }
        let level = self.level() - levelsup;
        let local = Var {
            levelsup: 0,
            ..var.clone()
        };
        let existing = self.params.iter().position(|p| {
            p.level == level && p.var.as_ref().is_some_and(|v| v.same_column(&local))
        });
        match existing {
            Some(id) => Ok(id as u32),
            None => {
                self.params.push(ParamSlot {
                    level,
                    typ: local.typ,
                    var: Some(local),
                });
                Ok((self.params.len() - 1) as u32)
            }
        }
    }

    fn new_result_param(&mut self, typ: DataType) -> u32 {
        self.params.push(ParamSlot {
            level: self.level(),
            var: None,
            typ,
        });
        (self.params.len() - 1) as u32
    }

    /// Replace columns of enclosing levels by executor parameters
    pub fn replace_correlation_vars(&mut self, expr: Expr) -> Result<Expr> {
        expr.replace_vars(&mut |var| {
            if var.levelsup == 0 {
                return Ok(None);
            }
            let id = self.param_for_var(var)?;
            Ok(Some(Expr::param(ParamKind::Exec, id, var.typ)))
        })
    }

    /// Plan every sublink in `expr` and replace it by its plan reference
    ///
    /// `plan_subquery` plans one subquery one level below the current one.
    pub fn process_sublinks(
        &mut self,
        expr: Expr,
        plan_subquery: &mut dyn FnMut(&mut SubqueryContext, &Query) -> Result<Plan>,
    ) -> Result<Expr> {
        expr.transform_up(&mut |e| match e {
            Expr::SubLink(link) => {
                let plan = plan_subquery(self, &link.subquery)?;
                let level = self.level();
                let par_param: Vec<u32> = plan
                    .ext_param
                    .iter()
                    .copied()
                    .filter(|id| self.params.get(*id as usize).is_some_and(|p| p.level == level))
                    .collect();
                let plan_id = self.subplans.len();
                self.subplans.push(plan);

                let single_value = matches!(link.kind, SubLinkKind::Expr | SubLinkKind::Exists);
                if par_param.is_empty() && single_value {
                    let id = self.new_result_param(link.typ);
                    let frame = self
                        .frames
                        .last_mut()
                        .ok_or_else(|| Error::invariant("sublink outside any query level"))?;
                    frame.init_plans.push(InitPlan {
                        plan_id,
                        set_param: vec![id],
                    });
                    debug!(plan_id, param = id, "sublink planned as init plan");
                    return Ok(Expr::param(ParamKind::Exec, id, link.typ));
                }

                let mut args = Vec::with_capacity(par_param.len());
                for id in &par_param {
                    let var = self
                        .params
                        .get(*id as usize)
                        .and_then(|p| p.var.clone())
                        .ok_or_else(|| Error::invariant(format!("param {} has no column", id)))?;
                    args.push(Expr::Var(var));
                }
                debug!(plan_id, params = ?par_param, "sublink planned as subplan");
                Ok(Expr::SubPlan(SubPlan {
                    plan_id,
                    kind: link.kind,
                    testexpr: link.testexpr,
                    par_param,
                    args,
                    typ: link.typ,
                }))
            }
            other => Ok(other),
        })
    }

    /// Compute the parameters each node of `plan` reads from outside its subtree
    ///
    /// A node's set is what its expressions, subplans, init plans and
    /// children read, less what its own init plans set.
    pub fn finalize_plan(&self, plan: &mut Plan) -> Vec<u32> {
        let mut ext: BTreeSet<u32> = BTreeSet::new();
        for child in plan.children_mut() {
            ext.extend(self.finalize_plan(child));
        }
        for expr in plan.exprs() {
            self.collect_params(expr, &mut ext);
        }
        for init in &plan.init_plans {
            if let Some(sub) = self.subplans.get(init.plan_id) {
                ext.extend(sub.ext_param.iter().copied());
            }
        }
        for id in &plan.set_param {
            ext.remove(id);
        }
        plan.ext_param = ext.into_iter().collect();
        plan.ext_param.clone()
    }

    fn collect_params(&self, expr: &Expr, out: &mut BTreeSet<u32>) {
        expr.any_node(&mut |e| {
            match e {
                Expr::Param(p) if p.kind == ParamKind::Exec => {
                    out.insert(p.id);
                }
                Expr::SubPlan(sub) => {
                    if let Some(plan) = self.subplans.get(sub.plan_id) {
                        out.extend(
                            plan.ext_param
                                .iter()
                                .copied()
                                .filter(|id| !sub.par_param.contains(id)),
                        );
                    }
                }
                _ => {}
            }
            false
        });
    }
}
