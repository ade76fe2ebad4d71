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

//! Genetic join order search
//!
//! Used instead of the exhaustive search when a query joins many
//! relations. A join order is a permutation of the base relations; the
//! pool keeps the cheapest orders found so far and every generation breeds
//! one child from two rank-biased parents.

mod eval;
mod pool;
mod recombination;
mod selection;

pub use eval::{geqo_eval, gimme_tree};
pub use pool::{Chromosome, Pool};
pub use recombination::{edge_recombination, order_crossover};
pub use selection::{linear_rank, select_parents};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use crate::core::{Error, Result};

use super::config::Recombination;
use super::relnode::{PlannerContext, RelOptInfo};

/// Join the base relations in the best order the genetic search finds
pub fn geqo(base_rels: &[RelOptInfo], ctx: &PlannerContext<'_>) -> Result<RelOptInfo> {
    let config = &ctx.config.geqo;
    let genes = base_rels.len();
    let pool_size = config.pool_size_for(genes);
    let generations = config.generations_for(pool_size);
    let mut rng = StdRng::seed_from_u64(config.random_seed);

    debug!(
        relations = genes,
        pool_size,
        generations,
        bias = config.selection_bias,
        "genetic join search"
    );

    let mut eval = |tour: &[usize]| geqo_eval(tour, base_rels, ctx);
    let mut pool = Pool::random(pool_size, genes, &mut rng, &mut eval)?;
    let mut edge_failures = 0;

    for generation in 0..generations {
        let (m, d) = select_parents(pool.len(), config.selection_bias, &mut rng);
        let (Some(mom), Some(dad)) = (pool.get(m), pool.get(d)) else {
            break;
        };
        let child = match config.recombination {
            Recombination::Edge => {
                let (tour, failures) = edge_recombination(&mom.tour, &dad.tour, &mut rng);
                edge_failures += failures;
                tour
            }
            Recombination::Order => order_crossover(&mom.tour, &dad.tour, &mut rng),
        };
        let worth = eval(&child)?;
        pool.spread(Chromosome { tour: child, worth });

        if generation % 50 == 0 || generation + 1 == generations {
            let (best, worst, avg) = pool.stats();
            debug!(generation, best, worst, avg, "genetic generation");
        }
    }

    if config.recombination == Recombination::Edge {
        debug!(edge_failures, generations, "edge recombination finished");
    }

    let best = pool
        .best()
        .ok_or_else(|| Error::unplannable("genetic join search produced no tour"))?;
    gimme_tree(&best.tour, base_rels, ctx)
}
