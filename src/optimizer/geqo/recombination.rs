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

//! Recombination operators
//!
//! Edge recombination keeps as many parent adjacencies as possible, which
//! suits join orders where neighboring relations share clauses. Order
//! crossover copies a slice of one parent and fills the rest in the other
//! parent's order.

use rand::Rng;

/// Neighbors of one gene across both parents
#[derive(Debug, Clone, Default)]
struct Edge {
    /// (gene, present in both parents)
    neighbors: Vec<(usize, bool)>,
}

impl Edge {
    fn add(&mut self, gene: usize) {
        match self.neighbors.iter_mut().find(|(g, _)| *g == gene) {
            Some(entry) => entry.1 = true,
            None => self.neighbors.push((gene, false)),
        }
    }

    fn remove(&mut self, gene: usize) {
        self.neighbors.retain(|(g, _)| *g != gene);
    }
}

/// Adjacency table of the union of both parent tours (tours are cyclic)
fn edge_table(mom: &[usize], dad: &[usize]) -> Vec<Edge> {
    let n = mom.len();
    let mut table = vec![Edge::default(); n];
    for tour in [mom, dad] {
        for i in 0..n {
            let (a, b) = (tour[i], tour[(i + 1) % n]);
            if a != b {
                table[a].add(b);
                table[b].add(a);
            }
        }
    }
    table
}

/// Next gene from `edge`: a shared edge if any, else the neighbor with the
/// fewest remaining edges (ties broken at random)
fn pick_neighbor<R: Rng>(table: &[Edge], edge: &Edge, rng: &mut R) -> Option<usize> {
    if let Some((gene, _)) = edge.neighbors.iter().find(|(_, shared)| *shared) {
        return Some(*gene);
    }
    let fewest = edge
        .neighbors
        .iter()
        .map(|(g, _)| table[*g].neighbors.len())
        .min()?;
    let candidates: Vec<usize> = edge
        .neighbors
        .iter()
        .map(|(g, _)| *g)
        .filter(|g| table[*g].neighbors.len() == fewest)
        .collect();
    Some(candidates[rng.gen_range(0..candidates.len())])
}

/// Edge recombination crossover
///
/// Returns the child and the number of edge failures (steps where the
/// current gene had no unused neighbor left).
pub fn edge_recombination<R: Rng>(mom: &[usize], dad: &[usize], rng: &mut R) -> (Vec<usize>, usize) {
    let n = mom.len();
    if n == 0 {
        return (Vec::new(), 0);
    }
    let mut table = edge_table(mom, dad);
    let mut used = vec![false; n];
    let mut child = Vec::with_capacity(n);
    let mut failures = 0;

    let mut current = rng.gen_range(0..n);
    loop {
        child.push(current);
        used[current] = true;
        if child.len() == n {
            break;
        }
        let neighbors: Vec<usize> = table[current].neighbors.iter().map(|(g, _)| *g).collect();
        for g in neighbors {
            table[g].remove(current);
        }
        let edge = table[current].clone();
        current = match pick_neighbor(&table, &edge, rng) {
            Some(next) => next,
            None => {
                failures += 1;
                let remaining: Vec<usize> = (0..n).filter(|g| !used[*g]).collect();
                remaining[rng.gen_range(0..remaining.len())]
            }
        };
    }
    (child, failures)
}

/// Order crossover (OX1)
///
/// The child takes `mom[left..=right]` in place and the remaining genes in
/// `dad`'s order, starting after the slice and wrapping around.
pub fn order_crossover<R: Rng>(mom: &[usize], dad: &[usize], rng: &mut R) -> Vec<usize> {
    let n = mom.len();
    if n < 2 {
        return mom.to_vec();
    }
    let mut left = rng.gen_range(0..n);
    let mut right = rng.gen_range(0..n);
    if left > right {
        std::mem::swap(&mut left, &mut right);
    }

    let mut child = vec![usize::MAX; n];
    let mut used = vec![false; n];
    for i in left..=right {
        child[i] = mom[i];
        used[mom[i]] = true;
    }
    let mut pos = (right + 1) % n;
    for k in 0..n {
        let gene = dad[(right + 1 + k) % n];
        if used[gene] {
            continue;
        }
        child[pos] = gene;
        used[gene] = true;
        pos = (pos + 1) % n;
    }
    child
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn is_permutation(tour: &[usize], n: usize) -> bool {
        let mut sorted = tour.to_vec();
        sorted.sort_unstable();
        sorted == (0..n).collect::<Vec<_>>()
    }

    #[test]
    fn test_edge_recombination_produces_permutation() {
        let mut rng = StdRng::seed_from_u64(11);
        let mom = vec![0, 1, 2, 3, 4, 5, 6, 7];
        let dad = vec![3, 7, 0, 5, 1, 6, 2, 4];
        for _ in 0..50 {
            let (child, _) = edge_recombination(&mom, &dad, &mut rng);
            assert!(is_permutation(&child, 8));
        }
    }

    #[test]
    fn test_identical_parents_reproduce_cycle() {
        let mut rng = StdRng::seed_from_u64(5);
        let tour = vec![2, 0, 3, 1, 4];
        let (child, failures) = edge_recombination(&tour, &tour, &mut rng);
        assert_eq!(failures, 0);
        // Every adjacency of the child is an adjacency of the cyclic parent
        for w in child.windows(2) {
            let i = tour.iter().position(|g| *g == w[0]).unwrap();
            let (prev, next) = (tour[(i + 4) % 5], tour[(i + 1) % 5]);
            assert!(w[1] == prev || w[1] == next);
        }
    }

    #[test]
    fn test_order_crossover_keeps_mom_slice() {
        let mut rng = StdRng::seed_from_u64(2);
        let mom = vec![0, 1, 2, 3, 4, 5];
        let dad = vec![5, 4, 3, 2, 1, 0];
        for _ in 0..50 {
            let child = order_crossover(&mom, &dad, &mut rng);
            assert!(is_permutation(&child, 6));
        }
    }
}
