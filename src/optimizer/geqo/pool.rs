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

//! Pool of tours kept sorted by fitness

use rand::seq::SliceRandom;
use rand::Rng;

use crate::core::Result;

/// A join order and its cost
#[derive(Debug, Clone, PartialEq)]
pub struct Chromosome {
    /// Permutation of base relation indexes
    pub tour: Vec<usize>,
    /// Cost of the cheapest plan for the tour; lower is better
    pub worth: f64,
}

#[derive(Debug, Clone)]
pub struct Pool {
    /// Best first
    chromosomes: Vec<Chromosome>,
}

impl Pool {
    /// Random tours evaluated by `eval`
    pub fn random<R: Rng>(
        size: usize,
        genes: usize,
        rng: &mut R,
        eval: &mut dyn FnMut(&[usize]) -> Result<f64>,
    ) -> Result<Self> {
        let mut chromosomes = Vec::with_capacity(size);
        for _ in 0..size {
            let mut tour: Vec<usize> = (0..genes).collect();
            tour.shuffle(rng);
            let worth = eval(&tour)?;
            chromosomes.push(Chromosome { tour, worth });
        }
        chromosomes.sort_by(|a, b| a.worth.total_cmp(&b.worth));
        Ok(Self { chromosomes })
    }

    pub fn len(&self) -> usize {
        self.chromosomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chromosomes.is_empty()
    }

    pub fn get(&self, rank: usize) -> Option<&Chromosome> {
        self.chromosomes.get(rank)
    }

    pub fn best(&self) -> Option<&Chromosome> {
        self.chromosomes.first()
    }

    pub fn worst(&self) -> Option<&Chromosome> {
        self.chromosomes.last()
    }

    /// Insert a child in rank order, displacing the worst tour
    ///
    /// A child no better than the worst tour is dropped. Returns whether
    /// the child was kept.
    pub fn spread(&mut self, child: Chromosome) -> bool {
        match self.worst() {
            Some(worst) if child.worth >= worst.worth => return false,
            None => return false,
            _ => {}
        }
        let pos = self
            .chromosomes
            .partition_point(|c| c.worth <= child.worth);
        self.chromosomes.insert(pos, child);
        self.chromosomes.pop();
        true
    }

    /// Worth of the best, worst and average tour
    pub fn stats(&self) -> (f64, f64, f64) {
        let best = self.best().map_or(0.0, |c| c.worth);
        let worst = self.worst().map_or(0.0, |c| c.worth);
        let avg = if self.is_empty() {
            0.0
        } else {
            self.chromosomes.iter().map(|c| c.worth).sum::<f64>() / self.len() as f64
        };
        (best, worst, avg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn pool() -> Pool {
        let mut rng = StdRng::seed_from_u64(7);
        let mut eval = |tour: &[usize]| Ok(tour[0] as f64 * 10.0 + tour[1] as f64);
        Pool::random(16, 5, &mut rng, &mut eval).unwrap()
    }

    #[test]
    fn test_sorted_and_permutations() {
        let p = pool();
        assert_eq!(p.len(), 16);
        for i in 1..p.len() {
            assert!(p.get(i - 1).unwrap().worth <= p.get(i).unwrap().worth);
        }
        let mut genes = p.best().unwrap().tour.clone();
        genes.sort_unstable();
        assert_eq!(genes, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_spread_displaces_worst() {
        let mut p = pool();
        let worst = p.worst().unwrap().worth;
        assert!(!p.spread(Chromosome {
            tour: vec![4, 3, 2, 1, 0],
            worth: worst + 1.0,
        }));
        assert!(p.spread(Chromosome {
            tour: vec![0, 1, 2, 3, 4],
            worth: -1.0,
        }));
        assert_eq!(p.len(), 16);
        assert_eq!(p.best().unwrap().worth, -1.0);
    }
}
