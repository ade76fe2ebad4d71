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

//! Rank-biased linear selection of parents

use rand::Rng;

/// Rank in `[0, pool_size)` drawn with a linear bias towards rank 0
///
/// With bias `b` the best tour is picked `b` times as often as the median.
pub fn linear_rank<R: Rng>(pool_size: usize, bias: f64, rng: &mut R) -> usize {
    let max = pool_size as f64;
    if pool_size <= 1 || bias <= 1.0 {
        return 0;
    }
    loop {
        let r: f64 = rng.gen();
        let disc = bias * bias - 4.0 * (bias - 1.0) * r;
        let root = if disc > 0.0 { disc.sqrt() } else { 0.0 };
        let index = max * (bias - root) / 2.0 / (bias - 1.0);
        if index >= 0.0 && index < max {
            return index as usize;
        }
    }
}

/// Two distinct parent ranks
pub fn select_parents<R: Rng>(pool_size: usize, bias: f64, rng: &mut R) -> (usize, usize) {
    let first = linear_rank(pool_size, bias, rng);
    if pool_size < 2 {
        return (first, first);
    }
    let mut second = linear_rank(pool_size, bias, rng);
    while second == first {
        second = linear_rank(pool_size, bias, rng);
    }
    (first, second)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_bias_prefers_low_ranks() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut low = 0;
        let mut high = 0;
        for _ in 0..10_000 {
            let r = linear_rank(100, 2.0, &mut rng);
            assert!(r < 100);
            if r < 50 {
                low += 1;
            } else {
                high += 1;
            }
        }
        assert!(low > high * 2);
    }

    #[test]
    fn test_parents_distinct() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..100 {
            let (a, b) = select_parents(4, 1.5, &mut rng);
            assert_ne!(a, b);
        }
    }
}
