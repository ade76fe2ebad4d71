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

//! Relation id sets
//!
//! A small bitmap keyed by relation id. Sets of up to 64 relations live
//! inline without heap allocation.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::core::RelId;

const WORD_BITS: u32 = 64;

/// Set of relation ids
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Relids {
    words: SmallVec<[u64; 1]>,
}

impl Relids {
    /// Empty set
    pub fn empty() -> Self {
        Self::default()
    }

    /// Set with a single member
    pub fn singleton(relid: RelId) -> Self {
        let mut set = Self::empty();
        set.insert(relid);
        set
    }

    /// Add a member
    pub fn insert(&mut self, relid: RelId) {
        let word = (relid / WORD_BITS) as usize;
        if self.words.len() <= word {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1u64 << (relid % WORD_BITS);
    }

    /// Remove a member
    pub fn remove(&mut self, relid: RelId) {
        let word = (relid / WORD_BITS) as usize;
        if let Some(w) = self.words.get_mut(word) {
            *w &= !(1u64 << (relid % WORD_BITS));
        }
        self.normalize();
    }

    pub fn contains(&self, relid: RelId) -> bool {
        let word = (relid / WORD_BITS) as usize;
        self.words
            .get(word)
            .map(|w| w & (1u64 << (relid % WORD_BITS)) != 0)
            .unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// The only member, if the set has exactly one
    pub fn singleton_member(&self) -> Option<RelId> {
        if self.len() == 1 {
            self.iter().next()
        } else {
            None
        }
    }

    pub fn union(&self, other: &Relids) -> Relids {
        let len = self.words.len().max(other.words.len());
        let mut words = SmallVec::with_capacity(len);
        for i in 0..len {
            let a = self.words.get(i).copied().unwrap_or(0);
            let b = other.words.get(i).copied().unwrap_or(0);
            words.push(a | b);
        }
        Relids { words }
    }

    pub fn intersection(&self, other: &Relids) -> Relids {
        let len = self.words.len().min(other.words.len());
        let mut result = Relids {
            words: (0..len).map(|i| self.words[i] & other.words[i]).collect(),
        };
        result.normalize();
        result
    }

    pub fn difference(&self, other: &Relids) -> Relids {
        let mut result = Relids {
            words: self
                .words
                .iter()
                .enumerate()
                .map(|(i, w)| w & !other.words.get(i).copied().unwrap_or(0))
                .collect(),
        };
        result.normalize();
        result
    }

    /// True when the sets share at least one member
    pub fn overlaps(&self, other: &Relids) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .any(|(a, b)| a & b != 0)
    }

    /// True when every member of `self` is in `other`
    pub fn is_subset(&self, other: &Relids) -> bool {
        self.words
            .iter()
            .enumerate()
            .all(|(i, w)| w & !other.words.get(i).copied().unwrap_or(0) == 0)
    }

    /// Members in ascending order
    pub fn iter(&self) -> impl Iterator<Item = RelId> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &w)| {
            (0..WORD_BITS)
                .filter(move |bit| w & (1u64 << bit) != 0)
                .map(move |bit| i as u32 * WORD_BITS + bit)
        })
    }

    fn normalize(&mut self) {
        while let Some(&0) = self.words.last() {
            self.words.pop();
        }
    }
}

impl PartialEq for Relids {
    fn eq(&self, other: &Self) -> bool {
        let len = self.words.len().max(other.words.len());
        (0..len).all(|i| {
            self.words.get(i).copied().unwrap_or(0) == other.words.get(i).copied().unwrap_or(0)
        })
    }
}

impl Eq for Relids {}

impl std::hash::Hash for Relids {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        let mut len = self.words.len();
        while len > 0 && self.words[len - 1] == 0 {
            len -= 1;
        }
        self.words[..len].hash(state);
    }
}

impl FromIterator<RelId> for Relids {
    fn from_iter<I: IntoIterator<Item = RelId>>(iter: I) -> Self {
        let mut set = Relids::empty();
        for relid in iter {
            set.insert(relid);
        }
        set
    }
}

impl fmt::Debug for Relids {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for Relids {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, relid) in self.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", relid)?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_operations() {
        let a: Relids = [1, 2, 3].into_iter().collect();
        let b: Relids = [3, 70].into_iter().collect();
        assert_eq!(a.union(&b).len(), 4);
        assert_eq!(a.intersection(&b), Relids::singleton(3));
        assert_eq!(a.difference(&b).iter().collect::<Vec<_>>(), vec![1, 2]);
        assert!(a.overlaps(&b));
        assert!(Relids::singleton(2).is_subset(&a));
        assert!(!b.is_subset(&a));
    }

    #[test]
    fn test_equality_ignores_trailing_words() {
        let mut a = Relids::singleton(100);
        a.remove(100);
        assert!(a.is_empty());
        assert_eq!(a, Relids::empty());
        a.insert(1);
        assert_eq!(a.singleton_member(), Some(1));
        assert_eq!(a.to_string(), "(1)");
    }
}
