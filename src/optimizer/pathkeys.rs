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

//! Path ordering descriptors
//!
//! A path's sort order is described twice: by path keys (which columns,
//! each key a set of columns known equal) and by the operators that
//! produced the order. Two paths are only comparable by order when both
//! descriptions agree on which one is at least as strong.

use crate::core::Oid;
use crate::expr::Var;

use super::clauses::MergeOrder;

/// Columns known to be equal that a path is sorted by at one position
pub type PathKey = Vec<Var>;

/// Operators that produced a path's order
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PathOrder {
    #[default]
    Unordered,
    /// One less-than operator per sort position
    SortOps(Vec<Oid>),
    /// Output of a merge join, ordered by the outer key
    Merge(MergeOrder),
}

impl PathOrder {
    fn sortops(&self) -> Option<Vec<Oid>> {
        match self {
            PathOrder::Unordered => None,
            PathOrder::SortOps(ops) => Some(ops.clone()),
            PathOrder::Merge(m) => Some(vec![m.left_sortop]),
        }
    }

    /// Sort operator at the first position
    pub fn leading_sortop(&self) -> Option<Oid> {
        self.sortops().and_then(|ops| ops.first().copied())
    }

    pub fn is_ordered(&self) -> bool {
        !matches!(self, PathOrder::Unordered)
    }
}

/// Outcome of comparing the order of a new path against an old one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyComparison {
    Equal,
    /// New path's order implies the old path's
    NewStronger,
    /// Old path's order implies the new path's
    OldStronger,
    Incomparable,
}

impl KeyComparison {
    /// Combine the verdicts of two independent order descriptions
    pub fn and(self, other: KeyComparison) -> KeyComparison {
        use KeyComparison::*;
        match (self, other) {
            (Equal, x) | (x, Equal) => x,
            (a, b) if a == b => a,
            _ => Incomparable,
        }
    }
}

fn key_contains(outer: &PathKey, inner: &PathKey) -> bool {
    inner.iter().all(|v| outer.iter().any(|o| o.same_column(v)))
}

/// Compare path keys of a new path against an old one
///
/// A longer key list with a matching prefix is stronger, as is a key that
/// is a superset of the other's equivalence class. No keys versus some keys
/// is incomparable.
pub fn compare_pathkeys(new: &[PathKey], old: &[PathKey]) -> KeyComparison {
    use KeyComparison::*;
    if new.is_empty() && old.is_empty() {
        return Equal;
    }
    if new.is_empty() || old.is_empty() {
        return Incomparable;
    }
    let mut result = Equal;
    for (n, o) in new.iter().zip(old.iter()) {
        let (n_in_o, o_in_n) = (key_contains(o, n), key_contains(n, o));
        let step = match (n_in_o, o_in_n) {
            (true, true) => Equal,
            (false, true) => NewStronger,
            (true, false) => OldStronger,
            (false, false) => return Incomparable,
        };
        result = result.and(step);
        if result == Incomparable {
            return Incomparable;
        }
    }
    let length = match new.len().cmp(&old.len()) {
        std::cmp::Ordering::Greater => NewStronger,
        std::cmp::Ordering::Less => OldStronger,
        std::cmp::Ordering::Equal => Equal,
    };
    result.and(length)
}

/// Compare ordering descriptors of a new path against an old one
pub fn compare_ordering(new: &PathOrder, old: &PathOrder) -> KeyComparison {
    use KeyComparison::*;
    match (new.sortops(), old.sortops()) {
        (None, None) => Equal,
        (Some(n), Some(o)) => {
            if n == o {
                Equal
            } else if n.starts_with(&o) {
                NewStronger
            } else if o.starts_with(&n) {
                OldStronger
            } else {
                Incomparable
            }
        }
        _ => Incomparable,
    }
}

/// Whether the keys begin with the given columns in order
pub fn pathkeys_satisfy(keys: &[PathKey], wanted: &[Var]) -> bool {
    wanted.len() <= keys.len()
        && wanted
            .iter()
            .zip(keys)
            .all(|(w, key)| key.iter().any(|v| v.same_column(w)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DataType;

    fn v(rel: u32, att: i16) -> Var {
        Var::new(rel, att, DataType::Integer)
    }

    #[test]
    fn test_prefix_extension_is_stronger() {
        let a = vec![vec![v(1, 1)]];
        let ab = vec![vec![v(1, 1)], vec![v(1, 2)]];
        assert_eq!(compare_pathkeys(&ab, &a), KeyComparison::NewStronger);
        assert_eq!(compare_pathkeys(&a, &ab), KeyComparison::OldStronger);
        assert_eq!(compare_pathkeys(&a, &a), KeyComparison::Equal);
    }

    #[test]
    fn test_equivalence_superset_is_stronger() {
        let narrow = vec![vec![v(1, 1)]];
        let wide = vec![vec![v(1, 1), v(2, 1)]];
        assert_eq!(compare_pathkeys(&wide, &narrow), KeyComparison::NewStronger);
    }

    #[test]
    fn test_unordered_versus_ordered_incomparable() {
        let a = vec![vec![v(1, 1)]];
        assert_eq!(compare_pathkeys(&[], &a), KeyComparison::Incomparable);
        assert_eq!(
            compare_ordering(&PathOrder::Unordered, &PathOrder::SortOps(vec![412])),
            KeyComparison::Incomparable
        );
        assert_eq!(
            compare_pathkeys(&[vec![v(1, 2)]], &a),
            KeyComparison::Incomparable
        );
    }

    #[test]
    fn test_pathkeys_satisfy() {
        let keys = vec![vec![v(1, 1), v(2, 1)], vec![v(1, 2)]];
        assert!(pathkeys_satisfy(&keys, &[v(2, 1)]));
        assert!(pathkeys_satisfy(&keys, &[v(1, 1), v(1, 2)]));
        assert!(!pathkeys_satisfy(&keys, &[v(1, 2)]));
    }
}
