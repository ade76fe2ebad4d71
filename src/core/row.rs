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

//! Row type - a fixed-shape tuple of column values

use std::fmt;
use std::ops::{Deref, Index};
use std::sync::Arc;

use super::error::{Error, Result};
use super::value::Value;

/// Internal storage for Row - either owned Vec or shared Arc
#[derive(Debug, Clone)]
enum RowStorage {
    /// Owned storage - supports mutation
    Owned(Vec<Value>),
    /// Shared storage - O(1) clone, copy-on-write for mutation
    Shared(Arc<[Value]>),
}

impl Default for RowStorage {
    fn default() -> Self {
        RowStorage::Owned(Vec::new())
    }
}

impl PartialEq for RowStorage {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl RowStorage {
    #[inline]
    fn as_slice(&self) -> &[Value] {
        match self {
            RowStorage::Owned(v) => v,
            RowStorage::Shared(a) => a,
        }
    }

    /// Get mutable access, converting to owned if necessary (copy-on-write)
    #[inline]
    fn make_mut(&mut self) -> &mut Vec<Value> {
        if let RowStorage::Shared(arc) = self {
            *self = RowStorage::Owned(arc.to_vec());
        }
        match self {
            RowStorage::Owned(v) => v,
            RowStorage::Shared(_) => unreachable_owned(),
        }
    }

    #[inline]
    fn into_vec(self) -> Vec<Value> {
        match self {
            RowStorage::Owned(v) => v,
            RowStorage::Shared(arc) => arc.to_vec(),
        }
    }
}

#[cold]
fn unreachable_owned() -> ! {
    unreachable!("row storage converted to owned above")
}

/// A tuple of column values
///
/// Rows are cheap to clone once shared: the tuplestore hands out shared rows
/// and `deep_copy` produces a physically independent row when the caller
/// needs one that survives later spilling.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    storage: RowStorage,
}

impl Row {
    /// Create a new empty row
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a row from a vector of values
    #[inline]
    pub fn from_values(values: Vec<Value>) -> Self {
        Self {
            storage: RowStorage::Owned(values),
        }
    }

    /// Create a row from shared storage
    #[inline]
    pub fn from_arc(values: Arc<[Value]>) -> Self {
        Self {
            storage: RowStorage::Shared(values),
        }
    }

    /// Concatenate an outer and an inner row, as produced by a join
    pub fn from_combined(left: &Row, right: &Row) -> Self {
        let mut values = Vec::with_capacity(left.len() + right.len());
        values.extend_from_slice(left);
        values.extend_from_slice(right);
        Row::from_values(values)
    }

    /// Row of `count` NULLs
    pub fn nulls(count: usize) -> Self {
        Row::from_values(vec![Value::null_unknown(); count])
    }

    /// Convert this row to shared storage so later clones are O(1)
    pub fn into_shared(self) -> Self {
        match self.storage {
            RowStorage::Shared(_) => self,
            RowStorage::Owned(v) => Row::from_arc(Arc::from(v)),
        }
    }

    /// Physically copy every value; the result shares nothing with `self`
    pub fn deep_copy(&self) -> Self {
        let values = self
            .iter()
            .map(|v| match v {
                Value::Text(s) => Value::Text(Arc::from(s.as_ref())),
                Value::Array(items) => Value::Array(Arc::from(items.to_vec())),
                other => other.clone(),
            })
            .collect();
        Row::from_values(values)
    }

    /// Number of columns
    #[inline]
    pub fn len(&self) -> usize {
        self.storage.as_slice().len()
    }

    /// Returns true if the row has no columns
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get a value by index
    #[inline]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.storage.as_slice().get(index)
    }

    /// Set a value at index
    pub fn set(&mut self, index: usize, value: Value) -> Result<()> {
        let values = self.storage.make_mut();
        match values.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(Error::invalid_argument(format!(
                "column index {} out of bounds for row of {} columns",
                index,
                values.len()
            ))),
        }
    }

    /// Append a value
    #[inline]
    pub fn push(&mut self, value: Value) {
        self.storage.make_mut().push(value);
    }

    /// Append values from a slice
    pub fn extend_from_slice(&mut self, other: &[Value]) {
        self.storage.make_mut().extend_from_slice(other);
    }

    /// Get the values as a slice
    #[inline]
    pub fn as_slice(&self) -> &[Value] {
        self.storage.as_slice()
    }

    /// Consume the row and return its values
    pub fn into_values(self) -> Vec<Value> {
        self.storage.into_vec()
    }

    /// Project a subset of columns
    pub fn select_columns(&self, indices: &[usize]) -> Result<Row> {
        let mut values = Vec::with_capacity(indices.len());
        for &idx in indices {
            match self.get(idx) {
                Some(v) => values.push(v.clone()),
                None => {
                    return Err(Error::invalid_argument(format!(
                        "column index {} out of bounds for row of {} columns",
                        idx,
                        self.len()
                    )))
                }
            }
        }
        Ok(Row::from_values(values))
    }

    /// Approximate in-memory footprint, used for work-memory accounting
    pub fn memory_size(&self) -> usize {
        std::mem::size_of::<Row>() + self.iter().map(Value::memory_size).sum::<usize>()
    }
}

impl Deref for Row {
    type Target = [Value];

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.storage.as_slice()
    }
}

impl Index<usize> for Row {
    type Output = Value;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.storage.as_slice()[index]
    }
}

impl FromIterator<Value> for Row {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Row::from_values(iter.into_iter().collect())
    }
}

impl IntoIterator for Row {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.storage.into_vec().into_iter()
    }
}

impl<'a> IntoIterator for &'a Row {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.storage.as_slice().iter()
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Row::from_values(values)
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, value) in self.storage.as_slice().iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", value)?;
        }
        write!(f, ")")
    }
}

/// Macro for creating rows conveniently
#[macro_export]
macro_rules! row {
    () => {
        $crate::core::Row::new()
    };
    ($($value:expr),+ $(,)?) => {
        $crate::core::Row::from_values(vec![$($crate::core::Value::from($value)),+])
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_on_write() {
        let shared = Row::from_values(vec![Value::integer(1), Value::text("a")]).into_shared();
        let mut copy = shared.clone();
        copy.set(0, Value::integer(2)).unwrap();
        assert_eq!(shared[0], Value::integer(1));
        assert_eq!(copy[0], Value::integer(2));
    }

    #[test]
    fn test_set_out_of_bounds() {
        let mut row = Row::from_values(vec![Value::integer(1)]);
        assert!(row.set(3, Value::integer(2)).is_err());
    }

    #[test]
    fn test_combined_and_select() {
        let left = crate::row![1i64, "x"];
        let right = crate::row![true];
        let joined = Row::from_combined(&left, &right);
        assert_eq!(joined.len(), 3);
        let projected = joined.select_columns(&[2, 0]).unwrap();
        assert_eq!(projected.to_string(), "(true, 1)");
        assert!(joined.select_columns(&[9]).is_err());
    }

    #[test]
    fn test_deep_copy_is_independent() {
        let row = Row::from_values(vec![Value::text("hello")]).into_shared();
        let copy = row.deep_copy();
        assert_eq!(row, copy);
        match (&row[0], &copy[0]) {
            (Value::Text(a), Value::Text(b)) => assert!(!Arc::ptr_eq(a, b)),
            _ => panic!("expected text"),
        }
    }
}
