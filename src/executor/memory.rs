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

//! Generational memory arenas
//!
//! Values live in ordinary Rust ownership; an arena tracks which values
//! belong to a lifetime scope (query, partition, aggregate) and how many
//! bytes that scope holds. Resetting an arena bumps its generation, which
//! detaches every [`Transition`] previously tagged with it in O(1).

use std::sync::atomic::{AtomicU64, Ordering};

use crate::core::{Result, Value};

static NEXT_ARENA_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one generation of one arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArenaId {
    id: u64,
    generation: u64,
}

/// Accounting scope for values sharing a lifetime
#[derive(Debug)]
pub struct MemoryArena {
    name: &'static str,
    id: u64,
    generation: u64,
    bytes: usize,
    resets: u64,
}

impl MemoryArena {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            id: NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed),
            generation: 0,
            bytes: 0,
            resets: 0,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Handle for the current generation
    pub fn handle(&self) -> ArenaId {
        ArenaId {
            id: self.id,
            generation: self.generation,
        }
    }

    /// Whether `handle` names the live generation of this arena
    pub fn owns(&self, handle: ArenaId) -> bool {
        handle.id == self.id && handle.generation == self.generation
    }

    /// Drop everything allocated in the current generation
    pub fn reset(&mut self) {
        self.generation += 1;
        self.bytes = 0;
        self.resets += 1;
    }

    pub fn charge(&mut self, bytes: usize) {
        self.bytes = self.bytes.saturating_add(bytes);
    }

    /// Bytes charged since the last reset
    pub fn allocated(&self) -> usize {
        self.bytes
    }

    pub fn reset_count(&self) -> u64 {
        self.resets
    }
}

/// Size of a value's heap footprint, charged to the owning arena
pub trait HeapSize {
    fn heap_size(&self) -> usize;
}

impl HeapSize for Value {
    fn heap_size(&self) -> usize {
        self.memory_size()
    }
}

/// A transition value tagged with the arena generation that owns it
///
/// A value owned by the arena may be handed to a transition function by
/// move, so the function can update it in place. A value that is not (for
/// example the aggregate's initial value, or one left over from a reset
/// generation) is copied first.
#[derive(Debug, Clone)]
pub struct Transition<T> {
    value: T,
    owner: Option<ArenaId>,
}

impl<T: Clone + HeapSize> Transition<T> {
    /// A value no arena owns
    pub fn unowned(value: T) -> Self {
        Self { value, owner: None }
    }

    /// Move `value` into `arena`
    pub fn new_in(arena: &mut MemoryArena, value: T) -> Self {
        arena.charge(value.heap_size());
        Self {
            value,
            owner: Some(arena.handle()),
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn into_inner(self) -> T {
        self.value
    }

    pub fn is_owned_by(&self, arena: &MemoryArena) -> bool {
        self.owner.is_some_and(|h| arena.owns(h))
    }

    /// Run `f` over the value and tag the result with `arena`
    ///
    /// Moves the value into `f` when `arena` owns it, clones it otherwise.
    pub fn take_and_replace<F>(self, arena: &mut MemoryArena, f: F) -> Result<Self>
    where
        F: FnOnce(T) -> Result<T>,
    {
        let input = if self.is_owned_by(arena) {
            self.value
        } else {
            self.value.clone()
        };
        Ok(Self::new_in(arena, f(input)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_reset_detaches_transitions() {
        let mut arena = MemoryArena::new("aggregate");
        let t = Transition::new_in(&mut arena, Value::integer(1));
        assert!(t.is_owned_by(&arena));
        assert!(arena.allocated() > 0);
        arena.reset();
        assert!(!t.is_owned_by(&arena));
        assert_eq!(arena.allocated(), 0);
        assert_eq!(arena.reset_count(), 1);
    }

    #[test]
    fn test_take_and_replace_moves_owned_value() {
        let mut arena = MemoryArena::new("aggregate");
        let t = Transition::new_in(&mut arena, Value::array(vec![Value::integer(0)]));
        let t = t
            .take_and_replace(&mut arena, |mut v| {
                if let Value::Array(items) = &mut v {
                    // Sole owner: the array can be updated in place
                    assert!(Arc::get_mut(items).is_some());
                }
                Ok(v)
            })
            .unwrap();
        assert!(t.is_owned_by(&arena));
    }

    #[test]
    fn test_take_and_replace_copies_unowned_value() {
        let mut arena = MemoryArena::new("aggregate");
        let init = Value::array(vec![Value::integer(0)]);
        let t = Transition::unowned(init.clone());
        let t = t
            .take_and_replace(&mut arena, |mut v| {
                if let Value::Array(items) = &mut v {
                    assert!(Arc::get_mut(items).is_none());
                }
                Ok(v)
            })
            .unwrap();
        assert!(t.is_owned_by(&arena));
        assert_eq!(t.get(), &init);
    }
}
