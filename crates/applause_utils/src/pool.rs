//! Generational object pools
//!
//! The scene keeps its entities, characters and textured models in pools and
//! refers to them by [`PoolHandle`]s: cheap copyable descriptors carrying an
//! index and a generation. Stale handles (use after free) are detected by a
//! generation mismatch instead of pointing into reused storage.

use std::{iter, marker::PhantomData};
use thiserror::Error;

type PoolEntry<T> = Option<(T, u64)>;

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("invalid handle (index points to an empty slot)")]
    BadIndex,
    #[error("invalid handle (generation mismatch; use after free?)")]
    BadGeneration,
}

/// A handle into a [`Pool<T>`]. Two pointer-sized fields, `Copy`, and typed so
/// that an entity handle cannot be fed to the character pool by accident.
pub struct PoolHandle<T> {
    pub index: usize,
    pub generation: u64,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for PoolHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for PoolHandle<T> {}
impl<T> PartialEq for PoolHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}
impl<T> Eq for PoolHandle<T> {}
impl<T> std::fmt::Debug for PoolHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PoolHandle({}v{})", self.index, self.generation)
    }
}

impl<T> PoolHandle<T> {
    /// Reassembles a handle from its raw parts. The handle is only useful
    /// against the pool that originally produced those parts.
    pub fn from_raw(index: usize, generation: u64) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }
}

/// A generational, single-threaded object pool.
pub struct Pool<T> {
    // TODO: store a free index list instead of scanning from lowest_free
    list: Vec<PoolEntry<T>>,
    generation: u64,
    lowest_free: usize,
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self::with_capacity(8)
    }
}

impl<T> Pool<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            list: iter::repeat_with(|| None).take(cap).collect(),
            generation: 1,
            lowest_free: 0,
        }
    }

    pub fn allocate(&mut self, initial: T) -> PoolHandle<T> {
        let generation = self.next_gen();
        let index = self.next_empty();
        self.list[index] = Some((initial, generation));
        PoolHandle {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    pub fn free(&mut self, handle: PoolHandle<T>) -> Result<T, PoolError> {
        self.validate(handle)?;
        if self.lowest_free > handle.index {
            self.lowest_free = handle.index;
        }
        let (value, _) = self.list[handle.index].take().unwrap();
        Ok(value)
    }

    pub fn validate(&self, handle: PoolHandle<T>) -> Result<(), PoolError> {
        let entry = self
            .list
            .get(handle.index)
            .and_then(Option::as_ref)
            .ok_or(PoolError::BadIndex)?;
        if entry.1 != handle.generation {
            return Err(PoolError::BadGeneration);
        }
        Ok(())
    }

    pub fn get(&self, handle: PoolHandle<T>) -> Option<&T> {
        self.validate(handle).ok()?;
        self.list[handle.index].as_ref().map(|(value, _)| value)
    }

    pub fn get_mut(&mut self, handle: PoolHandle<T>) -> Option<&mut T> {
        self.validate(handle).ok()?;
        self.list[handle.index].as_mut().map(|(value, _)| value)
    }

    pub fn len(&self) -> usize {
        self.list.iter().filter(|entry| entry.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates present entries in index order.
    pub fn iter(&self) -> impl Iterator<Item = (PoolHandle<T>, &T)> {
        self.list.iter().enumerate().filter_map(|(index, entry)| {
            entry.as_ref().map(|(value, generation)| {
                (
                    PoolHandle {
                        index,
                        generation: *generation,
                        _marker: PhantomData,
                    },
                    value,
                )
            })
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (PoolHandle<T>, &mut T)> {
        self.list.iter_mut().enumerate().filter_map(|(index, entry)| {
            entry.as_mut().map(|(value, generation)| {
                (
                    PoolHandle {
                        index,
                        generation: *generation,
                        _marker: PhantomData,
                    },
                    value,
                )
            })
        })
    }

    /// Collects the handles of all present entries. Handy when the iteration
    /// body needs `&mut self` access to other entries.
    pub fn handles(&self) -> Vec<PoolHandle<T>> {
        self.iter().map(|(handle, _)| handle).collect()
    }

    /// Retains only the elements for which the closure returns true.
    pub fn retain(&mut self, mut f: impl FnMut(&mut T) -> bool) {
        for (index, option) in self.list.iter_mut().enumerate() {
            let Some((value, _)) = option else { continue };
            if !f(value) {
                *option = None;
                if self.lowest_free > index {
                    self.lowest_free = index;
                }
            }
        }
    }

    fn next_gen(&mut self) -> u64 {
        let current = self.generation;
        self.generation = current.checked_add(1).expect("pool generation overflow");
        current
    }

    fn next_empty(&mut self) -> usize {
        debug_assert!(self.lowest_free <= self.list.len());

        let found = self
            .list
            .iter()
            .enumerate()
            .skip(self.lowest_free)
            .find(|(_, entry)| entry.is_none())
            .map(|(index, _)| index);

        match found {
            Some(index) => {
                self.lowest_free = index + 1;
                index
            }
            None => {
                let index = self.list.len();
                self.list.push(None);
                self.lowest_free = index + 1;
                index
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_pool_test() {
        const STARTING_SIZE: usize = 16;

        let mut pool: Pool<bool> = Pool::with_capacity(STARTING_SIZE);

        let handles = std::iter::from_fn(|| Some(pool.allocate(false)))
            .take(STARTING_SIZE)
            .collect::<Vec<_>>();

        // Modification checks
        *pool.get_mut(handles[5]).unwrap() = true;
        assert_eq!(*pool.get(handles[4]).unwrap(), false);
        assert_eq!(*pool.get(handles[5]).unwrap(), true);
        assert_eq!(*pool.get(handles[6]).unwrap(), false);

        // After-free use check
        pool.free(handles[6]).unwrap();
        assert_eq!(*pool.get(handles[5]).unwrap(), true);
        assert!(pool.get(handles[6]).is_none());
        assert_eq!(
            pool.validate(handles[6]),
            Err(PoolError::BadIndex),
        );
        assert_eq!(*pool.get(handles[7]).unwrap(), false);

        // This allocation reuses index 6 with a different generation
        let in_place_of_6 = pool.allocate(true);
        assert_eq!(in_place_of_6.index, handles[6].index);
        assert_ne!(in_place_of_6.generation, handles[6].generation);
        assert!(pool.get(handles[6]).is_none());
        assert_eq!(
            pool.validate(handles[6]),
            Err(PoolError::BadGeneration),
        );
        assert_eq!(*pool.get(in_place_of_6).unwrap(), true);

        // Extension check
        let extended_0 = pool.allocate(true);
        let extended_1 = pool.allocate(true);
        assert_ne!(extended_0.index, extended_1.index);
        for handle in [extended_0, extended_1] {
            for &other in &handles {
                assert_ne!(handle.index, other.index);
            }
        }
    }

    #[test]
    fn iteration_visits_in_index_order() {
        let mut pool = Pool::new();
        let a = pool.allocate("a");
        let _b = pool.allocate("b");
        let c = pool.allocate("c");
        pool.free(a).unwrap();

        let seen: Vec<_> = pool.iter().map(|(_, v)| *v).collect();
        assert_eq!(seen, vec!["b", "c"]);

        // freed slot is reused first
        let d = pool.allocate("d");
        assert_eq!(d.index, a.index);
        let seen: Vec<_> = pool.iter().map(|(_, v)| *v).collect();
        assert_eq!(seen, vec!["d", "b", "c"]);
        assert_eq!(pool.len(), 3);
        let _ = c;
    }
}
