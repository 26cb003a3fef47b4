// Copyright 2026 the Groundwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Generational slot arena behind the applied, boundary, and closure stores.

use alloc::vec::Vec;
use core::fmt;
use core::marker::PhantomData;

/// Conversion between a typed handle and its raw slot parts.
pub(crate) trait ArenaId: Copy {
    fn from_parts(idx: u32, generation: u32) -> Self;
    fn idx(self) -> u32;
    fn generation(self) -> u32;
}

/// Declares a public generational handle type.
macro_rules! arena_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name {
            pub(crate) idx: u32,
            pub(crate) generation: u32,
        }

        impl $name {
            /// Returns the raw slot index (for diagnostics only).
            #[inline]
            #[must_use]
            pub const fn index(self) -> u32 {
                self.idx
            }

            /// Returns the generation counter.
            #[inline]
            #[must_use]
            pub const fn generation(self) -> u32 {
                self.generation
            }
        }

        impl core::fmt::Debug for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, concat!(stringify!($name), "({}@gen{})"), self.idx, self.generation)
            }
        }

        impl crate::arena::ArenaId for $name {
            #[inline]
            fn from_parts(idx: u32, generation: u32) -> Self {
                Self { idx, generation }
            }

            #[inline]
            fn idx(self) -> u32 {
                self.idx
            }

            #[inline]
            fn generation(self) -> u32 {
                self.generation
            }
        }
    };
}

pub(crate) use arena_id;

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot storage addressed by generational handles of type `I`.
///
/// Freed slots are reused immediately with a bumped generation, so a stale
/// handle never resolves to the new occupant.
pub(crate) struct Arena<I, T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    live: usize,
    _id: PhantomData<I>,
}

impl<I, T> fmt::Debug for Arena<I, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("live", &self.live)
            .field("capacity", &self.slots.len())
            .finish_non_exhaustive()
    }
}

impl<I: ArenaId, T> Arena<I, T> {
    pub(crate) const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
            _id: PhantomData,
        }
    }

    pub(crate) fn insert(&mut self, value: T) -> I {
        self.live += 1;
        if let Some(idx) = self.free.pop() {
            let slot = &mut self.slots[idx as usize];
            slot.generation += 1;
            slot.value = Some(value);
            return I::from_parts(idx, slot.generation);
        }
        #[expect(
            clippy::cast_possible_truncation,
            reason = "slot counts beyond u32::MAX are not supported"
        )]
        let idx = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        I::from_parts(idx, 0)
    }

    pub(crate) fn remove(&mut self, id: I) -> Option<T> {
        let slot = self.slots.get_mut(id.idx() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        let value = slot.value.take()?;
        self.free.push(id.idx());
        self.live -= 1;
        Some(value)
    }

    pub(crate) fn get(&self, id: I) -> Option<&T> {
        let slot = self.slots.get(id.idx() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.value.as_ref()
    }

    pub(crate) fn get_mut(&mut self, id: I) -> Option<&mut T> {
        let slot = self.slots.get_mut(id.idx() as usize)?;
        if slot.generation != id.generation() {
            return None;
        }
        slot.value.as_mut()
    }

    pub(crate) fn contains(&self, id: I) -> bool {
        self.get(id).is_some()
    }

    /// Resolves a raw slot index to the handle of its current occupant.
    pub(crate) fn id_at(&self, idx: u32) -> Option<I> {
        let slot = self.slots.get(idx as usize)?;
        slot.value.as_ref()?;
        Some(I::from_parts(idx, slot.generation))
    }

    pub(crate) const fn len(&self) -> usize {
        self.live
    }

    /// Iterates live entries in slot order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (I, &T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(idx, slot)| {
            #[expect(
                clippy::cast_possible_truncation,
                reason = "slot counts beyond u32::MAX are not supported"
            )]
            let idx = idx as u32;
            slot.value
                .as_ref()
                .map(|v| (I::from_parts(idx, slot.generation), v))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    arena_id!(
        /// Test handle.
        TestId
    );

    #[test]
    fn stale_handles_do_not_resolve_after_reuse() {
        let mut arena: Arena<TestId, &str> = Arena::new();
        let a = arena.insert("a");
        assert_eq!(arena.remove(a), Some("a"));
        let b = arena.insert("b");
        assert_eq!(a.index(), b.index(), "slot is reused");
        assert!(arena.get(a).is_none());
        assert_eq!(arena.get(b), Some(&"b"));
        assert_eq!(arena.remove(a), None, "double remove is a no-op");
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn id_at_tracks_current_occupant() {
        let mut arena: Arena<TestId, u8> = Arena::new();
        let a = arena.insert(1);
        assert_eq!(arena.id_at(a.index()), Some(a));
        arena.remove(a);
        assert_eq!(arena.id_at(a.index()), None);
        let b = arena.insert(2);
        assert_eq!(arena.id_at(b.index()), Some(b));
    }
}
