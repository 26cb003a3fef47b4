// Copyright 2026 the Groundwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tree traversal utilities.

use super::id::{GroundId, INVALID};
use super::store::GroundStore;

/// An iterator over the direct children of a point.
///
/// Created by [`GroundStore::children`].
#[derive(Debug)]
pub struct Children<'a> {
    store: &'a GroundStore,
    current: u32,
}

impl<'a> Children<'a> {
    pub(crate) fn new(store: &'a GroundStore, first: u32) -> Self {
        Self {
            store,
            current: first,
        }
    }
}

impl Iterator for Children<'_> {
    type Item = GroundId;

    fn next(&mut self) -> Option<GroundId> {
        if self.current == INVALID {
            return None;
        }
        let idx = self.current;
        self.current = self.store.next_sibling[idx as usize];
        Some(self.store.id_of(idx))
    }
}
