// Copyright 2026 the Groundwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Struct-of-arrays ground point storage with topology and physical bookkeeping.

use alloc::rc::Rc;
use alloc::vec::Vec;

use super::id::{GroundId, GroundKind, INVALID};
use super::traverse::Children;
use crate::applied::AppliedId;
use crate::boundary::BoundaryId;
use crate::target::Props;

/// What an output point materializes as.
#[derive(Clone, Debug, PartialEq)]
pub struct Payload {
    /// Output tag.
    pub tag: Rc<str>,
    /// Output props.
    pub props: Props,
}

/// Where a physical node belongs: inside `parent`, directly before `before`
/// (or appended when `before` is `None`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Anchor {
    /// Nearest physical ancestor.
    pub parent: Option<GroundId>,
    /// First physical node that follows in tree order under the same parent.
    pub before: Option<GroundId>,
}

/// Struct-of-arrays storage for all ground points of one host.
///
/// Points are addressed by [`GroundId`] handles. Destroyed slots are held
/// back until the current batch of change records has been flushed (see
/// [`release_held`](Self::release_held)), so a slot index names at most one
/// point per batch.
#[derive(Debug)]
pub struct GroundStore {
    // -- Topology --
    pub(crate) parent: Vec<u32>,
    pub(crate) first_child: Vec<u32>,
    pub(crate) next_sibling: Vec<u32>,
    pub(crate) prev_sibling: Vec<u32>,

    // -- Identity --
    pub(crate) kind: Vec<GroundKind>,
    pub(crate) owner: Vec<Option<BoundaryId>>,
    pub(crate) applied: Vec<Option<AppliedId>>,

    // -- Output state --
    pub(crate) payload: Vec<Option<Payload>>,
    pub(crate) hidden: Vec<bool>,

    // -- Physical bookkeeping --
    pub(crate) nearest_physical: Vec<u32>,

    // -- Allocation --
    pub(crate) generation: Vec<u32>,
    pub(crate) alive: Vec<bool>,
    pub(crate) free_list: Vec<u32>,
    pub(crate) held: Vec<u32>,
    pub(crate) len: u32,
}

impl Default for GroundStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GroundStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            parent: Vec::new(),
            first_child: Vec::new(),
            next_sibling: Vec::new(),
            prev_sibling: Vec::new(),
            kind: Vec::new(),
            owner: Vec::new(),
            applied: Vec::new(),
            payload: Vec::new(),
            hidden: Vec::new(),
            nearest_physical: Vec::new(),
            generation: Vec::new(),
            alive: Vec::new(),
            free_list: Vec::new(),
            held: Vec::new(),
            len: 0,
        }
    }

    // -- Allocation --

    /// Creates an unparented point.
    pub(crate) fn create_point(
        &mut self,
        kind: GroundKind,
        owner: Option<BoundaryId>,
        applied: Option<AppliedId>,
    ) -> GroundId {
        let idx = if let Some(idx) = self.free_list.pop() {
            let i = idx as usize;
            self.parent[i] = INVALID;
            self.first_child[i] = INVALID;
            self.next_sibling[i] = INVALID;
            self.prev_sibling[i] = INVALID;
            self.kind[i] = kind;
            self.owner[i] = owner;
            self.applied[i] = applied;
            self.payload[i] = None;
            self.hidden[i] = false;
            self.alive[i] = true;
            idx
        } else {
            let idx = self.len;
            self.len += 1;
            self.parent.push(INVALID);
            self.first_child.push(INVALID);
            self.next_sibling.push(INVALID);
            self.prev_sibling.push(INVALID);
            self.kind.push(kind);
            self.owner.push(owner);
            self.applied.push(applied);
            self.payload.push(None);
            self.hidden.push(false);
            self.nearest_physical.push(INVALID);
            self.generation.push(0);
            self.alive.push(true);
            idx
        };
        self.nearest_physical[idx as usize] = if kind.is_physical() { idx } else { INVALID };
        self.id_of(idx)
    }

    /// Destroys `id` and everything under it.
    ///
    /// Physical points are appended to `removed` in pre-order. The slots stay
    /// readable through the `*_at` accessors until [`release_held`](Self::release_held).
    pub(crate) fn destroy_subtree(&mut self, id: GroundId, removed: &mut Vec<GroundId>) {
        self.validate(id);
        if self.parent[id.idx as usize] != INVALID {
            self.unlink(id.idx);
        }
        let mut stack = alloc::vec![id.idx];
        while let Some(idx) = stack.pop() {
            let i = idx as usize;
            if self.kind[i].is_physical() {
                removed.push(self.id_of(idx));
            }
            // Push children in reverse so they pop in tree order.
            let mut kids = Vec::new();
            let mut c = self.first_child[i];
            while c != INVALID {
                kids.push(c);
                c = self.next_sibling[c as usize];
            }
            stack.extend(kids.into_iter().rev());
            self.alive[i] = false;
            self.generation[i] += 1;
            self.held.push(idx);
        }
    }

    /// Makes slots destroyed since the last flush available for reuse.
    pub(crate) fn release_held(&mut self) {
        self.free_list.append(&mut self.held);
    }

    /// Returns whether the given handle refers to a live point.
    #[must_use]
    pub fn is_alive(&self, id: GroundId) -> bool {
        id.idx < self.len
            && self.alive[id.idx as usize]
            && self.generation[id.idx as usize] == id.generation
    }

    /// Number of live points.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.alive.iter().filter(|a| **a).count()
    }

    // -- Topology --

    /// Links `child` under `parent`, directly after `prev` (or first).
    ///
    /// # Panics
    ///
    /// Panics if a handle is stale, if `child` already has a parent, or if
    /// `prev` is not a child of `parent`.
    pub(crate) fn insert_after(&mut self, parent: GroundId, prev: Option<GroundId>, child: GroundId) {
        self.validate(parent);
        self.validate(child);
        let p = parent.idx;
        let c = child.idx;
        assert!(
            self.parent[c as usize] == INVALID,
            "point already has a parent"
        );

        self.parent[c as usize] = p;
        match prev {
            Some(prev) => {
                self.validate(prev);
                let s = prev.idx;
                assert!(self.parent[s as usize] == p, "anchor is not a child of parent");
                let next = self.next_sibling[s as usize];
                self.prev_sibling[c as usize] = s;
                self.next_sibling[c as usize] = next;
                self.next_sibling[s as usize] = c;
                if next != INVALID {
                    self.prev_sibling[next as usize] = c;
                }
            }
            None => {
                let first = self.first_child[p as usize];
                self.prev_sibling[c as usize] = INVALID;
                self.next_sibling[c as usize] = first;
                if first != INVALID {
                    self.prev_sibling[first as usize] = c;
                }
                self.first_child[p as usize] = c;
            }
        }
        self.refresh_nearest(p);
    }

    /// Unlinks `child` from its parent, keeping its subtree intact.
    ///
    /// # Panics
    ///
    /// Panics if the handle is stale or the point has no parent.
    pub(crate) fn detach(&mut self, child: GroundId) {
        self.validate(child);
        assert!(
            self.parent[child.idx as usize] != INVALID,
            "point has no parent"
        );
        self.unlink(child.idx);
    }

    fn unlink(&mut self, c: u32) {
        let p = self.parent[c as usize];
        let prev = self.prev_sibling[c as usize];
        let next = self.next_sibling[c as usize];
        if prev == INVALID {
            self.first_child[p as usize] = next;
        } else {
            self.next_sibling[prev as usize] = next;
        }
        if next != INVALID {
            self.prev_sibling[next as usize] = prev;
        }
        self.parent[c as usize] = INVALID;
        self.prev_sibling[c as usize] = INVALID;
        self.next_sibling[c as usize] = INVALID;
        self.refresh_nearest(p);
    }

    /// Re-derives `nearest_physical` from `idx` upward after its child list
    /// changed. Stops at the first point whose value is unchanged or that is
    /// itself physical.
    fn refresh_nearest(&mut self, mut idx: u32) {
        while idx != INVALID {
            let i = idx as usize;
            if self.kind[i].is_physical() {
                return;
            }
            let mut found = INVALID;
            let mut c = self.first_child[i];
            while c != INVALID {
                let n = self.nearest_physical[c as usize];
                if n != INVALID {
                    found = n;
                    break;
                }
                c = self.next_sibling[c as usize];
            }
            if self.nearest_physical[i] == found {
                return;
            }
            self.nearest_physical[i] = found;
            idx = self.parent[i];
        }
    }

    /// Returns the parent of a point, if any.
    #[must_use]
    pub fn parent(&self, id: GroundId) -> Option<GroundId> {
        self.validate(id);
        self.opt(self.parent[id.idx as usize])
    }

    /// Returns the previous sibling of a point, if any.
    #[must_use]
    pub fn prev_sibling(&self, id: GroundId) -> Option<GroundId> {
        self.validate(id);
        self.opt(self.prev_sibling[id.idx as usize])
    }

    /// Returns the next sibling of a point, if any.
    #[must_use]
    pub fn next_sibling(&self, id: GroundId) -> Option<GroundId> {
        self.validate(id);
        self.opt(self.next_sibling[id.idx as usize])
    }

    /// Returns an iterator over the direct children of a point.
    #[must_use]
    pub fn children(&self, id: GroundId) -> Children<'_> {
        self.validate(id);
        Children::new(self, self.first_child[id.idx as usize])
    }

    /// Counts `id` and every point under it.
    #[must_use]
    pub fn subtree_len(&self, id: GroundId) -> usize {
        self.validate(id);
        let mut n = 0;
        let mut stack = alloc::vec![id.idx];
        while let Some(idx) = stack.pop() {
            n += 1;
            let mut c = self.first_child[idx as usize];
            while c != INVALID {
                stack.push(c);
                c = self.next_sibling[c as usize];
            }
        }
        n
    }

    // -- Properties --

    /// Returns the kind of a point.
    #[must_use]
    pub fn kind(&self, id: GroundId) -> GroundKind {
        self.validate(id);
        self.kind[id.idx as usize]
    }

    /// Returns the boundary whose pass created the point.
    #[must_use]
    pub fn owner(&self, id: GroundId) -> Option<BoundaryId> {
        self.validate(id);
        self.owner[id.idx as usize]
    }

    /// Returns the applied node the point was grounded for (weak).
    #[must_use]
    pub fn applied(&self, id: GroundId) -> Option<AppliedId> {
        self.validate(id);
        self.applied[id.idx as usize]
    }

    /// Returns the output payload of a point.
    #[must_use]
    pub fn payload(&self, id: GroundId) -> Option<&Payload> {
        self.validate(id);
        self.payload[id.idx as usize].as_ref()
    }

    /// Returns whether the point itself is hidden.
    #[must_use]
    pub fn hidden(&self, id: GroundId) -> bool {
        self.validate(id);
        self.hidden[id.idx as usize]
    }

    /// Returns whether the point or any ancestor is hidden.
    #[must_use]
    pub fn effective_hidden(&self, id: GroundId) -> bool {
        self.validate(id);
        let mut idx = id.idx;
        while idx != INVALID {
            if self.hidden[idx as usize] {
                return true;
            }
            idx = self.parent[idx as usize];
        }
        false
    }

    pub(crate) fn set_payload(&mut self, id: GroundId, payload: Payload) {
        self.validate(id);
        self.payload[id.idx as usize] = Some(payload);
    }

    /// Sets the hidden flag, returning whether it changed.
    pub(crate) fn set_hidden(&mut self, id: GroundId, hidden: bool) -> bool {
        self.validate(id);
        let slot = &mut self.hidden[id.idx as usize];
        let changed = *slot != hidden;
        *slot = hidden;
        changed
    }

    // -- Raw access for renderers --
    //
    // Change records may name points destroyed later in the same batch. These
    // accessors read a slot without a generation check; the data stays in
    // place until the batch is flushed.

    /// Returns the kind stored in a slot.
    #[must_use]
    pub fn kind_at(&self, idx: u32) -> GroundKind {
        self.kind[idx as usize]
    }

    /// Returns the payload stored in a slot.
    #[must_use]
    pub fn payload_at(&self, idx: u32) -> Option<&Payload> {
        self.payload[idx as usize].as_ref()
    }

    /// Returns whether the physical node in a slot should be hidden.
    ///
    /// Considers the slot and its structural ancestors up to (excluding) the
    /// physical parent, which a renderer hides on its own.
    #[must_use]
    pub fn hidden_at(&self, idx: u32) -> bool {
        if self.hidden[idx as usize] {
            return true;
        }
        let mut i = self.parent[idx as usize];
        while i != INVALID && !self.kind[i as usize].is_physical() {
            if self.hidden[i as usize] {
                return true;
            }
            i = self.parent[i as usize];
        }
        false
    }

    // -- Physical bookkeeping --

    /// Returns the first physical point at or under `id` in tree order.
    #[must_use]
    pub fn nearest_physical(&self, id: GroundId) -> Option<GroundId> {
        self.validate(id);
        self.opt(self.nearest_physical[id.idx as usize])
    }

    /// Returns the nearest physical strict ancestor of `id`.
    #[must_use]
    pub fn physical_parent(&self, id: GroundId) -> Option<GroundId> {
        self.validate(id);
        let mut p = self.parent[id.idx as usize];
        while p != INVALID && !self.kind[p as usize].is_physical() {
            p = self.parent[p as usize];
        }
        self.opt(p)
    }

    /// Resolves where the physical nodes of `id` belong.
    ///
    /// Walks following siblings (climbing through structural ancestors) and
    /// takes the first cached `nearest_physical`, so the cost is bounded by
    /// the sibling run rather than the subtree size.
    #[must_use]
    pub fn anchor(&self, id: GroundId) -> Anchor {
        let parent = self.physical_parent(id);
        let mut cur = id.idx;
        loop {
            let mut s = self.next_sibling[cur as usize];
            while s != INVALID {
                let n = self.nearest_physical[s as usize];
                if n != INVALID {
                    return Anchor {
                        parent,
                        before: Some(self.id_of(n)),
                    };
                }
                s = self.next_sibling[s as usize];
            }
            let p = self.parent[cur as usize];
            if p == INVALID || self.kind[p as usize].is_physical() {
                return Anchor {
                    parent,
                    before: None,
                };
            }
            cur = p;
        }
    }

    /// Returns the top-most physical points at or under `id`, in tree order.
    #[must_use]
    pub fn physical_roots(&self, id: GroundId) -> Vec<GroundId> {
        self.validate(id);
        let mut out = Vec::new();
        self.collect_physical_roots(id.idx, &mut out);
        out
    }

    fn collect_physical_roots(&self, idx: u32, out: &mut Vec<GroundId>) {
        if self.nearest_physical[idx as usize] == INVALID {
            return;
        }
        if self.kind[idx as usize].is_physical() {
            out.push(self.id_of(idx));
            return;
        }
        let mut c = self.first_child[idx as usize];
        while c != INVALID {
            self.collect_physical_roots(c, out);
            c = self.next_sibling[c as usize];
        }
    }

    // -- Internal helpers --

    pub(crate) fn id_of(&self, idx: u32) -> GroundId {
        GroundId {
            idx,
            generation: self.generation[idx as usize],
        }
    }

    fn opt(&self, idx: u32) -> Option<GroundId> {
        (idx != INVALID).then(|| self.id_of(idx))
    }

    /// Panics if the handle is stale.
    pub(crate) fn validate(&self, id: GroundId) {
        assert!(self.is_alive(id), "stale GroundId: {id:?}");
    }
}
