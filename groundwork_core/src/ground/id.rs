// Copyright 2026 the Groundwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Ground point identity.

use core::fmt;

/// Sentinel value indicating "no point" in index fields.
pub const INVALID: u32 = u32::MAX;

/// A handle to a point in a [`GroundStore`](super::GroundStore).
///
/// Contains both a slot index and a generation counter so that stale handles
/// can be detected after a point is destroyed and the slot is reused.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroundId {
    pub(crate) idx: u32,
    pub(crate) generation: u32,
}

impl GroundId {
    /// Returns the raw slot index.
    ///
    /// Renderers key their physical handles by this index; a slot is never
    /// reused within one batch of change records.
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

impl fmt::Debug for GroundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroundId({}@gen{})", self.idx, self.generation)
    }
}

/// What a ground point stands for.
///
/// Only [`Root`](Self::Root) and [`Output`](Self::Output) points hold a
/// physical node. The other kinds are structural: they exist so that
/// relocation and insertion-point lookups can treat a whole subtree as one
/// unit, and they contribute their first physical descendant to
/// [`nearest_physical`](super::GroundStore::nearest_physical).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GroundKind {
    /// The host container the renderer supplies.
    Root,
    /// A physical output node.
    Output,
    /// The position of a source boundary.
    Boundary,
    /// A grounding site for projected content.
    Projection,
    /// An isolated pairing scope.
    Subtree,
    /// A position that never materializes (remote channel sources).
    Transparent,
}

impl GroundKind {
    /// Whether points of this kind hold a physical node.
    #[inline]
    #[must_use]
    pub const fn is_physical(self) -> bool {
        matches!(self, Self::Root | Self::Output)
    }
}
