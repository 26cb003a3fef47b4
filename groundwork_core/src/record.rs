// Copyright 2026 the Groundwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Change records, lifecycle calls, diagnostics, and engine errors.
//!
//! One update cycle accumulates a [`CycleChanges`] batch. Records are in
//! application order: a renderer that applies them one after another, using
//! the `parent`/`before` anchor carried by each create and move, reproduces
//! the ground tree's physical shape without sorting or scanning.

use alloc::vec::Vec;
use core::fmt;

use crate::applied::AppliedId;
use crate::boundary::BoundaryId;
use crate::closure::ClosureId;
use crate::ground::GroundId;

// ---------------------------------------------------------------------------
// Change records
// ---------------------------------------------------------------------------

/// What a [`ChangeRecord`] asks the renderer to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// Materialize a new physical node.
    Create,
    /// Relocate a node. For a structural point without physical descendants
    /// this is an "empty mover": nothing to move, but insertion points that
    /// depended on it must be re-resolved.
    Move,
    /// Payload or visibility of a node changed.
    Update,
    /// Discard a physical node.
    Remove,
    /// The content grounded at a projection site changed.
    ContentChanged,
    /// A copy site was promoted to true pass.
    Swap,
}

impl ChangeKind {
    /// Stable one-byte code, used by trace encoders.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Create => 0,
            Self::Move => 1,
            Self::Update => 2,
            Self::Remove => 3,
            Self::ContentChanged => 4,
            Self::Swap => 5,
        }
    }

    /// Inverse of [`code`](Self::code).
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Create,
            1 => Self::Move,
            2 => Self::Update,
            3 => Self::Remove,
            4 => Self::ContentChanged,
            5 => Self::Swap,
            _ => return None,
        })
    }
}

/// One structural change for the physical renderer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChangeRecord {
    /// What happened.
    pub kind: ChangeKind,
    /// The point it concerns.
    pub point: GroundId,
    /// Physical parent at emission time (`None` for removes).
    pub parent: Option<GroundId>,
    /// For creates and moves: the physical node to insert before, or `None`
    /// to append.
    pub before: Option<GroundId>,
}

// ---------------------------------------------------------------------------
// Lifecycle calls
// ---------------------------------------------------------------------------

/// A lifecycle hook.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Hook {
    /// The boundary was instantiated and is about to render for the first time.
    PreMount,
    /// The first pass, including nested work, has been grounded.
    PostMount,
    /// The boundary is about to re-render.
    BeforeUpdate,
    /// A re-render has been grounded.
    PostUpdate,
    /// The boundary's node moved among its siblings.
    PostMove,
    /// The boundary is being destroyed.
    PreUnmount,
}

/// An ordered lifecycle call, delivered alongside change records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LifecycleCall {
    /// The boundary the hook concerns.
    pub boundary: BoundaryId,
    /// Which hook.
    pub hook: Hook,
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

/// A recovered, non-fatal problem observed during a cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Diagnostic {
    /// A boundary kept invalidating itself; the last output was used.
    RerenderLimit {
        /// The runaway boundary.
        boundary: BoundaryId,
        /// Renders executed before giving up.
        renders: u32,
    },
    /// A render function kept returning replacement functions.
    RendererChainLimit {
        /// The boundary.
        boundary: BoundaryId,
    },
    /// A projection marker referenced a closure that no longer exists; the
    /// site renders nothing.
    DeadClosure {
        /// The missing closure.
        closure: ClosureId,
    },
    /// A reused node had lost its ground point; it was grounded afresh.
    UngroundedNode {
        /// The node.
        node: AppliedId,
    },
    /// Work referenced a boundary that no longer exists.
    StaleBoundary {
        /// The stale handle.
        boundary: BoundaryId,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RerenderLimit { boundary, renders } => {
                write!(f, "{boundary:?} re-render limit reached after {renders} renders")
            }
            Self::RendererChainLimit { boundary } => {
                write!(f, "{boundary:?} render function chain limit reached")
            }
            Self::DeadClosure { closure } => write!(f, "projection of dead {closure:?}"),
            Self::UngroundedNode { node } => write!(f, "{node:?} had no live ground point"),
            Self::StaleBoundary { boundary } => write!(f, "stale {boundary:?}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Batches
// ---------------------------------------------------------------------------

/// Everything one cycle produced.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CycleChanges {
    /// Structural changes in application order.
    pub records: Vec<ChangeRecord>,
    /// Lifecycle calls in the order they occurred.
    pub lifecycle: Vec<LifecycleCall>,
    /// Recovered problems.
    pub diagnostics: Vec<Diagnostic>,
}

impl CycleChanges {
    /// Whether the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.lifecycle.is_empty() && self.diagnostics.is_empty()
    }

    /// Number of records of the given kind.
    #[must_use]
    pub fn count(&self, kind: ChangeKind) -> usize {
        self.records.iter().filter(|r| r.kind == kind).count()
    }

    /// Lifecycle hooks delivered to `boundary`, in order.
    #[must_use]
    pub fn hooks_for(&self, boundary: BoundaryId) -> Vec<Hook> {
        self.lifecycle
            .iter()
            .filter(|c| c.boundary == boundary)
            .map(|c| c.hook)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by [`Engine`](crate::engine::Engine) entry points.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EngineError {
    /// The boundary handle is stale.
    StaleBoundary(BoundaryId),
    /// The operation needs a source boundary.
    NotSource(BoundaryId),
    /// Nothing is mounted.
    NoRoot,
    /// A root boundary is already mounted.
    AlreadyMounted,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StaleBoundary(b) => write!(f, "stale boundary handle {b:?}"),
            Self::NotSource(b) => write!(f, "{b:?} is a content boundary"),
            Self::NoRoot => f.write_str("no root boundary is mounted"),
            Self::AlreadyMounted => f.write_str("a root boundary is already mounted"),
        }
    }
}

impl core::error::Error for EngineError {}
