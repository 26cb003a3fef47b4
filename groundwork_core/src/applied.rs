// Copyright 2026 the Groundwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Applied nodes: the persistent, last-committed counterpart of target nodes.

use alloc::rc::Rc;
use alloc::vec::Vec;

use crate::arena::{Arena, arena_id};
use crate::boundary::BoundaryId;
use crate::channel::SourceToken;
use crate::ground::GroundId;
use crate::target::{Key, NodeKind, Props, TargetNode};

arena_id!(
    /// A handle to an applied node.
    ///
    /// A keyed node keeps its handle across re-renders as long as its key and
    /// tag are unchanged, regardless of sibling reordering.
    AppliedId
);

/// How pairing resolved a node in the latest pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    /// No previous node matched; a fresh one was created.
    Mounted,
    /// Matched, but at a different parent or index, or through the
    /// scope-wide index.
    Moved,
    /// Matched at the same slot.
    Updated,
}

/// One materialized structural position.
#[derive(Debug)]
pub(crate) struct AppliedNode {
    pub(crate) kind: NodeKind,
    pub(crate) key: Option<Key>,
    pub(crate) props: Props,
    pub(crate) children: Vec<AppliedId>,
    pub(crate) action: Action,
    /// Weak link; fragments and boundary roots have none.
    pub(crate) point: Option<GroundId>,
    pub(crate) disabled: bool,
    pub(crate) parent: Option<AppliedId>,
    pub(crate) index: u32,
    /// The source boundary of a boundary node, or the content boundary of a
    /// projection site.
    pub(crate) boundary: Option<BoundaryId>,
    /// Registration of a remote node in its channel.
    pub(crate) source: Option<SourceToken>,
    /// Content last fed into a channel by a remote node.
    pub(crate) content: Rc<[TargetNode]>,
}

impl AppliedNode {
    pub(crate) fn mount(target: &TargetNode) -> Self {
        Self {
            kind: target.kind.clone(),
            key: target.key.clone(),
            props: Props::new(),
            children: Vec::new(),
            action: Action::Mounted,
            point: None,
            disabled: false,
            parent: None,
            index: 0,
            boundary: None,
            source: None,
            content: Rc::from([]),
        }
    }

    /// A transparent root that holds a boundary's top-level nodes.
    pub(crate) fn root() -> Self {
        Self {
            kind: NodeKind::Fragment,
            key: None,
            props: Props::new(),
            children: Vec::new(),
            action: Action::Mounted,
            point: None,
            disabled: false,
            parent: None,
            index: 0,
            boundary: None,
            source: None,
            content: Rc::from([]),
        }
    }
}

pub(crate) type AppliedStore = Arena<AppliedId, AppliedNode>;
