// Copyright 2026 the Groundwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pairing: matching new target children against applied children.
//!
//! Pairing is a single forward pass per level with no backtracking. For each
//! target child, in order:
//!
//! 1. Compute its [`SearchTag`]. Structural kinds use sentinel tags.
//! 2. Keyed: take the first unclaimed sibling with the same key and tag. If
//!    there is none, take the first unclaimed node with the same key and tag
//!    anywhere in the scope (a wide match, always [`Action::Moved`]). If a
//!    candidate is vetoed by an immutable field, mount fresh.
//! 3. Unkeyed: take the next unclaimed unkeyed sibling with the same tag, in
//!    positional order. Unkeyed nodes never match outside their siblings.
//!
//! A scope is every applied node reachable from the pass root without
//! entering a nested scope. Boundary, projection, and remote nodes have no
//! applied children of their own; `Subtree` nodes open a fresh scope for
//! their children. Scope members nobody claimed are reported as unused.

use alloc::collections::{BTreeMap, BTreeSet, VecDeque};
use alloc::vec::Vec;

use crate::applied::{Action, AppliedId, AppliedStore};
use crate::target::{Key, NodeKind, SearchTag, TargetNode};

/// One target child together with the node it was paired with.
#[derive(Debug)]
pub(crate) struct Paired<'t> {
    pub(crate) target: &'t TargetNode,
    pub(crate) matched: Option<AppliedId>,
    pub(crate) action: Action,
    pub(crate) children: Vec<Paired<'t>>,
}

/// Keyed lookup over one pairing scope.
#[derive(Debug, Default)]
pub(crate) struct ScopeIndex {
    keyed: BTreeMap<(SearchTag, Key), Vec<AppliedId>>,
    members: Vec<AppliedId>,
}

impl ScopeIndex {
    /// Indexes `roots` and everything below them up to nested scopes.
    pub(crate) fn build(applied: &AppliedStore, roots: &[AppliedId]) -> Self {
        let mut index = Self::default();
        let mut stack: Vec<AppliedId> = roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let Some(node) = applied.get(id) else {
                continue;
            };
            index.members.push(id);
            if let Some(key) = &node.key {
                index
                    .keyed
                    .entry((node.kind.search_tag(), key.clone()))
                    .or_default()
                    .push(id);
            }
            if !matches!(node.kind, NodeKind::Subtree) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        index
    }

    /// Number of nodes in the scope.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.members.len()
    }
}

/// Candidates among one level of siblings.
struct Siblings {
    keyed: BTreeMap<(SearchTag, Key), Vec<AppliedId>>,
    unkeyed: BTreeMap<SearchTag, VecDeque<AppliedId>>,
}

impl Siblings {
    fn new(applied: &AppliedStore, old: &[AppliedId]) -> Self {
        let mut keyed: BTreeMap<(SearchTag, Key), Vec<AppliedId>> = BTreeMap::new();
        let mut unkeyed: BTreeMap<SearchTag, VecDeque<AppliedId>> = BTreeMap::new();
        for &id in old {
            let Some(node) = applied.get(id) else {
                continue;
            };
            let tag = node.kind.search_tag();
            match &node.key {
                Some(key) => keyed.entry((tag, key.clone())).or_default().push(id),
                None => unkeyed.entry(tag).or_default().push_back(id),
            }
        }
        Self { keyed, unkeyed }
    }
}

/// Pairs a pass and remembers which applied nodes were claimed.
pub(crate) struct Pairer<'a> {
    applied: &'a AppliedStore,
    claimed: BTreeSet<AppliedId>,
    unused: Vec<AppliedId>,
}

impl<'a> Pairer<'a> {
    pub(crate) fn new(applied: &'a AppliedStore) -> Self {
        Self {
            applied,
            claimed: BTreeSet::new(),
            unused: Vec::new(),
        }
    }

    /// Pairs `targets` against the children of `parent` as a fresh scope.
    pub(crate) fn pair_scope<'t>(
        &mut self,
        parent: AppliedId,
        targets: &'t [TargetNode],
    ) -> Vec<Paired<'t>> {
        let applied = self.applied;
        let old: &[AppliedId] = applied.get(parent).map_or(&[], |n| n.children.as_slice());
        let scope = ScopeIndex::build(applied, old);
        let paired = self.pair_level(&scope, old, Some(parent), targets);
        for &member in &scope.members {
            if !self.claimed.contains(&member) {
                self.unused.push(member);
            }
        }
        paired
    }

    /// Consumes the pairer, returning unclaimed nodes in scope order.
    pub(crate) fn finish(self) -> Vec<AppliedId> {
        self.unused
    }

    fn pair_level<'t>(
        &mut self,
        scope: &ScopeIndex,
        old: &[AppliedId],
        parent: Option<AppliedId>,
        targets: &'t [TargetNode],
    ) -> Vec<Paired<'t>> {
        let applied = self.applied;
        let mut siblings = Siblings::new(applied, old);
        let mut out = Vec::with_capacity(targets.len());

        for (index, target) in targets.iter().enumerate() {
            let tag = target.kind.search_tag();
            let (matched, wide) = match &target.key {
                Some(key) => self.match_keyed(scope, &siblings, target, tag, key),
                None => (self.match_unkeyed(&mut siblings, target, tag), false),
            };

            let action = match matched.and_then(|m| applied.get(m)) {
                None => Action::Mounted,
                Some(node) => {
                    let same_slot = node.parent == parent && node.index as usize == index;
                    if wide || !same_slot {
                        Action::Moved
                    } else {
                        Action::Updated
                    }
                }
            };
            if let Some(m) = matched {
                self.claimed.insert(m);
            }

            let old_children: &[AppliedId] = matched
                .and_then(|m| applied.get(m))
                .map_or(&[], |n| n.children.as_slice());
            let children = match &target.kind {
                NodeKind::Output(_) | NodeKind::Fragment => {
                    self.pair_level(scope, old_children, matched, &target.children)
                }
                NodeKind::Subtree => match matched {
                    Some(m) => self.pair_scope(m, &target.children),
                    None => self.pair_level(&ScopeIndex::default(), &[], None, &target.children),
                },
                NodeKind::Boundary(_) | NodeKind::Projection(_) | NodeKind::Remote { .. } => {
                    Vec::new()
                }
            };

            out.push(Paired {
                target,
                matched,
                action,
                children,
            });
        }
        out
    }

    fn match_keyed(
        &self,
        scope: &ScopeIndex,
        siblings: &Siblings,
        target: &TargetNode,
        tag: SearchTag,
        key: &Key,
    ) -> (Option<AppliedId>, bool) {
        let slot = (tag, key.clone());
        let local = siblings
            .keyed
            .get(&slot)
            .and_then(|c| c.iter().copied().find(|id| !self.claimed.contains(id)));
        let (candidate, wide) = match local {
            Some(id) => (Some(id), false),
            None => (
                scope
                    .keyed
                    .get(&slot)
                    .and_then(|c| c.iter().copied().find(|id| !self.claimed.contains(id))),
                true,
            ),
        };
        match candidate {
            Some(id) if !self.vetoed(target, id) => (Some(id), wide),
            _ => (None, false),
        }
    }

    fn match_unkeyed(
        &self,
        siblings: &mut Siblings,
        target: &TargetNode,
        tag: SearchTag,
    ) -> Option<AppliedId> {
        let queue = siblings.unkeyed.get_mut(&tag)?;
        while queue.front().is_some_and(|id| self.claimed.contains(id)) {
            queue.pop_front();
        }
        let &front = queue.front()?;
        if self.vetoed(target, front) {
            return None;
        }
        queue.pop_front();
        Some(front)
    }

    fn vetoed(&self, target: &TargetNode, id: AppliedId) -> bool {
        self.applied
            .get(id)
            .is_some_and(|node| target.vetoes(&node.kind, &node.props))
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;
    use crate::applied::AppliedNode;

    /// Commits a target tree as applied nodes the way a pass would.
    fn commit(store: &mut AppliedStore, parent: AppliedId, targets: &[TargetNode]) {
        let mut kids = Vec::new();
        for (i, t) in targets.iter().enumerate() {
            let mut node = AppliedNode::mount(t);
            node.props = t.props.clone();
            node.parent = Some(parent);
            node.index = u32::try_from(i).unwrap();
            let id = store.insert(node);
            commit(store, id, &t.children);
            kids.push(id);
        }
        store.get_mut(parent).unwrap().children = kids;
    }

    fn setup(targets: &[TargetNode]) -> (AppliedStore, AppliedId) {
        let mut store = AppliedStore::new();
        let root = store.insert(AppliedNode::root());
        commit(&mut store, root, targets);
        (store, root)
    }

    fn child(store: &AppliedStore, parent: AppliedId, i: usize) -> AppliedId {
        store.get(parent).unwrap().children[i]
    }

    #[test]
    fn keyed_swap_moves_both_and_keeps_identity() {
        let old = [
            TargetNode::output("div").key("x"),
            TargetNode::output("div").key("y"),
        ];
        let (store, root) = setup(&old);
        let x = child(&store, root, 0);
        let y = child(&store, root, 1);

        let new = [
            TargetNode::output("div").key("y"),
            TargetNode::output("div").key("x"),
        ];
        let mut pairer = Pairer::new(&store);
        let paired = pairer.pair_scope(root, &new);
        assert_eq!(paired[0].matched, Some(y));
        assert_eq!(paired[1].matched, Some(x));
        assert!(paired.iter().all(|p| p.action == Action::Moved));
        assert!(pairer.finish().is_empty());
    }

    #[test]
    fn unchanged_tree_pairs_as_updated() {
        let tree = [TargetNode::output("ul").children([
            TargetNode::output("li"),
            TargetNode::output("li").key(1),
        ])];
        let (store, root) = setup(&tree);
        let mut pairer = Pairer::new(&store);
        let paired = pairer.pair_scope(root, &tree);
        assert_eq!(paired[0].action, Action::Updated);
        assert!(paired[0].children.iter().all(|p| p.action == Action::Updated));
        assert!(pairer.finish().is_empty());
    }

    #[test]
    fn keyed_node_is_found_across_parents() {
        let old = [
            TargetNode::output("a").child(TargetNode::output("p").key("k")),
            TargetNode::output("b"),
        ];
        let (store, root) = setup(&old);
        let a = child(&store, root, 0);
        let k = child(&store, a, 0);

        let new = [
            TargetNode::output("a"),
            TargetNode::output("b").child(TargetNode::output("p").key("k")),
        ];
        let mut pairer = Pairer::new(&store);
        let paired = pairer.pair_scope(root, &new);
        assert_eq!(paired[1].children[0].matched, Some(k));
        assert_eq!(paired[1].children[0].action, Action::Moved);
    }

    #[test]
    fn unkeyed_nodes_never_match_outside_siblings() {
        let old = [TargetNode::output("a").child(TargetNode::output("p"))];
        let (store, root) = setup(&old);
        let a = child(&store, root, 0);
        let p = child(&store, a, 0);

        let new = [TargetNode::output("a"), TargetNode::output("p")];
        let mut pairer = Pairer::new(&store);
        let paired = pairer.pair_scope(root, &new);
        assert_eq!(paired[1].action, Action::Mounted);
        assert_eq!(pairer.finish(), vec![p]);
    }

    #[test]
    fn unkeyed_matching_is_positional_per_tag() {
        let old = [
            TargetNode::output("a"),
            TargetNode::output("b"),
            TargetNode::output("a"),
        ];
        let (store, root) = setup(&old);
        let a0 = child(&store, root, 0);
        let b = child(&store, root, 1);

        let new = [TargetNode::output("b"), TargetNode::output("a")];
        let mut pairer = Pairer::new(&store);
        let paired = pairer.pair_scope(root, &new);
        assert_eq!(paired[0].matched, Some(b));
        assert_eq!(paired[1].matched, Some(a0));
        assert_eq!(pairer.finish(), vec![child(&store, root, 2)]);
    }

    #[test]
    fn immutable_change_forces_mount() {
        let old = [TargetNode::output("input")
            .key("f")
            .prop("type", "text")
            .immutable(&["type"])];
        let (store, root) = setup(&old);
        let f = child(&store, root, 0);

        let new = [TargetNode::output("input")
            .key("f")
            .prop("type", "checkbox")
            .immutable(&["type"])];
        let mut pairer = Pairer::new(&store);
        let paired = pairer.pair_scope(root, &new);
        assert_eq!(paired[0].action, Action::Mounted);
        assert_eq!(pairer.finish(), vec![f]);
    }

    #[test]
    fn structural_sentinels_do_not_match_content_tags() {
        let old = [TargetNode::fragment([TargetNode::text("x")])];
        let (store, root) = setup(&old);
        let new = [TargetNode::output("Fragment")];
        let mut pairer = Pairer::new(&store);
        let paired = pairer.pair_scope(root, &new);
        assert_eq!(paired[0].action, Action::Mounted);
        assert_eq!(pairer.finish().len(), 2);
    }

    #[test]
    fn subtree_scopes_are_isolated() {
        let old = [
            TargetNode::subtree([TargetNode::output("p").key("k")]),
            TargetNode::output("div"),
        ];
        let (store, root) = setup(&old);
        let scope = ScopeIndex::build(&store, &store.get(root).unwrap().children);
        // The subtree node is a member; its children are not.
        assert_eq!(scope.len(), 2);

        let new = [
            TargetNode::subtree([]),
            TargetNode::output("div").child(TargetNode::output("p").key("k")),
        ];
        let mut pairer = Pairer::new(&store);
        let paired = pairer.pair_scope(root, &new);
        assert_eq!(paired[1].children[0].action, Action::Mounted);
        let inner = child(&store, child(&store, root, 0), 0);
        assert_eq!(pairer.finish(), vec![inner]);
    }
}
