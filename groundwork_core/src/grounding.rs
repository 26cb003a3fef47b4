// Copyright 2026 the Groundwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Grounding: committing a pass to the applied and ground trees.
//!
//! A pass pairs a boundary's new targets against its applied children, then
//! walks the pair tree top-down with a sibling cursor:
//!
//! - Fragments get no point. Their children splice into the enclosing point
//!   at the cursor.
//! - Output nodes get a physical point. New points emit `Create`; changed
//!   payloads emit `Update`.
//! - Boundary, projection, and subtree nodes get structural points; remote
//!   nodes get a transparent one.
//! - A reused point that is not directly after the cursor (ignoring points
//!   of unused nodes, which are destroyed once the walk ends) is detached
//!   and relocated with its subtree intact. Relocated points and every node
//!   pairing reported as moved emit `Move`.
//!
//! Nested work (boundaries to render, sites to reconcile, closures to
//! refresh) is collected during the walk and run depth-first after it, so
//! an inner boundary always reconciles against its parent's committed
//! output.

use alloc::collections::BTreeSet;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::mem;

use crate::applied::{Action, AppliedId, AppliedNode};
use crate::boundary::{Boundary, BoundaryId, ShouldUpdate, Unit};
use crate::closure::ClosureId;
use crate::engine::Engine;
use crate::ground::{GroundId, GroundKind, Payload};
use crate::pairing::{Pairer, Paired};
use crate::record::{ChangeKind, ChangeRecord, Diagnostic, Hook};
use crate::target::{NodeKind, ProjectionSource, TargetNode};

/// Nested work produced by a pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Work {
    /// Render a source boundary.
    Render(BoundaryId),
    /// Reconcile a site's content boundary.
    Site(BoundaryId),
    /// Re-ground every site of a closure.
    Refresh(ClosureId, bool),
}

/// Per-pass state.
#[derive(Debug)]
struct Pass {
    owner: BoundaryId,
    /// Slots of points owned by unused nodes.
    stale: BTreeSet<u32>,
    work: Vec<Work>,
}

impl Engine {
    /// Pairs `targets` against the children of `root`, grounds them under
    /// `point`, and destroys what was left unused.
    pub(crate) fn reconcile_into(
        &mut self,
        owner: BoundaryId,
        root: AppliedId,
        targets: &[TargetNode],
        point: GroundId,
    ) -> Vec<Work> {
        let (paired, unused) = {
            let mut pairer = Pairer::new(&self.applied);
            let paired = pairer.pair_scope(root, targets);
            (paired, pairer.finish())
        };
        let stale = unused
            .iter()
            .filter_map(|id| self.applied.get(*id)?.point)
            .map(|p| p.index())
            .collect();
        let mut pass = Pass {
            owner,
            stale,
            work: Vec::new(),
        };

        let mut cursor = None;
        let children = self.ground_list(&mut pass, Some(root), &paired, point, &mut cursor, false);
        if let Some(root_node) = self.applied.get_mut(root) {
            root_node.children = children;
        }
        for id in unused {
            self.destroy_applied(id);
        }
        pass.work
    }

    pub(crate) fn run_work(&mut self, work: Vec<Work>) {
        for w in work {
            match w {
                Work::Render(b) => self.update_source(b),
                Work::Site(cb) => self.reconcile_site(cb, false),
                Work::Refresh(closure, force) => self.apply_refresh(closure, force),
            }
        }
    }

    fn ground_list(
        &mut self,
        pass: &mut Pass,
        parent: Option<AppliedId>,
        pairs: &[Paired<'_>],
        point: GroundId,
        cursor: &mut Option<GroundId>,
        hidden: bool,
    ) -> Vec<AppliedId> {
        let mut out = Vec::with_capacity(pairs.len());
        for (index, pair) in pairs.iter().enumerate() {
            let id = self.ground_one(pass, parent, index, pair, point, cursor, hidden);
            out.push(id);
        }
        out
    }

    fn ground_one(
        &mut self,
        pass: &mut Pass,
        parent: Option<AppliedId>,
        index: usize,
        pair: &Paired<'_>,
        point: GroundId,
        cursor: &mut Option<GroundId>,
        hidden: bool,
    ) -> AppliedId {
        let target = pair.target;
        let id = match pair.matched.filter(|m| self.applied.contains(*m)) {
            Some(m) => m,
            None => self.applied.insert(AppliedNode::mount(target)),
        };
        let previous = {
            let Some(node) = self.applied.get_mut(id) else {
                return id;
            };
            node.parent = parent;
            node.index = u32::try_from(index).unwrap_or(u32::MAX);
            node.action = pair.action;
            node.key = target.key.clone();
            node.disabled = target.flags.disabled;
            mem::replace(&mut node.kind, target.kind.clone())
        };
        let hidden = hidden || target.flags.disabled;

        match &target.kind {
            NodeKind::Fragment => {
                let kids = self.ground_list(pass, Some(id), &pair.children, point, cursor, hidden);
                if let Some(node) = self.applied.get_mut(id) {
                    node.children = kids;
                    node.props = target.props.clone();
                }
            }
            NodeKind::Output(tag) => {
                let (p, created) =
                    self.ensure_point(pass, id, GroundKind::Output, point, cursor, hidden, pair.action);
                let changed = self
                    .applied
                    .get_mut(id)
                    .map(|node| {
                        let changed = node.props != target.props;
                        node.props = target.props.clone();
                        changed
                    })
                    .unwrap_or(true);
                if created || changed {
                    self.ground.set_payload(
                        p,
                        Payload {
                            tag: tag.clone(),
                            props: target.props.clone(),
                        },
                    );
                }
                if created {
                    self.record(ChangeKind::Create, p);
                } else if changed {
                    self.record(ChangeKind::Update, p);
                }
                let mut inner = None;
                let kids = self.ground_list(pass, Some(id), &pair.children, p, &mut inner, false);
                if let Some(node) = self.applied.get_mut(id) {
                    node.children = kids;
                }
            }
            NodeKind::Subtree => {
                let (p, _) =
                    self.ensure_point(pass, id, GroundKind::Subtree, point, cursor, hidden, pair.action);
                let mut inner = None;
                let kids = self.ground_list(pass, Some(id), &pair.children, p, &mut inner, false);
                if let Some(node) = self.applied.get_mut(id) {
                    node.children = kids;
                    node.props = target.props.clone();
                }
            }
            NodeKind::Boundary(unit) => {
                let (p, _) = self.ensure_point(
                    pass,
                    id,
                    GroundKind::Boundary,
                    point,
                    cursor,
                    hidden,
                    pair.action,
                );
                self.ground_boundary(pass, id, unit, target, p, pair.action);
            }
            NodeKind::Projection(source) => {
                let (p, _) = self.ensure_point(
                    pass,
                    id,
                    GroundKind::Projection,
                    point,
                    cursor,
                    hidden,
                    pair.action,
                );
                let closure = match source {
                    ProjectionSource::Content(c) => *c,
                    ProjectionSource::Channel(ch) => self.outlet_closure(ch),
                };
                let site = self.ground_site(pass.owner, id, p, closure);
                if let Some(node) = self.applied.get_mut(id) {
                    node.boundary = site;
                    node.props = target.props.clone();
                }
                if let Some(cb) = site {
                    pass.work.push(Work::Site(cb));
                }
            }
            NodeKind::Remote { channel, order } => {
                let _ = self.ensure_point(
                    pass,
                    id,
                    GroundKind::Transparent,
                    point,
                    cursor,
                    hidden,
                    pair.action,
                );
                let content: Rc<[TargetNode]> = if hidden {
                    Rc::from([])
                } else {
                    target.children.clone()
                };
                let old_order = match previous {
                    NodeKind::Remote { order, .. } => Some(order),
                    _ => None,
                };
                let Some(node) = self.applied.get(id) else {
                    return id;
                };
                let source = node.source;
                let same = old_order == Some(*order)
                    && (Rc::ptr_eq(&node.content, &content) || *node.content == *content);
                match source {
                    Some(token) => {
                        if !same {
                            if channel.has_foreign_subscribers(self.host) {
                                self.flush_records();
                            }
                            channel.update_source(token, *order, content.clone());
                        }
                    }
                    None => {
                        if channel.has_foreign_subscribers(self.host) {
                            self.flush_records();
                        }
                        let token = channel.add_source(self.host, *order, content.clone());
                        if let Some(node) = self.applied.get_mut(id) {
                            node.source = Some(token);
                        }
                    }
                }
                if let Some(node) = self.applied.get_mut(id) {
                    node.content = content;
                    node.props = target.props.clone();
                }
            }
        }
        id
    }

    /// Instantiates or updates the boundary behind a boundary node.
    fn ground_boundary(
        &mut self,
        pass: &mut Pass,
        id: AppliedId,
        unit: &Rc<dyn Unit>,
        target: &TargetNode,
        point: GroundId,
        action: Action,
    ) {
        let Some(node) = self.applied.get_mut(id) else {
            return;
        };
        let old_props = mem::replace(&mut node.props, target.props.clone());
        let existing = node.boundary;
        let alive = existing.filter(|b| self.boundaries.contains(*b));

        let Some(b) = alive else {
            if let Some(stale) = existing {
                self.diagnose(Diagnostic::StaleBoundary { boundary: stale });
            }
            let b = self.instantiate(
                Some(pass.owner),
                Some(id),
                unit.clone(),
                target.props.clone(),
                target.children.clone(),
                point,
            );
            if let Some(node) = self.applied.get_mut(id) {
                node.boundary = Some(b);
            }
            pass.work.push(Work::Render(b));
            return;
        };

        let Some(content) = self
            .boundaries
            .get(b)
            .and_then(Boundary::source)
            .map(|s| s.content)
        else {
            return;
        };
        let consumers = self.pre_refresh(content, target.children.clone());
        let refresh = !consumers.is_empty();
        for c in consumers {
            self.mark(c);
        }

        // Same name, different unit: the instance adopts the new unit.
        let swapped = self
            .boundaries
            .get_mut(b)
            .and_then(Boundary::source_mut)
            .is_some_and(|src| {
                if Rc::ptr_eq(&src.unit, unit) {
                    return false;
                }
                src.unit = unit.clone();
                src.renderer = None;
                true
            });
        let forced = target.flags.force_update || self.boundaries.get(b).is_some_and(|x| x.force);
        let update = forced
            || swapped
            || match unit.should_update(&old_props, &target.props) {
                ShouldUpdate::Yes => true,
                ShouldUpdate::No => false,
                ShouldUpdate::Default => old_props != target.props,
            };
        if update {
            if let Some(src) = self.boundaries.get_mut(b).and_then(Boundary::source_mut) {
                src.props = target.props.clone();
            }
            pass.work.push(Work::Render(b));
        } else if refresh {
            pass.work.push(Work::Refresh(content, false));
        }
        if action == Action::Moved {
            self.hook(b, Hook::PostMove);
        }
    }

    /// Returns the point of `id`, creating or relocating it as needed, and
    /// whether it was created.
    fn ensure_point(
        &mut self,
        pass: &Pass,
        id: AppliedId,
        kind: GroundKind,
        parent: GroundId,
        cursor: &mut Option<GroundId>,
        hidden: bool,
        action: Action,
    ) -> (GroundId, bool) {
        let recorded = self.applied.get(id).and_then(|n| n.point);
        let live = recorded.filter(|p| self.ground.is_alive(*p) && !pass.stale.contains(&p.index()));
        if recorded.is_some() && live.is_none() {
            self.diagnose(Diagnostic::UngroundedNode { node: id });
        }

        let (p, created) = match live {
            Some(p) => {
                let relocated = self.place(pass, p, parent, *cursor);
                if relocated || action == Action::Moved {
                    self.emit_move(p);
                }
                if self.ground.set_hidden(p, hidden) {
                    for r in self.ground.physical_roots(p) {
                        self.record(ChangeKind::Update, r);
                    }
                }
                (p, false)
            }
            None => {
                let p = self.ground.create_point(kind, Some(pass.owner), Some(id));
                self.ground.insert_after(parent, *cursor, p);
                self.ground.set_hidden(p, hidden);
                if let Some(node) = self.applied.get_mut(id) {
                    node.point = Some(p);
                }
                (p, true)
            }
        };
        *cursor = Some(p);
        (p, created)
    }

    /// Puts `p` directly after `cursor` under `parent`. Returns whether it
    /// had to move.
    fn place(
        &mut self,
        pass: &Pass,
        p: GroundId,
        parent: GroundId,
        cursor: Option<GroundId>,
    ) -> bool {
        let current = self.ground.parent(p);
        if current == Some(parent) {
            let mut prev = self.ground.prev_sibling(p);
            while let Some(s) = prev {
                if !pass.stale.contains(&s.index()) {
                    break;
                }
                prev = self.ground.prev_sibling(s);
            }
            if prev == cursor {
                return false;
            }
        }
        if current.is_some() {
            self.ground.detach(p);
        }
        self.ground.insert_after(parent, cursor, p);
        true
    }

    /// Emits the `Move` records for a relocated or moved point.
    fn emit_move(&mut self, p: GroundId) {
        if self.ground.kind(p).is_physical() {
            self.record(ChangeKind::Move, p);
            return;
        }
        let roots = self.ground.physical_roots(p);
        if roots.is_empty() {
            // Nothing physical moves, but insertion points may have.
            self.record(ChangeKind::Move, p);
        }
        for r in roots.into_iter().rev() {
            self.record(ChangeKind::Move, r);
        }
    }

    /// Destroys an applied node, everything below it, and whatever it owns.
    pub(crate) fn destroy_applied(&mut self, id: AppliedId) {
        let Some(node) = self.applied.remove(id) else {
            return;
        };
        match &node.kind {
            NodeKind::Boundary(_) | NodeKind::Projection(_) => {
                if let Some(b) = node.boundary {
                    self.destroy_boundary(b);
                }
            }
            NodeKind::Remote { channel, .. } => {
                if let Some(token) = node.source {
                    if channel.has_foreign_subscribers(self.host) {
                        self.flush_records();
                    }
                    channel.remove_source(token);
                }
            }
            NodeKind::Output(_) | NodeKind::Fragment | NodeKind::Subtree => {}
        }
        for child in node.children {
            if self.applied.get(child).is_some_and(|n| n.parent == Some(id)) {
                self.destroy_applied(child);
            }
        }
        if let Some(p) = node.point.filter(|p| self.ground.is_alive(*p)) {
            self.destroy_point(p);
        }
    }

    /// Destroys a point subtree, emitting `Remove` for every physical point
    /// in it, innermost first.
    pub(crate) fn destroy_point(&mut self, p: GroundId) {
        let mut removed = Vec::new();
        self.ground.destroy_subtree(p, &mut removed);
        for r in removed.into_iter().rev() {
            self.changes.records.push(ChangeRecord {
                kind: ChangeKind::Remove,
                point: r,
                parent: None,
                before: None,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::borrow::ToOwned;
    use alloc::rc::Rc;
    use alloc::string::String;
    use alloc::vec;
    use alloc::vec::Vec;
    use core::cell::Cell;

    use super::*;
    use crate::boundary::{RenderCx, RenderFn, Rendered, unit};
    use crate::scheduler::SchedulerConfig;
    use crate::target::{Key, Props};

    /// Renders the children listed in its `order` state, one `li` per
    /// character, keyed by that character.
    fn list(tag: &'static str) -> Rc<dyn Unit> {
        unit("List", move |cx: &mut RenderCx<'_>| {
            let order = cx.state().str("order").unwrap_or("").to_owned();
            TargetNode::output("ul").children(order.chars().map(|c| {
                let mut buf = [0_u8; 4];
                let key: &str = c.encode_utf8(&mut buf);
                TargetNode::output(tag).key(key).prop("label", key)
            }))
        })
    }

    fn mounted(order: &str) -> (Engine, BoundaryId) {
        let mut engine = Engine::new(SchedulerConfig::batched());
        let root = engine.mount(&list("li"), Props::new()).unwrap();
        engine.set_state(root, "order", order).unwrap();
        let _ = engine.flush();
        (engine, root)
    }

    fn labels(engine: &Engine, root: BoundaryId) -> Vec<String> {
        let ul = engine
            .ground()
            .children(engine.boundary_point(root).unwrap())
            .next()
            .unwrap();
        engine
            .ground()
            .children(ul)
            .filter_map(|li| engine.ground().payload(li)?.props.str("label").map(Into::into))
            .collect()
    }

    #[test]
    fn keyed_swap_moves_without_create_or_remove() {
        let (mut engine, root) = mounted("xy");
        let x = engine.find_keyed(&Key::from("x")).unwrap();
        engine.set_state(root, "order", "yx").unwrap();
        let changes = engine.flush();

        assert_eq!(changes.count(ChangeKind::Move), 2);
        assert_eq!(changes.count(ChangeKind::Create), 0);
        assert_eq!(changes.count(ChangeKind::Remove), 0);
        assert_eq!(engine.find_keyed(&Key::from("x")), Some(x));
        assert_eq!(labels(&engine, root), vec!["y", "x"]);
    }

    #[test]
    fn reconciling_unchanged_output_is_silent() {
        let (mut engine, root) = mounted("abc");
        engine.force_update(root).unwrap();
        let changes = engine.flush();
        assert!(changes.records.is_empty());
        assert_eq!(
            changes.hooks_for(root),
            vec![Hook::BeforeUpdate, Hook::PostUpdate]
        );
    }

    #[test]
    fn insertion_anchors_before_next_physical_sibling() {
        let (mut engine, root) = mounted("ac");
        engine.set_state(root, "order", "abc").unwrap();
        let changes = engine.flush();
        assert_eq!(changes.count(ChangeKind::Create), 1);
        let create = changes.records[0];
        let c = engine.applied_point(engine.find_keyed(&Key::from("c")).unwrap());
        assert_eq!(create.before, c);
        assert_eq!(labels(&engine, root), vec!["a", "b", "c"]);
    }

    #[test]
    fn removal_reports_every_physical_point() {
        let app = unit("App", |cx: &mut RenderCx<'_>| {
            if cx.state().int("gone") == Some(1) {
                TargetNode::fragment([])
            } else {
                TargetNode::output("div")
                    .child(TargetNode::text("a"))
                    .child(TargetNode::fragment([TargetNode::text("b")]))
            }
        });
        let mut engine = Engine::new(SchedulerConfig::batched());
        let root = engine.mount(&app, Props::new()).unwrap();
        assert_eq!(engine.flush().count(ChangeKind::Create), 3);
        let div = engine
            .ground()
            .children(engine.boundary_point(root).unwrap())
            .next()
            .unwrap();
        engine.set_state(root, "gone", 1).unwrap();
        let changes = engine.flush();
        assert_eq!(changes.count(ChangeKind::Remove), 3);
        // Innermost first: the div goes last.
        let last = changes.records.last().unwrap();
        assert_eq!((last.kind, last.point), (ChangeKind::Remove, div));
        assert_eq!(engine.ground().live_count(), 2);
    }

    #[test]
    fn structural_mover_emits_one_move_per_physical_root() {
        let inner = unit("Pair", |_: &mut RenderCx<'_>| {
            TargetNode::fragment([TargetNode::output("a"), TargetNode::output("b")])
        });
        let app = unit("App", move |cx: &mut RenderCx<'_>| {
            let pair = TargetNode::boundary(&inner).key("pair");
            let tail = TargetNode::output("tail").key("tail");
            if cx.state().int("flip") == Some(1) {
                TargetNode::fragment([tail, pair])
            } else {
                TargetNode::fragment([pair, tail])
            }
        });
        let mut engine = Engine::new(SchedulerConfig::batched());
        let root = engine.mount(&app, Props::new()).unwrap();
        let _ = engine.flush();
        engine.set_state(root, "flip", 1).unwrap();
        let changes = engine.flush();
        // `tail` relocates; the boundary is moved too and carries `a` and `b`.
        assert_eq!(changes.count(ChangeKind::Move), 3);
        assert_eq!(changes.count(ChangeKind::Create), 0);
        let pair = engine.inner_boundaries(root)[0];
        assert_eq!(changes.hooks_for(pair), vec![Hook::PostMove]);
    }

    #[test]
    fn empty_structural_mover_is_reported_on_itself() {
        let empty = unit("Empty", |_: &mut RenderCx<'_>| TargetNode::fragment([]));
        let app = unit("App", move |cx: &mut RenderCx<'_>| {
            let e = TargetNode::boundary(&empty).key("e");
            let t = TargetNode::output("t").key("t");
            if cx.state().int("flip") == Some(1) {
                TargetNode::fragment([t, e])
            } else {
                TargetNode::fragment([e, t])
            }
        });
        let mut engine = Engine::new(SchedulerConfig::batched());
        let root = engine.mount(&app, Props::new()).unwrap();
        let _ = engine.flush();
        engine.set_state(root, "flip", 1).unwrap();
        let changes = engine.flush();
        let e_point = engine.boundary_point(engine.inner_boundaries(root)[0]);
        assert!(
            changes
                .records
                .iter()
                .any(|r| r.kind == ChangeKind::Move && Some(r.point) == e_point)
        );
    }

    #[test]
    fn disabling_hides_without_remounting() {
        let app = unit("App", |cx: &mut RenderCx<'_>| {
            let off = cx.state().int("off") == Some(1);
            TargetNode::fragment([TargetNode::output("p").child(TargetNode::text("x"))])
                .disabled(off)
        });
        let mut engine = Engine::new(SchedulerConfig::batched());
        let root = engine.mount(&app, Props::new()).unwrap();
        let _ = engine.flush();
        engine.set_state(root, "off", 1).unwrap();
        let changes = engine.flush();
        assert_eq!(changes.count(ChangeKind::Update), 1);
        assert_eq!(changes.count(ChangeKind::Create), 0);
        let update = changes.records[0];
        assert!(engine.ground().hidden_at(update.point.index()));

        engine.set_state(root, "off", 0).unwrap();
        let changes = engine.flush();
        assert_eq!(changes.count(ChangeKind::Update), 1);
        assert!(!engine.ground().hidden_at(changes.records[0].point.index()));
    }

    /// Renders its `n` prop and counts renders; re-render policy is fixed.
    struct Gate {
        policy: ShouldUpdate,
        renders: Rc<Cell<u32>>,
    }

    impl Unit for Gate {
        fn name(&self) -> &str {
            "Gate"
        }

        fn instantiate(&self, _props: &Props) -> RenderFn {
            let renders = self.renders.clone();
            Box::new(move |cx| {
                renders.set(renders.get() + 1);
                let n = cx.props().int("n").unwrap_or(0);
                Rendered::Tree(TargetNode::output("gate").prop("n", n))
            })
        }

        fn should_update(&self, _old: &Props, _new: &Props) -> ShouldUpdate {
            self.policy
        }
    }

    /// Mounts a parent that passes its `n` state to a [`Gate`].
    fn gated(policy: ShouldUpdate) -> (Engine, BoundaryId, Rc<Cell<u32>>) {
        let renders = Rc::new(Cell::new(0));
        let gate: Rc<dyn Unit> = Rc::new(Gate {
            policy,
            renders: renders.clone(),
        });
        let app = unit("App", move |cx: &mut RenderCx<'_>| {
            let n = cx.state().int("n").unwrap_or(0);
            TargetNode::boundary(&gate).prop("n", n)
        });
        let mut engine = Engine::new(SchedulerConfig::batched());
        let root = engine.mount(&app, Props::new()).unwrap();
        let _ = engine.flush();
        assert_eq!(renders.get(), 1);
        (engine, root, renders)
    }

    fn gate_n(engine: &Engine, root: BoundaryId) -> Option<i64> {
        let inner = engine.inner_boundaries(root)[0];
        let point = engine.ground().children(engine.boundary_point(inner)?).next()?;
        engine.ground().payload(point)?.props.int("n")
    }

    #[test]
    fn should_update_no_keeps_output_on_new_props() {
        let (mut engine, root, renders) = gated(ShouldUpdate::No);
        engine.set_state(root, "n", 1).unwrap();
        let changes = engine.flush();
        assert_eq!(renders.get(), 1);
        assert_eq!(changes.count(ChangeKind::Update), 0);
        assert_eq!(gate_n(&engine, root), Some(0));
    }

    #[test]
    fn should_update_yes_renders_with_identical_props() {
        let (mut engine, root, renders) = gated(ShouldUpdate::Yes);
        // Parent re-renders; the gate's props stay the same.
        engine.set_state(root, "other", 1).unwrap();
        let changes = engine.flush();
        assert_eq!(renders.get(), 2);
        assert!(changes.records.is_empty());

        engine.set_state(root, "n", 4).unwrap();
        let changes = engine.flush();
        assert_eq!(renders.get(), 3);
        assert_eq!(changes.count(ChangeKind::Update), 1);
        assert_eq!(gate_n(&engine, root), Some(4));
    }

    /// A frame around its content; `ask` makes it query `has_content`.
    fn frame(ask: bool, renders: &Rc<Cell<u32>>) -> Rc<dyn Unit> {
        let renders = renders.clone();
        unit("Frame", move |cx: &mut RenderCx<'_>| {
            renders.set(renders.get() + 1);
            let has = ask && cx.has_content();
            TargetNode::output("frame")
                .prop("has", i64::from(has))
                .child(cx.content())
        })
    }

    /// Passes one text child per character of its `items` state to `inner`.
    fn producer(inner: Rc<dyn Unit>) -> Rc<dyn Unit> {
        unit("Producer", move |cx: &mut RenderCx<'_>| {
            let items = cx.state().str("items").unwrap_or("").to_owned();
            TargetNode::boundary(&inner).children(items.chars().map(|c| {
                let mut buf = [0_u8; 4];
                TargetNode::text(c.encode_utf8(&mut buf))
            }))
        })
    }

    #[test]
    fn content_interest_renders_consumer_once() {
        let renders = Rc::new(Cell::new(0));
        let mut engine = Engine::new(SchedulerConfig::batched());
        let root = engine
            .mount(&producer(frame(true, &renders)), Props::new())
            .unwrap();
        let _ = engine.flush();
        assert_eq!(renders.get(), 1);
        let inner = engine.inner_boundaries(root)[0];
        let out = engine
            .ground()
            .children(engine.boundary_point(inner).unwrap())
            .next()
            .unwrap();
        assert_eq!(engine.ground().payload(out).unwrap().props.int("has"), Some(0));

        engine.set_state(root, "items", "a").unwrap();
        let changes = engine.flush();
        assert_eq!(renders.get(), 2);
        assert_eq!(changes.count(ChangeKind::Create), 1);
        assert_eq!(changes.count(ChangeKind::Update), 1);
        assert_eq!(engine.ground().payload(out).unwrap().props.int("has"), Some(1));
    }

    #[test]
    fn content_change_refreshes_sites_without_rendering() {
        let renders = Rc::new(Cell::new(0));
        let mut engine = Engine::new(SchedulerConfig::batched());
        let root = engine
            .mount(&producer(frame(false, &renders)), Props::new())
            .unwrap();
        let _ = engine.flush();

        engine.set_state(root, "items", "ab").unwrap();
        let changes = engine.flush();
        assert_eq!(renders.get(), 1);
        assert_eq!(changes.count(ChangeKind::Create), 2);

        engine.set_state(root, "items", "b").unwrap();
        let changes = engine.flush();
        assert_eq!(renders.get(), 1);
        assert_eq!(changes.count(ChangeKind::Remove), 1);
    }

    #[test]
    fn same_named_unit_swap_renders_new_unit() {
        let first = unit("Panel", |_: &mut RenderCx<'_>| TargetNode::output("a"));
        let second = unit("Panel", |_: &mut RenderCx<'_>| TargetNode::output("b"));
        let app = unit("App", move |cx: &mut RenderCx<'_>| {
            let which = if cx.state().int("alt") == Some(1) {
                &second
            } else {
                &first
            };
            TargetNode::boundary(which)
        });
        let mut engine = Engine::new(SchedulerConfig::batched());
        let root = engine.mount(&app, Props::new()).unwrap();
        let _ = engine.flush();
        let panel = engine.inner_boundaries(root)[0];

        engine.set_state(root, "alt", 1).unwrap();
        let changes = engine.flush();
        // Paired by name: the instance survives and renders the new unit.
        assert_eq!(engine.inner_boundaries(root), vec![panel]);
        assert_eq!(changes.count(ChangeKind::Create), 1);
        assert_eq!(changes.count(ChangeKind::Remove), 1);
        let out = engine
            .ground()
            .children(engine.boundary_point(panel).unwrap())
            .next()
            .unwrap();
        assert_eq!(engine.ground().payload(out).unwrap().tag.as_ref(), "b");
    }
}
