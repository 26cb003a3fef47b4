// Copyright 2026 the Groundwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Content closures: captured content and the sites that ground it.
//!
//! Every source boundary owns one [`ContentClosure`] holding the children its
//! parent gave it. Projection markers ([`RenderCx::content`]) register
//! grounding *sites*. Each site gets a content boundary that reconciles the
//! closure's target at the site's ground point.
//!
//! The first live site is the *true pass*: it reconciles into the closure's
//! shared root, so a single consumer never allocates a second applied
//! subtree. Every other live site is a copy with its own root. When the true
//! pass goes away, the first copy is promoted and a
//! [`ChangeKind::Swap`](crate::record::ChangeKind::Swap) record is emitted.
//!
//! Refresh is two-phase. [`Engine::pre_refresh`] stores new content and
//! returns every boundary that must react (interested renderers, site
//! boundaries, and those of closures chained onto this one) without
//! grounding anything. [`Engine::apply_refresh`] then reconciles every site.
//!
//! Remote channel outlets use the same machinery: one closure per channel
//! per host, refreshed from the channel aggregate when an inbox notice
//! arrives.
//!
//! [`RenderCx::content`]: crate::boundary::RenderCx::content

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::mem;

use crate::applied::{AppliedId, AppliedNode};
use crate::arena::arena_id;
use crate::boundary::{Boundary, BoundaryId, BoundaryVariant, Lifecycle};
use crate::channel::RemoteChannel;
use crate::engine::Engine;
use crate::ground::GroundId;
use crate::record::{ChangeKind, Diagnostic};
use crate::target::{TargetNode, projected_closures};

arena_id!(
    /// A handle to a content closure.
    ClosureId
);

/// One grounding site of a closure.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Site {
    pub(crate) point: GroundId,
    pub(crate) content: BoundaryId,
    pub(crate) true_pass: bool,
    /// Closure version last reconciled at this site.
    pub(crate) seen: Option<u64>,
}

/// Captured content plus the bookkeeping needed to project it.
#[derive(Debug)]
pub(crate) struct ContentClosure {
    /// The boundary whose pass authored the content.
    pub(crate) producer: Option<BoundaryId>,
    /// The source boundary that received it.
    pub(crate) owner: Option<BoundaryId>,
    pub(crate) target: Rc<[TargetNode]>,
    pub(crate) shared_root: AppliedId,
    pub(crate) version: u64,
    pub(crate) grounded: BTreeMap<AppliedId, Site>,
    pub(crate) pending: BTreeSet<AppliedId>,
    pub(crate) interested: BTreeSet<BoundaryId>,
    /// Closures whose content projects this one.
    pub(crate) chained: BTreeSet<ClosureId>,
    /// Closures this one's content projects.
    pub(crate) upstream: Vec<ClosureId>,
    /// Set for channel outlets.
    pub(crate) channel: Option<RemoteChannel>,
}

impl Engine {
    pub(crate) fn create_closure(
        &mut self,
        producer: Option<BoundaryId>,
        target: Rc<[TargetNode]>,
    ) -> ClosureId {
        let shared_root = self.applied.insert(AppliedNode::root());
        let id = self.closures.insert(ContentClosure {
            producer,
            owner: None,
            target,
            shared_root,
            version: 0,
            grounded: BTreeMap::new(),
            pending: BTreeSet::new(),
            interested: BTreeSet::new(),
            chained: BTreeSet::new(),
            upstream: Vec::new(),
            channel: None,
        });
        self.link_upstream(id);
        id
    }

    /// Rescans projection markers in a closure's content and updates the
    /// chained sets of the closures they reference.
    fn link_upstream(&mut self, id: ClosureId) {
        let Some(closure) = self.closures.get(id) else {
            return;
        };
        let mut next = Vec::new();
        projected_closures(&closure.target, &mut next);
        next.retain(|u| *u != id);
        let Some(closure) = self.closures.get_mut(id) else {
            return;
        };
        let previous = mem::replace(&mut closure.upstream, next.clone());

        for u in previous {
            if !next.contains(&u) {
                if let Some(up) = self.closures.get_mut(u) {
                    up.chained.remove(&id);
                }
            }
        }
        for u in next {
            if let Some(up) = self.closures.get_mut(u) {
                up.chained.insert(id);
            }
        }
    }

    /// Stores new content and returns every boundary that has to react.
    ///
    /// Unchanged content returns an empty set and leaves the version alone.
    pub(crate) fn pre_refresh(
        &mut self,
        id: ClosureId,
        target: Rc<[TargetNode]>,
    ) -> BTreeSet<BoundaryId> {
        let Some(closure) = self.closures.get_mut(id) else {
            return BTreeSet::new();
        };
        if Rc::ptr_eq(&closure.target, &target) || *closure.target == *target {
            return BTreeSet::new();
        }
        closure.target = target;
        closure.version += 1;
        self.link_upstream(id);
        self.consumers(id)
    }

    /// Interested boundaries and site boundaries of `id` and, transitively,
    /// of every closure chained onto it.
    fn consumers(&self, id: ClosureId) -> BTreeSet<BoundaryId> {
        let mut out = BTreeSet::new();
        let mut seen = BTreeSet::new();
        let mut stack = alloc::vec![id];
        while let Some(c) = stack.pop() {
            if !seen.insert(c) {
                continue;
            }
            let Some(closure) = self.closures.get(c) else {
                continue;
            };
            out.extend(closure.interested.iter().copied());
            out.extend(closure.grounded.values().map(|s| s.content));
            stack.extend(closure.chained.iter().copied());
        }
        out
    }

    /// Marks every site stale and reconciles each one.
    pub(crate) fn apply_refresh(&mut self, id: ClosureId, force: bool) {
        let Some(closure) = self.closures.get_mut(id) else {
            return;
        };
        let sites: Vec<BoundaryId> = closure.grounded.values().map(|s| s.content).collect();
        closure.pending.extend(closure.grounded.keys().copied());
        for cb in sites {
            self.reconcile_site(cb, force);
        }
    }

    /// Registers the projection node `node` as a site of `closure`.
    ///
    /// Returns the site's content boundary, reusing the node's existing one
    /// when it is still alive, or `None` for a dead closure.
    pub(crate) fn ground_site(
        &mut self,
        owner: BoundaryId,
        node: AppliedId,
        point: GroundId,
        closure: ClosureId,
    ) -> Option<BoundaryId> {
        let Some(c) = self.closures.get(closure) else {
            self.diagnose(Diagnostic::DeadClosure { closure });
            return None;
        };
        if let Some(site) = c.grounded.get(&node) {
            if self.boundaries.contains(site.content) {
                return Some(site.content);
            }
        }
        let true_pass = !c.grounded.values().any(|s| s.true_pass);
        let root = if true_pass {
            c.shared_root
        } else {
            self.applied.insert(AppliedNode::root())
        };

        let cb = self.boundaries.insert(Boundary::content(
            closure,
            node,
            Some(owner),
            point,
            root,
        ));
        self.adopt(owner, cb);
        if let Some(c) = self.closures.get_mut(closure) {
            c.grounded.insert(
                node,
                Site {
                    point,
                    content: cb,
                    true_pass,
                    seen: None,
                },
            );
        }
        Some(cb)
    }

    /// Reconciles a site's content boundary against its closure.
    ///
    /// Skips the work when the site has already seen the current version,
    /// unless `force` is set.
    pub(crate) fn reconcile_site(&mut self, cb: BoundaryId, force: bool) {
        let Some(b) = self.boundaries.get(cb) else {
            self.diagnose(Diagnostic::StaleBoundary { boundary: cb });
            return;
        };
        let BoundaryVariant::Content { closure, site } = b.variant else {
            return;
        };
        let (root, point) = (b.root, b.point);
        let force = force || b.force;

        let (targets, first) = match self.closures.get_mut(closure) {
            Some(c) => {
                let version = c.version;
                let Some(s) = c.grounded.get_mut(&site) else {
                    return;
                };
                if s.seen == Some(version) && !force {
                    return;
                }
                let first = s.seen.is_none();
                s.seen = Some(version);
                c.pending.remove(&site);
                (c.target.clone(), first)
            }
            None => {
                self.diagnose(Diagnostic::DeadClosure { closure });
                (Rc::from([]), false)
            }
        };

        if let Some(b) = self.boundaries.get_mut(cb) {
            b.state = if first {
                Lifecycle::Mounting
            } else {
                Lifecycle::Updating
            };
            b.force = false;
        }
        self.reconcile_boundary(cb, root, &targets, point);
        if !first && self.ground.is_alive(point) {
            self.record(ChangeKind::ContentChanged, point);
        }
        let seq = self.sched.next_seq();
        if let Some(b) = self.boundaries.get_mut(cb) {
            b.state = Lifecycle::Mounted;
            b.updated_seq = seq;
        }
    }

    /// Unregisters the site for `node` after its content boundary was torn
    /// down, freeing or promoting roots as needed.
    pub(crate) fn release_site(&mut self, closure: ClosureId, node: AppliedId, root: AppliedId) {
        let Some(c) = self.closures.get_mut(closure) else {
            self.applied.remove(root);
            return;
        };
        let Some(site) = c.grounded.remove(&node) else {
            if root != c.shared_root {
                self.applied.remove(root);
            }
            return;
        };
        c.pending.remove(&node);

        if !site.true_pass {
            self.applied.remove(root);
        } else if let Some(next) = c.grounded.values_mut().next() {
            next.true_pass = true;
            let (promoted, promoted_point) = (next.content, next.point);
            if let Some(new_root) = self.boundaries.get(promoted).map(|b| b.root) {
                let old = mem::replace(&mut c.shared_root, new_root);
                self.applied.remove(old);
                if self.ground.is_alive(promoted_point) {
                    self.record(ChangeKind::Swap, promoted_point);
                }
            }
        }

        let orphaned_outlet = self
            .closures
            .get(closure)
            .is_some_and(|c| c.grounded.is_empty() && c.channel.is_some());
        if orphaned_outlet {
            self.destroy_closure(closure);
        }
    }

    /// Destroys a closure, its remaining sites, and its shared root.
    pub(crate) fn destroy_closure(&mut self, id: ClosureId) {
        let Some(closure) = self.closures.get(id) else {
            return;
        };
        let sites: Vec<BoundaryId> = closure.grounded.values().map(|s| s.content).collect();
        for cb in sites {
            self.destroy_boundary(cb);
        }
        let Some(closure) = self.closures.remove(id) else {
            return;
        };
        for u in &closure.upstream {
            if let Some(up) = self.closures.get_mut(*u) {
                up.chained.remove(&id);
            }
        }
        for d in &closure.chained {
            if let Some(down) = self.closures.get_mut(*d) {
                down.upstream.retain(|u| *u != id);
            }
        }
        let leftover = self
            .applied
            .get(closure.shared_root)
            .map(|n| n.children.clone())
            .unwrap_or_default();
        for child in leftover {
            self.destroy_applied(child);
        }
        self.applied.remove(closure.shared_root);

        if let Some(channel) = closure.channel {
            self.outlets.retain(|(_, c)| *c != id);
            self.release_channel(&channel);
        }
    }

    /// The outlet closure for `channel` on this host, created on first use.
    pub(crate) fn outlet_closure(&mut self, channel: &RemoteChannel) -> ClosureId {
        if let Some(&(_, id)) = self
            .outlets
            .iter()
            .find(|(c, id)| c.same_channel(channel) && self.closures.contains(*id))
        {
            return id;
        }
        let id = self.create_closure(None, channel.read());
        if let Some(c) = self.closures.get_mut(id) {
            c.channel = Some(channel.clone());
        }
        channel.subscribe(self.host, &self.inbox);
        self.outlets.push((channel.clone(), id));
        id
    }

    /// Unsubscribes this host from `channel` when nothing here uses it.
    pub(crate) fn release_channel(&mut self, channel: &RemoteChannel) {
        let outlet = self.outlets.iter().any(|(c, _)| c.same_channel(channel));
        let watched = self.boundaries.iter().any(|(_, b)| match &b.variant {
            BoundaryVariant::Source(src) => src.channels.iter().any(|c| c.same_channel(channel)),
            BoundaryVariant::Content { .. } => false,
        });
        if !outlet && !watched {
            channel.unsubscribe(self.host);
        }
    }

    /// Applies channel notices queued for this host.
    pub(crate) fn drain_inbox(&mut self) {
        let notices: Vec<RemoteChannel> = mem::take(&mut *self.inbox.borrow_mut());
        for channel in notices {
            let outlet = self
                .outlets
                .iter()
                .find(|(c, _)| c.same_channel(&channel))
                .map(|(_, id)| *id);
            if let Some(id) = outlet {
                for b in self.pre_refresh(id, channel.read()) {
                    self.mark(b);
                }
            }
            let watchers: Vec<BoundaryId> = self
                .boundaries
                .iter()
                .filter(|(_, b)| match &b.variant {
                    BoundaryVariant::Source(src) => {
                        src.channels.iter().any(|c| c.same_channel(&channel))
                    }
                    BoundaryVariant::Content { .. } => false,
                })
                .map(|(id, _)| id)
                .collect();
            for b in watchers {
                self.mark(b);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::rc::Rc;
    use alloc::string::String;
    use alloc::vec;
    use alloc::vec::Vec;

    use super::*;
    use crate::boundary::{RenderCx, Unit, unit};
    use crate::ground::GroundKind;
    use crate::scheduler::SchedulerConfig;
    use crate::target::{NodeKind, ProjectionSource, Props, TargetNode};

    fn texts(engine: &Engine) -> Vec<String> {
        let store = engine.ground();
        let mut out = Vec::new();
        let mut stack = vec![engine.root_point()];
        while let Some(p) = stack.pop() {
            if let Some(t) = store.payload(p).and_then(|pl| pl.props.str("text")) {
                out.push(String::from(t));
            }
            let kids: Vec<_> = store.children(p).collect();
            stack.extend(kids.into_iter().rev());
        }
        out
    }

    fn text_nodes(engine: &Engine) -> usize {
        engine
            .applied
            .iter()
            .filter(|(_, n)| matches!(&n.kind, NodeKind::Output(t) if &**t == "#text"))
            .count()
    }

    /// Grounds its content once per slot in `from..to`.
    fn frame() -> Rc<dyn Unit> {
        unit("Frame", |cx: &mut RenderCx<'_>| {
            let from = cx.props().int("from").unwrap_or(0);
            let to = cx.props().int("to").unwrap_or(1);
            TargetNode::output("frame")
                .children((from..to).map(|i| TargetNode::output("slot").key(i).child(cx.content())))
        })
    }

    /// Hands a text node labelled by its `label` state to a frame.
    fn producer() -> Rc<dyn Unit> {
        let frame = frame();
        unit("Producer", move |cx: &mut RenderCx<'_>| {
            let label = cx.state().str("label").unwrap_or("A");
            TargetNode::boundary(&frame)
                .prop("from", cx.props().int("from").unwrap_or(0))
                .prop("to", cx.props().int("to").unwrap_or(1))
                .child(TargetNode::text(label))
        })
    }

    fn mount(to: i64) -> (Engine, BoundaryId) {
        let mut engine = Engine::new(SchedulerConfig::batched());
        let root = engine
            .mount(&producer(), Props::new().with("to", to))
            .unwrap();
        let _ = engine.flush();
        (engine, root)
    }

    fn sites_of(engine: &Engine) -> &ContentClosure {
        engine
            .closures
            .iter()
            .map(|(_, c)| c)
            .find(|c| !c.grounded.is_empty())
            .expect("frame content is grounded")
    }

    #[test]
    fn single_site_is_zero_copy() {
        let (engine, _) = mount(1);
        assert_eq!(texts(&engine), vec!["A"]);
        // Exactly the content's own node: no copy was allocated.
        assert_eq!(text_nodes(&engine), 1);
        let site = sites_of(&engine).grounded.values().next().unwrap();
        assert!(site.true_pass);
    }

    #[test]
    fn second_site_is_a_distinct_copy() {
        let (engine, _) = mount(2);
        assert_eq!(texts(&engine), vec!["A", "A"]);
        assert_eq!(text_nodes(&engine), 2);

        let closure = sites_of(&engine);
        let roots: Vec<AppliedId> = closure
            .grounded
            .values()
            .map(|s| engine.boundaries.get(s.content).unwrap().root)
            .collect();
        assert_eq!(roots.len(), 2);
        assert_ne!(roots[0], roots[1]);
        assert!(roots.contains(&closure.shared_root));
        assert_eq!(closure.grounded.values().filter(|s| s.true_pass).count(), 1);

        let copies: Vec<&Vec<AppliedId>> = roots
            .iter()
            .map(|r| &engine.applied.get(*r).unwrap().children)
            .collect();
        assert_ne!(copies[0], copies[1]);
    }

    #[test]
    fn producer_update_reaches_both_sites() {
        let (mut engine, root) = mount(2);
        engine.set_state(root, "label", "B").unwrap();
        let changes = engine.flush();
        assert_eq!(texts(&engine), vec!["B", "B"]);
        assert_eq!(changes.count(ChangeKind::ContentChanged), 2);
        assert_eq!(changes.count(ChangeKind::Update), 2);
        assert_eq!(text_nodes(&engine), 2);
    }

    #[test]
    fn dropping_the_true_pass_promotes_the_copy() {
        let (mut engine, root) = mount(2);
        engine
            .set_props(root, Props::new().with("from", 1).with("to", 2))
            .unwrap();
        let changes = engine.flush();
        assert_eq!(texts(&engine), vec!["A"]);
        assert_eq!(text_nodes(&engine), 1);

        let closure = sites_of(&engine);
        let site = closure.grounded.values().next().unwrap();
        assert!(site.true_pass);
        assert_eq!(
            engine.boundaries.get(site.content).unwrap().root,
            closure.shared_root
        );
        assert_eq!(changes.count(ChangeKind::Swap), 1);
        let swap = changes
            .records
            .iter()
            .find(|r| r.kind == ChangeKind::Swap)
            .unwrap();
        assert_eq!(swap.point, site.point);
        assert_eq!(engine.ground().kind(swap.point), GroundKind::Projection);
    }

    #[test]
    fn emptied_content_destroys_site_output() {
        let frame = frame();
        let producer = unit("Producer", move |cx: &mut RenderCx<'_>| {
            let node = TargetNode::boundary(&frame);
            if cx.state().int("empty") == Some(1) {
                node
            } else {
                node.child(TargetNode::text("x"))
            }
        });
        let mut engine = Engine::new(SchedulerConfig::synchronous());
        let root = engine.mount(&producer, Props::new()).unwrap();
        assert_eq!(texts(&engine), vec!["x"]);
        engine.set_state(root, "empty", 1).unwrap();
        assert!(texts(&engine).is_empty());
        assert_eq!(text_nodes(&engine), 0);
    }

    #[test]
    fn dead_closure_renders_nothing() {
        let stale = ClosureId {
            idx: 999,
            generation: 0,
        };
        let app = unit("App", move |_: &mut RenderCx<'_>| {
            TargetNode::output("div")
                .child(TargetNode::projection(ProjectionSource::Content(stale)))
        });
        let mut engine = Engine::new(SchedulerConfig::batched());
        engine.mount(&app, Props::new()).unwrap();
        let changes = engine.flush();
        assert!(
            changes
                .diagnostics
                .contains(&Diagnostic::DeadClosure { closure: stale })
        );
        assert_eq!(changes.count(ChangeKind::Create), 1);
    }

    #[test]
    fn chained_closures_are_linked_both_ways() {
        let mut engine = Engine::new(SchedulerConfig::batched());
        let inner = engine.create_closure(None, Rc::from([]));
        let outer = engine.create_closure(
            None,
            vec![TargetNode::projection(ProjectionSource::Content(inner))].into(),
        );
        assert!(engine.closures.get(inner).unwrap().chained.contains(&outer));
        assert_eq!(engine.closures.get(outer).unwrap().upstream, vec![inner]);

        let _ = engine.pre_refresh(outer, Rc::from([]));
        assert!(engine.closures.get(inner).unwrap().chained.is_empty());
        assert_eq!(engine.closures.get(outer).unwrap().version, 1);

        engine.destroy_closure(inner);
        engine.destroy_closure(outer);
        assert_eq!(engine.closure_count(), 0);
    }
}
