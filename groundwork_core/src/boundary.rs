// Copyright 2026 the Groundwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Boundaries: the units of rendering and of content grounding.
//!
//! A *source* boundary is an instance of a [`Unit`]. It owns a render
//! function, props, state, and a content closure holding the children its
//! parent gave it. A *content* boundary has no render function; it mirrors
//! a closure's content at one grounding site.
//!
//! Boundaries move through [`Lifecycle`] states:
//!
//! ```text
//! Unmounted -> Mounting -> Mounted <-> Updating
//!                              \          /
//!                               Unmounting -> Destroyed
//! ```
//!
//! Destruction is idempotent: destroying a boundary that is already being
//! torn down, or whose handle is stale, does nothing.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::fmt;
use core::mem;

use understory_dirty::EagerPolicy;

use crate::applied::{AppliedId, AppliedNode};
use crate::arena::arena_id;
use crate::channel::RemoteChannel;
use crate::closure::ClosureId;
use crate::dirty;
use crate::engine::Engine;
use crate::ground::GroundId;
use crate::record::{Diagnostic, Hook};
use crate::target::{ProjectionSource, PropValue, Props, TargetNode};
use crate::trace::BoundaryRenderEvent;

arena_id!(
    /// A handle to a boundary.
    BoundaryId
);

// ---------------------------------------------------------------------------
// Units and render functions
// ---------------------------------------------------------------------------

/// A render function.
///
/// Returning [`Rendered::Next`] replaces the function for this and every
/// later render of the boundary. A chain that runs past the rerender limit
/// is dropped, and the next render starts again from [`Unit::instantiate`].
pub type RenderFn = Box<dyn FnMut(&mut RenderCx<'_>) -> Rendered>;

/// What a render function produced.
pub enum Rendered {
    /// The boundary's output for this pass.
    Tree(TargetNode),
    /// Install this function and call it right away.
    Next(RenderFn),
}

impl fmt::Debug for Rendered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tree(t) => f.debug_tuple("Tree").field(t).finish(),
            Self::Next(_) => f.write_str("Next(..)"),
        }
    }
}

/// Answer of [`Unit::should_update`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ShouldUpdate {
    /// Re-render.
    Yes,
    /// Keep the previous output.
    No,
    /// Re-render when props differ or an update was forced.
    #[default]
    Default,
}

/// A renderable unit type.
pub trait Unit {
    /// Identity used for pairing.
    ///
    /// Nodes of units with different names never match. A paired instance
    /// whose unit handle changed keeps its state, drops its render function,
    /// and re-renders with the new unit.
    fn name(&self) -> &str;

    /// Creates the render function for a new instance.
    fn instantiate(&self, props: &Props) -> RenderFn;

    /// Decides whether an instance re-renders when its parent does.
    fn should_update(&self, old: &Props, new: &Props) -> ShouldUpdate {
        _ = (old, new);
        ShouldUpdate::Default
    }

    /// Props whose change remounts the instance instead of updating it.
    fn immutable_props(&self) -> &[&'static str] {
        &[]
    }
}

/// A [`Unit`] backed by a plain render closure.
pub struct FnUnit<F> {
    name: Rc<str>,
    render: Rc<F>,
    immutable: &'static [&'static str],
}

impl<F> fmt::Debug for FnUnit<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnUnit")
            .field("name", &self.name)
            .field("immutable", &self.immutable)
            .finish_non_exhaustive()
    }
}

impl<F> FnUnit<F>
where
    F: Fn(&mut RenderCx<'_>) -> TargetNode + 'static,
{
    /// Creates a unit named `name`.
    pub fn new(name: &str, render: F) -> Self {
        Self {
            name: name.into(),
            render: Rc::new(render),
            immutable: &[],
        }
    }

    /// Declares props whose change remounts instances.
    #[must_use]
    pub fn immutable(mut self, names: &'static [&'static str]) -> Self {
        self.immutable = names;
        self
    }
}

impl<F> Unit for FnUnit<F>
where
    F: Fn(&mut RenderCx<'_>) -> TargetNode + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn instantiate(&self, _props: &Props) -> RenderFn {
        let render = self.render.clone();
        Box::new(move |cx| Rendered::Tree((*render)(cx)))
    }

    fn immutable_props(&self) -> &[&'static str] {
        self.immutable
    }
}

/// Shorthand for an [`FnUnit`] behind an `Rc<dyn Unit>`.
pub fn unit<F>(name: &str, render: F) -> Rc<dyn Unit>
where
    F: Fn(&mut RenderCx<'_>) -> TargetNode + 'static,
{
    Rc::new(FnUnit::new(name, render))
}

/// What a render function sees.
#[derive(Debug)]
pub struct RenderCx<'a> {
    boundary: BoundaryId,
    props: &'a Props,
    state: &'a mut Props,
    content: ClosureId,
    content_present: bool,
    channels: &'a mut Vec<RemoteChannel>,
    invalidated: bool,
    content_interest: bool,
}

impl RenderCx<'_> {
    /// The boundary being rendered.
    #[must_use]
    pub fn boundary(&self) -> BoundaryId {
        self.boundary
    }

    /// Current props.
    #[must_use]
    pub fn props(&self) -> &Props {
        self.props
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> &Props {
        self.state
    }

    /// Sets a state entry. A change invalidates the current render.
    pub fn set_state(&mut self, name: &str, value: impl Into<PropValue>) {
        if self.state.set(name, value) {
            self.invalidated = true;
        }
    }

    /// Requests another render once this one returns.
    pub fn invalidate(&mut self) {
        self.invalidated = true;
    }

    /// A projection marker for the content this boundary was given.
    #[must_use]
    pub fn content(&self) -> TargetNode {
        TargetNode::projection(ProjectionSource::Content(self.content))
    }

    /// The closure holding this boundary's content.
    #[must_use]
    pub fn content_closure(&self) -> ClosureId {
        self.content
    }

    /// Whether the boundary was given any content.
    ///
    /// Calling this subscribes the boundary: it re-renders whenever its
    /// content changes.
    pub fn has_content(&mut self) -> bool {
        self.content_interest = true;
        self.content_present
    }

    /// Whether any source currently feeds `channel`.
    ///
    /// Calling this subscribes the boundary to changes of the channel.
    pub fn channel_has_content(&mut self, channel: &RemoteChannel) -> bool {
        if !self.channels.iter().any(|c| c.same_channel(channel)) {
            self.channels.push(channel.clone());
        }
        channel.has_content()
    }
}

// ---------------------------------------------------------------------------
// Boundary records
// ---------------------------------------------------------------------------

/// Lifecycle state of a boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    /// Created but not yet wired up.
    Unmounted,
    /// Instantiated; the first pass has not completed.
    Mounting,
    /// Idle.
    Mounted,
    /// Re-rendering.
    Updating,
    /// Being torn down.
    Unmounting,
    /// Gone.
    Destroyed,
}

pub(crate) struct SourceState {
    pub(crate) unit: Rc<dyn Unit>,
    pub(crate) renderer: Option<RenderFn>,
    pub(crate) props: Props,
    pub(crate) state: Props,
    pub(crate) content: ClosureId,
    pub(crate) channels: Vec<RemoteChannel>,
}

impl fmt::Debug for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceState")
            .field("unit", &self.unit.name())
            .field("instantiated", &self.renderer.is_some())
            .field("props", &self.props)
            .field("state", &self.state)
            .field("content", &self.content)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub(crate) enum BoundaryVariant {
    Source(SourceState),
    Content {
        closure: ClosureId,
        /// The projection node this boundary grounds content for.
        site: AppliedId,
    },
}

#[derive(Debug)]
pub(crate) struct Boundary {
    pub(crate) state: Lifecycle,
    pub(crate) variant: BoundaryVariant,
    /// The boundary whose pass created this one.
    pub(crate) parent: Option<BoundaryId>,
    /// The applied node this boundary stands for.
    pub(crate) node: Option<AppliedId>,
    /// Fixed for the boundary's lifetime.
    pub(crate) point: GroundId,
    pub(crate) root: AppliedId,
    pub(crate) inner: Vec<BoundaryId>,
    pub(crate) dirty_seq: u64,
    pub(crate) updated_seq: u64,
    /// Cycle that `updates` counts for.
    pub(crate) cycle: u64,
    pub(crate) updates: u32,
    pub(crate) force: bool,
}

impl Boundary {
    fn new(
        variant: BoundaryVariant,
        parent: Option<BoundaryId>,
        node: Option<AppliedId>,
        point: GroundId,
        root: AppliedId,
    ) -> Self {
        Self {
            state: Lifecycle::Unmounted,
            variant,
            parent,
            node,
            point,
            root,
            inner: Vec::new(),
            dirty_seq: 0,
            updated_seq: 0,
            cycle: 0,
            updates: 0,
            force: false,
        }
    }

    pub(crate) fn content(
        closure: ClosureId,
        site: AppliedId,
        parent: Option<BoundaryId>,
        point: GroundId,
        root: AppliedId,
    ) -> Self {
        let mut b = Self::new(
            BoundaryVariant::Content { closure, site },
            parent,
            Some(site),
            point,
            root,
        );
        b.state = Lifecycle::Mounting;
        b
    }

    pub(crate) fn source(&self) -> Option<&SourceState> {
        match &self.variant {
            BoundaryVariant::Source(s) => Some(s),
            BoundaryVariant::Content { .. } => None,
        }
    }

    pub(crate) fn source_mut(&mut self) -> Option<&mut SourceState> {
        match &mut self.variant {
            BoundaryVariant::Source(s) => Some(s),
            BoundaryVariant::Content { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Engine operations
// ---------------------------------------------------------------------------

impl Engine {
    /// Creates a source boundary for `unit` grounded at `point`.
    pub(crate) fn instantiate(
        &mut self,
        parent: Option<BoundaryId>,
        node: Option<AppliedId>,
        unit: Rc<dyn Unit>,
        props: Props,
        content: Rc<[TargetNode]>,
        point: GroundId,
    ) -> BoundaryId {
        let root = self.applied.insert(AppliedNode::root());
        let closure = self.create_closure(parent, content);
        let source = SourceState {
            unit,
            renderer: None,
            props,
            state: Props::new(),
            content: closure,
            channels: Vec::new(),
        };
        let b = self.boundaries.insert(Boundary::new(
            BoundaryVariant::Source(source),
            parent,
            node,
            point,
            root,
        ));
        if let Some(c) = self.closures.get_mut(closure) {
            c.owner = Some(b);
        }
        if let Some(p) = parent {
            self.adopt(p, b);
        }
        if let Some(boundary) = self.boundaries.get_mut(b) {
            boundary.state = Lifecycle::Mounting;
        }
        self.hook(b, Hook::PreMount);
        b
    }

    /// Records `child` as an inner boundary of `parent`.
    pub(crate) fn adopt(&mut self, parent: BoundaryId, child: BoundaryId) {
        if let Some(p) = self.boundaries.get_mut(parent) {
            p.inner.push(child);
            let _ = self
                .sched
                .dirty
                .add_dependency(child.idx, parent.idx, dirty::CASCADE);
        }
    }

    /// Runs the render loop of a source boundary.
    ///
    /// Returns `None` when no tree was produced (renderer chain runaway).
    /// A runaway keeps the channels and content interest of the previous
    /// render.
    fn render(&mut self, b: BoundaryId) -> Option<TargetNode> {
        let max = self.config.max_rerenders;
        let (mut renderer, props, mut state, content, previous) = {
            let src = self.boundaries.get_mut(b)?.source_mut()?;
            let renderer = match src.renderer.take() {
                Some(r) => r,
                None => src.unit.instantiate(&src.props),
            };
            (
                renderer,
                src.props.clone(),
                mem::take(&mut src.state),
                src.content,
                mem::take(&mut src.channels),
            )
        };
        let content_present = self
            .closures
            .get(content)
            .is_some_and(|c| !c.target.is_empty());

        let mut channels = Vec::new();
        let mut interest = false;
        let mut renders = 0_u32;
        let mut chain = 0_u32;
        let mut runaway = false;
        let mut last = None;
        loop {
            let mut cx = RenderCx {
                boundary: b,
                props: &props,
                state: &mut state,
                content,
                content_present,
                channels: &mut channels,
                invalidated: false,
                content_interest: false,
            };
            let out = renderer(&mut cx);
            let invalidated = cx.invalidated;
            interest |= cx.content_interest;
            match out {
                Rendered::Next(next) => {
                    renderer = next;
                    chain += 1;
                    if chain > max + 1 {
                        self.diagnose(Diagnostic::RendererChainLimit { boundary: b });
                        runaway = true;
                        break;
                    }
                }
                Rendered::Tree(tree) => {
                    renders += 1;
                    last = Some(tree);
                    if !invalidated {
                        break;
                    }
                    if renders > max {
                        self.diagnose(Diagnostic::RerenderLimit {
                            boundary: b,
                            renders,
                        });
                        break;
                    }
                }
            }
        }

        if runaway && last.is_none() {
            channels = previous.clone();
            interest = self
                .closures
                .get(content)
                .is_some_and(|c| c.interested.contains(&b));
        }
        if let Some(src) = self.boundaries.get_mut(b).and_then(Boundary::source_mut) {
            src.renderer = (!runaway).then_some(renderer);
            src.state = state;
            src.channels = channels.clone();
        }
        if let Some(c) = self.closures.get_mut(content) {
            if interest {
                c.interested.insert(b);
            } else {
                c.interested.remove(&b);
            }
        }
        for ch in &channels {
            ch.subscribe(self.host, &self.inbox);
        }
        for ch in previous {
            if !channels.iter().any(|c| c.same_channel(&ch)) {
                self.release_channel(&ch);
            }
        }

        let e = BoundaryRenderEvent {
            cycle: self.cycle,
            boundary: b.index(),
            renders,
            timestamp: self.sched.now(),
        };
        self.tracer().boundary_render(&e);
        last
    }

    /// Renders a source boundary and reconciles its output, including
    /// nested work.
    pub(crate) fn update_source(&mut self, b: BoundaryId) {
        let Some(boundary) = self.boundaries.get_mut(b) else {
            self.diagnose(Diagnostic::StaleBoundary { boundary: b });
            return;
        };
        if matches!(
            boundary.state,
            Lifecycle::Unmounting | Lifecycle::Destroyed
        ) {
            return;
        }
        let first = boundary.state == Lifecycle::Mounting;
        let (root, point) = (boundary.root, boundary.point);
        let force = mem::take(&mut boundary.force);
        if !first {
            boundary.state = Lifecycle::Updating;
            self.hook(b, Hook::BeforeUpdate);
        }

        // A runaway after mount leaves the applied output as it was.
        match self.render(b) {
            Some(tree) => self.reconcile_boundary(b, root, &[tree], point),
            None if first => self.reconcile_boundary(b, root, &[], point),
            None => {}
        }

        let content = self
            .boundaries
            .get(b)
            .and_then(Boundary::source)
            .map(|s| s.content);
        if let Some(content) = content {
            self.apply_refresh(content, force);
        }

        let seq = self.sched.next_seq();
        let Some(boundary) = self.boundaries.get_mut(b) else {
            return;
        };
        boundary.state = Lifecycle::Mounted;
        boundary.updated_seq = seq;
        self.hook(
            b,
            if first {
                Hook::PostMount
            } else {
                Hook::PostUpdate
            },
        );
    }

    /// Reconciles `targets` into `root` at `point` and runs the nested work
    /// the pass produced.
    pub(crate) fn reconcile_boundary(
        &mut self,
        owner: BoundaryId,
        root: AppliedId,
        targets: &[TargetNode],
        point: GroundId,
    ) {
        let work = self.reconcile_into(owner, root, targets, point);
        self.run_work(work);
    }

    /// Tears down a boundary, its output, and everything it owns.
    pub(crate) fn destroy_boundary(&mut self, b: BoundaryId) {
        let Some(boundary) = self.boundaries.get_mut(b) else {
            return;
        };
        if matches!(
            boundary.state,
            Lifecycle::Unmounting | Lifecycle::Destroyed
        ) {
            return;
        }
        boundary.state = Lifecycle::Unmounting;
        let root = boundary.root;
        let is_source = boundary.source().is_some();
        if is_source {
            self.hook(b, Hook::PreUnmount);
        }

        let top = self
            .applied
            .get(root)
            .map(|n| n.children.clone())
            .unwrap_or_default();
        for child in top {
            if self.applied.get(child).is_some_and(|n| n.parent == Some(root)) {
                self.destroy_applied(child);
            }
        }
        if let Some(root_node) = self.applied.get_mut(root) {
            root_node.children.clear();
        }
        let inner = self
            .boundaries
            .get(b)
            .map(|x| x.inner.clone())
            .unwrap_or_default();
        for i in inner {
            self.destroy_boundary(i);
        }

        let Some(boundary) = self.boundaries.remove(b) else {
            return;
        };
        if let Some(p) = boundary.parent.and_then(|p| self.boundaries.get_mut(p)) {
            p.inner.retain(|x| *x != b);
        }
        self.sched.dirty.remove_key(b.idx);

        match boundary.variant {
            BoundaryVariant::Source(src) => {
                self.destroy_closure(src.content);
                self.applied.remove(root);
                for ch in &src.channels {
                    self.release_channel(ch);
                }
            }
            BoundaryVariant::Content { closure, site } => {
                self.release_site(closure, site, root);
            }
        }
    }

    /// Marks `b` and every boundary below it for a forced re-render.
    pub(crate) fn force_region(&mut self, b: BoundaryId) -> Vec<BoundaryId> {
        self.sched
            .dirty
            .mark_with(b.idx, dirty::CASCADE, &EagerPolicy);
        let affected: Vec<u32> = self
            .sched
            .dirty
            .drain(dirty::CASCADE)
            .affected()
            .deterministic()
            .run()
            .collect();
        let mut out = Vec::with_capacity(affected.len());
        for idx in affected {
            if let Some(id) = self.boundaries.id_at(idx) {
                if let Some(boundary) = self.boundaries.get_mut(id) {
                    boundary.force = true;
                }
                out.push(id);
            }
        }
        out
    }
}
