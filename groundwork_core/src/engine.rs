// Copyright 2026 the Groundwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The engine: one host's boundary tree, ground tree, and cycle loop.
//!
//! An [`Engine`] owns every store for one host. Callers mount a root
//! [`Unit`], push state or props into boundaries, and drive the two cycle
//! phases either synchronously or through [`poll`](Engine::poll):
//!
//! ```text
//!   mark_dirty / set_state / channel notice
//!       │
//!       ▼
//!   run_update_cycle ──► render + pair + ground ──► CycleChanges
//!                                                       │
//!                 ┌─────────────────────────────────────┘
//!                 ▼
//!   run_render_cycle ──► Renderer::apply + HookSubscriber::call
//! ```
//!
//! Within an update cycle, dirty boundaries are processed in tree order:
//! ancestors first, then siblings left to right. A boundary that was already
//! re-rendered by its parent after its own dirty mark is skipped. Marks made
//! while the cycle runs are folded into further batches of the same cycle.

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;
use core::mem;

use crate::applied::{AppliedId, AppliedStore};
use crate::arena::Arena;
use crate::backend::{HookSubscriber, Renderer};
use crate::boundary::{Boundary, BoundaryId, BoundaryVariant, Lifecycle, Unit};
use crate::channel::{HostId, Inbox, RemoteChannel};
use crate::closure::{ClosureId, ContentClosure};
use crate::ground::{GroundId, GroundKind, GroundStore};
use crate::record::{
    ChangeKind, ChangeRecord, CycleChanges, Diagnostic, EngineError, Hook, LifecycleCall,
};
use crate::scheduler::{Armed, HookTiming, Scheduler, SchedulerConfig};
use crate::target::{Key, NodeKind, PropValue, Props};
use crate::time::HostTime;
use crate::trace::{
    CycleBeginEvent, CycleEndEvent, DiagnosticEvent, FlushEvent, PhaseBeginEvent, PhaseEndEvent,
    PhaseKind, TraceSink, Tracer,
};

/// One reconciliation host.
pub struct Engine {
    pub(crate) host: HostId,
    pub(crate) config: SchedulerConfig,
    pub(crate) ground: GroundStore,
    pub(crate) applied: AppliedStore,
    pub(crate) boundaries: Arena<BoundaryId, Boundary>,
    pub(crate) closures: Arena<ClosureId, ContentClosure>,
    pub(crate) sched: Scheduler,
    /// Output accumulated since the last render cycle.
    pub(crate) changes: CycleChanges,
    renderer: Option<Box<dyn Renderer>>,
    hooks: Option<Box<dyn HookSubscriber>>,
    sink: Option<Box<dyn TraceSink>>,
    root_point: GroundId,
    root: Option<BoundaryId>,
    /// Outlet closure per consumed channel.
    pub(crate) outlets: Vec<(RemoteChannel, ClosureId)>,
    pub(crate) inbox: Inbox,
    pub(crate) cycle: u64,
    in_update: bool,
    /// Records emitted during the current update cycle.
    emitted: u32,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("host", &self.host)
            .field("config", &self.config)
            .field("cycle", &self.cycle)
            .field("root", &self.root)
            .field("boundaries", &self.boundaries.len())
            .field("closures", &self.closures.len())
            .field("applied", &self.applied.len())
            .field("points", &self.ground.live_count())
            .field("pending_records", &self.changes.records.len())
            .finish_non_exhaustive()
    }
}

impl Drop for Engine {
    /// Takes this host's sources and subscriptions out of every channel it
    /// touched. Channels outlive hosts.
    fn drop(&mut self) {
        let mut channels: Vec<RemoteChannel> = Vec::new();
        let mut keep = |ch: &RemoteChannel| {
            if !channels.iter().any(|c| c.same_channel(ch)) {
                channels.push(ch.clone());
            }
        };
        for (_, node) in self.applied.iter() {
            if let NodeKind::Remote { channel, .. } = &node.kind {
                keep(channel);
            }
        }
        for (ch, _) in &self.outlets {
            keep(ch);
        }
        for (_, b) in self.boundaries.iter() {
            if let BoundaryVariant::Source(src) = &b.variant {
                src.channels.iter().for_each(&mut keep);
            }
        }
        for ch in channels {
            ch.release_host(self.host);
        }
        self.inbox.borrow_mut().clear();
    }
}

impl Engine {
    /// Creates an empty host with the given scheduling configuration.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        let mut ground = GroundStore::new();
        let root_point = ground.create_point(GroundKind::Root, None, None);
        Self {
            host: HostId::next(),
            config,
            ground,
            applied: AppliedStore::new(),
            boundaries: Arena::new(),
            closures: Arena::new(),
            sched: Scheduler::new(),
            changes: CycleChanges::default(),
            renderer: None,
            hooks: None,
            sink: None,
            root_point,
            root: None,
            outlets: Vec::new(),
            inbox: Rc::new(RefCell::new(Vec::new())),
            cycle: 0,
            in_update: false,
            emitted: 0,
        }
    }

    /// This host's identity in remote channels.
    #[must_use]
    pub fn host(&self) -> HostId {
        self.host
    }

    /// The scheduling configuration.
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    // -- Backends --

    /// Installs the renderer that receives each cycle's records.
    pub fn set_renderer(&mut self, renderer: impl Renderer + 'static) {
        self.renderer = Some(Box::new(renderer));
    }

    /// Installs the subscriber that receives lifecycle calls.
    pub fn set_hook_subscriber(&mut self, hooks: impl HookSubscriber + 'static) {
        self.hooks = Some(Box::new(hooks));
    }

    /// Installs a trace sink. Events are only emitted with the `trace`
    /// feature enabled.
    pub fn set_trace_sink(&mut self, sink: Box<dyn TraceSink>) {
        self.sink = Some(sink);
    }

    // -- Mounting --

    /// Mounts `unit` as the root boundary under the root point.
    ///
    /// The first render happens in the next update cycle.
    pub fn mount(&mut self, unit: &Rc<dyn Unit>, props: Props) -> Result<BoundaryId, EngineError> {
        if self.root.is_some_and(|r| self.boundaries.contains(r)) {
            return Err(EngineError::AlreadyMounted);
        }
        let point = self.ground.create_point(GroundKind::Boundary, None, None);
        self.ground.insert_after(self.root_point, None, point);
        let b = self.instantiate(None, None, unit.clone(), props, Rc::from([]), point);
        self.root = Some(b);
        self.mark(b);
        Ok(b)
    }

    /// Destroys the root boundary and everything below it.
    pub fn unmount(&mut self) -> Result<(), EngineError> {
        let root = self.root.take().ok_or(EngineError::NoRoot)?;
        let point = self.boundaries.get(root).map(|b| b.point);
        self.destroy_boundary(root);
        if let Some(p) = point.filter(|p| self.ground.is_alive(*p)) {
            self.destroy_point(p);
        }
        self.arm_render();
        Ok(())
    }

    // -- External updates --

    /// Sets one state entry of a source boundary, marking it dirty when the
    /// value changed.
    pub fn set_state(
        &mut self,
        b: BoundaryId,
        name: &str,
        value: impl Into<PropValue>,
    ) -> Result<(), EngineError> {
        let src = self
            .boundaries
            .get_mut(b)
            .ok_or(EngineError::StaleBoundary(b))?
            .source_mut()
            .ok_or(EngineError::NotSource(b))?;
        if src.state.set(name, value) {
            self.mark(b);
        }
        Ok(())
    }

    /// Replaces the props of a source boundary, marking it dirty when they
    /// differ.
    ///
    /// Props of inner boundaries are overwritten again whenever their parent
    /// re-renders; this is mostly useful for the root.
    pub fn set_props(&mut self, b: BoundaryId, props: Props) -> Result<(), EngineError> {
        let src = self
            .boundaries
            .get_mut(b)
            .ok_or(EngineError::StaleBoundary(b))?
            .source_mut()
            .ok_or(EngineError::NotSource(b))?;
        if src.props != props {
            src.props = props;
            self.mark(b);
        }
        Ok(())
    }

    /// Schedules `b` for the next update cycle.
    pub fn mark_dirty(&mut self, b: BoundaryId) -> Result<(), EngineError> {
        if !self.boundaries.contains(b) {
            return Err(EngineError::StaleBoundary(b));
        }
        self.mark(b);
        Ok(())
    }

    /// Schedules `b` to re-render even though nothing it reads changed.
    ///
    /// Its content is re-grounded at every site as well.
    pub fn force_update(&mut self, b: BoundaryId) -> Result<(), EngineError> {
        let boundary = self
            .boundaries
            .get_mut(b)
            .ok_or(EngineError::StaleBoundary(b))?;
        boundary.force = true;
        self.mark(b);
        Ok(())
    }

    /// Forces `b` and every boundary below it to re-render in one cycle.
    pub fn force_update_deep(&mut self, b: BoundaryId) -> Result<(), EngineError> {
        let boundary = self
            .boundaries
            .get_mut(b)
            .ok_or(EngineError::StaleBoundary(b))?;
        boundary.force = true;
        self.mark_quiet(b);
        for inner in self.force_region(b) {
            self.mark_quiet(inner);
        }
        self.arm_update();
        Ok(())
    }

    // -- Cycles --

    /// Runs one update cycle: renders and grounds every dirty boundary.
    ///
    /// Does nothing when called re-entrantly.
    pub fn run_update_cycle(&mut self) {
        if self.in_update {
            return;
        }
        self.in_update = true;
        self.sched.clear_update();
        self.cycle += 1;
        self.emitted = 0;
        let cycle = self.cycle;
        let now = self.sched.now();
        self.tracer().cycle_begin(&CycleBeginEvent {
            cycle,
            timestamp: now,
        });
        self.tracer().phase_begin(&PhaseBeginEvent {
            cycle,
            phase: PhaseKind::Batch,
            timestamp: now,
        });

        let mut updated = 0_u32;
        loop {
            self.drain_inbox();
            let mut batch: Vec<(Vec<u32>, BoundaryId)> = self
                .sched
                .drain()
                .into_iter()
                .filter_map(|idx| self.boundaries.id_at(idx))
                .map(|b| (self.path_key(b), b))
                .collect();
            if batch.is_empty() {
                break;
            }
            batch.sort();
            for (_, b) in batch {
                if self.refresh_boundary(b) {
                    updated += 1;
                }
            }
        }

        let now = self.sched.now();
        self.tracer().phase_end(&PhaseEndEvent {
            cycle,
            phase: PhaseKind::Batch,
            timestamp: now,
        });
        let records = self.emitted;
        self.tracer().cycle_end(&CycleEndEvent {
            cycle,
            timestamp: now,
            updated,
            records,
        });
        self.in_update = false;
        self.arm_render();
    }

    /// Delivers pending output to the renderer and hook subscriber, and
    /// returns it.
    pub fn run_render_cycle(&mut self) -> CycleChanges {
        self.sched.clear_render();
        let changes = mem::take(&mut self.changes);
        if !changes.is_empty() {
            self.deliver(&changes, false);
        }
        self.ground.release_held();
        changes
    }

    /// Runs any pending update cycle, then the render cycle.
    pub fn flush(&mut self) -> CycleChanges {
        if self.sched.update_armed() || self.inbox_pending() {
            self.run_update_cycle();
        }
        self.run_render_cycle()
    }

    /// Advances the host clock to `now` and runs the phases that are due.
    ///
    /// Returns whether anything ran.
    pub fn poll(&mut self, now: HostTime) -> bool {
        self.sched.set_now(now);
        let mut ran = false;
        if self.sched.update_due() || self.inbox_pending() {
            self.run_update_cycle();
            ran = true;
        }
        if self.sched.render_due() {
            let _ = self.run_render_cycle();
            ran = true;
        }
        ran
    }

    /// When [`poll`](Self::poll) next has work to do.
    ///
    /// Pending channel notices are due immediately.
    #[must_use]
    pub fn next_deadline(&self) -> Option<HostTime> {
        if self.inbox_pending() {
            return Some(self.sched.now());
        }
        self.sched.next_deadline()
    }

    /// Drops every dirty mark and the armed update phase.
    ///
    /// Output that was already produced stays pending for the render phase,
    /// and queued channel notices are kept.
    pub fn cancel_pending(&mut self) {
        let _ = self.sched.drain();
        self.sched.clear_update();
    }

    // -- Inspection --

    /// The ground tree.
    #[must_use]
    pub fn ground(&self) -> &GroundStore {
        &self.ground
    }

    /// The host container point every root boundary is grounded under.
    #[must_use]
    pub fn root_point(&self) -> GroundId {
        self.root_point
    }

    /// The mounted root boundary.
    #[must_use]
    pub fn root(&self) -> Option<BoundaryId> {
        self.root.filter(|r| self.boundaries.contains(*r))
    }

    /// Lifecycle state of `b`; stale handles report [`Lifecycle::Destroyed`].
    #[must_use]
    pub fn lifecycle(&self, b: BoundaryId) -> Lifecycle {
        self.boundaries
            .get(b)
            .map_or(Lifecycle::Destroyed, |x| x.state)
    }

    /// The ground point `b` is grounded at.
    #[must_use]
    pub fn boundary_point(&self, b: BoundaryId) -> Option<GroundId> {
        self.boundaries.get(b).map(|x| x.point)
    }

    /// Boundaries created by the passes of `b`, in creation order.
    #[must_use]
    pub fn inner_boundaries(&self, b: BoundaryId) -> &[BoundaryId] {
        self.boundaries.get(b).map_or(&[], |x| x.inner.as_slice())
    }

    /// The content closure of a source boundary.
    #[must_use]
    pub fn content_closure(&self, b: BoundaryId) -> Option<ClosureId> {
        self.boundaries.get(b)?.source().map(|s| s.content)
    }

    /// The first live applied node with the given key.
    #[must_use]
    pub fn find_keyed(&self, key: &Key) -> Option<AppliedId> {
        self.applied
            .iter()
            .find(|(_, n)| n.key.as_ref() == Some(key))
            .map(|(id, _)| id)
    }

    /// The ground point of an applied node.
    #[must_use]
    pub fn applied_point(&self, id: AppliedId) -> Option<GroundId> {
        self.applied.get(id)?.point
    }

    /// Number of live applied nodes, including boundary roots.
    #[must_use]
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }

    /// Number of live boundaries.
    #[must_use]
    pub fn boundary_count(&self) -> usize {
        self.boundaries.len()
    }

    /// Number of live content closures.
    #[must_use]
    pub fn closure_count(&self) -> usize {
        self.closures.len()
    }

    /// Output not yet delivered to the renderer.
    #[must_use]
    pub fn pending_changes(&self) -> &CycleChanges {
        &self.changes
    }

    // -- Internals --

    /// Marks `b` dirty and arms the update phase.
    pub(crate) fn mark(&mut self, b: BoundaryId) {
        self.mark_quiet(b);
        self.arm_update();
    }

    fn mark_quiet(&mut self, b: BoundaryId) {
        let Some(boundary) = self.boundaries.get_mut(b) else {
            return;
        };
        boundary.dirty_seq = self.sched.next_seq();
        self.sched.mark(b.idx);
    }

    fn arm_update(&mut self) {
        if self.in_update {
            return;
        }
        if self.sched.arm_update(self.config.update_delay) == Armed::Now {
            self.run_update_cycle();
        }
    }

    fn arm_render(&mut self) {
        if self.changes.is_empty() {
            return;
        }
        if self.sched.arm_render(self.config.render_delay) == Armed::Now {
            let _ = self.run_render_cycle();
        }
    }

    fn inbox_pending(&self) -> bool {
        !self.inbox.borrow().is_empty()
    }

    /// Position of `b` in the ground tree: sibling counts from the root down.
    fn path_key(&self, b: BoundaryId) -> Vec<u32> {
        let Some(point) = self.boundary_point(b).filter(|p| self.ground.is_alive(*p)) else {
            return Vec::new();
        };
        let mut key = Vec::new();
        let mut cur = Some(point);
        while let Some(p) = cur {
            let mut n = 0_u32;
            let mut s = self.ground.prev_sibling(p);
            while let Some(prev) = s {
                n += 1;
                s = self.ground.prev_sibling(prev);
            }
            key.push(n);
            cur = self.ground.parent(p);
        }
        key.reverse();
        key
    }

    /// Updates one dirty boundary. Returns whether it ran.
    fn refresh_boundary(&mut self, b: BoundaryId) -> bool {
        let cycle = self.cycle;
        let max = self.config.max_rerenders;
        let Some(boundary) = self.boundaries.get_mut(b) else {
            return false;
        };
        if boundary.updated_seq > boundary.dirty_seq {
            return false;
        }
        if boundary.cycle != cycle {
            boundary.cycle = cycle;
            boundary.updates = 0;
        }
        boundary.updates += 1;
        if boundary.updates > max + 1 {
            let renders = boundary.updates - 1;
            if boundary.updates == max + 2 {
                self.diagnose(Diagnostic::RerenderLimit { boundary: b, renders });
            }
            return false;
        }
        match boundary.variant {
            BoundaryVariant::Source(_) => self.update_source(b),
            BoundaryVariant::Content { .. } => self.reconcile_site(b, false),
        }
        true
    }

    pub(crate) fn hook(&mut self, boundary: BoundaryId, hook: Hook) {
        self.changes.lifecycle.push(LifecycleCall { boundary, hook });
    }

    pub(crate) fn diagnose(&mut self, d: Diagnostic) {
        self.changes.diagnostics.push(d);
        let e = DiagnosticEvent::new(self.cycle, &d);
        self.tracer().diagnostic(&e);
    }

    /// Emits a record for a live point, resolving its physical anchor now.
    pub(crate) fn record(&mut self, kind: ChangeKind, point: GroundId) {
        let (parent, before) = match kind {
            ChangeKind::Create | ChangeKind::Move => {
                let anchor = self.ground.anchor(point);
                (anchor.parent, anchor.before)
            }
            ChangeKind::Update | ChangeKind::ContentChanged | ChangeKind::Swap => {
                (self.ground.physical_parent(point), None)
            }
            ChangeKind::Remove => (None, None),
        };
        self.changes.records.push(ChangeRecord {
            kind,
            point,
            parent,
            before,
        });
        self.emitted += 1;
    }

    /// Hands records produced so far to the renderer ahead of the render
    /// phase. Lifecycle calls stay queued.
    pub(crate) fn flush_records(&mut self) {
        if self.changes.records.is_empty() {
            return;
        }
        let early = CycleChanges {
            records: mem::take(&mut self.changes.records),
            ..CycleChanges::default()
        };
        self.deliver(&early, true);
    }

    fn deliver(&mut self, changes: &CycleChanges, early: bool) {
        let cycle = self.cycle;
        let hooks_first = !early && self.config.hook_timing == HookTiming::BeforeFlush;
        if hooks_first {
            self.deliver_hooks(&changes.lifecycle);
        }

        let now = self.sched.now();
        self.tracer().phase_begin(&PhaseBeginEvent {
            cycle,
            phase: PhaseKind::Render,
            timestamp: now,
        });
        if !changes.records.is_empty() {
            if let Some(renderer) = self.renderer.as_mut() {
                renderer.apply(&self.ground, changes);
            }
        }
        self.tracer().flush(&FlushEvent {
            cycle,
            records: u32::try_from(changes.records.len()).unwrap_or(u32::MAX),
            lifecycle: u32::try_from(changes.lifecycle.len()).unwrap_or(u32::MAX),
            early,
            timestamp: now,
        });
        #[cfg(feature = "trace-rich")]
        self.tracer().records(cycle, &changes.records);
        self.tracer().phase_end(&PhaseEndEvent {
            cycle,
            phase: PhaseKind::Render,
            timestamp: now,
        });

        if !early && !hooks_first {
            self.deliver_hooks(&changes.lifecycle);
        }
    }

    fn deliver_hooks(&mut self, calls: &[LifecycleCall]) {
        if calls.is_empty() {
            return;
        }
        let cycle = self.cycle;
        let now = self.sched.now();
        self.tracer().phase_begin(&PhaseBeginEvent {
            cycle,
            phase: PhaseKind::Hooks,
            timestamp: now,
        });
        if let Some(hooks) = self.hooks.as_mut() {
            for call in calls {
                hooks.call(call);
            }
        }
        self.tracer().phase_end(&PhaseEndEvent {
            cycle,
            phase: PhaseKind::Hooks,
            timestamp: now,
        });
    }

    pub(crate) fn tracer(&mut self) -> Tracer<'_> {
        match self.sink.as_deref_mut() {
            Some(sink) => Tracer::new(sink),
            None => Tracer::none(),
        }
    }
}
