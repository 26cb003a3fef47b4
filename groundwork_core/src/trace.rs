// Copyright 2026 the Groundwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing and diagnostics for the cycle loop.
//!
//! This module provides a [`TraceSink`] trait with per-event methods that the
//! engine calls at each stage of a cycle. All method bodies default to no-ops,
//! so implementing only the events you care about is fine.
//!
//! [`Tracer`] wraps an optional `&mut dyn TraceSink`. When the `trace` feature
//! is **off**, every `Tracer` method compiles to nothing. When **on**, each
//! method performs a single `Option` branch before dispatching.
//!
//! # Crate features
//!
//! - `trace`: enables the `Tracer` method bodies (one branch per call).
//! - `trace-rich` (implies `trace`): gates per-cycle change record dumps and
//!   the corresponding `TraceSink` method.

use alloc::rc::Rc;
use core::cell::RefCell;

#[cfg(feature = "trace-rich")]
use crate::record::ChangeRecord;
use crate::record::Diagnostic;
use crate::time::HostTime;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which part of a cycle is being measured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PhaseKind {
    /// One batch of dirty boundaries inside an update cycle.
    Batch,
    /// Handing records to the renderer.
    Render,
    /// Delivering lifecycle calls.
    Hooks,
}

impl PhaseKind {
    /// Stable one-byte code, used by trace encoders.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Batch => 0,
            Self::Render => 1,
            Self::Hooks => 2,
        }
    }

    /// Inverse of [`code`](Self::code).
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Batch,
            1 => Self::Render,
            2 => Self::Hooks,
            _ => return None,
        })
    }
}

/// Flattened [`Diagnostic`] discriminant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// [`Diagnostic::RerenderLimit`].
    RerenderLimit,
    /// [`Diagnostic::RendererChainLimit`].
    RendererChainLimit,
    /// [`Diagnostic::DeadClosure`].
    DeadClosure,
    /// [`Diagnostic::UngroundedNode`].
    UngroundedNode,
    /// [`Diagnostic::StaleBoundary`].
    StaleBoundary,
}

impl DiagnosticKind {
    /// Stable one-byte code, used by trace encoders.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::RerenderLimit => 0,
            Self::RendererChainLimit => 1,
            Self::DeadClosure => 2,
            Self::UngroundedNode => 3,
            Self::StaleBoundary => 4,
        }
    }

    /// Inverse of [`code`](Self::code).
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::RerenderLimit,
            1 => Self::RendererChainLimit,
            2 => Self::DeadClosure,
            3 => Self::UngroundedNode,
            4 => Self::StaleBoundary,
            _ => return None,
        })
    }
}

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted when an update cycle starts.
#[derive(Clone, Copy, Debug)]
pub struct CycleBeginEvent {
    /// Monotonic cycle counter.
    pub cycle: u64,
    /// Host time at the start of the cycle.
    pub timestamp: HostTime,
}

/// Emitted when an update cycle ends.
#[derive(Clone, Copy, Debug)]
pub struct CycleEndEvent {
    /// Cycle counter.
    pub cycle: u64,
    /// Host time at the end of the cycle.
    pub timestamp: HostTime,
    /// Boundaries reconciled from the dirty set.
    pub updated: u32,
    /// Change records pending delivery.
    pub records: u32,
}

/// Marks the beginning of a cycle phase.
#[derive(Clone, Copy, Debug)]
pub struct PhaseBeginEvent {
    /// Cycle counter.
    pub cycle: u64,
    /// Which phase is starting.
    pub phase: PhaseKind,
    /// Host time at the start of the phase.
    pub timestamp: HostTime,
}

/// Marks the end of a cycle phase.
#[derive(Clone, Copy, Debug)]
pub struct PhaseEndEvent {
    /// Cycle counter.
    pub cycle: u64,
    /// Which phase is ending.
    pub phase: PhaseKind,
    /// Host time at the end of the phase.
    pub timestamp: HostTime,
}

/// Emitted after a source boundary's render loop.
#[derive(Clone, Copy, Debug)]
pub struct BoundaryRenderEvent {
    /// Cycle counter.
    pub cycle: u64,
    /// Slot index of the boundary.
    pub boundary: u32,
    /// Render function invocations, including re-renders.
    pub renders: u32,
    /// Host time of the render.
    pub timestamp: HostTime,
}

/// Emitted when records are handed to the renderer.
#[derive(Clone, Copy, Debug)]
pub struct FlushEvent {
    /// Cycle counter.
    pub cycle: u64,
    /// Records delivered.
    pub records: u32,
    /// Lifecycle calls delivered.
    pub lifecycle: u32,
    /// Whether this flush happened mid-cycle, before a cross-host channel
    /// mutation.
    pub early: bool,
    /// Host time of the flush.
    pub timestamp: HostTime,
}

/// Emitted for every recovered [`Diagnostic`].
#[derive(Clone, Copy, Debug)]
pub struct DiagnosticEvent {
    /// Cycle counter.
    pub cycle: u64,
    /// What went wrong.
    pub kind: DiagnosticKind,
    /// Slot index of the boundary, closure, or node concerned.
    pub subject: u32,
}

impl DiagnosticEvent {
    /// Flattens a diagnostic.
    #[must_use]
    pub fn new(cycle: u64, d: &Diagnostic) -> Self {
        let (kind, subject) = match *d {
            Diagnostic::RerenderLimit { boundary, .. } => {
                (DiagnosticKind::RerenderLimit, boundary.index())
            }
            Diagnostic::RendererChainLimit { boundary } => {
                (DiagnosticKind::RendererChainLimit, boundary.index())
            }
            Diagnostic::DeadClosure { closure } => (DiagnosticKind::DeadClosure, closure.index()),
            Diagnostic::UngroundedNode { node } => (DiagnosticKind::UngroundedNode, node.index()),
            Diagnostic::StaleBoundary { boundary } => {
                (DiagnosticKind::StaleBoundary, boundary.index())
            }
        };
        Self {
            cycle,
            kind,
            subject,
        }
    }
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from the engine.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called when an update cycle starts.
    fn on_cycle_begin(&mut self, e: &CycleBeginEvent) {
        _ = e;
    }

    /// Called when an update cycle ends.
    fn on_cycle_end(&mut self, e: &CycleEndEvent) {
        _ = e;
    }

    /// Called at the beginning of a phase.
    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        _ = e;
    }

    /// Called at the end of a phase.
    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        _ = e;
    }

    /// Called after a source boundary rendered.
    fn on_boundary_render(&mut self, e: &BoundaryRenderEvent) {
        _ = e;
    }

    /// Called when records are handed to the renderer.
    fn on_flush(&mut self, e: &FlushEvent) {
        _ = e;
    }

    /// Called for every recovered diagnostic.
    fn on_diagnostic(&mut self, e: &DiagnosticEvent) {
        _ = e;
    }

    /// Called with every flushed record batch (requires `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    fn on_records(&mut self, cycle: u64, records: &[ChangeRecord]) {
        _ = (cycle, records);
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

/// Shares a sink with the engine so the caller can read it back later.
impl<T: TraceSink + ?Sized> TraceSink for Rc<RefCell<T>> {
    fn on_cycle_begin(&mut self, e: &CycleBeginEvent) {
        self.borrow_mut().on_cycle_begin(e);
    }

    fn on_cycle_end(&mut self, e: &CycleEndEvent) {
        self.borrow_mut().on_cycle_end(e);
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        self.borrow_mut().on_phase_begin(e);
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        self.borrow_mut().on_phase_end(e);
    }

    fn on_boundary_render(&mut self, e: &BoundaryRenderEvent) {
        self.borrow_mut().on_boundary_render(e);
    }

    fn on_flush(&mut self, e: &FlushEvent) {
        self.borrow_mut().on_flush(e);
    }

    fn on_diagnostic(&mut self, e: &DiagnosticEvent) {
        self.borrow_mut().on_diagnostic(e);
    }

    #[cfg(feature = "trace-rich")]
    fn on_records(&mut self, cycle: u64, records: &[ChangeRecord]) {
        self.borrow_mut().on_records(cycle, records);
    }
}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`TraceSink`].
///
/// When the `trace` feature is **off**, every method compiles to nothing. When
/// **on**, each method checks the inner `Option` (one branch) before
/// dispatching to the sink.
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: None }
        }
        #[cfg(not(feature = "trace"))]
        {
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer from an optional sink.
    #[inline]
    #[must_use]
    pub fn from_option(sink: Option<&'a mut dyn TraceSink>) -> Self {
        match sink {
            Some(s) => Self::new(s),
            None => Self::none(),
        }
    }

    /// Emits a [`CycleBeginEvent`].
    #[inline]
    pub fn cycle_begin(&mut self, e: &CycleBeginEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_cycle_begin(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`CycleEndEvent`].
    #[inline]
    pub fn cycle_end(&mut self, e: &CycleEndEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_cycle_end(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`PhaseBeginEvent`].
    #[inline]
    pub fn phase_begin(&mut self, e: &PhaseBeginEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_phase_begin(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`PhaseEndEvent`].
    #[inline]
    pub fn phase_end(&mut self, e: &PhaseEndEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_phase_end(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`BoundaryRenderEvent`].
    #[inline]
    pub fn boundary_render(&mut self, e: &BoundaryRenderEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_boundary_render(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`FlushEvent`].
    #[inline]
    pub fn flush(&mut self, e: &FlushEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_flush(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`DiagnosticEvent`].
    #[inline]
    pub fn diagnostic(&mut self, e: &DiagnosticEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_diagnostic(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a record batch (requires `trace-rich` feature).
    #[cfg(feature = "trace-rich")]
    #[inline]
    pub fn records(&mut self, cycle: u64, records: &[ChangeRecord]) {
        if let Some(s) = &mut self.sink {
            s.on_records(cycle, records);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
