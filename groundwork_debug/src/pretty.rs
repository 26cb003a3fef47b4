// Copyright 2026 the Groundwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). Timestamps
//! are converted to microseconds using a [`Timebase`].

use std::io::Write;

use groundwork_core::record::{ChangeKind, ChangeRecord};
use groundwork_core::time::{HostTime, Timebase};
use groundwork_core::trace::{
    BoundaryRenderEvent, CycleBeginEvent, CycleEndEvent, DiagnosticEvent, FlushEvent,
    PhaseBeginEvent, PhaseEndEvent, PhaseKind, TraceSink,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
    timebase: Timebase,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink")
            .field("timebase", &self.timebase)
            .finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr(timebase: Timebase) -> Self {
        Self {
            writer: Box::new(std::io::stderr()),
            timebase,
        }
    }

    /// Creates a sink that writes to a boxed writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write>, timebase: Timebase) -> Self {
        Self { writer, timebase }
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W, timebase: Timebase) -> Self {
        Self { writer, timebase }
    }

    /// Consumes the sink and returns its destination.
    pub fn into_writer(self) -> W {
        self.writer
    }

    fn host_us(&self, t: HostTime) -> f64 {
        self.timebase.ticks_to_nanos(t.ticks()) as f64 / 1000.0
    }
}

fn phase_name(phase: PhaseKind) -> &'static str {
    match phase {
        PhaseKind::Batch => "batch",
        PhaseKind::Render => "render",
        PhaseKind::Hooks => "hooks",
    }
}

fn kind_letter(kind: ChangeKind) -> char {
    match kind {
        ChangeKind::Create => '+',
        ChangeKind::Move => '~',
        ChangeKind::Update => '*',
        ChangeKind::Remove => '-',
        ChangeKind::ContentChanged => 'c',
        ChangeKind::Swap => 's',
    }
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_cycle_begin(&mut self, e: &CycleBeginEvent) {
        let _ = writeln!(
            self.writer,
            "[cycle:begin] cycle={} at {:.1}µs",
            e.cycle,
            self.host_us(e.timestamp),
        );
    }

    fn on_cycle_end(&mut self, e: &CycleEndEvent) {
        let _ = writeln!(
            self.writer,
            "[cycle:end] cycle={} updated={} records={} at {:.1}µs",
            e.cycle,
            e.updated,
            e.records,
            self.host_us(e.timestamp),
        );
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        let _ = writeln!(
            self.writer,
            "[phase:begin] cycle={} {} at {:.1}µs",
            e.cycle,
            phase_name(e.phase),
            self.host_us(e.timestamp),
        );
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        let _ = writeln!(
            self.writer,
            "[phase:end] cycle={} {} at {:.1}µs",
            e.cycle,
            phase_name(e.phase),
            self.host_us(e.timestamp),
        );
    }

    fn on_boundary_render(&mut self, e: &BoundaryRenderEvent) {
        let _ = writeln!(
            self.writer,
            "[render] cycle={} boundary={} renders={}",
            e.cycle, e.boundary, e.renders,
        );
    }

    fn on_flush(&mut self, e: &FlushEvent) {
        let early = if e.early { " early" } else { "" };
        let _ = writeln!(
            self.writer,
            "[flush{early}] cycle={} records={} lifecycle={}",
            e.cycle, e.records, e.lifecycle,
        );
    }

    fn on_diagnostic(&mut self, e: &DiagnosticEvent) {
        let _ = writeln!(
            self.writer,
            "[diagnostic] cycle={} {:?} subject={}",
            e.cycle, e.kind, e.subject,
        );
    }

    fn on_records(&mut self, cycle: u64, records: &[ChangeRecord]) {
        let summary: String = records
            .iter()
            .map(|r| format!(" {}{}", kind_letter(r.kind), r.point.index()))
            .collect();
        let _ = writeln!(self.writer, "[records] cycle={cycle}{summary}");
    }
}
