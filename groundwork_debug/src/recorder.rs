// Copyright 2026 the Groundwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`TraceSink`] and encodes events into a
//! `Vec<u8>` as little-endian records, each starting with a one-byte tag.
//! [`decode`] reads them back as an iterator of [`RecordedEvent`].
//!
//! Record batches ([`on_records`](TraceSink::on_records)) keep the kind and
//! point slot of every record; anchors are dropped.

use groundwork_core::record::{ChangeKind, ChangeRecord};
use groundwork_core::time::HostTime;
use groundwork_core::trace::{
    BoundaryRenderEvent, CycleBeginEvent, CycleEndEvent, DiagnosticEvent, DiagnosticKind,
    FlushEvent, PhaseBeginEvent, PhaseEndEvent, PhaseKind, TraceSink,
};

// ---------------------------------------------------------------------------
// Event type discriminants
// ---------------------------------------------------------------------------

const TAG_CYCLE_BEGIN: u8 = 1;
const TAG_CYCLE_END: u8 = 2;
const TAG_PHASE_BEGIN: u8 = 3;
const TAG_PHASE_END: u8 = 4;
const TAG_BOUNDARY_RENDER: u8 = 5;
const TAG_FLUSH: u8 = 6;
const TAG_DIAGNOSTIC: u8 = 7;
const TAG_RECORDS: u8 = 8;

// ---------------------------------------------------------------------------
// RecorderSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that encodes events into a compact binary buffer.
#[derive(Debug, Default)]
pub struct RecorderSink {
    buf: Vec<u8>,
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a view of the recorded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the recorder and returns the recorded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Discards everything recorded so far.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_phase(&mut self, tag: u8, cycle: u64, phase: PhaseKind, at: HostTime) {
        self.write_u8(tag);
        self.write_u64(cycle);
        self.write_u8(phase.code());
        self.write_u64(at.ticks());
    }
}

impl TraceSink for RecorderSink {
    fn on_cycle_begin(&mut self, e: &CycleBeginEvent) {
        self.write_u8(TAG_CYCLE_BEGIN);
        self.write_u64(e.cycle);
        self.write_u64(e.timestamp.ticks());
    }

    fn on_cycle_end(&mut self, e: &CycleEndEvent) {
        self.write_u8(TAG_CYCLE_END);
        self.write_u64(e.cycle);
        self.write_u64(e.timestamp.ticks());
        self.write_u32(e.updated);
        self.write_u32(e.records);
    }

    fn on_phase_begin(&mut self, e: &PhaseBeginEvent) {
        self.write_phase(TAG_PHASE_BEGIN, e.cycle, e.phase, e.timestamp);
    }

    fn on_phase_end(&mut self, e: &PhaseEndEvent) {
        self.write_phase(TAG_PHASE_END, e.cycle, e.phase, e.timestamp);
    }

    fn on_boundary_render(&mut self, e: &BoundaryRenderEvent) {
        self.write_u8(TAG_BOUNDARY_RENDER);
        self.write_u64(e.cycle);
        self.write_u32(e.boundary);
        self.write_u32(e.renders);
        self.write_u64(e.timestamp.ticks());
    }

    fn on_flush(&mut self, e: &FlushEvent) {
        self.write_u8(TAG_FLUSH);
        self.write_u64(e.cycle);
        self.write_u32(e.records);
        self.write_u32(e.lifecycle);
        self.write_u8(u8::from(e.early));
        self.write_u64(e.timestamp.ticks());
    }

    fn on_diagnostic(&mut self, e: &DiagnosticEvent) {
        self.write_u8(TAG_DIAGNOSTIC);
        self.write_u64(e.cycle);
        self.write_u8(e.kind.code());
        self.write_u32(e.subject);
    }

    fn on_records(&mut self, cycle: u64, records: &[ChangeRecord]) {
        let count = u32::try_from(records.len()).unwrap_or(u32::MAX);
        self.write_u8(TAG_RECORDS);
        self.write_u64(cycle);
        self.write_u32(count);
        for r in records.iter().take(count as usize) {
            self.write_u8(r.kind.code());
            self.write_u32(r.point.index());
        }
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// Kind and point slot of one recorded change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordedChange {
    /// What the record asked for.
    pub kind: ChangeKind,
    /// Slot index of the point.
    pub point: u32,
}

/// A decoded event from a binary recording.
#[derive(Clone, Debug)]
pub enum RecordedEvent {
    /// A [`CycleBeginEvent`].
    CycleBegin(CycleBeginEvent),
    /// A [`CycleEndEvent`].
    CycleEnd(CycleEndEvent),
    /// A [`PhaseBeginEvent`].
    PhaseBegin(PhaseBeginEvent),
    /// A [`PhaseEndEvent`].
    PhaseEnd(PhaseEndEvent),
    /// A [`BoundaryRenderEvent`].
    BoundaryRender(BoundaryRenderEvent),
    /// A [`FlushEvent`].
    Flush(FlushEvent),
    /// A [`DiagnosticEvent`].
    Diagnostic(DiagnosticEvent),
    /// One flushed record batch.
    Records {
        /// Cycle counter.
        cycle: u64,
        /// The batch, in emission order.
        changes: Vec<RecordedChange>,
    },
}

/// Decodes a byte slice produced by [`RecorderSink`] into an iterator of
/// [`RecordedEvent`].
///
/// Iteration stops at the first truncated or unknown record.
pub fn decode(bytes: &[u8]) -> DecodeIter<'_> {
    DecodeIter {
        data: bytes,
        pos: 0,
    }
}

/// Iterator over decoded events.
#[derive(Debug)]
pub struct DecodeIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl DecodeIter<'_> {
    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let bytes = self.data.get(self.pos..self.pos + N)?.try_into().ok()?;
        self.pos += N;
        Some(bytes)
    }

    fn read_u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|[b]| b)
    }

    fn read_u32(&mut self) -> Option<u32> {
        self.take().map(u32::from_le_bytes)
    }

    fn read_u64(&mut self) -> Option<u64> {
        self.take().map(u64::from_le_bytes)
    }

    fn read_time(&mut self) -> Option<HostTime> {
        self.read_u64().map(HostTime)
    }

    fn read_phase(&mut self) -> Option<(u64, PhaseKind, HostTime)> {
        let cycle = self.read_u64()?;
        let phase = PhaseKind::from_code(self.read_u8()?)?;
        Some((cycle, phase, self.read_time()?))
    }

    fn decode_cycle_end(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::CycleEnd(CycleEndEvent {
            cycle: self.read_u64()?,
            timestamp: self.read_time()?,
            updated: self.read_u32()?,
            records: self.read_u32()?,
        }))
    }

    fn decode_boundary_render(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::BoundaryRender(BoundaryRenderEvent {
            cycle: self.read_u64()?,
            boundary: self.read_u32()?,
            renders: self.read_u32()?,
            timestamp: self.read_time()?,
        }))
    }

    fn decode_flush(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Flush(FlushEvent {
            cycle: self.read_u64()?,
            records: self.read_u32()?,
            lifecycle: self.read_u32()?,
            early: self.read_u8()? != 0,
            timestamp: self.read_time()?,
        }))
    }

    fn decode_diagnostic(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::Diagnostic(DiagnosticEvent {
            cycle: self.read_u64()?,
            kind: DiagnosticKind::from_code(self.read_u8()?)?,
            subject: self.read_u32()?,
        }))
    }

    fn decode_records(&mut self) -> Option<RecordedEvent> {
        let cycle = self.read_u64()?;
        let count = self.read_u32()?;
        let mut changes = Vec::with_capacity((count as usize).min(self.data.len()));
        for _ in 0..count {
            changes.push(RecordedChange {
                kind: ChangeKind::from_code(self.read_u8()?)?,
                point: self.read_u32()?,
            });
        }
        Some(RecordedEvent::Records { cycle, changes })
    }
}

impl Iterator for DecodeIter<'_> {
    type Item = RecordedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        match self.read_u8()? {
            TAG_CYCLE_BEGIN => Some(RecordedEvent::CycleBegin(CycleBeginEvent {
                cycle: self.read_u64()?,
                timestamp: self.read_time()?,
            })),
            TAG_CYCLE_END => self.decode_cycle_end(),
            TAG_PHASE_BEGIN => {
                let (cycle, phase, timestamp) = self.read_phase()?;
                Some(RecordedEvent::PhaseBegin(PhaseBeginEvent {
                    cycle,
                    phase,
                    timestamp,
                }))
            }
            TAG_PHASE_END => {
                let (cycle, phase, timestamp) = self.read_phase()?;
                Some(RecordedEvent::PhaseEnd(PhaseEndEvent {
                    cycle,
                    phase,
                    timestamp,
                }))
            }
            TAG_BOUNDARY_RENDER => self.decode_boundary_render(),
            TAG_FLUSH => self.decode_flush(),
            TAG_DIAGNOSTIC => self.decode_diagnostic(),
            TAG_RECORDS => self.decode_records(),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use groundwork_core::boundary::{RenderCx, unit};
    use groundwork_core::engine::Engine;
    use groundwork_core::scheduler::SchedulerConfig;
    use groundwork_core::target::{Props, TargetNode};

    use super::*;

    fn record_mount() -> Vec<RecordedEvent> {
        let app = unit("App", |_: &mut RenderCx<'_>| {
            TargetNode::output("div").child(TargetNode::text("hi"))
        });
        let sink = Rc::new(RefCell::new(RecorderSink::new()));
        let mut engine = Engine::new(SchedulerConfig::batched());
        engine.set_trace_sink(Box::new(sink.clone()));
        engine.mount(&app, Props::new()).unwrap();
        let _ = engine.flush();
        let sink = sink.borrow();
        decode(sink.as_bytes()).collect()
    }

    #[test]
    fn engine_cycle_is_recorded_in_order() {
        let events = record_mount();
        assert!(matches!(events[0], RecordedEvent::CycleBegin(e) if e.cycle == 1));
        assert!(matches!(
            events[1],
            RecordedEvent::PhaseBegin(e) if e.phase == PhaseKind::Batch
        ));
        assert!(matches!(
            events[2],
            RecordedEvent::BoundaryRender(e) if e.renders == 1
        ));
        assert!(matches!(
            events[3],
            RecordedEvent::PhaseEnd(e) if e.phase == PhaseKind::Batch
        ));
        match &events[4] {
            RecordedEvent::CycleEnd(e) => {
                assert_eq!(e.updated, 1);
                assert_eq!(e.records, 2);
            }
            other => panic!("expected CycleEnd, got {other:?}"),
        }
        assert!(matches!(
            events[5],
            RecordedEvent::PhaseBegin(e) if e.phase == PhaseKind::Render
        ));
        match &events[6] {
            RecordedEvent::Flush(e) => {
                assert_eq!(e.records, 2);
                assert!(!e.early);
            }
            other => panic!("expected Flush, got {other:?}"),
        }
        match &events[7] {
            RecordedEvent::Records { cycle, changes } => {
                assert_eq!(*cycle, 1);
                assert_eq!(changes.len(), 2);
                assert!(changes.iter().all(|c| c.kind == ChangeKind::Create));
            }
            other => panic!("expected Records, got {other:?}"),
        }
        assert!(matches!(
            events[8],
            RecordedEvent::PhaseEnd(e) if e.phase == PhaseKind::Render
        ));
    }

    #[test]
    fn diagnostics_keep_kind_and_subject() {
        let mut rec = RecorderSink::new();
        rec.on_diagnostic(&DiagnosticEvent {
            cycle: 4,
            kind: DiagnosticKind::DeadClosure,
            subject: 12,
        });
        rec.on_flush(&FlushEvent {
            cycle: 4,
            records: 3,
            lifecycle: 0,
            early: true,
            timestamp: HostTime(900),
        });

        let events: Vec<_> = decode(rec.as_bytes()).collect();
        assert_eq!(events.len(), 2);
        match &events[0] {
            RecordedEvent::Diagnostic(e) => {
                assert_eq!(e.kind, DiagnosticKind::DeadClosure);
                assert_eq!(e.subject, 12);
            }
            other => panic!("expected Diagnostic, got {other:?}"),
        }
        assert!(matches!(events[1], RecordedEvent::Flush(e) if e.early));
    }

    #[test]
    fn truncated_recording_stops_cleanly() {
        let mut rec = RecorderSink::new();
        rec.on_cycle_begin(&CycleBeginEvent {
            cycle: 1,
            timestamp: HostTime(5),
        });
        rec.on_cycle_end(&CycleEndEvent {
            cycle: 1,
            timestamp: HostTime(9),
            updated: 2,
            records: 7,
        });
        let bytes = rec.into_bytes();
        let events: Vec<_> = decode(&bytes[..bytes.len() - 3]).collect();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], RecordedEvent::CycleBegin(_)));
    }

    #[test]
    fn unknown_tag_stops_iteration() {
        assert_eq!(decode(&[0xff, 1, 2, 3]).count(), 0);
        assert_eq!(decode(&[]).count(), 0);
    }
}
