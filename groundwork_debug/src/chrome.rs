// Copyright 2026 the Groundwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] reads recorded bytes from a [`RecorderSink`](super::recorder::RecorderSink)
//! and writes [Chrome Trace Event Format][spec] JSON to the given writer.
//!
//! Update cycles are duration events on thread 0 and phases on thread 1.
//! Events without a timestamp of their own (diagnostics, record batches) are
//! placed at the most recent timestamp seen.
//!
//! [spec]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Map, Value, json};

use groundwork_core::record::ChangeKind;
use groundwork_core::time::{HostTime, Timebase};

use crate::recorder::{RecordedEvent, decode};

const CYCLE_TID: u32 = 0;
const PHASE_TID: u32 = 1;

/// Exports recorded events as Chrome Trace Event Format JSON.
///
/// The output is a complete JSON array of trace event objects, suitable for
/// loading into `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
///
/// Timestamps are converted to microseconds using the provided [`Timebase`].
pub fn export(bytes: &[u8], timebase: Timebase, writer: &mut dyn Write) -> io::Result<()> {
    let mut events: Vec<Value> = Vec::new();
    let mut last = HostTime(0);
    let us = |t: HostTime| timebase.ticks_to_nanos(t.ticks()) as f64 / 1000.0;

    for recorded in decode(bytes) {
        match recorded {
            RecordedEvent::CycleBegin(e) => {
                last = e.timestamp;
                events.push(json!({
                    "ph": "B",
                    "name": "Cycle",
                    "cat": "Update",
                    "ts": us(e.timestamp),
                    "pid": 0,
                    "tid": CYCLE_TID,
                    "args": { "cycle": e.cycle }
                }));
            }
            RecordedEvent::CycleEnd(e) => {
                last = e.timestamp;
                events.push(json!({
                    "ph": "E",
                    "name": "Cycle",
                    "cat": "Update",
                    "ts": us(e.timestamp),
                    "pid": 0,
                    "tid": CYCLE_TID,
                    "args": {
                        "cycle": e.cycle,
                        "updated": e.updated,
                        "records": e.records,
                    }
                }));
            }
            RecordedEvent::PhaseBegin(e) => {
                last = e.timestamp;
                events.push(json!({
                    "ph": "B",
                    "name": format!("{:?}", e.phase),
                    "cat": "Phase",
                    "ts": us(e.timestamp),
                    "pid": 0,
                    "tid": PHASE_TID,
                    "args": { "cycle": e.cycle }
                }));
            }
            RecordedEvent::PhaseEnd(e) => {
                last = e.timestamp;
                events.push(json!({
                    "ph": "E",
                    "name": format!("{:?}", e.phase),
                    "cat": "Phase",
                    "ts": us(e.timestamp),
                    "pid": 0,
                    "tid": PHASE_TID,
                    "args": { "cycle": e.cycle }
                }));
            }
            RecordedEvent::BoundaryRender(e) => {
                last = e.timestamp;
                events.push(json!({
                    "ph": "i",
                    "name": "BoundaryRender",
                    "cat": "Update",
                    "ts": us(e.timestamp),
                    "pid": 0,
                    "tid": PHASE_TID,
                    "s": "t",
                    "args": {
                        "cycle": e.cycle,
                        "boundary": e.boundary,
                        "renders": e.renders,
                    }
                }));
            }
            RecordedEvent::Flush(e) => {
                last = e.timestamp;
                let name = if e.early { "EarlyFlush" } else { "Flush" };
                events.push(json!({
                    "ph": "i",
                    "name": name,
                    "cat": "Render",
                    "ts": us(e.timestamp),
                    "pid": 0,
                    "tid": PHASE_TID,
                    "s": "t",
                    "args": {
                        "cycle": e.cycle,
                        "records": e.records,
                        "lifecycle": e.lifecycle,
                    }
                }));
            }
            RecordedEvent::Diagnostic(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": format!("{:?}", e.kind),
                    "cat": "Diagnostic",
                    "ts": us(last),
                    "pid": 0,
                    "tid": CYCLE_TID,
                    "s": "g",
                    "args": {
                        "cycle": e.cycle,
                        "subject": e.subject,
                    }
                }));
            }
            RecordedEvent::Records { cycle, changes } => {
                let mut args = Map::new();
                args.insert("cycle".into(), json!(cycle));
                for kind in [
                    ChangeKind::Create,
                    ChangeKind::Move,
                    ChangeKind::Update,
                    ChangeKind::Remove,
                    ChangeKind::ContentChanged,
                    ChangeKind::Swap,
                ] {
                    let n = changes.iter().filter(|c| c.kind == kind).count();
                    if n > 0 {
                        args.insert(format!("{kind:?}"), json!(n));
                    }
                }
                events.push(json!({
                    "ph": "i",
                    "name": "Records",
                    "cat": "Render",
                    "ts": us(last),
                    "pid": 0,
                    "tid": PHASE_TID,
                    "s": "t",
                    "args": Value::Object(args),
                }));
            }
        }
    }

    serde_json::to_writer_pretty(writer, &events)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::RecorderSink;
    use groundwork_core::trace::{
        CycleBeginEvent, CycleEndEvent, DiagnosticEvent, DiagnosticKind, PhaseBeginEvent,
        PhaseEndEvent, PhaseKind, TraceSink,
    };

    #[test]
    fn export_produces_valid_json() {
        let mut rec = RecorderSink::new();
        rec.on_cycle_begin(&CycleBeginEvent {
            cycle: 1,
            timestamp: HostTime(1_000_000),
        });
        rec.on_phase_begin(&PhaseBeginEvent {
            cycle: 1,
            phase: PhaseKind::Batch,
            timestamp: HostTime(1_000_000),
        });
        rec.on_diagnostic(&DiagnosticEvent {
            cycle: 1,
            kind: DiagnosticKind::UngroundedNode,
            subject: 4,
        });
        rec.on_phase_end(&PhaseEndEvent {
            cycle: 1,
            phase: PhaseKind::Batch,
            timestamp: HostTime(1_000_100),
        });
        rec.on_cycle_end(&CycleEndEvent {
            cycle: 1,
            timestamp: HostTime(1_000_200),
            updated: 1,
            records: 0,
        });

        let mut out = Vec::new();
        export(rec.as_bytes(), Timebase::NANOS, &mut out).unwrap();
        let json_str = String::from_utf8(out).unwrap();

        let parsed: Vec<Value> = serde_json::from_str(&json_str).unwrap();
        assert_eq!(parsed.len(), 5);

        assert_eq!(parsed[0]["ph"], "B");
        assert_eq!(parsed[0]["name"], "Cycle");
        assert_eq!(parsed[1]["name"], "Batch");
        assert_eq!(parsed[1]["tid"], PHASE_TID);

        // Diagnostics borrow the latest timestamp.
        assert_eq!(parsed[2]["name"], "UngroundedNode");
        assert_eq!(parsed[2]["ts"], 1_000.0);
        assert_eq!(parsed[2]["args"]["subject"], 4);

        assert_eq!(parsed[4]["ph"], "E");
        assert_eq!(parsed[4]["args"]["updated"], 1);
    }

    #[test]
    fn export_engine_recording() {
        use groundwork_core::boundary::{RenderCx, unit};
        use groundwork_core::engine::Engine;
        use groundwork_core::scheduler::SchedulerConfig;
        use groundwork_core::target::{Props, TargetNode};
        use std::cell::RefCell;
        use std::rc::Rc;

        let app = unit("App", |_: &mut RenderCx<'_>| {
            TargetNode::output("ul").children([TargetNode::output("li"), TargetNode::output("li")])
        });
        let sink = Rc::new(RefCell::new(RecorderSink::new()));
        let mut engine = Engine::new(SchedulerConfig::batched());
        engine.set_trace_sink(Box::new(sink.clone()));
        engine.mount(&app, Props::new()).unwrap();
        let _ = engine.flush();

        let mut out = Vec::new();
        export(sink.borrow().as_bytes(), Timebase::NANOS, &mut out).unwrap();
        let parsed: Vec<Value> = serde_json::from_slice(&out).unwrap();
        let records = parsed
            .iter()
            .find(|e| e["name"] == "Records")
            .expect("record batch exported");
        assert_eq!(records["args"]["Create"], 3);
        assert!(parsed.iter().any(|e| e["name"] == "Flush"));
    }

    #[test]
    fn export_empty_recording() {
        let mut out = Vec::new();
        export(&[], Timebase::NANOS, &mut out).unwrap();
        let json_str = String::from_utf8(out).unwrap();
        let parsed: Vec<Value> = serde_json::from_str(&json_str).unwrap();
        assert!(parsed.is_empty());
    }
}
