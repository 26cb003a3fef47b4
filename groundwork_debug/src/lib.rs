// Copyright 2026 the Groundwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Recording, pretty-printing, and Chrome trace export for groundwork
//! diagnostics.
//!
//! This crate provides [`TraceSink`](groundwork_core::trace::TraceSink)
//! implementations for development and post-mortem analysis:
//!
//! - [`pretty::PrettyPrintSink`]: one human-readable line per event.
//! - [`recorder::RecorderSink`]: compact binary recording with
//!   [`recorder::decode`] for playback.
//! - [`chrome::export`]: writes Chrome Trace Event Format JSON from recorded
//!   bytes.
//!
//! Install a sink with
//! [`Engine::set_trace_sink`](groundwork_core::engine::Engine::set_trace_sink).
//! Wrapping it in `Rc<RefCell<_>>` keeps a handle for reading it back.

pub mod chrome;
pub mod pretty;
pub mod recorder;
