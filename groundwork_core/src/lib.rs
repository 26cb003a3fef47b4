// Copyright 2026 the Groundwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Declarative tree reconciliation, grounding, and content projection.
//!
//! `groundwork_core` turns trees of desired output, produced by render
//! functions, into a minimal stream of structural change records for a
//! physical renderer. It is `no_std` compatible (with `alloc`) and keeps
//! every persistent node in generational arenas addressed by copyable
//! handles.
//!
//! # Architecture
//!
//! ```text
//!   Unit ──► render fn ──► TargetNode tree
//!                               │
//!                               ▼
//!   pairing (applied tree) ──► grounding (ground tree) ──► ChangeRecord stream
//!                                                               │
//!                 ┌─────────────────────────────────────────────┘
//!                 ▼
//!   Renderer::apply ──► physical tree
//! ```
//!
//! **[`target`]**: Immutable target nodes built by render functions, with
//! props, keys, and control flags.
//!
//! **[`applied`]**: The last-committed structure. Pairing matches new
//! targets against it so keyed nodes keep their identity across reorders.
//!
//! **[`ground`]**: Struct-of-arrays tree of grounding points. Physical points
//! materialize; structural points (boundaries, projection sites, subtrees)
//! only position their descendants.
//!
//! **[`boundary`]**: Units, render functions, and the boundary lifecycle.
//!
//! **[`closure`]**: Content captured from a parent and projected at any
//! number of sites, with a zero-copy first site.
//!
//! **[`channel`]**: Remote channels that carry content between subtrees and
//! between engine instances.
//!
//! **[`engine`]**: The [`Engine`](engine::Engine) host: mounting, external
//! updates, and the two-phase update/render cycle.
//!
//! **[`scheduler`]**: Phase delays and hook timing.
//!
//! **[`dirty`]**: Dirty-tracking channels on `understory_dirty`.
//!
//! **[`record`]**: Change records, lifecycle calls, diagnostics, and errors.
//!
//! **[`backend`]**: The [`Renderer`](backend::Renderer) and
//! [`HookSubscriber`](backend::HookSubscriber) traits.
//!
//! **[`time`]**: Host time and durations for deadlines and trace timestamps.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) trait and event types for
//! cycle instrumentation, with a zero-overhead [`Tracer`](trace::Tracer)
//! wrapper.
//!
//! # Crate features
//!
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one branch
//!   per call site).
//! - `trace-rich` (disabled by default, implies `trace`): Gates per-cycle
//!   change record dumps.

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

pub mod applied;
mod arena;
pub mod backend;
pub mod boundary;
pub mod channel;
pub mod closure;
pub mod dirty;
pub mod engine;
pub mod ground;
mod grounding;
mod pairing;
pub mod record;
pub mod scheduler;
pub mod target;
pub mod time;
pub mod trace;
