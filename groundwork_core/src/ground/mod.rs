// Copyright 2026 the Groundwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The ground tree: sparse structural points with physical bookkeeping.
//!
//! Every positioned node of every boundary owns one point. Output nodes and
//! the host root are *physical*; boundaries, projection sites, subtree scopes
//! and remote sources are structural points that group physical nodes so a
//! whole subtree can be relocated as one unit.
//!
//! Each point caches its first physical descendant in tree order
//! ([`GroundStore::nearest_physical`]). The cache is maintained on every link
//! and unlink by walking upward only while the value changes, so resolving an
//! insertion point ([`GroundStore::anchor`]) never re-walks a subtree.

mod id;
mod store;
mod traverse;

pub use id::{GroundId, GroundKind, INVALID};
pub use store::{Anchor, GroundStore, Payload};
pub use traverse::Children;
