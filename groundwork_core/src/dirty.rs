// Copyright 2026 the Groundwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dirty-tracking channel constants.
//!
//! Boundaries are tracked by slot index in an
//! [`understory_dirty::DirtyTracker`] owned by the scheduler.
//!
//! - [`RENDER`] is the scheduler's dirty set. Marks are local: only the
//!   explicitly marked boundary is drained, and the update cycle orders the
//!   drained set by tree position itself.
//! - [`CASCADE`] carries one dependency edge from every inner boundary to the
//!   boundary whose pass created it. Marking it with
//!   [`EagerPolicy`](understory_dirty::EagerPolicy) reaches every boundary
//!   below the marked one; [`Engine::force_update_deep`] drains it to force a
//!   whole region to re-render.
//!
//! [`Engine::force_update_deep`]: crate::engine::Engine::force_update_deep

use understory_dirty::Channel;

/// Boundary needs to be updated in the next update cycle.
pub const RENDER: Channel = Channel::new(0);

/// Inner-on-parent edges used to force whole regions.
pub const CASCADE: Channel = Channel::new(1);
