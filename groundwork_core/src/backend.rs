// Copyright 2026 the Groundwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Contract for physical renderers and lifecycle hook subscribers.
//!
//! `groundwork_core` never touches platform primitives. Each cycle it hands
//! a [`CycleChanges`] batch to a [`Renderer`] along with read access to the
//! [`GroundStore`]. Records are pre-ordered: applying them one after another
//! reproduces the ground tree's physical shape.
//!
//! A typical renderer keys its physical handles by
//! [`GroundId::index`](crate::ground::GroundId::index) and handles each
//! record kind like this:
//!
//! - `Create`: materialize the node from
//!   [`GroundStore::payload_at`], then insert it into `parent` before
//!   `before` (or append).
//! - `Move`: detach the node and insert it at the new anchor. Records for
//!   structural points are "empty movers" and carry nothing to move.
//! - `Update`: re-read the payload and [`GroundStore::hidden_at`].
//! - `Remove`: detach and discard the node.
//! - `ContentChanged` and `Swap`: notifications about projection sites.
//!
//! A point named in a record may be destroyed later in the same batch. Its
//! slot stays readable through the `*_at` accessors until the batch has been
//! delivered.
//!
//! ```rust,ignore
//! engine.set_renderer(Rc::new(RefCell::new(MyRenderer::new())));
//! engine.mount(&app, Props::new())?;
//! loop {
//!     engine.poll(host_now());
//! }
//! ```

use alloc::rc::Rc;
use core::cell::RefCell;

use crate::ground::GroundStore;
use crate::record::{CycleChanges, LifecycleCall};

/// Applies a cycle's change records to a physical tree.
pub trait Renderer {
    /// Applies the given records, reading payloads from `store` as needed.
    fn apply(&mut self, store: &GroundStore, changes: &CycleChanges);
}

/// Receives lifecycle calls in order.
pub trait HookSubscriber {
    /// Called once per lifecycle call.
    fn call(&mut self, call: &LifecycleCall);
}

impl<R: Renderer + ?Sized> Renderer for Rc<RefCell<R>> {
    fn apply(&mut self, store: &GroundStore, changes: &CycleChanges) {
        self.borrow_mut().apply(store, changes);
    }
}

impl<H: HookSubscriber + ?Sized> HookSubscriber for Rc<RefCell<H>> {
    fn call(&mut self, call: &LifecycleCall) {
        self.borrow_mut().call(call);
    }
}
