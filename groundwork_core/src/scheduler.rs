// Copyright 2026 the Groundwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Two-phase cycle scheduling.
//!
//! Marking a boundary dirty arms the *update* phase after
//! [`SchedulerConfig::update_delay`]. When an update cycle produced records,
//! the *render* phase is armed after [`SchedulerConfig::render_delay`].
//! Splitting the phases lets a host batch several logical updates before
//! touching physical output, or run everything synchronously.
//!
//! The scheduler never reads a clock. Timed delays are armed relative to the
//! last [`HostTime`] the host passed to [`Engine::poll`](crate::engine::Engine::poll).

use alloc::vec::Vec;

use understory_dirty::{CycleHandling, DirtyTracker};

use crate::dirty;
use crate::time::{Duration, HostTime};

/// When an armed phase fires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CycleDelay {
    /// Run synchronously inside the call that armed it.
    Immediate,
    /// Run at the next [`poll`](crate::engine::Engine::poll).
    Zero,
    /// Run at the first poll at least this long after arming.
    After(Duration),
}

/// Whether lifecycle calls are delivered before or after the renderer sees
/// the cycle's records.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum HookTiming {
    /// Hooks observe the tree before it is physically updated.
    BeforeFlush,
    /// Hooks observe physical output.
    #[default]
    AfterFlush,
}

/// Configuration for the cycle scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SchedulerConfig {
    /// Delay between the first dirty mark and the update cycle.
    pub update_delay: CycleDelay,
    /// Delay between an update cycle and delivery to the renderer.
    pub render_delay: CycleDelay,
    /// Extra renders a boundary may trigger on itself in one update.
    pub max_rerenders: u32,
    /// Hook delivery relative to the renderer flush.
    pub hook_timing: HookTiming,
}

impl SchedulerConfig {
    /// Everything runs inside the call that caused it.
    #[must_use]
    pub const fn synchronous() -> Self {
        Self {
            update_delay: CycleDelay::Immediate,
            render_delay: CycleDelay::Immediate,
            max_rerenders: 8,
            hook_timing: HookTiming::AfterFlush,
        }
    }

    /// Updates and renders run at the next poll.
    #[must_use]
    pub const fn batched() -> Self {
        Self {
            update_delay: CycleDelay::Zero,
            render_delay: CycleDelay::Zero,
            max_rerenders: 8,
            hook_timing: HookTiming::AfterFlush,
        }
    }

    /// Updates wait `delay` so bursts of marks coalesce into one cycle.
    #[must_use]
    pub const fn deferred(delay: Duration) -> Self {
        Self {
            update_delay: CycleDelay::After(delay),
            render_delay: CycleDelay::Zero,
            max_rerenders: 8,
            hook_timing: HookTiming::AfterFlush,
        }
    }

    /// Returns the configuration with a different re-render cap.
    #[must_use]
    pub const fn with_max_rerenders(mut self, max: u32) -> Self {
        self.max_rerenders = max;
        self
    }

    /// Returns the configuration with a different hook timing.
    #[must_use]
    pub const fn with_hook_timing(mut self, timing: HookTiming) -> Self {
        self.hook_timing = timing;
        self
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::batched()
    }
}

/// How a caller should proceed after arming a phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Armed {
    /// Run the phase now.
    Now,
    /// A deadline is set (or already was).
    Later,
}

/// Dirty set, sequence counter and phase deadlines of one engine.
#[derive(Debug)]
pub(crate) struct Scheduler {
    pub(crate) dirty: DirtyTracker<u32>,
    seq: u64,
    now: HostTime,
    update_at: Option<HostTime>,
    render_at: Option<HostTime>,
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        Self {
            dirty: DirtyTracker::with_cycle_handling(CycleHandling::Error),
            seq: 0,
            now: HostTime(0),
            update_at: None,
            render_at: None,
        }
    }

    /// Returns a fresh, strictly increasing sequence number.
    pub(crate) fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    pub(crate) fn now(&self) -> HostTime {
        self.now
    }

    pub(crate) fn set_now(&mut self, now: HostTime) {
        self.now = self.now.max(now);
    }

    // -- Dirty set --

    pub(crate) fn mark(&mut self, idx: u32) {
        self.dirty.mark(idx, dirty::RENDER);
    }

    /// Drains the dirty set in deterministic slot order.
    pub(crate) fn drain(&mut self) -> Vec<u32> {
        self.dirty.drain(dirty::RENDER).deterministic().run().collect()
    }

    // -- Deadlines --

    fn arm(slot: &mut Option<HostTime>, now: HostTime, delay: CycleDelay) -> Armed {
        let at = match delay {
            CycleDelay::Immediate => return Armed::Now,
            CycleDelay::Zero => now,
            CycleDelay::After(d) => now + d,
        };
        // An earlier deadline already covers this request.
        if slot.is_none_or(|existing| at < existing) {
            *slot = Some(at);
        }
        Armed::Later
    }

    pub(crate) fn arm_update(&mut self, delay: CycleDelay) -> Armed {
        Self::arm(&mut self.update_at, self.now, delay)
    }

    pub(crate) fn arm_render(&mut self, delay: CycleDelay) -> Armed {
        Self::arm(&mut self.render_at, self.now, delay)
    }

    pub(crate) fn update_armed(&self) -> bool {
        self.update_at.is_some()
    }

    pub(crate) fn update_due(&self) -> bool {
        self.update_at.is_some_and(|at| at <= self.now)
    }

    pub(crate) fn render_due(&self) -> bool {
        self.render_at.is_some_and(|at| at <= self.now)
    }

    pub(crate) fn clear_update(&mut self) {
        self.update_at = None;
    }

    pub(crate) fn clear_render(&mut self) {
        self.render_at = None;
    }

    pub(crate) fn next_deadline(&self) -> Option<HostTime> {
        match (self.update_at, self.render_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;

    #[test]
    fn presets() {
        assert_eq!(SchedulerConfig::default(), SchedulerConfig::batched());
        assert_eq!(
            SchedulerConfig::synchronous().update_delay,
            CycleDelay::Immediate
        );
        let d = SchedulerConfig::deferred(Duration(50)).with_max_rerenders(1);
        assert_eq!(d.update_delay, CycleDelay::After(Duration(50)));
        assert_eq!(d.max_rerenders, 1);
    }

    #[test]
    fn immediate_delay_never_arms() {
        let mut s = Scheduler::new();
        assert_eq!(s.arm_update(CycleDelay::Immediate), Armed::Now);
        assert_eq!(s.next_deadline(), None);
    }

    #[test]
    fn earliest_deadline_wins() {
        let mut s = Scheduler::new();
        s.set_now(HostTime(100));
        s.arm_update(CycleDelay::After(Duration(50)));
        s.arm_update(CycleDelay::After(Duration(80)));
        assert_eq!(s.next_deadline(), Some(HostTime(150)));
        s.arm_render(CycleDelay::Zero);
        assert_eq!(s.next_deadline(), Some(HostTime(100)));

        assert!(!s.update_due());
        assert!(s.render_due());
        s.set_now(HostTime(150));
        assert!(s.update_due());
        s.clear_update();
        s.clear_render();
        assert_eq!(s.next_deadline(), None);
    }

    #[test]
    fn time_never_goes_backwards() {
        let mut s = Scheduler::new();
        s.set_now(HostTime(10));
        s.set_now(HostTime(5));
        assert_eq!(s.now(), HostTime(10));
    }

    #[test]
    fn drain_is_deterministic_and_deduplicated() {
        let mut s = Scheduler::new();
        s.mark(7);
        s.mark(2);
        s.mark(7);
        let mut drained = s.drain();
        drained.sort_unstable();
        assert_eq!(drained, vec![2, 7]);
        assert!(s.drain().is_empty());
        assert!(s.next_seq() < s.next_seq());
    }
}
