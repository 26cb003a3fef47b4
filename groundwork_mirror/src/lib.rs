// Copyright 2026 the Groundwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! In-memory physical renderer for tests and tooling.
//!
//! [`MirrorRenderer`] implements [`Renderer`] by applying change records to a
//! plain element tree, one record at a time, exactly as a platform backend
//! would. Elements are stored in slots keyed by
//! [`GroundId::index`](groundwork_core::ground::GroundId::index).
//!
//! After any number of batches, [`MirrorRenderer::verify`] walks the ground
//! tree and checks that the mirror has the same physical shape: every
//! physical point has an element with the same tag, props, and visibility,
//! in the same order under the same parent, and nothing else exists.
//!
//! ```rust,ignore
//! let mirror = Rc::new(RefCell::new(MirrorRenderer::new()));
//! engine.set_renderer(mirror.clone());
//! engine.mount(&app, Props::new())?;
//! let _ = engine.flush();
//! mirror.borrow().verify(engine.ground(), engine.root_point())?;
//! ```

#![no_std]

extern crate alloc;

use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::{self, Write as _};

use groundwork_core::backend::Renderer;
use groundwork_core::ground::{GroundId, GroundKind, GroundStore};
use groundwork_core::record::{ChangeKind, ChangeRecord, CycleChanges};
use groundwork_core::target::{PropValue, Props};

/// One mirrored physical node.
#[derive(Clone, Debug, PartialEq)]
pub struct Element {
    /// Output tag (`#root` for the host container).
    pub tag: Rc<str>,
    /// Last applied props.
    pub props: Props,
    /// Whether the element is hidden.
    pub hidden: bool,
    /// Slot of the parent element.
    pub parent: Option<u32>,
    /// Slots of the child elements, in order.
    pub children: Vec<u32>,
}

/// What [`MirrorRenderer::verify`] found wrong.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MismatchKind {
    /// A physical point has no element.
    Missing,
    /// An element has no physical point.
    Extra,
    /// Tags differ.
    Tag,
    /// Props differ.
    Props,
    /// Visibility differs.
    Hidden,
    /// Children are different or in a different order.
    Order,
}

/// A difference between the mirror and the ground tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mismatch {
    /// Slot of the offending point or element.
    pub point: u32,
    /// What is wrong.
    pub kind: MismatchKind,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            MismatchKind::Missing => "no element for physical point",
            MismatchKind::Extra => "element without physical point",
            MismatchKind::Tag => "tag differs",
            MismatchKind::Props => "props differ",
            MismatchKind::Hidden => "visibility differs",
            MismatchKind::Order => "children differ",
        };
        write!(f, "slot {}: {what}", self.point)
    }
}

impl core::error::Error for Mismatch {}

/// Applies change records to an in-memory element tree.
#[derive(Debug, Default)]
pub struct MirrorRenderer {
    elements: Vec<Option<Element>>,
    root: Option<u32>,
    counts: [usize; 6],
    batches: usize,
    faults: usize,
}

impl MirrorRenderer {
    /// Creates an empty mirror.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The element in a slot.
    #[must_use]
    pub fn element(&self, idx: u32) -> Option<&Element> {
        self.elements.get(idx as usize)?.as_ref()
    }

    /// Slot of the host container, once something was inserted into it.
    #[must_use]
    pub fn root(&self) -> Option<u32> {
        self.root
    }

    /// Number of live elements, including the host container.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.iter().flatten().count()
    }

    /// Whether no element exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records of `kind` applied so far.
    #[must_use]
    pub fn count(&self, kind: ChangeKind) -> usize {
        self.counts[kind.code() as usize]
    }

    /// Non-empty batches applied so far.
    #[must_use]
    pub fn batches(&self) -> usize {
        self.batches
    }

    /// Records that could not be applied (unknown parent or anchor).
    #[must_use]
    pub fn faults(&self) -> usize {
        self.faults
    }

    /// The `text` prop of every element, in tree order.
    #[must_use]
    pub fn texts(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(root) = self.root {
            self.collect_texts(root, &mut out);
        }
        out
    }

    fn collect_texts(&self, idx: u32, out: &mut Vec<String>) {
        let Some(el) = self.element(idx) else {
            return;
        };
        if let Some(t) = el.props.str("text") {
            out.push(String::from(t));
        }
        for &c in &el.children {
            self.collect_texts(c, out);
        }
    }

    /// Renders the element tree as indented text, one element per line.
    #[must_use]
    pub fn dump(&self) -> String {
        let mut out = String::new();
        if let Some(root) = self.root {
            self.dump_into(root, 0, &mut out);
        }
        out
    }

    fn dump_into(&self, idx: u32, depth: usize, out: &mut String) {
        let Some(el) = self.element(idx) else {
            return;
        };
        for _ in 0..depth {
            out.push_str("  ");
        }
        out.push_str(&el.tag);
        for (name, value) in el.props.iter() {
            let _ = write!(out, " {name}=");
            let _ = match value {
                PropValue::Bool(v) => write!(out, "{v}"),
                PropValue::Int(v) => write!(out, "{v}"),
                PropValue::Float(v) => write!(out, "{v}"),
                PropValue::Str(v) => write!(out, "{v:?}"),
            };
        }
        if el.hidden {
            out.push_str(" [hidden]");
        }
        out.push('\n');
        for &c in &el.children {
            self.dump_into(c, depth + 1, out);
        }
    }

    /// Checks the mirror against the physical shape of the ground tree
    /// below `root`.
    pub fn verify(&self, store: &GroundStore, root: GroundId) -> Result<(), Mismatch> {
        let mut visited = alloc::vec![false; self.elements.len()];
        if self.element(root.index()).is_some() {
            self.verify_point(store, root, &mut visited)?;
        } else {
            let mut expected = Vec::new();
            physical_children(store, root, &mut expected);
            if let Some(first) = expected.first() {
                return Err(Mismatch {
                    point: first.index(),
                    kind: MismatchKind::Missing,
                });
            }
        }
        for (idx, slot) in self.elements.iter().enumerate() {
            if slot.is_some() && !visited[idx] {
                return Err(Mismatch {
                    point: u32::try_from(idx).unwrap_or(u32::MAX),
                    kind: MismatchKind::Extra,
                });
            }
        }
        Ok(())
    }

    fn verify_point(
        &self,
        store: &GroundStore,
        p: GroundId,
        visited: &mut [bool],
    ) -> Result<(), Mismatch> {
        let idx = p.index();
        let fail = |kind| Mismatch { point: idx, kind };
        let el = self.element(idx).ok_or(fail(MismatchKind::Missing))?;
        visited[idx as usize] = true;

        if let Some(payload) = store.payload(p) {
            if el.tag != payload.tag {
                return Err(fail(MismatchKind::Tag));
            }
            if el.props != payload.props {
                return Err(fail(MismatchKind::Props));
            }
        }
        if store.kind(p) != GroundKind::Root && el.hidden != store.hidden_at(idx) {
            return Err(fail(MismatchKind::Hidden));
        }

        let mut expected = Vec::new();
        physical_children(store, p, &mut expected);
        if !expected.iter().map(|c| c.index()).eq(el.children.iter().copied()) {
            return Err(fail(MismatchKind::Order));
        }
        for c in expected {
            self.verify_point(store, c, visited)?;
        }
        Ok(())
    }

    // -- Slots --

    fn element_mut(&mut self, idx: u32) -> Option<&mut Element> {
        self.elements.get_mut(idx as usize)?.as_mut()
    }

    fn put_element(&mut self, idx: u32, el: Element) {
        let slot = idx as usize;
        if self.elements.len() <= slot {
            self.elements.resize_with(slot + 1, || None);
        }
        self.elements[slot] = Some(el);
    }

    fn take_element(&mut self, idx: u32) -> Option<Element> {
        self.elements.get_mut(idx as usize)?.take()
    }

    /// Creates the host container element the first time something is
    /// inserted into it.
    fn ensure_root(&mut self, store: &GroundStore, idx: u32) {
        if store.kind_at(idx) == GroundKind::Root && self.element(idx).is_none() {
            self.put_element(
                idx,
                Element {
                    tag: "#root".into(),
                    props: Props::new(),
                    hidden: false,
                    parent: None,
                    children: Vec::new(),
                },
            );
            self.root = Some(idx);
        }
    }

    fn detach(&mut self, idx: u32) {
        let Some(parent) = self.element_mut(idx).and_then(|el| el.parent.take()) else {
            return;
        };
        if let Some(p) = self.element_mut(parent) {
            p.children.retain(|c| *c != idx);
        }
    }

    fn insert(&mut self, store: &GroundStore, idx: u32, record: &ChangeRecord) {
        let Some(parent) = record.parent.map(GroundId::index) else {
            self.faults += 1;
            return;
        };
        self.ensure_root(store, parent);
        let before = record.before.map(GroundId::index);
        let Some(p) = self.element_mut(parent) else {
            self.faults += 1;
            return;
        };
        let pos = before.and_then(|b| p.children.iter().position(|c| *c == b));
        match pos {
            Some(pos) => p.children.insert(pos, idx),
            None => p.children.push(idx),
        }
        let missing_anchor = before.is_some() && pos.is_none();
        if let Some(el) = self.element_mut(idx) {
            el.parent = Some(parent);
        }
        if missing_anchor {
            self.faults += 1;
        }
    }

    fn apply_record(&mut self, store: &GroundStore, record: &ChangeRecord) {
        let idx = record.point.index();
        self.counts[record.kind.code() as usize] += 1;
        match record.kind {
            ChangeKind::Create => {
                let (tag, props) = store
                    .payload_at(idx)
                    .map(|p| (p.tag.clone(), p.props.clone()))
                    .unwrap_or_else(|| ("#unknown".into(), Props::new()));
                self.put_element(
                    idx,
                    Element {
                        tag,
                        props,
                        hidden: store.hidden_at(idx),
                        parent: None,
                        children: Vec::new(),
                    },
                );
                self.insert(store, idx, record);
            }
            ChangeKind::Move => {
                // Structural points have no element: an empty mover.
                if self.element(idx).is_some() {
                    self.detach(idx);
                    self.insert(store, idx, record);
                }
            }
            ChangeKind::Update => {
                let payload = store.payload_at(idx).cloned();
                let hidden = store.hidden_at(idx);
                if let Some(el) = self.element_mut(idx) {
                    if let Some(payload) = payload {
                        el.tag = payload.tag;
                        el.props = payload.props;
                    }
                    el.hidden = hidden;
                }
            }
            ChangeKind::Remove => {
                self.detach(idx);
                if let Some(el) = self.take_element(idx) {
                    for c in el.children {
                        if let Some(child) = self.element_mut(c) {
                            child.parent = None;
                        }
                    }
                }
            }
            ChangeKind::ContentChanged | ChangeKind::Swap => {}
        }
    }
}

impl Renderer for MirrorRenderer {
    fn apply(&mut self, store: &GroundStore, changes: &CycleChanges) {
        if changes.records.is_empty() {
            return;
        }
        self.batches += 1;
        for record in &changes.records {
            self.apply_record(store, record);
        }
    }
}

/// Physical children of `p`, looking through structural points.
fn physical_children(store: &GroundStore, p: GroundId, out: &mut Vec<GroundId>) {
    for c in store.children(p) {
        if store.kind(c).is_physical() {
            out.push(c);
        } else {
            physical_children(store, c, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use alloc::borrow::ToOwned;
    use alloc::vec;
    use core::cell::RefCell;

    use groundwork_core::boundary::{RenderCx, Unit, unit};
    use groundwork_core::channel::{ChannelPolicy, RemoteChannel};
    use groundwork_core::engine::Engine;
    use groundwork_core::scheduler::SchedulerConfig;
    use groundwork_core::target::TargetNode;

    use super::*;

    fn mirrored(config: SchedulerConfig) -> (Engine, Rc<RefCell<MirrorRenderer>>) {
        let mirror = Rc::new(RefCell::new(MirrorRenderer::new()));
        let mut engine = Engine::new(config);
        engine.set_renderer(mirror.clone());
        (engine, mirror)
    }

    fn check(engine: &Engine, mirror: &Rc<RefCell<MirrorRenderer>>) {
        let m = mirror.borrow();
        if let Err(e) = m.verify(engine.ground(), engine.root_point()) {
            panic!("{e}\n{}", m.dump());
        }
        assert_eq!(m.faults(), 0, "{}", m.dump());
    }

    /// Renders one keyed `li` per character of its `order` state, optionally
    /// wrapping every other one in a fragment.
    fn keyed_list() -> Rc<dyn Unit> {
        unit("List", |cx: &mut RenderCx<'_>| {
            let order = cx.state().str("order").unwrap_or("").to_owned();
            let nested = cx.state().int("nested") == Some(1);
            TargetNode::output("ul").children(order.chars().enumerate().map(|(i, c)| {
                let mut buf = [0_u8; 4];
                let key: &str = c.encode_utf8(&mut buf);
                let li = TargetNode::output("li")
                    .key(key)
                    .child(TargetNode::text(key));
                if nested && i % 2 == 0 {
                    TargetNode::fragment([li])
                } else {
                    li
                }
            }))
        })
    }

    #[test]
    fn keyed_reorders_stay_in_sync() {
        let (mut engine, mirror) = mirrored(SchedulerConfig::batched());
        let root = engine.mount(&keyed_list(), Props::new()).unwrap();
        for order in ["abcde", "edcba", "aXcYe", "", "bdfh", "hfdb", "abcdefgh"] {
            engine.set_state(root, "order", order).unwrap();
            let _ = engine.flush();
            check(&engine, &mirror);
            let expected: Vec<String> = order.chars().map(String::from).collect();
            assert_eq!(mirror.borrow().texts(), expected);
        }
    }

    #[test]
    fn fragment_splices_stay_in_sync() {
        let (mut engine, mirror) = mirrored(SchedulerConfig::batched());
        let root = engine.mount(&keyed_list(), Props::new()).unwrap();
        engine.set_state(root, "order", "abcd").unwrap();
        let _ = engine.flush();
        engine.set_state(root, "nested", 1).unwrap();
        let _ = engine.flush();
        check(&engine, &mirror);
        engine.set_state(root, "order", "dcba").unwrap();
        let _ = engine.flush();
        check(&engine, &mirror);
        assert_eq!(mirror.borrow().texts(), vec!["d", "c", "b", "a"]);
    }

    #[test]
    fn boundary_movers_stay_in_sync() {
        let pair = unit("Pair", |cx: &mut RenderCx<'_>| {
            let tag = cx.props().str("tag").unwrap_or("p").to_owned();
            TargetNode::fragment([
                TargetNode::output(&tag).child(TargetNode::text(&tag)),
                TargetNode::output("sep"),
            ])
        });
        let app = unit("App", move |cx: &mut RenderCx<'_>| {
            let flip = cx.state().int("flip") == Some(1);
            let mut items = vec![
                TargetNode::boundary(&pair).key("x").prop("tag", "x"),
                TargetNode::boundary(&pair).key("y").prop("tag", "y"),
                TargetNode::output("tail").key("t"),
            ];
            if flip {
                items.reverse();
            }
            TargetNode::output("root").children(items)
        });
        let (mut engine, mirror) = mirrored(SchedulerConfig::batched());
        let root = engine.mount(&app, Props::new()).unwrap();
        let _ = engine.flush();
        check(&engine, &mirror);
        for flip in [1, 0, 1] {
            engine.set_state(root, "flip", flip).unwrap();
            let _ = engine.flush();
            check(&engine, &mirror);
        }
        assert_eq!(mirror.borrow().texts(), vec!["y", "x"]);
        assert_eq!(mirror.borrow().count(ChangeKind::Create), 8);
    }

    #[test]
    fn projections_and_promotion_stay_in_sync() {
        let frame = unit("Frame", |cx: &mut RenderCx<'_>| {
            let from = cx.props().int("from").unwrap_or(0);
            let to = cx.props().int("to").unwrap_or(1);
            TargetNode::output("frame").children(
                (from..to).map(|i| TargetNode::output("slot").key(i).child(cx.content())),
            )
        });
        let app = unit("App", move |cx: &mut RenderCx<'_>| {
            let label = cx.state().str("label").unwrap_or("a").to_owned();
            TargetNode::boundary(&frame)
                .prop("from", cx.state().int("from").unwrap_or(0))
                .prop("to", cx.state().int("to").unwrap_or(3))
                .children([TargetNode::text(&label), TargetNode::output("hr")])
        });
        let (mut engine, mirror) = mirrored(SchedulerConfig::batched());
        let root = engine.mount(&app, Props::new()).unwrap();
        let _ = engine.flush();
        check(&engine, &mirror);
        assert_eq!(mirror.borrow().texts(), vec!["a", "a", "a"]);

        engine.set_state(root, "label", "b").unwrap();
        let _ = engine.flush();
        check(&engine, &mirror);
        assert_eq!(mirror.borrow().texts(), vec!["b", "b", "b"]);

        engine.set_state(root, "from", 1).unwrap();
        let _ = engine.flush();
        check(&engine, &mirror);
        assert_eq!(mirror.borrow().count(ChangeKind::Swap), 1);

        engine.set_state(root, "from", 3).unwrap();
        let _ = engine.flush();
        check(&engine, &mirror);
        assert!(mirror.borrow().texts().is_empty());
    }

    #[test]
    fn disabled_nodes_are_hidden_in_the_mirror() {
        let app = unit("App", |cx: &mut RenderCx<'_>| {
            let off = cx.state().int("off") == Some(1);
            TargetNode::output("div").children([
                TargetNode::fragment([TargetNode::output("a"), TargetNode::output("b")])
                    .disabled(off),
                TargetNode::output("c"),
            ])
        });
        let (mut engine, mirror) = mirrored(SchedulerConfig::synchronous());
        let root = engine.mount(&app, Props::new()).unwrap();
        engine.set_state(root, "off", 1).unwrap();
        check(&engine, &mirror);
        let dump = mirror.borrow().dump();
        assert_eq!(dump.matches("[hidden]").count(), 2, "{dump}");
        engine.set_state(root, "off", 0).unwrap();
        check(&engine, &mirror);
        assert!(!mirror.borrow().dump().contains("[hidden]"));
    }

    #[test]
    fn outlets_stay_in_sync_across_hosts() {
        let ch = RemoteChannel::new("overlay", ChannelPolicy::Concat);
        let feeder = ch.clone();
        let source = unit("Source", move |cx: &mut RenderCx<'_>| {
            let n = cx.state().int("n").unwrap_or(1);
            TargetNode::remote(
                &feeder,
                0,
                (0..n).map(|i| TargetNode::output("toast").key(i).prop("i", i)),
            )
        });
        let out = ch.clone();
        let sink = unit("Sink", move |_: &mut RenderCx<'_>| {
            TargetNode::output("body").children([
                TargetNode::output("main"),
                TargetNode::outlet(&out),
                TargetNode::output("footer"),
            ])
        });

        let (mut b, mirror) = mirrored(SchedulerConfig::batched());
        b.mount(&sink, Props::new()).unwrap();
        let _ = b.flush();

        let mut a = Engine::new(SchedulerConfig::batched());
        let root_a = a.mount(&source, Props::new()).unwrap();
        let _ = a.flush();
        for n in [3, 1, 4, 0] {
            let _ = b.flush();
            check(&b, &mirror);
            a.set_state(root_a, "n", n).unwrap();
            let _ = a.flush();
        }
        let _ = b.flush();
        check(&b, &mirror);
        let dump = mirror.borrow().dump();
        assert!(!dump.contains("toast"), "{dump}");
    }

    #[test]
    fn verify_reports_a_missed_batch() {
        let (mut engine, mirror) = mirrored(SchedulerConfig::batched());
        let root = engine.mount(&keyed_list(), Props::new()).unwrap();
        engine.set_state(root, "order", "ab").unwrap();
        let _ = engine.flush();
        // The next batch goes to another renderer.
        engine.set_renderer(MirrorRenderer::new());
        engine.set_state(root, "order", "abc").unwrap();
        let lost = engine.flush();
        assert_eq!(lost.count(ChangeKind::Create), 2);
        assert_eq!(mirror.borrow().batches(), 1);

        let err = mirror
            .borrow()
            .verify(engine.ground(), engine.root_point())
            .unwrap_err();
        assert_eq!(err.kind, MismatchKind::Order);
    }

    #[test]
    fn unmount_empties_the_mirror() {
        let (mut engine, mirror) = mirrored(SchedulerConfig::synchronous());
        let root = engine.mount(&keyed_list(), Props::new()).unwrap();
        engine.set_state(root, "order", "abc").unwrap();
        assert_eq!(mirror.borrow().len(), 8);
        engine.unmount().unwrap();
        check(&engine, &mirror);
        assert_eq!(mirror.borrow().len(), 1);
        assert_eq!(mirror.borrow().dump(), "#root\n");
    }
}
