// Copyright 2026 the Groundwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Target nodes: immutable descriptions of desired output.
//!
//! A render function returns a fresh [`TargetNode`] tree on every pass. The
//! tree is never mutated after construction; builder methods consume `self`.
//! Children are shared through an `Rc<[TargetNode]>`, so content handed to a
//! boundary can be captured by a closure without copying it.
//!
//! ```
//! use groundwork_core::target::TargetNode;
//!
//! let list = TargetNode::output("ul").children([
//!     TargetNode::output("li").key("x").prop("label", "first"),
//!     TargetNode::output("li").key("y").prop("label", "second"),
//! ]);
//! assert_eq!(list.child_nodes().len(), 2);
//! ```

use alloc::collections::BTreeMap;
use alloc::collections::btree_map;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use crate::boundary::Unit;
use crate::channel::RemoteChannel;
use crate::closure::ClosureId;

// ---------------------------------------------------------------------------
// Props
// ---------------------------------------------------------------------------

/// A single property value.
#[derive(Clone, Debug, PartialEq)]
pub enum PropValue {
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Int(i64),
    /// A float.
    Float(f64),
    /// A string.
    Str(Rc<str>),
}

impl From<bool> for PropValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for PropValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for PropValue {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for PropValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for PropValue {
    fn from(v: &str) -> Self {
        Self::Str(v.into())
    }
}

impl From<String> for PropValue {
    fn from(v: String) -> Self {
        Self::Str(v.into())
    }
}

/// An ordered property map.
///
/// Used for output attributes, boundary props, and boundary state. Ordering
/// is by name, so two maps with the same entries compare equal regardless of
/// insertion order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Props(BTreeMap<Rc<str>, PropValue>);

impl Props {
    /// Creates an empty map.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Returns the map with `name` set to `value`.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<PropValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Sets `name` to `value`, returning whether the stored value changed.
    pub fn set(&mut self, name: &str, value: impl Into<PropValue>) -> bool {
        let value = value.into();
        if self.0.get(name) == Some(&value) {
            return false;
        }
        self.0.insert(name.into(), value);
        true
    }

    /// Removes `name`, returning whether it was present.
    pub fn remove(&mut self, name: &str) -> bool {
        self.0.remove(name).is_some()
    }

    /// Returns the value stored under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PropValue> {
        self.0.get(name)
    }

    /// Returns the integer stored under `name`, if it is one.
    #[must_use]
    pub fn int(&self, name: &str) -> Option<i64> {
        match self.0.get(name) {
            Some(PropValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    /// Returns the string stored under `name`, if it is one.
    #[must_use]
    pub fn str(&self, name: &str) -> Option<&str> {
        match self.0.get(name) {
            Some(PropValue::Str(v)) => Some(v),
            _ => None,
        }
    }

    /// Iterates entries in name order.
    pub fn iter(&self) -> btree_map::Iter<'_, Rc<str>, PropValue> {
        self.0.iter()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Keys and flags
// ---------------------------------------------------------------------------

/// A sibling identity key.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    /// Integer key.
    Int(i64),
    /// String key.
    Str(Rc<str>),
}

impl From<i64> for Key {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Key {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<u64> for Key {
    fn from(v: u64) -> Self {
        Self::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

impl From<&str> for Key {
    fn from(v: &str) -> Self {
        Self::Str(v.into())
    }
}

/// Per-node control flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ControlFlags {
    /// The node stays paired (and keeps its state) but its output is hidden.
    pub disabled: bool,
    /// A boundary node re-renders even when its props are unchanged.
    pub force_update: bool,
}

// ---------------------------------------------------------------------------
// Kinds
// ---------------------------------------------------------------------------

/// Where a projection marker takes its content from.
#[derive(Clone)]
pub enum ProjectionSource {
    /// The content a source boundary was given by its parent.
    Content(ClosureId),
    /// The aggregate of a remote channel.
    Channel(RemoteChannel),
}

impl PartialEq for ProjectionSource {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Content(a), Self::Content(b)) => a == b,
            (Self::Channel(a), Self::Channel(b)) => a.same_channel(b),
            _ => false,
        }
    }
}

impl fmt::Debug for ProjectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Content(c) => f.debug_tuple("Content").field(c).finish(),
            Self::Channel(ch) => f.debug_tuple("Channel").field(&ch.name()).finish(),
        }
    }
}

/// The kind of a target or applied node.
#[derive(Clone)]
pub enum NodeKind {
    /// A physical output node with the given tag.
    Output(Rc<str>),
    /// Transparent grouping; children splice into the enclosing point.
    Fragment,
    /// A source boundary instance of the given unit.
    Boundary(Rc<dyn Unit>),
    /// A grounding site for projected content.
    Projection(ProjectionSource),
    /// An isolated pairing scope: keyed children never match outside it.
    Subtree,
    /// Feeds this node's children into a remote channel.
    Remote {
        /// Destination channel.
        channel: RemoteChannel,
        /// Position among the channel's sources (ascending).
        order: i32,
    },
}

impl NodeKind {
    /// The tag pairing indexes this kind under.
    pub(crate) fn search_tag(&self) -> SearchTag {
        match self {
            Self::Output(tag) => SearchTag::Output(tag.clone()),
            Self::Fragment => SearchTag::Fragment,
            Self::Boundary(unit) => SearchTag::Unit(unit.name().into()),
            Self::Projection(_) => SearchTag::Projection,
            Self::Subtree => SearchTag::Subtree,
            Self::Remote { .. } => SearchTag::Remote,
        }
    }
}

impl PartialEq for NodeKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Output(a), Self::Output(b)) => a == b,
            (Self::Fragment, Self::Fragment) | (Self::Subtree, Self::Subtree) => true,
            (Self::Boundary(a), Self::Boundary(b)) => Rc::ptr_eq(a, b) || a.name() == b.name(),
            (Self::Projection(a), Self::Projection(b)) => a == b,
            (
                Self::Remote { channel: a, order: oa },
                Self::Remote { channel: b, order: ob },
            ) => oa == ob && a.same_channel(b),
            _ => false,
        }
    }
}

impl fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Output(tag) => f.debug_tuple("Output").field(tag).finish(),
            Self::Fragment => f.write_str("Fragment"),
            Self::Boundary(unit) => f.debug_tuple("Boundary").field(&unit.name()).finish(),
            Self::Projection(src) => f.debug_tuple("Projection").field(src).finish(),
            Self::Subtree => f.write_str("Subtree"),
            Self::Remote { channel, order } => f
                .debug_struct("Remote")
                .field("channel", &channel.name())
                .field("order", order)
                .finish(),
        }
    }
}

/// Pairing identity of a node kind.
///
/// Structural kinds use sentinel variants so they never match an output tag
/// or unit name that happens to spell the same word.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) enum SearchTag {
    Output(Rc<str>),
    Unit(Rc<str>),
    Fragment,
    Projection,
    Subtree,
    Remote,
}

// ---------------------------------------------------------------------------
// TargetNode
// ---------------------------------------------------------------------------

/// One desired output unit for one render pass.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetNode {
    pub(crate) kind: NodeKind,
    pub(crate) key: Option<Key>,
    pub(crate) props: Props,
    pub(crate) children: Rc<[TargetNode]>,
    pub(crate) flags: ControlFlags,
    pub(crate) immutable: &'static [&'static str],
}

impl TargetNode {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            key: None,
            props: Props::new(),
            children: Rc::from([]),
            flags: ControlFlags::default(),
            immutable: &[],
        }
    }

    /// A physical output node.
    #[must_use]
    pub fn output(tag: &str) -> Self {
        Self::new(NodeKind::Output(tag.into()))
    }

    /// A text leaf: an output node tagged `#text` with a `text` prop.
    #[must_use]
    pub fn text(content: &str) -> Self {
        Self::output("#text").prop("text", content)
    }

    /// A transparent group of nodes.
    #[must_use]
    pub fn fragment(children: impl IntoIterator<Item = Self>) -> Self {
        Self::new(NodeKind::Fragment).children(children)
    }

    /// An instance of `unit`. Children become the boundary's projectable content.
    #[must_use]
    pub fn boundary(unit: &Rc<dyn Unit>) -> Self {
        Self::new(NodeKind::Boundary(unit.clone()))
    }

    /// A grounding site for `source`.
    #[must_use]
    pub fn projection(source: ProjectionSource) -> Self {
        Self::new(NodeKind::Projection(source))
    }

    /// A grounding site for the aggregate of `channel`.
    #[must_use]
    pub fn outlet(channel: &RemoteChannel) -> Self {
        Self::projection(ProjectionSource::Channel(channel.clone()))
    }

    /// An isolated pairing scope around `children`.
    #[must_use]
    pub fn subtree(children: impl IntoIterator<Item = Self>) -> Self {
        Self::new(NodeKind::Subtree).children(children)
    }

    /// Feeds `children` into `channel` at the given source order.
    #[must_use]
    pub fn remote(
        channel: &RemoteChannel,
        order: i32,
        children: impl IntoIterator<Item = Self>,
    ) -> Self {
        Self::new(NodeKind::Remote {
            channel: channel.clone(),
            order,
        })
        .children(children)
    }

    /// Sets the sibling key.
    #[must_use]
    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Sets one prop.
    #[must_use]
    pub fn prop(mut self, name: &str, value: impl Into<PropValue>) -> Self {
        self.props.set(name, value);
        self
    }

    /// Replaces all props.
    #[must_use]
    pub fn props(mut self, props: Props) -> Self {
        self.props = props;
        self
    }

    /// Replaces the children.
    #[must_use]
    pub fn children(mut self, children: impl IntoIterator<Item = Self>) -> Self {
        self.children = children.into_iter().collect::<Vec<_>>().into();
        self
    }

    /// Appends one child.
    #[must_use]
    pub fn child(mut self, child: Self) -> Self {
        let mut v = self.children.to_vec();
        v.push(child);
        self.children = v.into();
        self
    }

    /// Marks the node disabled.
    #[must_use]
    pub fn disabled(mut self, disabled: bool) -> Self {
        self.flags.disabled = disabled;
        self
    }

    /// Forces a boundary node to re-render even with unchanged props.
    #[must_use]
    pub fn force_update(mut self) -> Self {
        self.flags.force_update = true;
        self
    }

    /// Declares props whose change forces a remount instead of an update.
    #[must_use]
    pub fn immutable(mut self, names: &'static [&'static str]) -> Self {
        self.immutable = names;
        self
    }

    /// The node kind.
    #[must_use]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// The sibling key, if any.
    #[must_use]
    pub fn key_ref(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    /// The props.
    #[must_use]
    pub fn prop_map(&self) -> &Props {
        &self.props
    }

    /// The children.
    #[must_use]
    pub fn child_nodes(&self) -> &[Self] {
        &self.children
    }

    /// The control flags.
    #[must_use]
    pub fn flags(&self) -> ControlFlags {
        self.flags
    }

    /// Whether matching an applied node of `old_kind` with `old_props` would
    /// reuse an identity this node declares immutable.
    pub(crate) fn vetoes(&self, old_kind: &NodeKind, old_props: &Props) -> bool {
        let changed = |name: &&str| old_props.get(name) != self.props.get(name);
        if self.immutable.iter().any(changed) {
            return true;
        }
        match (&self.kind, old_kind) {
            (NodeKind::Boundary(unit), _) => unit.immutable_props().iter().any(changed),
            (NodeKind::Projection(new), NodeKind::Projection(old)) => new != old,
            (NodeKind::Remote { channel: new, .. }, NodeKind::Remote { channel: old, .. }) => {
                !new.same_channel(old)
            }
            _ => false,
        }
    }
}

/// Collects the content closures referenced by projection markers anywhere
/// under `nodes`.
pub(crate) fn projected_closures(nodes: &[TargetNode], out: &mut Vec<ClosureId>) {
    for node in nodes {
        if let NodeKind::Projection(ProjectionSource::Content(c)) = &node.kind {
            if !out.contains(c) {
                out.push(*c);
            }
        }
        projected_closures(&node.children, out);
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use super::*;

    #[test]
    fn props_set_reports_changes() {
        let mut props = Props::new();
        assert!(props.set("a", 1));
        assert!(!props.set("a", 1));
        assert!(props.set("a", 2));
        assert_eq!(props.int("a"), Some(2));
        assert!(props.remove("a"));
        assert!(props.is_empty());
    }

    #[test]
    fn structural_tags_never_match_output_tags() {
        let frag = TargetNode::fragment([]);
        let named = TargetNode::output("Fragment");
        assert_ne!(frag.kind.search_tag(), named.kind.search_tag());
        assert_eq!(
            TargetNode::output("div").kind.search_tag(),
            SearchTag::Output("div".into())
        );
    }

    #[test]
    fn immutable_props_veto_changed_values() {
        let node = TargetNode::output("input")
            .prop("type", "text")
            .immutable(&["type"]);
        let same = Props::new().with("type", "text").with("value", "x");
        let other = Props::new().with("type", "checkbox");
        assert!(!node.vetoes(&node.kind, &same));
        assert!(node.vetoes(&node.kind, &other));
    }

    #[test]
    fn projected_closures_are_collected_once() {
        let c = ClosureId {
            idx: 3,
            generation: 0,
        };
        let tree = vec![
            TargetNode::projection(ProjectionSource::Content(c)),
            TargetNode::output("div")
                .child(TargetNode::projection(ProjectionSource::Content(c))),
        ];
        let mut out = Vec::new();
        projected_closures(&tree, &mut out);
        assert_eq!(out, vec![c]);
    }

    #[test]
    fn child_appends_in_order() {
        let node = TargetNode::output("ul")
            .child(TargetNode::text("a"))
            .child(TargetNode::text("b"));
        let texts: Vec<_> = node
            .child_nodes()
            .iter()
            .map(|c| c.prop_map().str("text"))
            .collect();
        assert_eq!(texts, vec![Some("a"), Some("b")]);
    }
}
