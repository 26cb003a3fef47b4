// Copyright 2026 the Groundwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Remote channels: named multi-source projection points.
//!
//! A [`RemoteChannel`] is a shared handle. Any number of `remote` nodes, on
//! any number of hosts, feed content into it; `outlet` nodes ground its
//! aggregate. Sources are ordered by their declared order, then by
//! registration.
//!
//! Every mutation synchronously pushes a notice into the inbox of each
//! subscribed host. A host drains its inbox at the start of every update
//! batch, so consumers never render a stale aggregate once a source is gone.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::target::TargetNode;

static NEXT_HOST: AtomicU32 = AtomicU32::new(0);

/// Identifies one engine instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HostId(u32);

impl HostId {
    pub(crate) fn next() -> Self {
        Self(NEXT_HOST.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

/// A source's registration in a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceToken(u64);

/// How a channel combines its sources.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ChannelPolicy {
    /// Concatenate every source in order.
    #[default]
    Concat,
    /// Only the last source in order is shown.
    Last,
}

/// Pending channel notices for one host.
pub(crate) type Inbox = Rc<RefCell<Vec<RemoteChannel>>>;

#[derive(Debug)]
struct Source {
    token: SourceToken,
    host: HostId,
    order: i32,
    seq: u64,
    content: Rc<[TargetNode]>,
}

struct Subscriber {
    host: HostId,
    inbox: Inbox,
}

struct ChannelInner {
    name: Rc<str>,
    policy: ChannelPolicy,
    sources: Vec<Source>,
    next_token: u64,
    next_seq: u64,
    version: u64,
    subscribers: Vec<Subscriber>,
}

/// A shared, named aggregation point for remote content.
#[derive(Clone)]
pub struct RemoteChannel(Rc<RefCell<ChannelInner>>);

impl fmt::Debug for RemoteChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.0.borrow();
        f.debug_struct("RemoteChannel")
            .field("name", &inner.name)
            .field("policy", &inner.policy)
            .field("sources", &inner.sources.len())
            .field("version", &inner.version)
            .finish_non_exhaustive()
    }
}

impl RemoteChannel {
    /// Creates a channel.
    #[must_use]
    pub fn new(name: &str, policy: ChannelPolicy) -> Self {
        Self(Rc::new(RefCell::new(ChannelInner {
            name: name.into(),
            policy,
            sources: Vec::new(),
            next_token: 0,
            next_seq: 0,
            version: 0,
            subscribers: Vec::new(),
        })))
    }

    /// The channel name.
    #[must_use]
    pub fn name(&self) -> Rc<str> {
        self.0.borrow().name.clone()
    }

    /// The combination policy.
    #[must_use]
    pub fn policy(&self) -> ChannelPolicy {
        self.0.borrow().policy
    }

    /// Whether both handles refer to the same channel.
    #[must_use]
    pub fn same_channel(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Bumped on every source mutation.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.0.borrow().version
    }

    /// Number of registered sources.
    #[must_use]
    pub fn source_count(&self) -> usize {
        self.0.borrow().sources.len()
    }

    /// Whether any live source currently provides content.
    #[must_use]
    pub fn has_content(&self) -> bool {
        self.0.borrow().sources.iter().any(|s| !s.content.is_empty())
    }

    /// The aggregate content.
    ///
    /// With [`ChannelPolicy::Concat`] every source is wrapped in a fragment
    /// keyed by its token, so a source keeps its identity while others come
    /// and go.
    #[must_use]
    pub fn read(&self) -> Rc<[TargetNode]> {
        let inner = self.0.borrow();
        match inner.policy {
            ChannelPolicy::Concat => inner
                .sources
                .iter()
                .map(|s| {
                    let mut group = TargetNode::fragment([]).key(s.token.0);
                    group.children = s.content.clone();
                    group
                })
                .collect::<Vec<_>>()
                .into(),
            ChannelPolicy::Last => inner
                .sources
                .last()
                .map_or_else(|| Rc::from([]), |s| s.content.clone()),
        }
    }

    // -- Sources --

    pub(crate) fn add_source(
        &self,
        host: HostId,
        order: i32,
        content: Rc<[TargetNode]>,
    ) -> SourceToken {
        let token = {
            let mut inner = self.0.borrow_mut();
            let token = SourceToken(inner.next_token);
            inner.next_token += 1;
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.sources.push(Source {
                token,
                host,
                order,
                seq,
                content,
            });
            inner.sources.sort_by_key(|s| (s.order, s.seq));
            inner.version += 1;
            token
        };
        self.notify();
        token
    }

    /// Replaces a source's order and content. Returns `false` for an unknown
    /// token.
    pub(crate) fn update_source(
        &self,
        token: SourceToken,
        order: i32,
        content: Rc<[TargetNode]>,
    ) -> bool {
        {
            let mut inner = self.0.borrow_mut();
            let Some(source) = inner.sources.iter_mut().find(|s| s.token == token) else {
                return false;
            };
            source.order = order;
            source.content = content;
            inner.sources.sort_by_key(|s| (s.order, s.seq));
            inner.version += 1;
        }
        self.notify();
        true
    }

    /// Unregisters a source. Returns `false` for an unknown token.
    pub(crate) fn remove_source(&self, token: SourceToken) -> bool {
        {
            let mut inner = self.0.borrow_mut();
            let before = inner.sources.len();
            inner.sources.retain(|s| s.token != token);
            if inner.sources.len() == before {
                return false;
            }
            inner.version += 1;
        }
        self.notify();
        true
    }

    /// Hosts that registered sources, in source order.
    #[must_use]
    pub fn source_hosts(&self) -> Vec<HostId> {
        self.0.borrow().sources.iter().map(|s| s.host).collect()
    }

    // -- Subscribers --

    pub(crate) fn subscribe(&self, host: HostId, inbox: &Inbox) {
        let mut inner = self.0.borrow_mut();
        if inner.subscribers.iter().all(|s| s.host != host) {
            inner.subscribers.push(Subscriber {
                host,
                inbox: inbox.clone(),
            });
        }
    }

    pub(crate) fn unsubscribe(&self, host: HostId) {
        self.0.borrow_mut().subscribers.retain(|s| s.host != host);
    }

    /// Drops every source and the subscription of `host`. Returns `true` if
    /// a source was removed.
    pub(crate) fn release_host(&self, host: HostId) -> bool {
        {
            let mut inner = self.0.borrow_mut();
            inner.subscribers.retain(|s| s.host != host);
            let before = inner.sources.len();
            inner.sources.retain(|s| s.host != host);
            if inner.sources.len() == before {
                return false;
            }
            inner.version += 1;
        }
        self.notify();
        true
    }

    /// Whether a host other than `host` consumes this channel.
    pub(crate) fn has_foreign_subscribers(&self, host: HostId) -> bool {
        self.0.borrow().subscribers.iter().any(|s| s.host != host)
    }

    fn notify(&self) {
        let inboxes: Vec<Inbox> = self
            .0
            .borrow()
            .subscribers
            .iter()
            .map(|s| s.inbox.clone())
            .collect();
        for inbox in inboxes {
            let mut pending = inbox.borrow_mut();
            if !pending.iter().any(|c| c.same_channel(self)) {
                pending.push(self.clone());
            }
        }
    }
}
