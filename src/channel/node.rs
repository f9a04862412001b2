// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! One node of the channel namespace tree.
//!
//! A channel owns its children and a membership-only set of subscriber
//! session ids. Subscriber and child mutation is locked per channel, never
//! globally; the listener list is copy-on-write so fan-out reads it
//! without a lock.

use super::ChannelId;
use crate::listener::ChannelMessageListener;
use crate::message::Message;
use crate::session::Session;
use arc_swap::ArcSwap;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// A channel in the namespace tree.
pub struct Channel {
    id: ChannelId,
    parent: Weak<Channel>,
    persistent: AtomicBool,
    /// Set by the sweep under the children write lock; creators seeing it
    /// retry from the root instead of attaching to a detached node.
    pub(crate) removed: AtomicBool,
    pub(crate) children: RwLock<HashMap<String, Arc<Channel>>>,
    subscribers: RwLock<HashSet<String>>,
    listeners: ArcSwap<Vec<Arc<dyn ChannelMessageListener>>>,
    attributes: DashMap<String, Value>,
}

impl Channel {
    pub(crate) fn new(id: ChannelId, parent: Weak<Channel>) -> Arc<Self> {
        Arc::new(Self {
            id,
            parent,
            persistent: AtomicBool::new(false),
            removed: AtomicBool::new(false),
            children: RwLock::new(HashMap::new()),
            subscribers: RwLock::new(HashSet::new()),
            listeners: ArcSwap::from_pointee(Vec::new()),
            attributes: DashMap::new(),
        })
    }

    pub(crate) fn root() -> Arc<Self> {
        Self::new(ChannelId::root(), Weak::new())
    }

    /// The channel's id.
    pub fn id(&self) -> &ChannelId {
        &self.id
    }

    /// The channel's path string.
    pub fn path(&self) -> &str {
        self.id.path()
    }

    /// Parent channel; `None` only for the root or a removed node.
    pub fn parent(&self) -> Option<Arc<Channel>> {
        self.parent.upgrade()
    }

    /// Whether the channel is a protocol-control channel.
    pub fn is_meta(&self) -> bool {
        self.id.is_meta()
    }

    /// Whether the channel is a server-side request/response channel.
    pub fn is_service(&self) -> bool {
        self.id.is_service()
    }

    /// Whether the channel survives sweeping while empty.
    pub fn is_persistent(&self) -> bool {
        self.persistent.load(Ordering::Acquire)
    }

    /// Mark the channel persistent (or not).
    pub fn set_persistent(&self, persistent: bool) {
        self.persistent.store(persistent, Ordering::Release);
    }

    /// Add a session to the subscriber set. Idempotent; returns whether
    /// the membership changed.
    pub(crate) fn add_subscriber(&self, session_id: &str) -> bool {
        self.subscribers.write().insert(session_id.to_string())
    }

    /// Remove a session from the subscriber set. Idempotent.
    pub(crate) fn remove_subscriber(&self, session_id: &str) -> bool {
        self.subscribers.write().remove(session_id)
    }

    /// Whether the given session is subscribed.
    pub fn is_subscribed(&self, session_id: &str) -> bool {
        self.subscribers.read().contains(session_id)
    }

    /// Number of subscribed sessions.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Snapshot of the subscriber ids.
    pub fn subscribers(&self) -> Vec<String> {
        self.subscribers.read().iter().cloned().collect()
    }

    /// Drop subscriber ids rejected by `alive` (sessions gone from the
    /// registry). Called by the sweep.
    pub(crate) fn prune_subscribers(&self, alive: impl Fn(&str) -> bool) -> usize {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|id| alive(id));
        before - subscribers.len()
    }

    /// Append a channel-scoped message listener.
    pub fn add_listener(&self, listener: Arc<dyn ChannelMessageListener>) {
        self.listeners.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(Arc::clone(&listener));
            next
        });
    }

    /// Number of channel-scoped listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.load().len()
    }

    /// Run the channel's listeners in registration order; the first veto
    /// stops the chain and suppresses delivery to this channel's direct
    /// subscribers.
    pub(crate) fn notify_listeners(
        &self,
        from: Option<&Arc<Session>>,
        message: &mut Message,
    ) -> bool {
        let snapshot = self.listeners.load();
        for listener in snapshot.iter() {
            if !listener.on_message(from, self, message) {
                return false;
            }
        }
        true
    }

    /// Attach an attribute for stateful extensions.
    pub fn set_attribute(&self, name: &str, value: Value) {
        self.attributes.insert(name.to_string(), value);
    }

    /// Look up an attribute.
    pub fn attribute(&self, name: &str) -> Option<Value> {
        self.attributes.get(name).map(|v| v.value().clone())
    }

    /// Child snapshot for traversal.
    pub(crate) fn child_snapshot(&self) -> Vec<Arc<Channel>> {
        self.children.read().values().map(Arc::clone).collect()
    }

    /// Sweep candidate test, subscriber/listener part. The child map is
    /// checked separately under its write lock by the remover.
    pub(crate) fn has_local_state(&self) -> bool {
        !self.subscribers.read().is_empty() || !self.listeners.load().is_empty()
    }

    /// Render this subtree, indented, into `out`.
    pub(crate) fn dump(&self, out: &mut String, indent: &str) {
        out.push_str(indent);
        out.push_str(self.path());
        let subs = self.subscriber_count();
        if subs > 0 || self.is_persistent() {
            out.push_str(&format!(
                " [{} subscriber(s){}]",
                subs,
                if self.is_persistent() { ", persistent" } else { "" }
            ));
        }
        out.push('\n');
        let mut children = self.child_snapshot();
        children.sort_by(|a, b| a.path().cmp(b.path()));
        let nested = format!("{}  ", indent);
        for child in children {
            child.dump(out, &nested);
        }
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("path", &self.path())
            .field("persistent", &self.is_persistent())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
