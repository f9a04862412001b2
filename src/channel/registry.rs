// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Channel tree plus flat index.
//!
//! The registry owns the root channel and an id->channel index kept
//! consistent with the tree: every channel reachable from the root is
//! indexed, and vice versa. Creation descends from the root taking one
//! per-node child lock at a time; the sweep detaches nodes under the same
//! locks and flags them `removed`, so a creator racing a removal retries
//! from the root instead of attaching to a detached node.

use super::{Channel, ChannelId};
use crate::error::{Error, Result};
use crate::listener::ListenerRegistry;
use crate::message::Message;
use crate::session::{Session, SessionRegistry};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Owns the channel tree and its flat index.
pub struct ChannelRegistry {
    root: Arc<Channel>,
    index: DashMap<String, Arc<Channel>>,
}

impl ChannelRegistry {
    /// Create a registry holding only the root channel.
    pub fn new() -> Self {
        Self {
            root: Channel::root(),
            index: DashMap::new(),
        }
    }

    /// The root channel. Never swept.
    pub fn root(&self) -> &Arc<Channel> {
        &self.root
    }

    /// Look up a channel by exact path.
    pub fn channel(&self, path: &str) -> Option<Arc<Channel>> {
        self.index
            .get(path)
            .map(|entry| Arc::clone(entry.value()))
            .filter(|channel| !channel.removed.load(Ordering::Acquire))
    }

    /// Number of indexed channels.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether no channels exist besides the root.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Resolve `id`, optionally creating the whole branch.
    ///
    /// `policy_ok` is consulted once, for the full path, before anything
    /// is created; intermediate nodes are then created unconditionally.
    /// Returns `None` when the channel does not exist and creation was not
    /// requested or not permitted.
    pub fn resolve(
        &self,
        id: &ChannelId,
        create: bool,
        policy_ok: impl FnOnce() -> bool,
    ) -> Option<Arc<Channel>> {
        if let Some(existing) = self.channel(id.path()) {
            return Some(existing);
        }
        if !create || id.depth() == 0 {
            return None;
        }
        if !policy_ok() {
            return None;
        }
        Some(self.create_branch(id))
    }

    /// Create a channel unless it exists, running `init` on the new node.
    ///
    /// Server-side API: no security-policy check. Returns whether this
    /// call created the channel.
    pub fn create_if_absent(&self, path: &str, init: impl FnOnce(&Arc<Channel>)) -> Result<bool> {
        if self.channel(path).is_some() {
            return Ok(false);
        }
        let id = ChannelId::parse(path)?;
        let channel = self.create_branch(&id);
        init(&channel);
        Ok(true)
    }

    fn create_branch(&self, id: &ChannelId) -> Arc<Channel> {
        'retry: loop {
            let mut node = Arc::clone(&self.root);
            for depth in 1..=id.depth() {
                let Some(segment) = id.segment(depth - 1) else {
                    break;
                };
                let next = {
                    let mut children = node.children.write();
                    if node.removed.load(Ordering::Acquire) {
                        // Swept away under us; start over from the root.
                        None
                    } else {
                        Some(match children.get(segment) {
                            Some(existing) => Arc::clone(existing),
                            None => {
                                let child = Channel::new(id.prefix(depth), Arc::downgrade(&node));
                                children.insert(segment.to_string(), Arc::clone(&child));
                                self.index
                                    .insert(child.path().to_string(), Arc::clone(&child));
                                log::debug!("[ChannelRegistry] created {}", child.path());
                                child
                            }
                        })
                    }
                };
                match next {
                    Some(found) => node = found,
                    None => continue 'retry,
                }
            }
            return node;
        }
    }

    /// Add `session` to the channel's subscriber set. Idempotent.
    ///
    /// Meta and service channels accept only local sessions.
    pub fn subscribe(&self, channel: &Arc<Channel>, session: &Arc<Session>) -> Result<bool> {
        if (channel.is_meta() || channel.is_service()) && !session.is_local() {
            return Err(Error::Subscribe(format!(
                "{} accepts only local subscribers",
                channel.path()
            )));
        }
        Ok(channel.add_subscriber(session.id()))
    }

    /// Remove `session` from the channel's subscriber set. Idempotent;
    /// double-unsubscribe is a no-op, not an error.
    pub fn unsubscribe(&self, channel: &Arc<Channel>, session: &Arc<Session>) -> bool {
        channel.remove_subscriber(session.id())
    }

    /// Fan a message out to every session subscribed to the channel or to
    /// a wildcard ancestor pattern matching it.
    ///
    /// Each matched channel's listeners run first (registration order); a
    /// veto suppresses delivery to that channel's direct subscribers only.
    /// The publishing session is a normal fan-out target when subscribed;
    /// there is no sender exclusion. Returns the number of sessions the
    /// message was queued to.
    pub fn publish(
        &self,
        sessions: &SessionRegistry,
        from: Option<&Arc<Session>>,
        channel: &Arc<Channel>,
        message: &mut Message,
    ) -> usize {
        let matched = self.matching_channels(channel);
        let mut recipients: HashSet<String> = HashSet::new();
        for target in &matched {
            if !target.notify_listeners(from, message) {
                log::debug!(
                    "[ChannelRegistry] listener veto on {} for {}",
                    target.path(),
                    channel.path()
                );
                continue;
            }
            for subscriber in target.subscribers() {
                recipients.insert(subscriber);
            }
        }

        let frozen = Arc::new(message.clone());
        let mut delivered = 0;
        for subscriber in recipients {
            if let Some(session) = sessions.get(&subscriber) {
                session.enqueue(Arc::clone(&frozen));
                delivered += 1;
            }
        }
        log::debug!(
            "[ChannelRegistry] published {} to {} session(s)",
            channel.path(),
            delivered
        );
        delivered
    }

    /// The channel itself, its parent's `/*`, and every ancestor's `/**`.
    fn matching_channels(&self, channel: &Arc<Channel>) -> Vec<Arc<Channel>> {
        let id = channel.id();
        let mut seen: HashSet<String> = HashSet::new();
        let mut matched = Vec::new();
        seen.insert(id.path().to_string());
        matched.push(Arc::clone(channel));

        let depth = id.depth();
        if depth == 0 {
            return matched;
        }
        let mut patterns = Vec::with_capacity(depth + 1);
        patterns.push(format!("{}/{}", prefix_path(id, depth - 1), super::WILD));
        for ancestors in (0..depth).rev() {
            patterns.push(format!(
                "{}/{}",
                prefix_path(id, ancestors),
                super::DEEP_WILD
            ));
        }
        for pattern in patterns {
            if !seen.insert(pattern.clone()) {
                continue;
            }
            if let Some(wild) = self.channel(&pattern) {
                matched.push(wild);
            }
        }
        matched
    }

    /// Depth-first post-order reclamation pass.
    ///
    /// Removes subscriber ids whose session is gone, then removes every
    /// channel with no children, no subscribers, no listeners that is not
    /// persistent. Removal cascades upward within the same pass because
    /// children are processed before their parent is considered. The root
    /// is never removed. Returns the number of channels removed.
    pub fn sweep(&self, sessions: &SessionRegistry, listeners: &ListenerRegistry) -> usize {
        let mut removed = 0;
        self.sweep_node(&self.root, sessions, listeners, &mut removed);
        if removed > 0 {
            log::debug!("[ChannelRegistry] sweep removed {} channel(s)", removed);
        }
        removed
    }

    fn sweep_node(
        &self,
        node: &Arc<Channel>,
        sessions: &SessionRegistry,
        listeners: &ListenerRegistry,
        removed: &mut usize,
    ) {
        let pruned = node.prune_subscribers(|id| sessions.contains(id));
        if pruned > 0 {
            log::debug!(
                "[ChannelRegistry] pruned {} dead subscriber(s) from {}",
                pruned,
                node.path()
            );
        }
        for child in node.child_snapshot() {
            self.sweep_node(&child, sessions, listeners, removed);
            if self.try_remove_child(node, &child, listeners) {
                *removed += 1;
            }
        }
    }

    fn try_remove_child(
        &self,
        parent: &Arc<Channel>,
        child: &Arc<Channel>,
        listeners: &ListenerRegistry,
    ) -> bool {
        if child.is_persistent() {
            return false;
        }
        let mut parent_children = parent.children.write();
        {
            let child_children = child.children.write();
            if !child_children.is_empty() || child.has_local_state() {
                return false;
            }
            child.removed.store(true, Ordering::Release);
        }
        if let Some(segment) = child.id().last_segment() {
            parent_children.remove(segment);
        }
        drop(parent_children);

        let dropped = self
            .index
            .remove_if(child.path(), |_, stored| Arc::ptr_eq(stored, child));
        if dropped.is_some() {
            log::debug!("[ChannelRegistry] removed {}", child.path());
            listeners.notify_channel_removed(child.path());
            true
        } else {
            false
        }
    }

    /// Render the channel tree for diagnostics.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        self.root.dump(&mut out, "");
        out
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn prefix_path(id: &ChannelId, depth: usize) -> String {
    if depth == 0 {
        String::new()
    } else {
        format!("/{}", id.segments()[..depth].join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(path: &str) -> ChannelId {
        ChannelId::parse(path).expect("valid path")
    }

    fn registry_with(paths: &[&str]) -> ChannelRegistry {
        let registry = ChannelRegistry::new();
        for path in paths {
            registry
                .resolve(&id(path), true, || true)
                .expect("created channel");
        }
        registry
    }

    fn sessions_with(ids: &[&str]) -> (SessionRegistry, Vec<Arc<Session>>) {
        let sessions = SessionRegistry::new();
        let listeners = ListenerRegistry::new();
        let mut created = Vec::new();
        for sid in ids {
            let session = Session::for_tests(sid, false);
            sessions.add_session(&session, &listeners);
            created.push(session);
        }
        (sessions, created)
    }

    #[test]
    fn test_resolve_creates_intermediates() {
        let registry = registry_with(&["/a/b/c"]);
        assert!(registry.channel("/a").is_some());
        assert!(registry.channel("/a/b").is_some());
        assert!(registry.channel("/a/b/c").is_some());
        assert_eq!(registry.len(), 3);

        let parent = registry.channel("/a/b").expect("intermediate");
        let leaf = registry.channel("/a/b/c").expect("leaf");
        assert_eq!(leaf.parent().expect("parent link").path(), parent.path());
    }

    #[test]
    fn test_resolve_without_create_returns_none() {
        let registry = ChannelRegistry::new();
        assert!(registry.resolve(&id("/a/b"), false, || true).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_resolve_policy_denied() {
        let registry = ChannelRegistry::new();
        assert!(registry.resolve(&id("/a/b"), true, || false).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_policy_checked_once_for_full_path() {
        let registry = ChannelRegistry::new();
        let mut calls = 0;
        registry.resolve(&id("/a/b/c"), true, || {
            calls += 1;
            true
        });
        assert_eq!(calls, 1);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_create_if_absent_runs_init_once() {
        let registry = ChannelRegistry::new();
        let created = registry
            .create_if_absent("/fixed", |channel| channel.set_persistent(true))
            .expect("valid path");
        assert!(created);
        assert!(registry.channel("/fixed").expect("channel").is_persistent());

        let again = registry
            .create_if_absent("/fixed", |_| panic!("init must not run"))
            .expect("valid path");
        assert!(!again);
    }

    #[test]
    fn test_subscribe_restrictions() {
        let registry = registry_with(&["/meta/connect", "/service/echo", "/chat/room1"]);
        let remote = Session::for_tests("remote", false);
        let local = Session::for_tests("local", true);

        let meta = registry.channel("/meta/connect").expect("channel");
        let service = registry.channel("/service/echo").expect("channel");
        let chat = registry.channel("/chat/room1").expect("channel");

        assert!(registry.subscribe(&meta, &remote).is_err());
        assert!(registry.subscribe(&service, &remote).is_err());
        assert!(registry.subscribe(&meta, &local).expect("local allowed"));
        assert!(registry.subscribe(&chat, &remote).expect("plain channel"));
    }

    #[test]
    fn test_publish_wildcard_fanout() {
        let registry = registry_with(&["/a/b", "/a/*", "/a/**", "/a/c", "/x/**"]);
        let (sessions, _) = sessions_with(&["exact", "star", "deep", "sibling", "other"]);

        for (path, sid) in [
            ("/a/b", "exact"),
            ("/a/*", "star"),
            ("/a/**", "deep"),
            ("/a/c", "sibling"),
            ("/x/**", "other"),
        ] {
            let channel = registry.channel(path).expect("channel");
            let session = sessions.get(sid).expect("session");
            registry.subscribe(&channel, &session).expect("subscribe");
        }

        let target = registry.channel("/a/b").expect("channel");
        let mut message = Message::new("/a/b");
        let delivered = registry.publish(&sessions, None, &target, &mut message);
        assert_eq!(delivered, 3);

        for (sid, expect) in [
            ("exact", 1),
            ("star", 1),
            ("deep", 1),
            ("sibling", 0),
            ("other", 0),
        ] {
            let session = sessions.get(sid).expect("session");
            assert_eq!(session.queue_len(), expect, "queue of {}", sid);
        }
    }

    #[test]
    fn test_publisher_receives_own_message_when_subscribed() {
        let registry = registry_with(&["/a/b"]);
        let (sessions, created) = sessions_with(&["self"]);
        let channel = registry.channel("/a/b").expect("channel");
        registry.subscribe(&channel, &created[0]).expect("subscribe");

        let mut message = Message::new("/a/b");
        let delivered = registry.publish(&sessions, Some(&created[0]), &channel, &mut message);
        assert_eq!(delivered, 1);
        assert_eq!(created[0].queue_len(), 1);
    }

    #[test]
    fn test_listener_veto_limited_to_one_channel() {
        use crate::listener::ChannelMessageListener;

        struct Veto;
        impl ChannelMessageListener for Veto {
            fn on_message(
                &self,
                _from: Option<&Arc<Session>>,
                _channel: &Channel,
                _message: &mut Message,
            ) -> bool {
                false
            }
        }

        let registry = registry_with(&["/a/b", "/a/*"]);
        let (sessions, created) = sessions_with(&["direct", "wild"]);
        let direct = registry.channel("/a/b").expect("channel");
        let wild = registry.channel("/a/*").expect("channel");
        registry.subscribe(&direct, &created[0]).expect("subscribe");
        registry.subscribe(&wild, &created[1]).expect("subscribe");

        direct.add_listener(Arc::new(Veto));
        let mut message = Message::new("/a/b");
        let delivered = registry.publish(&sessions, None, &direct, &mut message);

        // The veto silences /a/b's direct subscribers, not /a/*'s.
        assert_eq!(delivered, 1);
        assert_eq!(created[0].queue_len(), 0);
        assert_eq!(created[1].queue_len(), 1);
    }

    #[test]
    fn test_sweep_removes_empty_non_persistent() {
        let registry = registry_with(&["/a/b/c"]);
        let sessions = SessionRegistry::new();
        let listeners = ListenerRegistry::new();

        let removed = registry.sweep(&sessions, &listeners);
        assert_eq!(removed, 3, "cascade removes the whole empty branch");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_sweep_keeps_persistent_and_subscribed() {
        let registry = registry_with(&["/keep", "/busy", "/gone"]);
        let (sessions, created) = sessions_with(&["s1"]);
        registry.channel("/keep").expect("channel").set_persistent(true);
        let busy = registry.channel("/busy").expect("channel");
        registry.subscribe(&busy, &created[0]).expect("subscribe");

        let listeners = ListenerRegistry::new();
        registry.sweep(&sessions, &listeners);

        assert!(registry.channel("/keep").is_some());
        assert!(registry.channel("/busy").is_some());
        assert!(registry.channel("/gone").is_none());
    }

    #[test]
    fn test_sweep_prunes_dead_subscribers_then_removes() {
        let registry = registry_with(&["/room"]);
        let listeners = ListenerRegistry::new();
        let sessions = SessionRegistry::new();

        // Subscriber id with no live session behind it.
        let ghost = Session::for_tests("ghost", false);
        let room = registry.channel("/room").expect("channel");
        registry.subscribe(&room, &ghost).expect("subscribe");

        registry.sweep(&sessions, &listeners);
        assert!(registry.channel("/room").is_none());
    }

    #[test]
    fn test_recreate_after_sweep_yields_live_channel() {
        let registry = registry_with(&["/a/b"]);
        let sessions = SessionRegistry::new();
        let listeners = ListenerRegistry::new();

        registry.sweep(&sessions, &listeners);
        assert!(registry.channel("/a/b").is_none());

        // Re-creating the same path after removal is a fresh registration,
        // not a duplicate: the new node is indexed and usable.
        let recreated = registry
            .resolve(&id("/a/b"), true, || true)
            .expect("recreated channel");
        let looked_up = registry.channel("/a/b").expect("indexed");
        assert!(Arc::ptr_eq(&recreated, &looked_up));

        let (sessions, created) = sessions_with(&["s1"]);
        registry.subscribe(&recreated, &created[0]).expect("subscribe");
        let mut message = Message::new("/a/b");
        assert_eq!(registry.publish(&sessions, None, &recreated, &mut message), 1);
    }

    #[test]
    fn test_sweep_notifies_channel_listeners() {
        use crate::listener::ChannelListener;
        use parking_lot::Mutex;

        struct Recorder(Mutex<Vec<String>>);
        impl ChannelListener for Recorder {
            fn channel_removed(&self, channel_id: &str) {
                self.0.lock().push(channel_id.to_string());
            }
        }

        let registry = registry_with(&["/a"]);
        let listeners = ListenerRegistry::new();
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        listeners.add_channel_listener(recorder.clone());

        registry.sweep(&SessionRegistry::new(), &listeners);
        assert_eq!(*recorder.0.lock(), vec!["/a".to_string()]);
    }

    #[test]
    fn test_randomized_tree_sweep_keeps_subscribed_branches() {
        let registry = ChannelRegistry::new();
        let (sessions, created) = sessions_with(&["keeper"]);
        let listeners = ListenerRegistry::new();

        let mut kept = Vec::new();
        for i in 0..50 {
            let depth = 1 + fastrand::usize(..3);
            let mut path = String::new();
            for _ in 0..depth {
                path.push_str(&format!("/s{}", fastrand::u8(..6)));
            }
            let channel = registry
                .resolve(&id(&path), true, || true)
                .expect("created channel");
            if i % 7 == 0 {
                registry.subscribe(&channel, &created[0]).expect("subscribe");
                kept.push(channel.path().to_string());
            }
        }

        registry.sweep(&sessions, &listeners);
        for path in &kept {
            assert!(registry.channel(path).is_some(), "{} swept away", path);
        }

        // Drop the subscriptions and the whole tree goes.
        for path in &kept {
            let channel = registry.channel(path).expect("channel");
            registry.unsubscribe(&channel, &created[0]);
        }
        registry.sweep(&sessions, &listeners);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_dump_renders_tree() {
        let registry = registry_with(&["/a/b", "/a/c"]);
        let dump = registry.dump();
        assert!(dump.contains("/a/b"));
        assert!(dump.contains("/a/c"));
    }
}
