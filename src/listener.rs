// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Server listener traits and the typed listener registry.
//!
//! Listeners are sorted by capability once, at registration time, into
//! separate ordered lists - the event paths never probe a listener for the
//! capability it implements. Each list is copy-on-write so event delivery
//! iterates a consistent snapshot without a lock.
//!
//! Listeners are called from the message path and from the timer thread.
//! They must be `Send + Sync` and must not block.

use crate::channel::Channel;
use crate::message::Message;
use crate::session::Session;
use arc_swap::ArcSwap;
use std::sync::Arc;

/// Observes session lifecycle.
pub trait SessionListener: Send + Sync {
    /// A session completed handshake and entered the registry.
    fn session_added(&self, session: &Arc<Session>);

    /// A session left the registry. `timed_out` is true when the sweep
    /// removed it after its reconnect window elapsed.
    fn session_removed(&self, session: &Arc<Session>, timed_out: bool);
}

/// Observes channel removal.
pub trait ChannelListener: Send + Sync {
    /// A channel was removed from the registry by the sweep.
    fn channel_removed(&self, channel_id: &str);
}

/// Channel-scoped message interceptor, run during fan-out.
///
/// Returning `false` vetoes delivery to that channel's direct subscribers;
/// delivery through other matched channels is unaffected.
pub trait ChannelMessageListener: Send + Sync {
    /// Called for each message published through the channel.
    fn on_message(
        &self,
        from: Option<&Arc<Session>>,
        channel: &Channel,
        message: &mut Message,
    ) -> bool;
}

/// Typed listener slots, one ordered copy-on-write list per capability.
pub struct ListenerRegistry {
    session: ArcSwap<Vec<Arc<dyn SessionListener>>>,
    channel: ArcSwap<Vec<Arc<dyn ChannelListener>>>,
}

impl ListenerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            session: ArcSwap::from_pointee(Vec::new()),
            channel: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Register a session-lifecycle listener.
    pub fn add_session_listener(&self, listener: Arc<dyn SessionListener>) {
        self.session.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(Arc::clone(&listener));
            next
        });
    }

    /// Register a channel-removal listener.
    pub fn add_channel_listener(&self, listener: Arc<dyn ChannelListener>) {
        self.channel.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(Arc::clone(&listener));
            next
        });
    }

    /// Notify session-added, in registration order.
    pub fn notify_session_added(&self, session: &Arc<Session>) {
        for listener in self.session.load().iter() {
            listener.session_added(session);
        }
    }

    /// Notify session-removed, in registration order.
    pub fn notify_session_removed(&self, session: &Arc<Session>, timed_out: bool) {
        for listener in self.session.load().iter() {
            listener.session_removed(session, timed_out);
        }
    }

    /// Notify channel-removed, in registration order.
    pub fn notify_channel_removed(&self, channel_id: &str) {
        for listener in self.channel.load().iter() {
            listener.channel_removed(channel_id);
        }
    }
}

impl Default for ListenerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
