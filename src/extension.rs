// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Message interceptor chain.
//!
//! Extensions see every message at the engine boundary: forward in
//! registration order on receive, reverse on send, with separate hooks for
//! meta and application traffic. The first hook returning `false` stops
//! the chain: a receive veto rejects the message (the caller replies with
//! a deletion error), a send veto suppresses the outbound message
//! entirely.
//!
//! The reversal on send gives symmetric wrapping: the extension that saw
//! a message first on the way in unwraps it last on the way out.
//!
//! Registration uses a copy-on-write list so the message path iterates a
//! consistent snapshot without a lock, even while another thread registers.

use crate::message::Message;
use crate::session::Session;
use arc_swap::ArcSwap;
use std::sync::Arc;

/// Interceptor with up to four hooks, all defaulting to pass-through.
///
/// Extensions hold no engine state; anything session-scoped lives in the
/// session's attribute map.
pub trait Extension: Send + Sync {
    /// Inbound application message. Return `false` to reject it.
    fn recv(&self, _session: Option<&Arc<Session>>, _message: &mut Message) -> bool {
        true
    }

    /// Inbound meta message. Return `false` to reject it.
    fn recv_meta(&self, _session: Option<&Arc<Session>>, _message: &mut Message) -> bool {
        true
    }

    /// Outbound application message. Return `false` to suppress it.
    fn send(&self, _session: Option<&Arc<Session>>, _message: &mut Message) -> bool {
        true
    }

    /// Outbound meta message. Return `false` to suppress it.
    fn send_meta(&self, _session: Option<&Arc<Session>>, _message: &mut Message) -> bool {
        true
    }
}

/// Ordered extension list with directional application.
pub struct ExtensionChain {
    extensions: ArcSwap<Vec<Arc<dyn Extension>>>,
}

impl ExtensionChain {
    /// Create an empty chain.
    pub fn new() -> Self {
        Self {
            extensions: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Append an extension; it becomes last on receive, first on send.
    pub fn add(&self, extension: Arc<dyn Extension>) {
        self.extensions.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(Arc::clone(&extension));
            next
        });
    }

    /// Number of registered extensions.
    pub fn len(&self) -> usize {
        self.extensions.load().len()
    }

    /// Whether the chain is empty.
    pub fn is_empty(&self) -> bool {
        self.extensions.load().is_empty()
    }

    /// Apply the receive lane, forward, stopping at the first veto.
    pub fn apply_recv(&self, session: Option<&Arc<Session>>, message: &mut Message) -> bool {
        let snapshot = self.extensions.load();
        for extension in snapshot.iter() {
            let passed = if message.is_meta() {
                extension.recv_meta(session, message)
            } else {
                extension.recv(session, message)
            };
            if !passed {
                return false;
            }
        }
        true
    }

    /// Apply the send lane, in reverse registration order, stopping at the
    /// first veto.
    pub fn apply_send(&self, session: Option<&Arc<Session>>, message: &mut Message) -> bool {
        let snapshot = self.extensions.load();
        for extension in snapshot.iter().rev() {
            let passed = if message.is_meta() {
                extension.send_meta(session, message)
            } else {
                extension.send(session, message)
            };
            if !passed {
                return false;
            }
        }
        true
    }
}

impl Default for ExtensionChain {
    fn default() -> Self {
        Self::new()
    }
}
