// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Server-side sessions.
//!
//! A [`Session`] is one client's identity on the server: its queue of
//! pending outbound messages, its negotiated reconnect advice, and its
//! transport attachment. Sessions are created on handshake, indexed by the
//! [`SessionRegistry`], and removed on disconnect, transport close, or
//! timeout sweep.
//!
//! Locking is scoped per session (queue, transport, advice); the registry
//! index itself is a concurrent map. Nothing here blocks on I/O - waking
//! the transport is a non-blocking signal.

mod registry;

pub use registry::SessionRegistry;

use crate::config::ServerOptions;
use crate::extension::ExtensionChain;
use crate::message::Message;
use crate::scheduler::TimeoutHandle;
use crate::transport::Transport;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// One client's connection state on the server.
pub struct Session {
    id: String,
    local: bool,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    connected: AtomicBool,
    removed: AtomicBool,
    queue: Mutex<VecDeque<Arc<Message>>>,
    /// Client-negotiated hold timeout; 0 means server default.
    timeout_ms: AtomicU64,
    /// Client-negotiated reconnect pause; 0 means server default.
    interval_ms: AtomicU64,
    last_connect_ms: AtomicU64,
    advice: Mutex<Option<Value>>,
    hold: Mutex<Option<TimeoutHandle>>,
    extensions: ExtensionChain,
    attributes: DashMap<String, Value>,
}

impl Session {
    pub(crate) fn new(id: String, transport: Option<Arc<dyn Transport>>, local: bool) -> Arc<Self> {
        Arc::new(Self {
            id,
            local,
            transport: Mutex::new(transport),
            connected: AtomicBool::new(false),
            removed: AtomicBool::new(false),
            queue: Mutex::new(VecDeque::new()),
            timeout_ms: AtomicU64::new(0),
            interval_ms: AtomicU64::new(0),
            last_connect_ms: AtomicU64::new(0),
            advice: Mutex::new(None),
            hold: Mutex::new(None),
            extensions: ExtensionChain::new(),
            attributes: DashMap::new(),
        })
    }

    #[cfg(test)]
    pub(crate) fn for_tests(id: &str, local: bool) -> Arc<Self> {
        Self::new(id.to_string(), None, local)
    }

    /// Server-assigned identifier. Never changes, never reused.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether this is a local (in-process) session, exempt from the
    /// trust restrictions applied to remote publishers.
    pub fn is_local(&self) -> bool {
        self.local
    }

    /// Whether the session currently holds a connect.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Whether the session has been removed from the registry.
    pub fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    /// Attach or replace the transport.
    pub fn set_transport(&self, transport: Option<Arc<dyn Transport>>) {
        *self.transport.lock() = transport;
    }

    /// Current transport, if any.
    pub fn transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport.lock().clone()
    }

    /// Queue an outbound message and wake the transport.
    ///
    /// Safe against a concurrent removal: if the session was removed while
    /// we enqueued, the queue is discarded again so no message lingers on
    /// a dead session.
    pub fn enqueue(&self, message: Arc<Message>) {
        self.queue.lock().push_back(message);
        if self.is_removed() {
            self.queue.lock().clear();
            return;
        }
        self.wake();
    }

    /// Drain the outbound queue, FIFO.
    pub fn take_queue(&self) -> Vec<Arc<Message>> {
        self.queue.lock().drain(..).collect()
    }

    /// Number of pending outbound messages.
    pub fn queue_len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Non-blocking wake signal to the transport, if one is attached.
    pub fn wake(&self) {
        if let Some(transport) = self.transport() {
            transport.wake(self);
        }
    }

    /// Per-session extension chain.
    pub fn extensions(&self) -> &ExtensionChain {
        &self.extensions
    }

    /// Arbitrary attributes for stateful extensions.
    pub fn set_attribute(&self, name: &str, value: Value) {
        self.attributes.insert(name.to_string(), value);
    }

    /// Look up an attribute.
    pub fn attribute(&self, name: &str) -> Option<Value> {
        self.attributes.get(name).map(|v| v.value().clone())
    }

    /// Park advice to be sent on the next connect reply.
    pub fn set_advice(&self, advice: Value) {
        *self.advice.lock() = Some(advice);
    }

    /// Take the parked advice; one-shot.
    pub fn take_advice(&self) -> Option<Value> {
        self.advice.lock().take()
    }

    /// Negotiated hold timeout, or 0 when the client sent none.
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms.load(Ordering::Relaxed)
    }

    /// Negotiated reconnect pause, or 0 when the client sent none.
    pub fn interval_ms(&self) -> u64 {
        self.interval_ms.load(Ordering::Relaxed)
    }

    pub(crate) fn set_timeout_ms(&self, timeout: u64) {
        self.timeout_ms.store(timeout, Ordering::Relaxed);
    }

    pub(crate) fn set_interval_ms(&self, interval: u64) {
        self.interval_ms.store(interval, Ordering::Relaxed);
    }

    /// Hold timeout with the server default applied.
    pub fn effective_timeout_ms(&self, options: &ServerOptions) -> u64 {
        match self.timeout_ms() {
            0 => options.timeout_ms(),
            t => t,
        }
    }

    /// Reconnect pause with the server default applied.
    pub fn effective_interval_ms(&self, options: &ServerOptions) -> u64 {
        match self.interval_ms() {
            0 => options.interval_ms(),
            i => i,
        }
    }

    /// Timestamp of the last connect (or the handshake, before any
    /// connect arrives).
    pub fn last_connect_ms(&self) -> u64 {
        self.last_connect_ms.load(Ordering::Relaxed)
    }

    /// Mark the handshake: the expiry clock starts here.
    pub(crate) fn handshake(&self, now: u64) {
        self.last_connect_ms.store(now, Ordering::Relaxed);
    }

    /// Mark a connect: refresh the expiry clock, flag connected.
    pub(crate) fn connect(&self, now: u64) {
        self.last_connect_ms.store(now, Ordering::Relaxed);
        self.connected.store(true, Ordering::Release);
    }

    /// Replace the pending connect-hold handle, returning the old one so
    /// the caller can cancel it against the scheduler.
    pub(crate) fn swap_hold(&self, handle: Option<TimeoutHandle>) -> Option<TimeoutHandle> {
        let mut hold = self.hold.lock();
        std::mem::replace(&mut *hold, handle)
    }

    /// Whether the reconnect window has elapsed since the last connect.
    pub(crate) fn expired(&self, now: u64, options: &ServerOptions) -> bool {
        let last = self.last_connect_ms();
        if last == 0 {
            return false;
        }
        let window = self
            .effective_timeout_ms(options)
            .saturating_add(self.effective_interval_ms(options));
        now.saturating_sub(last) > window
    }

    /// Teardown on removal: flush the pending queue toward the transport,
    /// detach it, mark disconnected. Returns whether the session was
    /// connected.
    pub(crate) fn finish_removal(&self) -> bool {
        self.removed.store(true, Ordering::Release);
        let was_connected = self.connected.swap(false, Ordering::AcqRel);
        self.wake();
        self.set_transport(None);
        self.queue.lock().clear();
        was_connected
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("local", &self.local)
            .field("connected", &self.is_connected())
            .field("queued", &self.queue_len())
            .finish()
    }
}
