// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Session index and lifecycle.
//!
//! The id->session index is a concurrent map; all mutation goes through
//! atomic insert / remove-if-identity operations so a handshake race and
//! an expiry race can never both win against the same identifier.

use super::Session;
use crate::config::{self, ServerOptions};
use crate::error::{Error, Result};
use crate::listener::ListenerRegistry;
use crate::message::fields;
use crate::transport::Transport;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;

/// Owns the id->session index.
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<Session>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Allocate a session with a fresh cryptographically-random id.
    ///
    /// The id is checked against the index and regenerated on collision;
    /// exhausting the bounded retry budget is a fatal configuration error.
    /// The session is *not* indexed yet - that happens when its handshake
    /// completes via [`SessionRegistry::add_session`].
    pub fn create_session(
        &self,
        transport: Option<Arc<dyn Transport>>,
        id_hint: Option<&str>,
        local: bool,
    ) -> Result<Arc<Session>> {
        for _ in 0..config::ID_RETRY_LIMIT {
            let id = random_session_id(id_hint)?;
            if !self.sessions.contains_key(&id) {
                return Ok(Session::new(id, transport, local));
            }
            log::debug!("[SessionRegistry] session id collision, retrying");
        }
        Err(Error::IdSpaceExhausted)
    }

    /// Index a session that completed handshake and notify listeners.
    ///
    /// Returns false (without replacing anything) if the id is already
    /// taken - with 160-bit random ids this indicates an internal bug.
    pub fn add_session(&self, session: &Arc<Session>, listeners: &ListenerRegistry) -> bool {
        match self.sessions.entry(session.id().to_string()) {
            Entry::Occupied(_) => {
                log::error!("[SessionRegistry] duplicate session id {}", session.id());
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::clone(session));
                log::debug!("[SessionRegistry] added {:?}", session);
                listeners.notify_session_added(session);
                true
            }
        }
    }

    /// Remove a session if the stored identity still matches, notify
    /// listeners, and tear the session down.
    ///
    /// Returns whether this call performed the removal; a racing double
    /// removal loses and returns false.
    pub fn remove_session(
        &self,
        session: &Arc<Session>,
        timed_out: bool,
        listeners: &ListenerRegistry,
    ) -> bool {
        let removed = self
            .sessions
            .remove_if(session.id(), |_, stored| Arc::ptr_eq(stored, session));
        if removed.is_none() {
            return false;
        }
        log::debug!(
            "[SessionRegistry] removed {:?}{}",
            session,
            if timed_out { " (timed out)" } else { "" }
        );
        listeners.notify_session_removed(session, timed_out);
        session.finish_removal();
        true
    }

    /// Look up a session by client id.
    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|s| Arc::clone(s.value()))
    }

    /// Whether a session with this id is indexed.
    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Number of indexed sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Snapshot of all indexed sessions.
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Record a connect: refresh the session's expiry clock, store any
    /// timeout/interval overrides from the inbound advice, and return the
    /// advice to send back, if the server needs the client to change its
    /// reconnect behavior (absent otherwise).
    pub fn negotiate_connect(
        &self,
        session: &Arc<Session>,
        advice_in: Option<&Value>,
        now: u64,
    ) -> Option<Value> {
        session.connect(now);
        if let Some(advice) = advice_in {
            let timeout = advice
                .get(fields::TIMEOUT)
                .and_then(Value::as_u64)
                .unwrap_or(0);
            session.set_timeout_ms(timeout);
            let interval = advice
                .get(fields::INTERVAL)
                .and_then(Value::as_u64)
                .unwrap_or(0);
            session.set_interval_ms(interval);
        }
        session.take_advice()
    }

    /// Remove every session whose reconnect window has elapsed.
    pub fn sweep(&self, now: u64, options: &ServerOptions, listeners: &ListenerRegistry) {
        let expired: Vec<Arc<Session>> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().expired(now, options))
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for session in expired {
            if self.remove_session(&session, true, listeners) {
                log::debug!("[SessionRegistry] swept expired session {}", session.id());
            }
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// 20 random bytes, hex-encoded, with the optional hint as a prefix.
fn random_session_id(hint: Option<&str>) -> Result<String> {
    let mut bytes = [0u8; 20];
    getrandom::getrandom(&mut bytes).map_err(|_| Error::RandomUnavailable)?;
    let mut id = String::with_capacity(bytes.len() * 2 + 16);
    if let Some(hint) = hint {
        id.push_str(hint);
        id.push('_');
    }
    for byte in bytes {
        use std::fmt::Write;
        // Write into a String cannot fail.
        let _ = write!(id, "{:02x}", byte);
    }
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_create_session_is_not_indexed() {
        let registry = SessionRegistry::new();
        let session = registry
            .create_session(None, None, false)
            .expect("session id");
        assert!(!registry.contains(session.id()));
        assert!(!session.id().is_empty());
    }

    #[test]
    fn test_id_hint_is_incorporated() {
        let registry = SessionRegistry::new();
        let session = registry
            .create_session(None, Some("local"), true)
            .expect("session id");
        assert!(session.id().starts_with("local_"));
        assert!(session.is_local());
    }

    #[test]
    fn test_add_and_identity_guarded_remove() {
        let registry = SessionRegistry::new();
        let listeners = ListenerRegistry::new();
        let session = registry
            .create_session(None, None, false)
            .expect("session id");

        assert!(registry.add_session(&session, &listeners));
        assert!(registry.contains(session.id()));

        assert!(registry.remove_session(&session, false, &listeners));
        assert!(!registry.contains(session.id()));
        // Second removal loses the identity check.
        assert!(!registry.remove_session(&session, false, &listeners));
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let registry = SessionRegistry::new();
        let mut seen = HashSet::new();
        for _ in 0..100 {
            let session = registry
                .create_session(None, None, false)
                .expect("session id");
            assert!(seen.insert(session.id().to_string()));
        }
    }

    #[test]
    fn test_negotiate_connect_stores_overrides() {
        let registry = SessionRegistry::new();
        let session = registry
            .create_session(None, None, false)
            .expect("session id");

        let advice_in = serde_json::json!({"timeout": 5000, "interval": 1000});
        let advice_out = registry.negotiate_connect(&session, Some(&advice_in), 42);
        assert!(advice_out.is_none());
        assert_eq!(session.timeout_ms(), 5_000);
        assert_eq!(session.interval_ms(), 1_000);
        assert_eq!(session.last_connect_ms(), 42);
        assert!(session.is_connected());
    }

    #[test]
    fn test_negotiate_connect_returns_parked_advice_once() {
        let registry = SessionRegistry::new();
        let session = registry
            .create_session(None, None, false)
            .expect("session id");
        session.set_advice(serde_json::json!({"reconnect": "retry", "interval": 2000}));

        assert!(registry.negotiate_connect(&session, None, 1).is_some());
        assert!(registry.negotiate_connect(&session, None, 2).is_none());
    }

    #[test]
    fn test_sweep_removes_expired_only() {
        let registry = SessionRegistry::new();
        let listeners = ListenerRegistry::new();
        let options = ServerOptions::new();

        let fresh = registry
            .create_session(None, None, false)
            .expect("session id");
        let stale = registry
            .create_session(None, None, false)
            .expect("session id");
        registry.add_session(&fresh, &listeners);
        registry.add_session(&stale, &listeners);

        let window = options.timeout_ms() + options.interval_ms();
        stale.connect(1_000);
        fresh.connect(1_000 + window);

        registry.sweep(1_000 + window + 1, &options, &listeners);
        assert!(registry.contains(fresh.id()));
        assert!(!registry.contains(stale.id()));
    }
}
