// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bayeux message record.
//!
//! A [`Message`] is a mutable key/value record over the standard Bayeux
//! field names. The meta/application classification is fixed when the
//! message is constructed (the channel never changes afterwards) and
//! decides which interceptor lane and which security-policy check apply.
//!
//! The request/reply association is explicit: [`Message::reply_to`] builds
//! the reply for a request, copying its channel and (if present) its id.
//! The pair is owned by the exchange that created it; no hidden
//! back-pointers.

use serde_json::{Map, Value};

/// Standard Bayeux field names.
pub mod fields {
    /// Channel path of the message.
    pub const CHANNEL: &str = "channel";
    /// Server-assigned client (session) id.
    pub const CLIENT_ID: &str = "clientId";
    /// Client-assigned message id, echoed on the reply.
    pub const ID: &str = "id";
    /// Application payload.
    pub const DATA: &str = "data";
    /// Reconnect advice block.
    pub const ADVICE: &str = "advice";
    /// Subscription target of subscribe/unsubscribe requests.
    pub const SUBSCRIPTION: &str = "subscription";
    /// Success flag of a reply.
    pub const SUCCESSFUL: &str = "successful";
    /// Coded error string of an unsuccessful reply (`"<code>::<text>"`).
    pub const ERROR: &str = "error";
    /// Protocol version announced on handshake replies.
    pub const VERSION: &str = "version";
    /// Minimum protocol version announced on handshake replies.
    pub const MIN_VERSION: &str = "minimumVersion";
    /// Transport names offered on handshake replies.
    pub const SUPPORTED_CONNECTION_TYPES: &str = "supportedConnectionTypes";
    /// Advice key: reconnect directive.
    pub const RECONNECT: &str = "reconnect";
    /// Advice key: hold timeout override.
    pub const TIMEOUT: &str = "timeout";
    /// Advice key: reconnect pause override.
    pub const INTERVAL: &str = "interval";
    /// Reconnect directive: give up.
    pub const RECONNECT_NONE: &str = "none";
    /// Reconnect directive: perform a new handshake.
    pub const RECONNECT_HANDSHAKE: &str = "handshake";
    /// Reconnect directive: retry the connect.
    pub const RECONNECT_RETRY: &str = "retry";
}

/// Mutable Bayeux message.
#[derive(Debug, Clone)]
pub struct Message {
    map: Map<String, Value>,
    meta: bool,
}

impl Message {
    /// Create an empty message bound to `channel`.
    ///
    /// Classification (meta vs. application) is derived here and never
    /// changes for the lifetime of the message.
    pub fn new(channel: &str) -> Self {
        let mut map = Map::new();
        map.insert(fields::CHANNEL.to_string(), Value::String(channel.to_string()));
        Self {
            map,
            meta: crate::channel::ChannelId::is_meta_path(channel),
        }
    }

    /// Create a message without a channel (malformed by construction;
    /// used to model inbound garbage in the engine's error path and tests).
    pub fn empty() -> Self {
        Self {
            map: Map::new(),
            meta: false,
        }
    }

    /// Build the reply for `request`: same channel, same id if present.
    pub fn reply_to(request: &Message) -> Self {
        let mut reply = match request.channel() {
            Some(channel) => Message::new(channel),
            None => Message::empty(),
        };
        if let Some(id) = request.get(fields::ID) {
            reply.set(fields::ID, id.clone());
        }
        reply
    }

    /// Whether this message travels on a meta channel.
    pub fn is_meta(&self) -> bool {
        self.meta
    }

    /// Channel path, if present.
    pub fn channel(&self) -> Option<&str> {
        self.map.get(fields::CHANNEL).and_then(Value::as_str)
    }

    /// Raw field access.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.map.get(name)
    }

    /// Raw field write.
    pub fn set(&mut self, name: &str, value: Value) {
        self.map.insert(name.to_string(), value);
    }

    /// Remove a field, returning its previous value.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.map.remove(name)
    }

    /// Client (session) id field.
    pub fn client_id(&self) -> Option<&str> {
        self.map.get(fields::CLIENT_ID).and_then(Value::as_str)
    }

    /// Set the client id field.
    pub fn set_client_id(&mut self, id: &str) {
        self.set(fields::CLIENT_ID, Value::String(id.to_string()));
    }

    /// Message id field.
    pub fn id(&self) -> Option<&Value> {
        self.map.get(fields::ID)
    }

    /// Application payload.
    pub fn data(&self) -> Option<&Value> {
        self.map.get(fields::DATA)
    }

    /// Set the application payload.
    pub fn set_data(&mut self, data: Value) {
        self.set(fields::DATA, data);
    }

    /// Subscription target of a subscribe/unsubscribe request.
    pub fn subscription(&self) -> Option<&str> {
        self.map.get(fields::SUBSCRIPTION).and_then(Value::as_str)
    }

    /// Advice block, if present.
    pub fn advice(&self) -> Option<&Value> {
        self.map.get(fields::ADVICE)
    }

    /// Set the advice block.
    pub fn set_advice(&mut self, advice: Value) {
        self.set(fields::ADVICE, advice);
    }

    /// Success flag; absent counts as unsuccessful.
    pub fn is_successful(&self) -> bool {
        self.map
            .get(fields::SUCCESSFUL)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Set the success flag.
    pub fn set_successful(&mut self, successful: bool) {
        self.set(fields::SUCCESSFUL, Value::Bool(successful));
    }

    /// Coded error string of an unsuccessful reply.
    pub fn error(&self) -> Option<&str> {
        self.map.get(fields::ERROR).and_then(Value::as_str)
    }

    /// Mark the message unsuccessful with a `"<code>::<text>"` error.
    pub fn fail(&mut self, error: &str) {
        self.set(fields::ERROR, Value::String(error.to_string()));
        self.set_successful(false);
    }

    /// Iterate over all fields.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.map.iter()
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", Value::Object(self.map.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classification_fixed_at_construction() {
        assert!(Message::new("/meta/handshake").is_meta());
        assert!(Message::new("/meta/connect").is_meta());
        assert!(!Message::new("/chat/room1").is_meta());
        assert!(!Message::new("/service/echo").is_meta());
        assert!(!Message::empty().is_meta());
    }

    #[test]
    fn test_reply_copies_channel_and_id() {
        let mut request = Message::new("/meta/subscribe");
        request.set(fields::ID, json!("42"));

        let reply = Message::reply_to(&request);
        assert_eq!(reply.channel(), Some("/meta/subscribe"));
        assert_eq!(reply.get(fields::ID), Some(&json!("42")));
        assert!(reply.is_meta());
    }

    #[test]
    fn test_reply_without_id() {
        let request = Message::new("/chat/room1");
        let reply = Message::reply_to(&request);
        assert_eq!(reply.channel(), Some("/chat/room1"));
        assert!(reply.get(fields::ID).is_none());
    }

    #[test]
    fn test_fail_sets_error_and_unsuccessful() {
        let mut reply = Message::new("/meta/connect");
        reply.fail("402::Unknown client");
        assert!(!reply.is_successful());
        assert_eq!(reply.error(), Some("402::Unknown client"));
    }

    #[test]
    fn test_successful_absent_is_false() {
        let msg = Message::new("/chat/room1");
        assert!(!msg.is_successful());
    }

    #[test]
    fn test_typed_accessors_round_trip() {
        let mut msg = Message::new("/chat/room1");
        msg.set_client_id("abc123");
        msg.set_data(json!({"text": "hello"}));
        msg.set_advice(json!({"reconnect": "retry"}));

        assert_eq!(msg.client_id(), Some("abc123"));
        assert_eq!(msg.data(), Some(&json!({"text": "hello"})));
        assert_eq!(msg.advice(), Some(&json!({"reconnect": "retry"})));
    }
}
