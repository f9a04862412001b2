// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Extension chain and listener integration tests
//!
//! Covers receive-side veto (`404` reply, no publish side effect),
//! send-side suppression, per-session chains, and listener notification
//! on session and channel lifecycle events.

use hbayeux::{fields, BayeuxServer, Extension, Message, Session, SessionListener};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;

fn handshaken(server: &Arc<BayeuxServer>) -> Arc<Session> {
    let mut handshake = Message::new("/meta/handshake");
    let reply = server.handle(None, &mut handshake).expect("handshake");
    let id = reply.client_id().expect("client id").to_string();
    server.session(&id).expect("session indexed")
}

fn subscribe(server: &Arc<BayeuxServer>, session: &Arc<Session>, channel: &str) {
    let mut request = Message::new("/meta/subscribe");
    request.set(fields::SUBSCRIPTION, json!(channel));
    let reply = server.handle(Some(session), &mut request).expect("subscribe");
    assert!(reply.is_successful());
}

struct RejectData;
impl Extension for RejectData {
    fn recv(&self, _session: Option<&Arc<Session>>, _message: &mut Message) -> bool {
        false
    }
}

struct SuppressSend;
impl Extension for SuppressSend {
    fn send(&self, _session: Option<&Arc<Session>>, _message: &mut Message) -> bool {
        false
    }
}

struct Stamp(&'static str);
impl Extension for Stamp {
    fn recv(&self, _session: Option<&Arc<Session>>, message: &mut Message) -> bool {
        message.set(self.0, json!(true));
        true
    }
}

#[test]
fn test_receive_veto_yields_404_and_no_side_effect() {
    let server = BayeuxServer::new();
    let subscriber = handshaken(&server);
    subscribe(&server, &subscriber, "/chat/room1");
    let publisher = handshaken(&server);

    server.add_extension(Arc::new(RejectData));

    let mut publish = Message::new("/chat/room1");
    publish.set_data(json!("blocked"));
    let reply = server.handle(Some(&publisher), &mut publish).expect("handle");

    assert!(!reply.is_successful());
    assert_eq!(reply.error(), Some("404::Message deleted"));
    assert_eq!(subscriber.queue_len(), 0, "veto must stop the publish");
}

#[test]
fn test_receive_veto_does_not_touch_meta_traffic() {
    let server = BayeuxServer::new();
    server.add_extension(Arc::new(RejectData));

    // RejectData only implements the non-meta hook; a handshake still works.
    let mut handshake = Message::new("/meta/handshake");
    let reply = server.handle(None, &mut handshake).expect("handshake");
    assert!(reply.is_successful());
}

#[test]
fn test_send_veto_suppresses_reply() {
    let server = BayeuxServer::new();
    let session = handshaken(&server);
    server.add_extension(Arc::new(SuppressSend));

    let mut publish = Message::new("/chat/room1");
    let reply = server.handle(Some(&session), &mut publish).expect("handle");
    assert!(reply.is_successful());

    // The transport sees "nothing to send", not an error.
    assert!(server.extend_reply(Some(&session), reply).is_none());
}

#[test]
fn test_session_chain_runs_inside_server_chain() {
    let server = BayeuxServer::new();
    let session = handshaken(&server);

    server.add_extension(Arc::new(Stamp("server_saw")));
    session.extensions().add(Arc::new(Stamp("session_saw")));

    let mut publish = Message::new("/chat/room1");
    server.handle(Some(&session), &mut publish).expect("handle");

    assert_eq!(publish.get("server_saw"), Some(&json!(true)));
    assert_eq!(publish.get("session_saw"), Some(&json!(true)));
}

#[test]
fn test_extension_can_rewrite_payload() {
    struct Redact;
    impl Extension for Redact {
        fn recv(&self, _session: Option<&Arc<Session>>, message: &mut Message) -> bool {
            if message.data().is_some() {
                message.set_data(json!("[redacted]"));
            }
            true
        }
    }

    let server = BayeuxServer::new();
    let subscriber = handshaken(&server);
    subscribe(&server, &subscriber, "/chat/room1");
    server.add_extension(Arc::new(Redact));

    let publisher = handshaken(&server);
    let mut publish = Message::new("/chat/room1");
    publish.set_data(json!("secret"));
    server.handle(Some(&publisher), &mut publish).expect("handle");

    let queued = subscriber.take_queue();
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].data(), Some(&json!("[redacted]")));
}

#[test]
fn test_session_listener_sees_lifecycle() {
    #[derive(Default)]
    struct Recorder {
        added: Mutex<Vec<String>>,
        removed: Mutex<Vec<(String, bool)>>,
    }
    impl SessionListener for Recorder {
        fn session_added(&self, session: &Arc<Session>) {
            self.added.lock().push(session.id().to_string());
        }
        fn session_removed(&self, session: &Arc<Session>, timed_out: bool) {
            self.removed.lock().push((session.id().to_string(), timed_out));
        }
    }

    let server = BayeuxServer::new();
    let recorder = Arc::new(Recorder::default());
    server.add_session_listener(recorder.clone());

    let session = handshaken(&server);
    assert_eq!(*recorder.added.lock(), vec![session.id().to_string()]);

    let mut disconnect = Message::new("/meta/disconnect");
    server
        .handle(Some(&session), &mut disconnect)
        .expect("disconnect");
    assert_eq!(
        *recorder.removed.lock(),
        vec![(session.id().to_string(), false)]
    );
}

#[test]
fn test_channel_message_listener_veto_scoped_to_channel() {
    use hbayeux::{Channel, ChannelMessageListener};

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

    let server = BayeuxServer::new();
    let direct = handshaken(&server);
    let wild = handshaken(&server);
    subscribe(&server, &direct, "/chat/room1");
    subscribe(&server, &wild, "/chat/*");

    server
        .channel("/chat/room1")
        .expect("channel")
        .add_listener(Arc::new(Veto));

    let publisher = handshaken(&server);
    let mut publish = Message::new("/chat/room1");
    publish.set_data(json!("x"));
    let reply = server.handle(Some(&publisher), &mut publish).expect("handle");
    assert!(reply.is_successful());

    assert_eq!(direct.queue_len(), 0, "vetoed channel's subscribers");
    assert_eq!(wild.queue_len(), 1, "other matched channels unaffected");
}
