// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Meta-channel handlers.
//!
//! One function per meta channel, dispatched explicitly by path from
//! [`handle_meta`]. Each handler takes `(session-or-absent, request)` and
//! returns the reply; protocol failures are unsuccessful replies carrying
//! a `"<code>::<text>"` error string, never crate errors.

use super::BayeuxServer;
use crate::channel::{
    Channel, ChannelId, META_CONNECT, META_DISCONNECT, META_HANDSHAKE, META_SUBSCRIBE,
    META_UNSUBSCRIBE,
};
use crate::error::Result;
use crate::message::{fields, Message};
use crate::scheduler::now_millis;
use crate::session::Session;
use serde_json::json;
use std::sync::Arc;

/// Advice sent with `402` replies: re-handshake after a short pause.
pub(super) fn handshake_advice() -> serde_json::Value {
    json!({
        fields::RECONNECT: fields::RECONNECT_HANDSHAKE,
        fields::INTERVAL: 500,
    })
}

/// Dispatch a meta message to its handler by channel path.
pub(super) fn handle_meta(
    server: &BayeuxServer,
    session: Option<&Arc<Session>>,
    channel: &Arc<Channel>,
    message: &Message,
) -> Result<Message> {
    match channel.path() {
        META_HANDSHAKE => handshake(server, session, message),
        META_CONNECT => Ok(connect(server, session, message)),
        META_SUBSCRIBE => Ok(subscribe(server, session, message)),
        META_UNSUBSCRIBE => Ok(unsubscribe(server, session, message)),
        META_DISCONNECT => Ok(disconnect(server, session, message)),
        other => {
            log::debug!("[BayeuxServer] no handler for meta channel {}", other);
            let mut reply = Message::reply_to(message);
            reply.fail("403::unknown meta channel");
            Ok(reply)
        }
    }
}

fn handshake(
    server: &BayeuxServer,
    session: Option<&Arc<Session>>,
    message: &Message,
) -> Result<Message> {
    let session = match session {
        Some(existing) => Arc::clone(existing),
        None => server.sessions().create_session(None, None, false)?,
    };
    let mut reply = Message::reply_to(message);

    if !server.policy().can_handshake(server, &session, message) {
        log::debug!("[BayeuxServer] handshake denied for {}", session.id());
        reply.fail("403::Handshake denied");
        reply.set_advice(json!({ fields::RECONNECT: fields::RECONNECT_NONE }));
        return Ok(reply);
    }

    session.handshake(now_millis());
    server.sessions().add_session(&session, server.listeners());

    reply.set_successful(true);
    reply.set_client_id(session.id());
    reply.set(fields::VERSION, json!("1.0"));
    reply.set(fields::MIN_VERSION, json!("1.0"));
    reply.set(
        fields::SUPPORTED_CONNECTION_TYPES,
        json!(server.allowed_transports()),
    );
    Ok(reply)
}

fn connect(server: &BayeuxServer, session: Option<&Arc<Session>>, message: &Message) -> Message {
    let mut reply = Message::reply_to(message);
    let Some(session) = session else {
        reply.fail("402::Unknown client");
        reply.set_advice(handshake_advice());
        return reply;
    };

    let advice_out = server
        .sessions()
        .negotiate_connect(session, message.advice(), now_millis());
    server.arm_connect_hold(session);

    if let Some(advice) = advice_out {
        reply.set_advice(advice);
    }
    reply.set_successful(true);
    reply
}

fn subscribe(server: &BayeuxServer, session: Option<&Arc<Session>>, message: &Message) -> Message {
    let mut reply = Message::reply_to(message);
    let Some(session) = session else {
        reply.fail("402::Unknown client");
        reply.set_advice(handshake_advice());
        return reply;
    };

    let Some(subscription) = message.subscription().map(str::to_string) else {
        reply.fail("403::cannot create");
        return reply;
    };
    reply.set(fields::SUBSCRIPTION, json!(subscription));

    let channel = ChannelId::parse(&subscription).ok().and_then(|id| {
        server.channels().resolve(&id, true, || {
            server
                .policy()
                .can_create(server, Some(session), &id, message)
        })
    });
    let Some(channel) = channel else {
        reply.fail("403::cannot create");
        return reply;
    };

    if !server
        .policy()
        .can_subscribe(server, session, &channel, message)
    {
        reply.fail("403::cannot subscribe");
        return reply;
    }

    if session.is_local() || (!channel.is_meta() && !channel.is_service()) {
        match server.channels().subscribe(&channel, session) {
            Ok(_) => reply.set_successful(true),
            Err(err) => {
                log::debug!("[BayeuxServer] subscribe failed: {}", err);
                reply.fail("403::subscribe failed");
            }
        }
    } else {
        // A remote session may not join a meta or service channel; the
        // reply is still successful, nothing is recorded.
        reply.set_successful(true);
    }
    reply
}

fn unsubscribe(
    server: &BayeuxServer,
    session: Option<&Arc<Session>>,
    message: &Message,
) -> Message {
    let mut reply = Message::reply_to(message);
    let Some(session) = session else {
        reply.fail("402::Unknown client");
        reply.set_advice(handshake_advice());
        return reply;
    };

    let Some(subscription) = message.subscription().map(str::to_string) else {
        reply.fail("400::no channel");
        return reply;
    };
    reply.set(fields::SUBSCRIPTION, json!(subscription));

    let Some(channel) = server.channels().channel(&subscription) else {
        reply.fail("400::no channel");
        return reply;
    };

    if session.is_local() || (!channel.is_meta() && !channel.is_service()) {
        server.channels().unsubscribe(&channel, session);
    }
    reply.set_successful(true);
    reply
}

fn disconnect(server: &BayeuxServer, session: Option<&Arc<Session>>, message: &Message) -> Message {
    let mut reply = Message::reply_to(message);
    let Some(session) = session else {
        reply.fail("402::Unknown client");
        return reply;
    };

    server
        .sessions()
        .remove_session(session, false, server.listeners());
    reply.set_successful(true);
    reply
}

/// Paths of the meta channels served by [`handle_meta`], pre-created as
/// persistent channels when the server is built.
pub(super) const META_CHANNELS: [&str; 5] = [
    META_HANDSHAKE,
    META_CONNECT,
    META_SUBSCRIBE,
    META_UNSUBSCRIBE,
    META_DISCONNECT,
];
