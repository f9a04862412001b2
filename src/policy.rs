// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Security policy boundary.
//!
//! The engine consults the installed policy at four decision points; the
//! decision logic itself is the collaborator's business. The default
//! policy permits everything.

use crate::channel::{Channel, ChannelId};
use crate::engine::BayeuxServer;
use crate::message::Message;
use crate::session::Session;
use std::sync::Arc;

/// Authorization decisions at the protocol boundaries.
///
/// Every hook defaults to permit, so a policy only overrides the decisions
/// it cares about.
pub trait SecurityPolicy: Send + Sync {
    /// May this (possibly brand-new) session handshake?
    fn can_handshake(
        &self,
        _server: &BayeuxServer,
        _session: &Arc<Session>,
        _message: &Message,
    ) -> bool {
        true
    }

    /// May `session` cause `channel` to be created?
    fn can_create(
        &self,
        _server: &BayeuxServer,
        _session: Option<&Arc<Session>>,
        _channel: &ChannelId,
        _message: &Message,
    ) -> bool {
        true
    }

    /// May `session` subscribe to `channel`?
    fn can_subscribe(
        &self,
        _server: &BayeuxServer,
        _session: &Arc<Session>,
        _channel: &Arc<Channel>,
        _message: &Message,
    ) -> bool {
        true
    }

    /// May `session` publish to `channel`?
    fn can_publish(
        &self,
        _server: &BayeuxServer,
        _session: Option<&Arc<Session>>,
        _channel: &Arc<Channel>,
        _message: &Message,
    ) -> bool {
        true
    }
}

/// Permit-everything policy installed by default.
pub struct DefaultSecurityPolicy;

impl SecurityPolicy for DefaultSecurityPolicy {}
