// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport boundary.
//!
//! Concrete wire transports (long-poll, streaming, websocket) live outside
//! this crate. The engine sees them through this trait only: it never
//! performs I/O itself, it signals a session's transport with a
//! non-blocking [`Transport::wake`] when the session's outbound queue has
//! something to drain, and the transport calls back into the engine with
//! inbound messages and close events.

use crate::session::Session;

/// A pluggable server transport.
pub trait Transport: Send + Sync {
    /// Wire name advertised in handshake replies (for example
    /// `"long-polling"` or `"websocket"`).
    fn name(&self) -> &str;

    /// Non-blocking signal that `session` has queued outbound messages.
    ///
    /// Called from the publish path and from connect-hold expiry; must not
    /// block and must tolerate the session being concurrently removed.
    fn wake(&self, session: &Session);
}
