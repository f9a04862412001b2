// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # hbayeux - Bayeux publish/subscribe protocol engine
//!
//! A server-side Bayeux-style publish/subscribe engine: clients handshake
//! to obtain a session identity, connect to hold a long-lived receive
//! point, subscribe to channels in a hierarchical namespace (with `*` and
//! `**` wildcards), and publish messages that the server fans out to all
//! current subscribers. A security policy and an ordered extension chain
//! sit at every boundary.
//!
//! This crate is the protocol engine only. Concrete wire transports
//! (long-poll, streaming, websocket) and JSON framing live outside and
//! drive the engine through the [`Transport`] trait and
//! [`BayeuxServer::handle`] / [`BayeuxServer::extend_reply`].
//!
//! ## Quick Start
//!
//! ```rust
//! use hbayeux::{fields, BayeuxServer, Message};
//! use serde_json::json;
//!
//! fn main() -> hbayeux::Result<()> {
//!     let server = BayeuxServer::new();
//!
//!     // A client handshakes and gets a session id.
//!     let mut handshake = Message::new("/meta/handshake");
//!     let reply = server.handle(None, &mut handshake)?;
//!     let id = reply.client_id().expect("assigned id").to_string();
//!     let session = server.session(&id).expect("indexed");
//!
//!     // It subscribes and someone publishes.
//!     let mut subscribe = Message::new("/meta/subscribe");
//!     subscribe.set(fields::SUBSCRIPTION, json!("/chat/room1"));
//!     server.handle(Some(&session), &mut subscribe)?;
//!
//!     let mut publish = Message::new("/chat/room1");
//!     publish.set_data(json!({"text": "hello"}));
//!     server.handle(Some(&session), &mut publish)?;
//!
//!     assert_eq!(session.take_queue().len(), 1);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                     Transports (external)                    |
//! |        long-poll | streaming | websocket | in-process        |
//! +--------------------------------------------------------------+
//! |                        BayeuxServer                          |
//! |  extension chain | security policy | meta handlers | ticker  |
//! +--------------------------------------------------------------+
//! |   ChannelRegistry          |          SessionRegistry        |
//! |   tree + wildcard fan-out  |          ids + expiry sweep     |
//! +--------------------------------------------------------------+
//! |                      TimeoutScheduler                        |
//! |            connect holds | tick-driven expiry                |
//! +--------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`BayeuxServer`] | The engine: owns everything, runs the meta state machine |
//! | [`Message`] | Mutable key/value Bayeux message record |
//! | [`Session`] | One client's identity, outbound queue and advice |
//! | [`Channel`] | One node of the channel namespace tree |
//! | [`ChannelId`] | Parsed channel path with wildcard matching |
//! | [`Extension`] | Interceptor hooks on the receive/send boundaries |
//! | [`SecurityPolicy`] | Authorization at handshake/create/subscribe/publish |

/// Hierarchical channel namespace (ids, tree nodes, registry).
pub mod channel;
/// Server defaults and the named-option surface.
pub mod config;
/// The protocol engine and its meta-message handlers.
pub mod engine;
/// Crate error type.
pub mod error;
/// Message interceptor chain.
pub mod extension;
/// Server listener traits and the typed listener registry.
pub mod listener;
/// Bayeux message record and standard field names.
pub mod message;
/// Security policy boundary.
pub mod policy;
/// Tick-driven timeout scheduler.
pub mod scheduler;
/// Server-side sessions and their registry.
pub mod session;
/// Transport boundary trait.
pub mod transport;

pub use channel::{Channel, ChannelId, ChannelRegistry};
pub use config::ServerOptions;
pub use engine::BayeuxServer;
pub use error::{Error, Result};
pub use extension::{Extension, ExtensionChain};
pub use listener::{ChannelListener, ChannelMessageListener, SessionListener};
pub use message::{fields, Message};
pub use policy::{DefaultSecurityPolicy, SecurityPolicy};
pub use scheduler::{TimeoutHandle, TimeoutScheduler};
pub use session::{Session, SessionRegistry};
pub use transport::Transport;

/// Crate version, as compiled.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
