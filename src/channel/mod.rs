// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Hierarchical channel namespace.
//!
//! - [`ChannelId`]: parsed, classified channel path with wildcard matching.
//! - [`Channel`]: one node of the namespace tree (subscribers, listeners,
//!   children, attributes).
//! - [`ChannelRegistry`]: the root channel plus the flat id->channel index,
//!   lazy creation, wildcard fan-out and sweeping.

mod id;
mod node;
mod registry;

pub use id::{
    ChannelId, DEEP_WILD, META_CONNECT, META_DISCONNECT, META_HANDSHAKE, META_SEGMENT,
    META_SUBSCRIBE, META_UNSUBSCRIBE, SERVICE_SEGMENT, WILD,
};
pub use node::Channel;
pub use registry::ChannelRegistry;
