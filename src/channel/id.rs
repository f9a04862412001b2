// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Channel identifiers: parsing, classification, wildcard matching.
//!
//! A channel path is `/`-separated, always absolute. Classification
//! (meta, service, wildcard, depth) is computed once at parse time and
//! cached on the value. Two ids are equal iff their path strings are equal.

use crate::error::{Error, Result};

/// First segment reserved for protocol-control channels.
pub const META_SEGMENT: &str = "meta";
/// First segment reserved for server-side request/response channels.
pub const SERVICE_SEGMENT: &str = "service";

/// Handshake meta channel.
pub const META_HANDSHAKE: &str = "/meta/handshake";
/// Connect meta channel.
pub const META_CONNECT: &str = "/meta/connect";
/// Subscribe meta channel.
pub const META_SUBSCRIBE: &str = "/meta/subscribe";
/// Unsubscribe meta channel.
pub const META_UNSUBSCRIBE: &str = "/meta/unsubscribe";
/// Disconnect meta channel.
pub const META_DISCONNECT: &str = "/meta/disconnect";

/// Single-segment wildcard marker.
pub const WILD: &str = "*";
/// Deep (one-or-more trailing segments) wildcard marker.
pub const DEEP_WILD: &str = "**";

/// Parsed, classified channel id.
#[derive(Debug, Clone)]
pub struct ChannelId {
    path: String,
    segments: Vec<String>,
    meta: bool,
    service: bool,
    wild: bool,
    deep_wild: bool,
}

impl ChannelId {
    /// Parse a channel path.
    ///
    /// Fails if the path does not start with `/` or contains empty
    /// segments (a trailing `/` included).
    pub fn parse(path: &str) -> Result<Self> {
        let Some(rest) = path.strip_prefix('/') else {
            return Err(Error::InvalidChannel(path.to_string()));
        };
        if rest.is_empty() {
            return Err(Error::InvalidChannel(path.to_string()));
        }
        let segments: Vec<String> = rest.split('/').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(Error::InvalidChannel(path.to_string()));
        }

        let last = segments.len() - 1;
        let wild = segments[last] == WILD;
        let deep_wild = segments[last] == DEEP_WILD;
        Ok(Self {
            path: path.to_string(),
            meta: segments[0] == META_SEGMENT,
            service: segments[0] == SERVICE_SEGMENT,
            wild,
            deep_wild,
            segments,
        })
    }

    /// The root id `/`. Only the registry's root channel carries it.
    pub(crate) fn root() -> Self {
        Self {
            path: "/".to_string(),
            segments: Vec::new(),
            meta: false,
            service: false,
            wild: false,
            deep_wild: false,
        }
    }

    /// Id of the first `depth` segments of this id.
    ///
    /// Used while descending the channel tree; never fails because the
    /// segments were validated when `self` was parsed.
    pub(crate) fn prefix(&self, depth: usize) -> Self {
        let segments: Vec<String> = self.segments[..depth].to_vec();
        let path = format!("/{}", segments.join("/"));
        let last_wild = depth > 0 && segments[depth - 1] == WILD;
        let last_deep = depth > 0 && segments[depth - 1] == DEEP_WILD;
        Self {
            path,
            meta: depth > 0 && segments[0] == META_SEGMENT,
            service: depth > 0 && segments[0] == SERVICE_SEGMENT,
            wild: last_wild,
            deep_wild: last_deep,
            segments,
        }
    }

    /// Original path string.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Number of segments.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Segment at `index`, if any.
    pub fn segment(&self, index: usize) -> Option<&str> {
        self.segments.get(index).map(String::as_str)
    }

    /// Last segment; `None` only for the root id.
    pub fn last_segment(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// All segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// First segment is the reserved meta segment.
    pub fn is_meta(&self) -> bool {
        self.meta
    }

    /// First segment is the service segment.
    pub fn is_service(&self) -> bool {
        self.service
    }

    /// Path ends in `*` or `**`.
    pub fn is_wild(&self) -> bool {
        self.wild || self.deep_wild
    }

    /// Path ends in `**`.
    pub fn is_deep_wild(&self) -> bool {
        self.deep_wild
    }

    /// Cheap meta test for a raw path, without a full parse.
    pub fn is_meta_path(path: &str) -> bool {
        path == "/meta" || path.starts_with("/meta/")
    }

    /// Wildcard match of `self` (the pattern) against a concrete id.
    ///
    /// `*` matches exactly one segment, `**` one or more trailing
    /// segments; literal segments compare equal, no case folding.
    /// A non-wildcard pattern matches only the identical path.
    pub fn matches(&self, concrete: &ChannelId) -> bool {
        if self.deep_wild {
            // One or more segments must follow the literal prefix.
            if concrete.depth() < self.depth() {
                return false;
            }
        } else if self.wild {
            if concrete.depth() != self.depth() {
                return false;
            }
        } else {
            return self.path == concrete.path;
        }
        self.segments[..self.depth() - 1]
            .iter()
            .zip(concrete.segments.iter())
            .all(|(pattern, segment)| pattern == segment)
    }
}

impl PartialEq for ChannelId {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for ChannelId {}

impl std::hash::Hash for ChannelId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.path)
    }
}
