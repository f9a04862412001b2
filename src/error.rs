// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Crate error type.
//!
//! Only caller bugs and fatal invariant violations surface as [`Error`].
//! Protocol-level failures (denied handshake, unknown client, rejected
//! publish) are *not* errors: they travel back to the client as an
//! unsuccessful reply carrying a `"<code>::<text>"` error string.

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal or caller-side failures of the protocol engine.
#[derive(Debug)]
pub enum Error {
    /// Channel path is malformed (does not start with `/`, or contains
    /// empty segments).
    InvalidChannel(String),
    /// The session-id generator exhausted its bounded retry budget.
    /// Treated as a fatal configuration error, not a user error.
    IdSpaceExhausted,
    /// The OS random source is unavailable.
    RandomUnavailable,
    /// Subscription refused by the registry (meta or service channel and
    /// the session is not local).
    Subscribe(String),
    /// Background timer thread could not be spawned or the engine is in
    /// the wrong lifecycle state for the requested operation.
    Internal(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidChannel(path) => write!(f, "Invalid channel path: {}", path),
            Error::IdSpaceExhausted => {
                write!(f, "Session id space exhausted: random ids kept colliding")
            }
            Error::RandomUnavailable => write!(f, "OS random source unavailable"),
            Error::Subscribe(msg) => write!(f, "Subscribe refused: {}", msg),
            Error::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_context() {
        let err = Error::InvalidChannel("foo/bar".to_string());
        assert!(err.to_string().contains("foo/bar"));

        let err = Error::Subscribe("meta channel".to_string());
        assert!(err.to_string().contains("meta channel"));
    }

    #[test]
    fn test_error_is_std_error() {
        fn takes_std_error(_e: &dyn std::error::Error) {}
        takes_std_error(&Error::IdSpaceExhausted);
    }
}
