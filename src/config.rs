// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Server configuration - single source of truth for defaults.
//!
//! Two levels, mirroring the rest of the crate:
//!
//! - **Static**: compile-time defaults for timer cadence and session
//!   advice. **Never hardcode these elsewhere!**
//! - **Dynamic**: [`ServerOptions`], the named-option surface of a running
//!   server. Recognized names map onto typed fields; unrecognized names are
//!   stored opaquely and ignored by the core.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Milliseconds between timeout-scheduler ticks.
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 97;

/// Milliseconds between reclamation sweeps of channels and sessions.
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 997;

/// Default long-poll hold timeout advised to clients.
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Default pause between client reconnects advised to clients.
pub const DEFAULT_INTERVAL_MS: u64 = 0;

/// Retry budget for random session-id collisions before the generator is
/// declared exhausted.
pub const ID_RETRY_LIMIT: u32 = 16;

/// Option name for the scheduler tick cadence.
pub const OPTION_TICK_INTERVAL: &str = "tickIntervalMs";
/// Option name for the sweep cadence.
pub const OPTION_SWEEP_INTERVAL: &str = "sweepIntervalMs";
/// Option name for the default connect hold timeout.
pub const OPTION_TIMEOUT: &str = "timeoutMs";
/// Option name for the default reconnect interval.
pub const OPTION_INTERVAL: &str = "intervalMs";

/// Named options of a [`BayeuxServer`](crate::BayeuxServer).
///
/// Recognized options are held in atomics so they can be read from the
/// message path and the timer thread without a lock. Everything else lands
/// in an opaque string map, preserved for transports and extensions but
/// ignored by the core.
pub struct ServerOptions {
    tick_interval_ms: AtomicU64,
    sweep_interval_ms: AtomicU64,
    timeout_ms: AtomicU64,
    interval_ms: AtomicU64,
    extra: DashMap<String, String>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            tick_interval_ms: AtomicU64::new(DEFAULT_TICK_INTERVAL_MS),
            sweep_interval_ms: AtomicU64::new(DEFAULT_SWEEP_INTERVAL_MS),
            timeout_ms: AtomicU64::new(DEFAULT_TIMEOUT_MS),
            interval_ms: AtomicU64::new(DEFAULT_INTERVAL_MS),
            extra: DashMap::new(),
        }
    }
}

impl ServerOptions {
    /// Create options with library defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scheduler tick cadence in milliseconds.
    pub fn tick_interval_ms(&self) -> u64 {
        self.tick_interval_ms.load(Ordering::Relaxed)
    }

    /// Sweep cadence in milliseconds.
    pub fn sweep_interval_ms(&self) -> u64 {
        self.sweep_interval_ms.load(Ordering::Relaxed)
    }

    /// Default connect hold timeout in milliseconds.
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms.load(Ordering::Relaxed)
    }

    /// Default reconnect interval in milliseconds.
    pub fn interval_ms(&self) -> u64 {
        self.interval_ms.load(Ordering::Relaxed)
    }

    /// Set a named option.
    ///
    /// Recognized names with a non-numeric value keep their previous typed
    /// value; unrecognized names are stored verbatim.
    pub fn set_option(&self, name: &str, value: &str) {
        let slot = match name {
            OPTION_TICK_INTERVAL => Some(&self.tick_interval_ms),
            OPTION_SWEEP_INTERVAL => Some(&self.sweep_interval_ms),
            OPTION_TIMEOUT => Some(&self.timeout_ms),
            OPTION_INTERVAL => Some(&self.interval_ms),
            _ => None,
        };
        match slot {
            Some(field) => match value.parse::<u64>() {
                Ok(parsed) => field.store(parsed, Ordering::Relaxed),
                Err(_) => {
                    log::debug!("[ServerOptions] non-numeric value for {}: {}", name, value);
                }
            },
            None => {
                self.extra.insert(name.to_string(), value.to_string());
            }
        }
    }

    /// Look up a named option, typed fields included.
    pub fn option(&self, name: &str) -> Option<String> {
        match name {
            OPTION_TICK_INTERVAL => Some(self.tick_interval_ms().to_string()),
            OPTION_SWEEP_INTERVAL => Some(self.sweep_interval_ms().to_string()),
            OPTION_TIMEOUT => Some(self.timeout_ms().to_string()),
            OPTION_INTERVAL => Some(self.interval_ms().to_string()),
            _ => self.extra.get(name).map(|v| v.value().clone()),
        }
    }

    /// All option names currently set, typed fields included.
    pub fn option_names(&self) -> Vec<String> {
        let mut names = vec![
            OPTION_TICK_INTERVAL.to_string(),
            OPTION_SWEEP_INTERVAL.to_string(),
            OPTION_TIMEOUT.to_string(),
            OPTION_INTERVAL.to_string(),
        ];
        for entry in self.extra.iter() {
            names.push(entry.key().clone());
        }
        names
    }
}
