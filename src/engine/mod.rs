// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The protocol engine.
//!
//! [`BayeuxServer`] owns the channel tree, the session registry, the
//! server extension chain, the listener registry, the timeout scheduler
//! and the security policy, and runs the meta state machine over them.
//!
//! A transport hands every inbound message to [`BayeuxServer::handle`]
//! with the resolved session (absent for a first handshake). The engine
//! runs the receive-side extension chains, resolves the target channel
//! (creating it if the policy allows), dispatches meta messages to their
//! handler and application messages to the publish fan-out, and returns
//! the reply. The transport then passes the reply through
//! [`BayeuxServer::extend_reply`]; a `None` result means nothing goes on
//! the wire.
//!
//! A dedicated timer thread ticks the scheduler every `tickIntervalMs`
//! and sweeps channels and sessions every `sweepIntervalMs`.

mod handlers;

use crate::channel::{Channel, ChannelId, ChannelRegistry};
use crate::config::ServerOptions;
use crate::error::{Error, Result};
use crate::extension::{Extension, ExtensionChain};
use crate::listener::{ChannelListener, ListenerRegistry, SessionListener};
use crate::message::{fields, Message};
use crate::policy::{DefaultSecurityPolicy, SecurityPolicy};
use crate::scheduler::{now_millis, TimeoutScheduler};
use crate::session::{Session, SessionRegistry};
use crate::transport::Transport;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Handle to the running timer thread. Dropping it stops the thread.
struct TickerHandle {
    stop: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl Drop for TickerHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// The Bayeux protocol engine.
pub struct BayeuxServer {
    options: ServerOptions,
    channels: ChannelRegistry,
    sessions: SessionRegistry,
    extensions: ExtensionChain,
    listeners: ListenerRegistry,
    scheduler: TimeoutScheduler,
    policy: RwLock<Arc<dyn SecurityPolicy>>,
    transports: DashMap<String, Arc<dyn Transport>>,
    allowed_transports: RwLock<Vec<String>>,
    ticker: Mutex<Option<TickerHandle>>,
}

impl BayeuxServer {
    /// Create an engine with default options. The five meta channels are
    /// pre-created persistent so the sweep never removes them.
    pub fn new() -> Arc<Self> {
        Self::with_options(ServerOptions::new())
    }

    /// Create an engine with the given options.
    pub fn with_options(options: ServerOptions) -> Arc<Self> {
        let server = Arc::new(Self {
            options,
            channels: ChannelRegistry::new(),
            sessions: SessionRegistry::new(),
            extensions: ExtensionChain::new(),
            listeners: ListenerRegistry::new(),
            scheduler: TimeoutScheduler::new(),
            policy: RwLock::new(Arc::new(DefaultSecurityPolicy)),
            transports: DashMap::new(),
            allowed_transports: RwLock::new(Vec::new()),
            ticker: Mutex::new(None),
        });
        for path in handlers::META_CHANNELS {
            // Paths are compile-time constants; a failure here is a bug.
            if let Err(err) = server
                .channels
                .create_if_absent(path, |channel| channel.set_persistent(true))
            {
                log::error!("[BayeuxServer] meta channel setup failed: {}", err);
            }
        }
        server
    }

    /// Spawn the timer thread driving scheduler ticks and sweeps.
    ///
    /// Idempotent: a second call while running is a no-op.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut ticker = self.ticker.lock();
        if ticker.is_some() {
            log::warn!("[BayeuxServer::start] already running");
            return Ok(());
        }

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let weak: Weak<Self> = Arc::downgrade(self);
        let thread = std::thread::Builder::new()
            .name("hbayeux-timer".to_string())
            .spawn(move || run_ticker(&weak, &stop_flag))
            .map_err(|e| Error::Internal(format!("timer thread spawn failed: {}", e)))?;

        *ticker = Some(TickerHandle {
            stop,
            thread: Some(thread),
        });
        log::info!(
            "[BayeuxServer::start] timer running (tick {}ms, sweep {}ms)",
            self.options.tick_interval_ms(),
            self.options.sweep_interval_ms()
        );
        Ok(())
    }

    /// Stop the timer thread and wait for it to exit. No tick or sweep
    /// runs after this returns. Idempotent.
    pub fn stop(&self) {
        let handle = self.ticker.lock().take();
        drop(handle);
        log::info!("[BayeuxServer::stop] timer stopped");
    }

    /// Handle one inbound message and build its reply.
    ///
    /// `session` is the transport-resolved sender, absent for a first
    /// handshake. Protocol failures come back as unsuccessful replies;
    /// `Err` is reserved for fatal conditions (id-space exhaustion, no OS
    /// random source).
    ///
    /// The reply has not been through the send-side extension chain yet;
    /// the transport must pass it to [`BayeuxServer::extend_reply`] before
    /// delivery.
    pub fn handle(&self, session: Option<&Arc<Session>>, message: &mut Message) -> Result<Message> {
        log::debug!(
            "[BayeuxServer::handle] >  {} from {:?}",
            message,
            session.map(|s| s.id())
        );

        if !self.extend_recv(session, message) {
            let mut reply = Message::reply_to(message);
            reply.fail("404::Message deleted");
            return Ok(reply);
        }

        let channel_path = message.channel().map(str::to_string);
        let channel_id = match &channel_path {
            Some(path) => match ChannelId::parse(path) {
                Ok(id) => Some(id),
                Err(err) => {
                    log::debug!("[BayeuxServer::handle] {}", err);
                    let mut reply = Message::reply_to(message);
                    reply.fail("400::invalid channel");
                    return Ok(reply);
                }
            },
            None => None,
        };

        let channel = channel_id.as_ref().and_then(|id| {
            self.channels.resolve(id, true, || {
                self.policy().can_create(self, session, id, message)
            })
        });

        let reply = match channel {
            None => {
                let mut reply = Message::reply_to(message);
                reply.fail(if channel_path.is_none() {
                    "402::no channel"
                } else {
                    "403::Cannot create"
                });
                reply
            }
            Some(channel) if channel.is_meta() => {
                let reply = handlers::handle_meta(self, session, &channel, message)?;
                // Meta traffic is observable: after the handler, the
                // request fans out on its meta channel so channel
                // listeners and (local) subscribers see it.
                self.channels.publish(&self.sessions, session, &channel, message);
                reply
            }
            Some(channel) => self.handle_publish(session, &channel, message),
        };

        log::debug!("[BayeuxServer::handle] << {}", reply);
        Ok(reply)
    }

    /// Application (non-meta) publish path.
    fn handle_publish(
        &self,
        session: Option<&Arc<Session>>,
        channel: &Arc<Channel>,
        message: &mut Message,
    ) -> Message {
        if !self.policy().can_publish(self, session, channel, message) {
            let mut reply = Message::reply_to(message);
            reply.fail(if session.is_none() {
                "402::unknown client"
            } else {
                "403::Cannot publish"
            });
            return reply;
        }

        let trusted = session.is_some_and(|s| s.is_local()) || channel.is_service();
        if trusted {
            message.remove(fields::CLIENT_ID);
            self.channels.publish(&self.sessions, session, channel, message);
        } else {
            // Remote publisher on a broadcast channel: forward only the
            // fields we trust, everything else stays behind.
            let mut out = match message.channel() {
                Some(path) => Message::new(path),
                None => Message::empty(),
            };
            if let Some(data) = message.data() {
                out.set_data(data.clone());
            }
            if let Some(id) = message.id() {
                out.set(fields::ID, id.clone());
            }
            self.channels.publish(&self.sessions, session, channel, &mut out);
        }

        let mut reply = Message::reply_to(message);
        reply.set_successful(true);
        reply
    }

    /// Run a reply through the send-side extension chains: the session's
    /// own chain first, then the server chain, each in reverse
    /// registration order. `None` means the reply is suppressed and
    /// nothing goes on the wire.
    pub fn extend_reply(&self, session: Option<&Arc<Session>>, reply: Message) -> Option<Message> {
        let mut reply = reply;
        if let Some(session) = session {
            if !session.extensions().apply_send(Some(session), &mut reply) {
                log::debug!("[BayeuxServer::extend_reply] session chain vetoed reply");
                return None;
            }
        }
        if !self.extensions.apply_send(session, &mut reply) {
            log::debug!("[BayeuxServer::extend_reply] server chain vetoed reply");
            return None;
        }
        Some(reply)
    }

    /// Server chain first, then the session's own chain.
    fn extend_recv(&self, session: Option<&Arc<Session>>, message: &mut Message) -> bool {
        if !self.extensions.apply_recv(session, message) {
            return false;
        }
        match session {
            Some(session) => session.extensions().apply_recv(Some(session), message),
            None => true,
        }
    }

    /// Arm (or re-arm) the connect-hold wake-up for a session: when the
    /// hold expires the session's transport is woken so it can flush the
    /// queue and release the long poll. The previous hold is cancelled
    /// first, so a re-connect never leaves two pending wake-ups.
    pub(crate) fn arm_connect_hold(&self, session: &Arc<Session>) {
        let timeout = session.effective_timeout_ms(&self.options);
        let weak = Arc::downgrade(session);
        let handle = self.scheduler.schedule(timeout, move || {
            if let Some(session) = weak.upgrade() {
                log::debug!("[BayeuxServer] connect hold expired for {}", session.id());
                session.wake();
            }
        });
        if let Some(previous) = session.swap_hold(Some(handle)) {
            self.scheduler.cancel(previous);
        }
    }

    /// Run one reclamation pass over channels and sessions. Called from
    /// the timer thread; safe to call directly (tests, shutdown).
    pub fn sweep(&self) {
        self.channels.sweep(&self.sessions, &self.listeners);
        self.sessions
            .sweep(now_millis(), &self.options, &self.listeners);
    }

    /// Create a handshaken local (in-process) session, exempt from the
    /// trust restrictions applied to remote publishers.
    pub fn new_local_session(&self, id_hint: Option<&str>) -> Result<Arc<Session>> {
        let session = self.sessions.create_session(None, id_hint, true)?;
        session.handshake(now_millis());
        self.sessions.add_session(&session, &self.listeners);
        Ok(session)
    }

    /// Install the security policy, replacing the current one. Decisions
    /// already in flight finish under the policy they started with.
    pub fn set_security_policy(&self, policy: Arc<dyn SecurityPolicy>) {
        *self.policy.write() = policy;
    }

    pub(crate) fn policy(&self) -> Arc<dyn SecurityPolicy> {
        Arc::clone(&self.policy.read())
    }

    /// Append a server-wide extension.
    pub fn add_extension(&self, extension: Arc<dyn Extension>) {
        self.extensions.add(extension);
    }

    /// Register a session-lifecycle listener.
    pub fn add_session_listener(&self, listener: Arc<dyn SessionListener>) {
        self.listeners.add_session_listener(listener);
    }

    /// Register a channel-removal listener.
    pub fn add_channel_listener(&self, listener: Arc<dyn ChannelListener>) {
        self.listeners.add_channel_listener(listener);
    }

    /// Register a transport under its wire name.
    pub fn add_transport(&self, transport: Arc<dyn Transport>) {
        self.transports
            .insert(transport.name().to_string(), transport);
    }

    /// Look up a registered transport.
    pub fn transport(&self, name: &str) -> Option<Arc<dyn Transport>> {
        self.transports.get(name).map(|t| Arc::clone(t.value()))
    }

    /// Names of all registered transports.
    pub fn known_transport_names(&self) -> Vec<String> {
        self.transports
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Restrict the transports offered on handshake. Unknown names are
    /// dropped; registration order of the argument is preserved.
    pub fn set_allowed_transports(&self, allowed: &[&str]) {
        let filtered: Vec<String> = allowed
            .iter()
            .filter(|name| self.transports.contains_key(**name))
            .map(|name| (*name).to_string())
            .collect();
        *self.allowed_transports.write() = filtered;
    }

    /// Transport names offered on handshake: the allowed list, or every
    /// known transport when no restriction was set.
    pub fn allowed_transports(&self) -> Vec<String> {
        let allowed = self.allowed_transports.read();
        if allowed.is_empty() {
            self.known_transport_names()
        } else {
            allowed.clone()
        }
    }

    /// Session registry.
    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Channel registry.
    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }

    /// Listener registry.
    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    /// Timeout scheduler. Exposed so transports can schedule their own
    /// deadlines on the shared timer.
    pub fn scheduler(&self) -> &TimeoutScheduler {
        &self.scheduler
    }

    /// Look up a session by client id.
    pub fn session(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get(id)
    }

    /// Look up a channel by path.
    pub fn channel(&self, path: &str) -> Option<Arc<Channel>> {
        self.channels.channel(path)
    }

    /// Create a channel unless it exists, running `init` on the new node.
    pub fn create_if_absent(&self, path: &str, init: impl FnOnce(&Arc<Channel>)) -> Result<bool> {
        self.channels.create_if_absent(path, init)
    }

    /// Set a named option.
    pub fn set_option(&self, name: &str, value: &str) {
        self.options.set_option(name, value);
    }

    /// Look up a named option.
    pub fn option(&self, name: &str) -> Option<String> {
        self.options.option(name)
    }

    /// All option names currently set.
    pub fn option_names(&self) -> Vec<String> {
        self.options.option_names()
    }

    /// Server options, typed view.
    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// Render the channel tree for diagnostics.
    pub fn dump(&self) -> String {
        self.channels.dump()
    }
}

impl std::fmt::Debug for BayeuxServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BayeuxServer")
            .field("sessions", &self.sessions.len())
            .field("channels", &self.channels.len())
            .field("running", &self.ticker.lock().is_some())
            .finish()
    }
}

fn run_ticker(server: &Weak<BayeuxServer>, stop: &AtomicBool) {
    log::debug!("[hbayeux-timer] started");
    let mut since_sweep: u64 = 0;
    loop {
        let tick_ms = match server.upgrade() {
            Some(server) => server.options.tick_interval_ms(),
            None => break,
        };
        std::thread::sleep(Duration::from_millis(tick_ms));
        if stop.load(Ordering::Acquire) {
            break;
        }
        let Some(server) = server.upgrade() else {
            break;
        };
        server.scheduler.tick(now_millis());
        since_sweep = since_sweep.saturating_add(tick_ms);
        if since_sweep >= server.options.sweep_interval_ms() {
            server.sweep();
            since_sweep = 0;
        }
    }
    log::debug!("[hbayeux-timer] stopped");
}
