//! Connection session state machine
//!
//! Synchronous and clock-agnostic: every input carries `now`. The guardian
//! driver owns the only instance and turns its answers into I/O.
//!
//! ```text
//!              open                     error / stale
//! reconnecting ────▶ connected ─────────────────────▶ reconnecting
//!      │ attempts exhausted                                │
//!      ▼                                                   │ fatal
//! disconnected ◀── manual reconnect resets attempts      error
//! ```

use crate::buffer::EventBuffer;
use rampart_core::StreamConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;
use ulid::Ulid;

/// Session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Ulid);

impl SessionId {
    /// Fresh id
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ses_{}", self.0)
    }
}

/// Connection state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Open and delivering
    Connected,
    /// Waiting for or running a reconnect attempt
    Reconnecting,
    /// Attempts exhausted or torn down; waits for a manual reconnect
    Disconnected,
    /// Fatal transport failure; waits for a manual reconnect
    Error,
}

impl ConnectionState {
    /// Stable name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        }
    }

    /// Whether only a manual reconnect leaves this state
    #[inline]
    #[must_use]
    pub fn needs_manual_reconnect(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Error)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Delivery and reconnection counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardianStats {
    /// Messages delivered live
    pub delivered: u64,
    /// Messages appended to the buffer
    pub buffered: u64,
    /// Messages dropped on buffer overflow
    pub dropped: u64,
    /// Messages replayed from the buffer on open
    pub flushed: u64,
    /// Messages waiting in the buffer now
    pub pending: usize,
    /// Reconnect attempts started
    pub reconnect_attempts: u64,
    /// Attempts that reopened the connection
    pub successful_reconnects: u64,
}

/// One guarded subscription
#[derive(Debug)]
pub struct ConnectionSession<M> {
    id: SessionId,
    state: ConnectionState,
    last_heartbeat_at: Instant,
    reconnect_attempts: u32,
    max_reconnect_attempts: u32,
    staleness_window: Duration,
    buffer: EventBuffer<M>,
    ever_connected: bool,
    stats: GuardianStats,
}

impl<M> ConnectionSession<M> {
    /// New session waiting for its first connection
    #[must_use]
    pub fn new(config: &StreamConfig, now: Instant) -> Self {
        Self {
            id: SessionId::new(),
            state: ConnectionState::Reconnecting,
            last_heartbeat_at: now,
            reconnect_attempts: 0,
            max_reconnect_attempts: config.max_reconnect_attempts,
            staleness_window: config.staleness_window(),
            buffer: EventBuffer::new(config.buffer_capacity),
            ever_connected: false,
            stats: GuardianStats::default(),
        }
    }

    /// Session id
    #[inline]
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Current state
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Attempts made in the current reconnect cycle
    #[inline]
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    /// Last time any event arrived
    #[inline]
    #[must_use]
    pub fn last_heartbeat_at(&self) -> Instant {
        self.last_heartbeat_at
    }

    /// Messages waiting in the buffer
    #[inline]
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Counters
    #[must_use]
    pub fn stats(&self) -> GuardianStats {
        GuardianStats {
            pending: self.buffer.len(),
            ..self.stats
        }
    }

    /// Connection opened: reset attempts and hand back the buffer in arrival order
    pub fn on_open(&mut self, now: Instant) -> Vec<M> {
        if self.ever_connected && self.state != ConnectionState::Connected {
            self.stats.successful_reconnects += 1;
        }
        self.ever_connected = true;
        self.state = ConnectionState::Connected;
        self.reconnect_attempts = 0;
        self.last_heartbeat_at = now;

        let flushed = self.buffer.drain();
        self.stats.flushed += flushed.len() as u64;
        flushed
    }

    /// Inbound message: returned for delivery when connected, buffered otherwise
    pub fn on_message(&mut self, message: M, now: Instant) -> Option<M> {
        self.last_heartbeat_at = now;
        if self.state == ConnectionState::Connected {
            self.stats.delivered += 1;
            return Some(message);
        }
        self.stats.buffered += 1;
        if self.buffer.push(message).is_some() {
            self.stats.dropped += 1;
        }
        None
    }

    /// Liveness signal
    pub fn on_heartbeat(&mut self, now: Instant) {
        self.last_heartbeat_at = now;
    }

    /// Connection broke; returns whether a reconnect cycle should start
    pub fn on_error(&mut self) -> bool {
        if self.state == ConnectionState::Connected {
            self.state = ConnectionState::Reconnecting;
            true
        } else {
            false
        }
    }

    /// Whether the connection has been silent for the whole window.
    /// A stale connected session moves to `reconnecting` and returns true.
    pub fn check_heartbeat(&mut self, now: Instant) -> bool {
        if self.state != ConnectionState::Connected {
            return false;
        }
        if now.saturating_duration_since(self.last_heartbeat_at) >= self.staleness_window {
            self.state = ConnectionState::Reconnecting;
            return true;
        }
        false
    }

    /// Claim the next attempt number of the cycle.
    /// With the budget spent the session becomes `disconnected` and `None` is returned.
    pub fn begin_attempt(&mut self) -> Option<u32> {
        if self.state != ConnectionState::Reconnecting {
            return None;
        }
        if self.reconnect_attempts >= self.max_reconnect_attempts {
            self.state = ConnectionState::Disconnected;
            return None;
        }
        self.reconnect_attempts += 1;
        self.stats.reconnect_attempts += 1;
        Some(self.reconnect_attempts)
    }

    /// Fatal transport failure
    pub fn on_fatal(&mut self) {
        self.state = ConnectionState::Error;
    }

    /// Restart the cycle from attempt 1
    pub fn manual_reconnect(&mut self) {
        self.reconnect_attempts = 0;
        self.state = ConnectionState::Reconnecting;
    }

    /// Tear down: drop buffered messages and stop
    pub fn teardown(&mut self) {
        self.buffer.clear();
        self.state = ConnectionState::Disconnected;
    }
}
