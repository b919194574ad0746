//! Streaming connection guardian
//!
//! A spawned driver owns the [`ConnectionSession`] and multiplexes four inputs:
//! commands from the handle, transport events, the heartbeat check tick and
//! the pending reconnect deadline. The handle only sees state (watch channel)
//! and counters; messages reach the consumer through an unbounded channel in
//! arrival order.

use crate::error::{GuardianError, TransportError};
use crate::session::{ConnectionSession, ConnectionState, GuardianStats, SessionId};
use crate::transport::{Transport, TransportEvent};
use parking_lot::Mutex;
use rampart_core::telemetry::{events, noop};
use rampart_core::{Backoff, SharedTelemetry, StreamConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Counter: reconnect attempts
pub const RECONNECT_ATTEMPTS: &str = "rampart_stream_reconnect_attempts_total";
/// Counter: buffered messages dropped on overflow
pub const BUFFER_DROPPED: &str = "rampart_stream_buffer_dropped_total";

#[derive(Debug)]
enum Command {
    Reconnect,
    Shutdown,
}

/// Options for [`StreamGuardian::spawn_with`]
#[derive(Clone)]
pub struct GuardianOptions {
    /// Stream settings
    pub config: StreamConfig,
    /// Telemetry sink
    pub telemetry: SharedTelemetry,
    /// Seed for reconnect jitter
    pub seed: Option<u64>,
}

impl GuardianOptions {
    /// Options from configuration with no telemetry
    #[must_use]
    pub fn new(config: StreamConfig) -> Self {
        Self {
            config,
            telemetry: noop(),
            seed: None,
        }
    }

    /// With telemetry sink
    #[inline]
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: SharedTelemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// With jitter seed
    #[inline]
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Handle to a guarded subscription
#[derive(Debug)]
pub struct StreamGuardian {
    session_id: SessionId,
    commands: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ConnectionState>,
    stats: Arc<Mutex<GuardianStats>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl StreamGuardian {
    /// Subscribe through `transport`; returns the handle and the consumer side
    pub fn spawn<M: Send + 'static>(
        transport: Arc<dyn Transport<M>>,
        config: StreamConfig,
    ) -> (Self, mpsc::UnboundedReceiver<M>) {
        Self::spawn_with(transport, GuardianOptions::new(config))
    }

    /// Subscribe with explicit options
    pub fn spawn_with<M: Send + 'static>(
        transport: Arc<dyn Transport<M>>,
        options: GuardianOptions,
    ) -> (Self, mpsc::UnboundedReceiver<M>) {
        let session = ConnectionSession::new(&options.config, Instant::now());
        let session_id = session.id();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (consumer_tx, consumer_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(session.state());
        let stats = Arc::new(Mutex::new(GuardianStats::default()));

        let driver = Driver {
            published: session.state(),
            session,
            transport,
            backoff: options.config.reconnect_backoff(),
            heartbeat_check: options.config.heartbeat_check_interval(),
            consumer: consumer_tx,
            events_tx,
            events_rx,
            commands: commands_rx,
            state_tx,
            stats: stats.clone(),
            reconnect_at: None,
            telemetry: options.telemetry,
            rng: options.seed.map(StdRng::seed_from_u64),
        };
        let handle = tokio::spawn(driver.run());
        tracing::info!(%session_id, "stream guardian started");

        (
            Self {
                session_id,
                commands: commands_tx,
                state_rx,
                stats,
                driver: Mutex::new(Some(handle)),
            },
            consumer_rx,
        )
    }

    /// Session id
    #[inline]
    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Current connection state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Receiver that always holds the latest state
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Counters
    #[must_use]
    pub fn stats(&self) -> GuardianStats {
        *self.stats.lock()
    }

    /// Manual reconnect: reset attempts and restart the backoff cycle
    pub fn reconnect(&self) -> Result<(), GuardianError> {
        self.commands
            .send(Command::Reconnect)
            .map_err(|_| GuardianError::Closed(self.session_id.to_string()))
    }

    /// Stop the driver, disconnect the transport and cancel pending timers
    pub async fn teardown(&self) -> Result<(), GuardianError> {
        let handle = self.driver.lock().take();
        let Some(handle) = handle else {
            return Err(GuardianError::Closed(self.session_id.to_string()));
        };
        // The driver may already have exited on its own.
        let _ = self.commands.send(Command::Shutdown);
        handle
            .await
            .map_err(|_| GuardianError::Closed(self.session_id.to_string()))
    }
}

impl Drop for StreamGuardian {
    fn drop(&mut self) {
        if let Some(handle) = self.driver.lock().take() {
            handle.abort();
        }
    }
}

struct Driver<M: Send + 'static> {
    session: ConnectionSession<M>,
    published: ConnectionState,
    transport: Arc<dyn Transport<M>>,
    backoff: Backoff,
    heartbeat_check: Duration,
    consumer: mpsc::UnboundedSender<M>,
    events_tx: mpsc::UnboundedSender<TransportEvent<M>>,
    events_rx: mpsc::UnboundedReceiver<TransportEvent<M>>,
    commands: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<ConnectionState>,
    stats: Arc<Mutex<GuardianStats>>,
    reconnect_at: Option<Instant>,
    telemetry: SharedTelemetry,
    rng: Option<StdRng>,
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl<M: Send + 'static> Driver<M> {
    async fn run(mut self) {
        self.connect().await;

        let mut heartbeat = tokio::time::interval_at(
            Instant::now() + self.heartbeat_check,
            self.heartbeat_check,
        );
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Reconnect) => self.manual_reconnect().await,
                    Some(Command::Shutdown) | None => break,
                },
                Some(event) = self.events_rx.recv() => self.on_event(event).await,
                _ = heartbeat.tick() => self.check_heartbeat().await,
                () = sleep_until_opt(self.reconnect_at) => {
                    self.reconnect_at = None;
                    self.connect().await;
                }
            }
        }

        self.transport.disconnect().await;
        self.session.teardown();
        self.reconnect_at = None;
        self.sync();
        tracing::info!(session_id = %self.session.id(), "stream guardian stopped");
    }

    async fn connect(&mut self) {
        let session_id = self.session.id();
        match self.transport.connect(self.events_tx.clone()).await {
            Ok(()) => self.open(),
            Err(TransportError::Retryable(reason)) => {
                tracing::warn!(%session_id, %reason, "connect failed");
                self.schedule_attempt();
            }
            Err(TransportError::Fatal(reason)) => {
                tracing::error!(%session_id, %reason, "connect failed fatally");
                self.session.on_fatal();
            }
        }
        self.sync();
    }

    fn open(&mut self) {
        self.reconnect_at = None;
        let flushed = self.session.on_open(Instant::now());
        let count = flushed.len();
        for message in flushed {
            // A dropped consumer only loses messages, the session keeps running.
            let _ = self.consumer.send(message);
        }
        if count > 0 {
            tracing::info!(session_id = %self.session.id(), count, "flushed buffered messages");
            self.telemetry.record_event(
                events::STREAM_FLUSH,
                json!({ "session_id": self.session.id().to_string(), "count": count }),
            );
        }
    }

    async fn on_event(&mut self, event: TransportEvent<M>) {
        let now = Instant::now();
        match event {
            TransportEvent::Open => self.open(),
            TransportEvent::Message(message) => {
                let before = self.session.stats().dropped;
                if let Some(message) = self.session.on_message(message, now) {
                    let _ = self.consumer.send(message);
                }
                let dropped = self.session.stats().dropped - before;
                if dropped > 0 {
                    metrics::counter!(BUFFER_DROPPED).increment(dropped);
                    tracing::trace!(session_id = %self.session.id(), "buffer full, dropped oldest");
                }
            }
            TransportEvent::Heartbeat => self.session.on_heartbeat(now),
            TransportEvent::Error(reason) => {
                tracing::warn!(session_id = %self.session.id(), %reason, "stream error");
                self.start_cycle().await;
            }
            TransportEvent::Closed => {
                tracing::warn!(session_id = %self.session.id(), "stream closed by remote");
                self.start_cycle().await;
            }
        }
        self.sync();
    }

    async fn check_heartbeat(&mut self) {
        let now = Instant::now();
        let silent_for = now.saturating_duration_since(self.session.last_heartbeat_at());
        if self.session.check_heartbeat(now) {
            tracing::warn!(
                session_id = %self.session.id(),
                silent_ms = u64::try_from(silent_for.as_millis()).unwrap_or(u64::MAX),
                "heartbeat stale, reconnecting"
            );
            self.transport.disconnect().await;
            self.schedule_attempt();
            self.sync();
        }
    }

    async fn start_cycle(&mut self) {
        if self.session.on_error() {
            self.transport.disconnect().await;
            self.schedule_attempt();
        }
    }

    async fn manual_reconnect(&mut self) {
        tracing::info!(session_id = %self.session.id(), "manual reconnect");
        if self.session.state() == ConnectionState::Connected {
            self.transport.disconnect().await;
        }
        self.session.manual_reconnect();
        self.schedule_attempt();
        self.sync();
    }

    fn schedule_attempt(&mut self) {
        let Some(attempt) = self.session.begin_attempt() else {
            self.reconnect_at = None;
            if self.session.state() == ConnectionState::Disconnected {
                tracing::error!(
                    session_id = %self.session.id(),
                    "reconnect attempts exhausted"
                );
            }
            return;
        };
        let delay = match self.rng.as_mut() {
            Some(rng) => self.backoff.jittered_delay_with(attempt, rng),
            None => self.backoff.jittered_delay_for(attempt),
        };
        metrics::counter!(RECONNECT_ATTEMPTS).increment(1);
        tracing::warn!(
            session_id = %self.session.id(),
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "reconnect scheduled"
        );
        self.reconnect_at = Some(Instant::now() + delay);
    }

    fn sync(&mut self) {
        *self.stats.lock() = self.session.stats();
        let state = self.session.state();
        if state == self.published {
            return;
        }
        tracing::info!(
            session_id = %self.session.id(),
            from = %self.published,
            to = %state,
            "stream state changed"
        );
        self.telemetry.record_event(
            events::STREAM_STATE,
            json!({
                "session_id": self.session.id().to_string(),
                "from": self.published.as_str(),
                "to": state.as_str(),
                "reconnect_attempts": self.session.reconnect_attempts(),
            }),
        );
        self.published = state;
        self.state_tx.send_replace(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;

    type Sink = mpsc::UnboundedSender<TransportEvent<u32>>;

    /// Transport answering connects from a script (default: succeed)
    #[derive(Default)]
    struct Scripted {
        answers: Mutex<VecDeque<Result<(), TransportError>>>,
        sink: Mutex<Option<Sink>>,
        connects: Mutex<Vec<Instant>>,
        disconnects: Mutex<u32>,
    }

    impl Scripted {
        fn with_answers(answers: Vec<Result<(), TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(answers.into()),
                ..Self::default()
            })
        }

        fn emit(&self, event: TransportEvent<u32>) {
            if let Some(sink) = self.sink.lock().as_ref() {
                sink.send(event).unwrap();
            }
        }
    }

    #[async_trait]
    impl Transport<u32> for Scripted {
        async fn connect(&self, events: Sink) -> Result<(), TransportError> {
            self.connects.lock().push(Instant::now());
            *self.sink.lock() = Some(events);
            self.answers.lock().pop_front().unwrap_or(Ok(()))
        }

        async fn disconnect(&self) {
            *self.disconnects.lock() += 1;
        }
    }

    fn config() -> StreamConfig {
        StreamConfig::default()
            .with_buffer_capacity(3)
            .with_max_reconnect_attempts(3)
            .without_jitter()
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn connects_and_delivers() {
        let transport = Scripted::with_answers(vec![]);
        let (guardian, mut rx) = StreamGuardian::spawn::<u32>(transport.clone(), config());
        settle().await;

        assert_eq!(guardian.state(), ConnectionState::Connected);
        transport.emit(TransportEvent::Message(1));
        transport.emit(TransportEvent::Message(2));
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(guardian.stats().delivered, 2);
        guardian.teardown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn outage_buffers_then_replays_in_order() {
        let transport = Scripted::with_answers(vec![]);
        let (guardian, mut rx) = StreamGuardian::spawn::<u32>(transport.clone(), config());
        settle().await;

        transport.emit(TransportEvent::Error("socket reset".into()));
        for i in 1..=5 {
            transport.emit(TransportEvent::Message(i));
        }
        settle().await;
        assert_eq!(guardian.state(), ConnectionState::Reconnecting);
        assert_eq!(guardian.stats().pending, 3);

        // First reconnect attempt fires after the 1000ms base delay.
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        settle().await;
        assert_eq!(guardian.state(), ConnectionState::Connected);

        let mut replayed = Vec::new();
        for _ in 0..3 {
            replayed.push(rx.recv().await.unwrap());
        }
        assert_eq!(replayed, vec![3, 4, 5]);
        let stats = guardian.stats();
        assert_eq!(stats.dropped, 2);
        assert_eq!(stats.flushed, 3);
        assert_eq!(stats.successful_reconnects, 1);
        guardian.teardown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn retries_follow_backoff_then_disconnect() {
        let down = || Err(TransportError::Retryable("refused".into()));
        let transport = Scripted::with_answers(vec![down(), down(), down(), down()]);
        let start = Instant::now();
        let (guardian, _rx) = StreamGuardian::spawn::<u32>(transport.clone(), config());

        tokio::time::sleep(Duration::from_secs(30)).await;

        let offsets: Vec<Duration> = transport
            .connects
            .lock()
            .iter()
            .map(|t| t.duration_since(start))
            .collect();
        assert_eq!(
            offsets,
            vec![
                Duration::ZERO,
                Duration::from_millis(1_000),
                Duration::from_millis(3_000),
                Duration::from_millis(7_000),
            ]
        );
        assert_eq!(guardian.state(), ConnectionState::Disconnected);
        assert_eq!(guardian.stats().reconnect_attempts, 3);

        guardian.reconnect().unwrap();
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        settle().await;
        assert_eq!(guardian.state(), ConnectionState::Connected);
        guardian.teardown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_connect_enters_error_state() {
        let transport =
            Scripted::with_answers(vec![Err(TransportError::Fatal("unauthorized".into()))]);
        let (guardian, _rx) = StreamGuardian::spawn::<u32>(transport.clone(), config());
        settle().await;
        assert_eq!(guardian.state(), ConnectionState::Error);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(transport.connects.lock().len(), 1);

        guardian.reconnect().unwrap();
        tokio::time::sleep(Duration::from_millis(1_000)).await;
        settle().await;
        assert_eq!(guardian.state(), ConnectionState::Connected);
        guardian.teardown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_disconnects_and_stops() {
        let transport = Scripted::with_answers(vec![]);
        let (guardian, mut rx) = StreamGuardian::spawn::<u32>(transport.clone(), config());
        settle().await;

        guardian.teardown().await.unwrap();
        assert_eq!(*transport.disconnects.lock(), 1);
        assert_eq!(guardian.state(), ConnectionState::Disconnected);
        assert!(rx.recv().await.is_none());
        assert!(guardian.reconnect().is_err());
        assert!(guardian.teardown().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn state_watchers_see_transitions() {
        let transport = Scripted::with_answers(vec![]);
        let (guardian, _rx) = StreamGuardian::spawn::<u32>(transport.clone(), config());
        let mut states = guardian.subscribe_state();
        settle().await;
        assert_eq!(*states.borrow_and_update(), ConnectionState::Connected);

        transport.emit(TransportEvent::Closed);
        states.changed().await.unwrap();
        assert_eq!(*states.borrow_and_update(), ConnectionState::Reconnecting);
        guardian.teardown().await.unwrap();
    }
}
