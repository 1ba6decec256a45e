//! # Dashboard WebSocket Feed
//!
//! Live event source over a `tokio-tungstenite` client.
//!
//! Lifecycle:
//! `Idle -> Connecting -> Connected -> (abnormal close -> Reconnecting -> Connecting)* -> Connected | Failed`.
//! `disconnect` from any phase returns to `Idle` and never schedules a retry.
//!
//! Each `connect` starts a new session identified by a generation number and
//! guarded by its own cancellation token. Anything a superseded session tries
//! to emit or change after that is discarded, so a late close frame or a
//! sleeping retry timer from an old session cannot resurrect the connection.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::core::source::{EventSource, FeedEvent, FeedSender, FeedSinks, LinkEvent};
use crate::model::wire::{decode_message, Decoded, OutboundMessage};
use crate::model::DashboardFilter;

/// Close code of an orderly shutdown. Never triggers a retry.
pub const NORMAL_CLOSURE: u16 = 1000;
/// Close frame received without a status code.
pub const NO_STATUS_RECEIVED: u16 = 1005;
/// Connection lost without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Connection settings for the live feed.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Feed endpoint.
    pub url: String,
    /// Delay before the first retry.
    pub reconnect_base: Duration,
    /// Growth factor between consecutive retries.
    pub backoff_factor: f64,
    /// Retries before giving up.
    pub max_reconnect_attempts: u32,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:3001/ws".to_string(),
            reconnect_base: Duration::from_millis(3000),
            backoff_factor: 1.5,
            max_reconnect_attempts: 10,
        }
    }
}

/// Where the feed is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPhase {
    /// Not connected and not trying to be.
    Idle,
    /// Handshake in flight.
    Connecting,
    /// Open and receiving.
    Connected,
    /// Waiting out a backoff delay.
    Reconnecting,
    /// Retries exhausted. Only an explicit connect leaves this phase.
    Failed,
}

/// What to do after an abnormal close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after `delay`.
    Retry {
        /// 1-based attempt number.
        attempt: u32,
        /// Backoff delay before the attempt.
        delay: Duration,
    },
    /// The budget is spent.
    GiveUp {
        /// Attempts made.
        attempts: u32,
    },
}

/// Bounded exponential backoff: attempt `n` waits `base * factor^(n-1)`.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    base: Duration,
    factor: f64,
    max_attempts: u32,
    attempts: u32,
}

impl ReconnectPolicy {
    /// A fresh policy with no attempts used.
    pub fn new(base: Duration, factor: f64, max_attempts: u32) -> Self {
        Self {
            base,
            factor,
            max_attempts,
            attempts: 0,
        }
    }

    /// The policy described by `config`.
    pub fn from_config(config: &SocketConfig) -> Self {
        Self::new(
            config.reconnect_base,
            config.backoff_factor,
            config.max_reconnect_attempts,
        )
    }

    /// Delay before the 1-based `attempt`. Saturates instead of overflowing.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.base.as_secs_f64() * self.factor.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Counts one abnormal close and decides whether to retry.
    pub fn on_abnormal_close(&mut self) -> RetryDecision {
        if self.attempts >= self.max_attempts {
            return RetryDecision::GiveUp {
                attempts: self.attempts,
            };
        }
        self.attempts += 1;
        RetryDecision::Retry {
            attempt: self.attempts,
            delay: self.delay_for(self.attempts),
        }
    }

    /// Restores the full retry budget.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Retries scheduled since the last reset.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Configured retry budget.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

struct Session {
    generation: u64,
    cancel: CancellationToken,
}

struct Shared {
    phase: LinkPhase,
    policy: ReconnectPolicy,
    session: Option<Session>,
    outbound: Option<mpsc::UnboundedSender<Message>>,
    filter: DashboardFilter,
    sinks: FeedSinks,
    next_generation: u64,
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.generation == generation && !s.cancel.is_cancelled())
    }
}

struct SocketInner {
    config: SocketConfig,
    shared: Mutex<Shared>,
}

/// What the session loop does after a close.
enum AfterClose {
    Stop,
    RetryAfter(Duration),
}

/// Live event source. Cloning yields another handle to the same connection.
#[derive(Clone)]
pub struct SocketFeed {
    inner: Arc<SocketInner>,
}

fn encode(message: &OutboundMessage) -> Option<Message> {
    match serde_json::to_string(message) {
        Ok(text) => Some(Message::text(text)),
        Err(e) => {
            log::error!("Failed to serialize outbound message: {}", e);
            None
        }
    }
}

impl SocketFeed {
    /// An idle feed for `config`.
    pub fn new(config: SocketConfig) -> Self {
        let policy = ReconnectPolicy::from_config(&config);
        Self {
            inner: Arc::new(SocketInner {
                config,
                shared: Mutex::new(Shared {
                    phase: LinkPhase::Idle,
                    policy,
                    session: None,
                    outbound: None,
                    filter: DashboardFilter::default(),
                    sinks: FeedSinks::default(),
                    next_generation: 0,
                }),
            }),
        }
    }

    /// The endpoint this feed connects to.
    pub fn url(&self) -> &str {
        &self.inner.config.url
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> LinkPhase {
        self.inner.shared().phase
    }

    /// Retries used since the last successful open or explicit connect.
    pub fn retry_count(&self) -> u32 {
        self.inner.shared().policy.attempts()
    }

    /// Opens a new session, superseding any current one and any pending retry.
    /// Resets the retry budget.
    pub fn connect(&self) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            log::error!("Socket feed needs a tokio runtime to connect.");
            return;
        };

        let mut shared = self.inner.shared();
        if let Some(old) = shared.session.take() {
            old.cancel.cancel();
        }
        shared.next_generation += 1;
        let generation = shared.next_generation;
        let cancel = CancellationToken::new();
        shared.session = Some(Session {
            generation,
            cancel: cancel.clone(),
        });
        shared.policy.reset();
        shared.outbound = None;
        shared.phase = LinkPhase::Connecting;
        drop(shared);

        handle.spawn(run_session(self.inner.clone(), generation, cancel));
    }

    /// Explicit reconnect, e.g. after retries were exhausted.
    pub fn reconnect(&self) {
        log::info!("Manual reconnect requested.");
        self.connect();
    }

    /// Closes with a normal closure, cancels any pending retry and marks the
    /// feed disconnected. Repeated calls are harmless.
    pub fn disconnect(&self) {
        let mut shared = self.inner.shared();
        let session = shared.session.take();
        let was_active = session.is_some() || shared.phase != LinkPhase::Idle;
        if let Some(session) = session {
            session.cancel.cancel();
        }
        shared.outbound = None;
        shared.phase = LinkPhase::Idle;
        if was_active {
            log::info!("Disconnecting from {}.", self.inner.config.url);
            shared.sinks.broadcast(FeedEvent::Link(LinkEvent::Disconnected));
        }
    }

    /// Sends `message` if the connection is open. Otherwise logs a warning
    /// and returns false; nothing is queued for later.
    pub fn send_message(&self, message: &OutboundMessage) -> bool {
        let shared = self.inner.shared();
        let outbound = match (&shared.phase, &shared.outbound) {
            (LinkPhase::Connected, Some(outbound)) => outbound,
            _ => {
                log::warn!("WebSocket is not connected. Message not sent.");
                return false;
            }
        };
        let Some(frame) = encode(message) else {
            return false;
        };
        outbound.send(frame).is_ok()
    }

    /// Stores the filter and, when connected, asks the backend to follow it.
    pub fn set_filter(&self, filter: &DashboardFilter) {
        let connected = {
            let mut shared = self.inner.shared();
            if shared.filter == *filter {
                return;
            }
            shared.filter = filter.clone();
            shared.phase == LinkPhase::Connected
        };
        if connected {
            self.send_message(&OutboundMessage::subscribe(filter));
        }
    }
}

impl SocketInner {
    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, generation: u64, event: FeedEvent) {
        let mut shared = self.shared();
        if shared.is_current(generation) {
            shared.sinks.broadcast(event);
        }
    }

    /// Marks the session open and returns the subscribe frame to send first.
    fn on_open(&self, generation: u64, outbound: mpsc::UnboundedSender<Message>) -> Option<Message> {
        let mut shared = self.shared();
        if !shared.is_current(generation) {
            return None;
        }
        shared.phase = LinkPhase::Connected;
        shared.policy.reset();
        shared.outbound = Some(outbound);
        shared.sinks.broadcast(FeedEvent::Link(LinkEvent::Connected));
        encode(&OutboundMessage::subscribe(&shared.filter))
    }

    fn on_close(&self, generation: u64, code: u16) -> AfterClose {
        let mut shared = self.shared();
        if !shared.is_current(generation) {
            return AfterClose::Stop;
        }
        shared.outbound = None;
        shared.sinks.broadcast(FeedEvent::Link(LinkEvent::Closed { code }));

        if code == NORMAL_CLOSURE {
            log::info!("Feed closed normally.");
            shared.phase = LinkPhase::Idle;
            return AfterClose::Stop;
        }

        match shared.policy.on_abnormal_close() {
            RetryDecision::Retry { attempt, delay } => {
                let max_attempts = shared.policy.max_attempts();
                log::info!(
                    "Feed closed with code {}. Reconnecting in {:?} (attempt {}/{}).",
                    code,
                    delay,
                    attempt,
                    max_attempts
                );
                shared.phase = LinkPhase::Reconnecting;
                shared.sinks.broadcast(FeedEvent::Link(LinkEvent::Reconnecting {
                    attempt,
                    max_attempts,
                    delay,
                }));
                AfterClose::RetryAfter(delay)
            }
            RetryDecision::GiveUp { attempts } => {
                log::error!(
                    "Feed closed with code {}. Giving up after {} reconnect attempts.",
                    code,
                    attempts
                );
                shared.phase = LinkPhase::Failed;
                shared.sinks.broadcast(FeedEvent::Link(LinkEvent::Failed { attempts }));
                AfterClose::Stop
            }
        }
    }

    fn handle_text(&self, generation: u64, text: &str) {
        match decode_message(text) {
            Ok(Decoded::Event(envelope)) => self.emit(generation, FeedEvent::Message(envelope)),
            Ok(Decoded::Unknown(kind)) => log::info!("Unknown message type: {}", kind),
            Err(e) => log::warn!("Dropping malformed message: {}", e),
        }
    }

    /// Pumps one open connection. Returns the close code, or `None` when the
    /// session was cancelled and closed from this side.
    async fn drive(
        &self,
        generation: u64,
        cancel: &CancellationToken,
        stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    ) -> Option<u16> {
        let (mut write, mut read) = stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();

        if let Some(subscribe) = self.on_open(generation, out_tx.clone()) {
            log::info!("Connected to dashboard feed: {}", self.config.url);
            let _ = out_tx.send(subscribe);
        }
        drop(out_tx);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "Client disconnecting".into(),
                    };
                    if let Err(e) = write.send(Message::Close(Some(frame))).await {
                        log::debug!("Close frame not delivered: {}", e);
                    }
                    return None;
                }
                Some(message) = out_rx.recv() => {
                    if let Err(e) = write.send(message).await {
                        log::warn!("Failed to send message: {}", e);
                    }
                }
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.handle_text(generation, text.as_str()),
                    Some(Ok(Message::Close(frame))) => {
                        return Some(frame.map_or(NO_STATUS_RECEIVED, |f| u16::from(f.code)));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        log::error!("WebSocket read error: {}", e);
                        self.emit(generation, FeedEvent::Link(LinkEvent::TransportError(e.to_string())));
                        return Some(ABNORMAL_CLOSURE);
                    }
                    None => {
                        log::warn!("WebSocket stream ended without a close frame.");
                        return Some(ABNORMAL_CLOSURE);
                    }
                }
            }
        }
    }
}

async fn run_session(inner: Arc<SocketInner>, generation: u64, cancel: CancellationToken) {
    loop {
        log::info!("Connecting to dashboard feed: {}", inner.config.url);
        let outcome = tokio::select! {
            _ = cancel.cancelled() => None,
            result = connect_async(inner.config.url.as_str()) => match result {
                Ok((stream, _)) => inner.drive(generation, &cancel, stream).await,
                Err(e) => {
                    log::error!("Failed to connect to {}: {}", inner.config.url, e);
                    inner.emit(generation, FeedEvent::Link(LinkEvent::TransportError(e.to_string())));
                    Some(ABNORMAL_CLOSURE)
                }
            },
        };

        let Some(code) = outcome else {
            log::debug!("Feed session {} cancelled.", generation);
            return;
        };

        match inner.on_close(generation, code) {
            AfterClose::Stop => return,
            AfterClose::RetryAfter(delay) => {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
                let mut shared = inner.shared();
                if !shared.is_current(generation) {
                    return;
                }
                shared.phase = LinkPhase::Connecting;
            }
        }
    }
}

impl EventSource for SocketFeed {
    fn name(&self) -> &'static str {
        "websocket"
    }

    fn start(&self, sink: FeedSender) {
        let mut shared = self.inner.shared();
        shared.sinks.push(sink);
        let idle = matches!(shared.phase, LinkPhase::Idle | LinkPhase::Failed);
        drop(shared);
        if idle {
            self.connect();
        }
    }

    fn stop(&self) {
        self.disconnect();
        self.inner.shared().sinks.clear();
    }

    fn on_filter_change(&self, filter: &DashboardFilter) {
        self.set_filter(filter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_by_half_each_attempt() {
        let mut policy = ReconnectPolicy::new(Duration::from_millis(3000), 1.5, 10);
        let delays: Vec<u128> = (0..4)
            .map(|_| match policy.on_abnormal_close() {
                RetryDecision::Retry { delay, .. } => delay.as_millis(),
                RetryDecision::GiveUp { .. } => panic!("gave up too early"),
            })
            .collect();
        assert_eq!(delays, vec![3000, 4500, 6750, 10125]);
    }

    #[test]
    fn no_retry_once_the_budget_is_spent() {
        let mut policy = ReconnectPolicy::new(Duration::from_millis(10), 1.5, 3);
        for n in 1..=3 {
            assert!(matches!(
                policy.on_abnormal_close(),
                RetryDecision::Retry { attempt, .. } if attempt == n
            ));
        }
        assert_eq!(policy.on_abnormal_close(), RetryDecision::GiveUp { attempts: 3 });
        assert_eq!(policy.on_abnormal_close(), RetryDecision::GiveUp { attempts: 3 });

        policy.reset();
        assert!(matches!(policy.on_abnormal_close(), RetryDecision::Retry { attempt: 1, .. }));
    }

    #[test]
    fn zero_budget_gives_up_immediately() {
        let mut policy = ReconnectPolicy::new(Duration::from_secs(1), 1.5, 0);
        assert_eq!(policy.on_abnormal_close(), RetryDecision::GiveUp { attempts: 0 });
    }

    #[test]
    fn huge_attempt_numbers_saturate() {
        let policy = ReconnectPolicy::new(Duration::from_secs(3), 1.5, u32::MAX);
        assert_eq!(policy.delay_for(u32::MAX), Duration::MAX);
        assert_eq!(policy.delay_for(1), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn send_is_refused_while_idle() {
        let feed = SocketFeed::new(SocketConfig::default());
        assert_eq!(feed.phase(), LinkPhase::Idle);
        assert!(!feed.send_message(&OutboundMessage::subscribe(&DashboardFilter::default())));
    }

    #[tokio::test]
    async fn disconnect_on_idle_feed_emits_nothing() {
        let feed = SocketFeed::new(SocketConfig::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        feed.inner.shared().sinks.push(tx);
        feed.disconnect();
        feed.disconnect();
        assert!(rx.try_recv().is_err());
        assert_eq!(feed.phase(), LinkPhase::Idle);
    }
}
