use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, warn};

use live_queue_cell::models::{ClientMessage, QueuePositionPayload, ServerMessage, TokenStatus};

use crate::countdown::WaitCountdown;
use crate::error::QueueClientError;

/// Connection factory for the realtime feed. The concrete transport is the
/// application's WebSocket client; tests script the server side.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn QueueStream>, QueueClientError>;
}

#[async_trait]
pub trait QueueStream: Send {
    async fn send(&mut self, message: &ClientMessage) -> Result<(), QueueClientError>;

    /// `None` once the server has closed the connection.
    async fn recv(&mut self) -> Option<Result<ServerMessage, QueueClientError>>;
}

/// What the waiting-room screen renders. `live` is false while the feed is
/// between connections; the rest of the view is then the last-known state
/// carried by the local countdown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatientQueueView {
    pub token_number: Option<i32>,
    pub position: Option<u32>,
    pub status: Option<TokenStatus>,
    pub remaining_minutes: f64,
    pub display_minutes: u32,
    pub live: bool,
}

impl PatientQueueView {
    fn idle() -> Self {
        Self {
            token_number: None,
            position: None,
            status: None,
            remaining_minutes: 0.0,
            display_minutes: 0,
            live: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay: Duration,
    /// Cadence of the local countdown.
    pub tick_interval: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(3),
            tick_interval: Duration::from_secs(1),
        }
    }
}

/// Client half of the realtime channel: keeps one subscription alive across
/// disconnects, folds authoritative pushes and once-a-second ticks into a
/// `watch`-published view.
pub struct PositionFeed {
    transport: Arc<dyn QueueTransport>,
    subscribe: ClientMessage,
    config: FeedConfig,
    countdown: WaitCountdown,
    last_payload: Option<QueuePositionPayload>,
    view_tx: watch::Sender<PatientQueueView>,
    live: bool,
}

impl PositionFeed {
    pub fn new(
        transport: Arc<dyn QueueTransport>,
        subscribe: ClientMessage,
    ) -> (Self, watch::Receiver<PatientQueueView>) {
        Self::with_config(transport, subscribe, FeedConfig::default())
    }

    pub fn with_config(
        transport: Arc<dyn QueueTransport>,
        subscribe: ClientMessage,
        config: FeedConfig,
    ) -> (Self, watch::Receiver<PatientQueueView>) {
        let (view_tx, view_rx) = watch::channel(PatientQueueView::idle());
        (
            Self {
                transport,
                subscribe,
                config,
                countdown: WaitCountdown::idle(),
                last_payload: None,
                view_tx,
                live: false,
            },
            view_rx,
        )
    }

    /// Seed the countdown from cached token data (position + creation time)
    /// so the display has something sensible before the first push lands.
    pub fn seed_fallback(&mut self, countdown: WaitCountdown) {
        if self.last_payload.is_none() {
            self.countdown = countdown;
            self.push_view();
        }
    }

    /// Run until dropped/aborted. On any closure the feed waits the fixed
    /// reconnect delay, reconnects, and re-issues its subscribe message;
    /// while disconnected the last-known view keeps counting down locally.
    pub async fn run(mut self) {
        loop {
            match self.transport.connect().await {
                Ok(mut stream) => {
                    match stream.send(&self.subscribe).await {
                        Ok(()) => {
                            debug!("Queue feed connected, subscription sent");
                            self.live = true;
                            self.push_view();
                            self.pump(stream.as_mut()).await;
                        }
                        Err(e) => debug!("Queue feed subscribe failed: {}", e),
                    }
                    self.live = false;
                    self.push_view();
                }
                Err(e) => debug!("Queue feed connect failed: {}", e),
            }

            self.wait_for_reconnect().await;
        }
    }

    /// The backoff pause before the next connection attempt. The countdown
    /// keeps extrapolating from the last-known value the whole time.
    async fn wait_for_reconnect(&mut self) {
        let deadline = tokio::time::Instant::now() + self.config.reconnect_delay;
        let mut ticker = interval(self.config.tick_interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return,
                _ = ticker.tick() => {
                    self.countdown.tick();
                    self.push_view();
                }
            }
        }
    }

    async fn pump(&mut self, stream: &mut dyn QueueStream) {
        let mut ticker = interval(self.config.tick_interval);
        // The first tick of a fresh interval completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                message = stream.recv() => match message {
                    Some(Ok(ServerMessage::QueuePosition { data })) => {
                        self.apply_authoritative(data);
                    }
                    // Admin updates are not for this feed.
                    Some(Ok(ServerMessage::AdminQueueUpdate { .. })) => {}
                    Some(Err(e)) => {
                        warn!("Discarding malformed queue frame: {}", e);
                    }
                    None => return,
                },
                _ = ticker.tick() => {
                    self.countdown.tick();
                    self.push_view();
                }
            }
        }
    }

    fn apply_authoritative(&mut self, payload: QueuePositionPayload) {
        self.countdown.set_authoritative(payload.estimated_wait_time);
        self.last_payload = Some(payload);
        self.push_view();
    }

    fn push_view(&self) {
        let view = PatientQueueView {
            token_number: self.last_payload.as_ref().and_then(|p| p.token_number),
            position: self.last_payload.as_ref().and_then(|p| p.position),
            status: self.last_payload.as_ref().and_then(|p| p.status),
            remaining_minutes: self.countdown.remaining_minutes(),
            display_minutes: self.countdown.display_minutes(),
            live: self.live,
        };
        let _ = self.view_tx.send(view);
    }
}
