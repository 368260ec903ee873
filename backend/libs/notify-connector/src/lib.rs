/// Reconnecting WebSocket consumer for the notify gateway
///
/// Owns one outbound connection to the gateway, keeps it alive with the
/// JSON-level ping contract, and hands every inbound frame to its owner
/// without interpreting payloads. Drops and handshake failures trigger
/// exponential-backoff reconnects; once the attempt cap is exhausted the
/// connector halts and surfaces a terminal `ServiceUnavailable` event
/// instead of retrying forever.
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use notify_wire::WireMessage;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;

/// Connection lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake in progress
    Connecting,
    /// Connected and consuming
    Open,
    /// Shut down on purpose; no reconnect
    ClosedClean,
    /// Lost the connection; a reconnect is (or was) pending
    ClosedRetryable,
}

/// Everything the owner can observe
#[derive(Debug, Clone)]
pub enum ConnectorEvent {
    StateChanged(ConnectionState),
    /// An inbound frame; payload semantics are the owner's business
    Message(WireMessage),
    /// Reconnect attempts exhausted; the connector has halted
    ServiceUnavailable,
}

#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// Gateway URL, e.g. `ws://gateway:8000/ws?client_id=guard-desk`
    pub url: String,
    /// First reconnect backoff; doubles per attempt
    pub base_reconnect_delay: Duration,
    /// Backoff ceiling
    pub max_reconnect_delay: Duration,
    /// Consecutive failed attempts tolerated before giving up
    pub max_reconnect_attempts: u32,
    /// JSON-level ping cadence while open
    pub ping_interval: Duration,
}

impl ConnectorConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            base_reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
            max_reconnect_attempts: 10,
            ping_interval: Duration::from_secs(30),
        }
    }
}

/// Backoff before reconnect attempt `attempt` (1-based):
/// `min(base × 2^(attempt−1), max)`
pub fn reconnect_delay(config: &ConnectorConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    std::cmp::min(
        config.base_reconnect_delay.saturating_mul(1 << exponent),
        config.max_reconnect_delay,
    )
}

/// Handle to a running connector. Events arrive on `next_event`; dropping
/// the handle (or calling `shutdown`) ends the connection loop.
pub struct NotifyConnector {
    events: mpsc::Receiver<ConnectorEvent>,
    task: JoinHandle<()>,
}

impl NotifyConnector {
    /// Spawn the connection loop. Must be called from within a tokio
    /// runtime.
    pub fn connect(config: ConnectorConfig) -> Self {
        let (tx, rx) = mpsc::channel(64);
        let task = tokio::spawn(run(config, tx));
        NotifyConnector { events: rx, task }
    }

    /// Next lifecycle or message event; `None` once the loop has ended
    pub async fn next_event(&mut self) -> Option<ConnectorEvent> {
        self.events.recv().await
    }

    /// Stop consuming and close the connection
    pub fn shutdown(self) {
        self.task.abort();
    }
}

async fn run(config: ConnectorConfig, events: mpsc::Sender<ConnectorEvent>) {
    let mut attempt: u32 = 0;

    loop {
        if emit(&events, ConnectorEvent::StateChanged(ConnectionState::Connecting))
            .await
            .is_err()
        {
            return;
        }

        match tokio_tungstenite::connect_async(config.url.as_str()).await {
            Ok((stream, _response)) => {
                // Successful handshake resets the attempt counter
                attempt = 0;
                tracing::info!(url = %config.url, "connected to notify gateway");
                if emit(&events, ConnectorEvent::StateChanged(ConnectionState::Open))
                    .await
                    .is_err()
                {
                    return;
                }

                match consume(stream, &config, &events).await {
                    SessionEnd::OwnerGone => return,
                    SessionEnd::Dropped => {
                        tracing::warn!(url = %config.url, "connection lost");
                        if emit(
                            &events,
                            ConnectorEvent::StateChanged(ConnectionState::ClosedRetryable),
                        )
                        .await
                        .is_err()
                        {
                            return;
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(url = %config.url, error = %e, "handshake failed");
                if emit(
                    &events,
                    ConnectorEvent::StateChanged(ConnectionState::ClosedRetryable),
                )
                .await
                .is_err()
                {
                    return;
                }
            }
        }

        attempt += 1;
        if attempt > config.max_reconnect_attempts {
            tracing::error!(
                url = %config.url,
                attempts = attempt - 1,
                "reconnect attempts exhausted, giving up"
            );
            let _ = emit(&events, ConnectorEvent::ServiceUnavailable).await;
            return;
        }

        let delay = reconnect_delay(&config, attempt);
        tracing::info!(
            attempt = attempt,
            max = config.max_reconnect_attempts,
            delay_ms = delay.as_millis() as u64,
            "reconnecting after backoff"
        );
        tokio::time::sleep(delay).await;
    }
}

enum SessionEnd {
    /// The owner dropped its handle; stop cleanly
    OwnerGone,
    /// The connection went away; reconnect
    Dropped,
}

async fn consume(
    stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    config: &ConnectorConfig,
    events: &mpsc::Sender<ConnectorEvent>,
) -> SessionEnd {
    let (mut sink, mut source) = stream.split();

    // First tick only after a full interval; the handshake just happened
    let start = tokio::time::Instant::now() + config.ping_interval;
    let mut ping = tokio::time::interval_at(start, config.ping_interval);

    loop {
        tokio::select! {
            _ = ping.tick() => {
                let frame = match WireMessage::ping().to_json() {
                    Ok(text) => Message::Text(text),
                    Err(e) => {
                        tracing::error!(error = %e, "failed to build ping frame");
                        continue;
                    }
                };
                if sink.send(frame).await.is_err() {
                    return SessionEnd::Dropped;
                }
            }
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => match WireMessage::from_json(&text) {
                    // pongs (and server pings) belong to the keepalive
                    // contract, not the notification stream
                    Ok(msg) if msg.is_keepalive() => {}
                    Ok(msg) => {
                        if emit(events, ConnectorEvent::Message(msg)).await.is_err() {
                            return SessionEnd::OwnerGone;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "unparseable frame from gateway");
                    }
                },
                Some(Ok(Message::Ping(payload))) => {
                    if sink.send(Message::Pong(payload)).await.is_err() {
                        return SessionEnd::Dropped;
                    }
                }
                Some(Ok(Message::Pong(_))) => {}
                Some(Ok(Message::Close(reason))) => {
                    tracing::info!(?reason, "gateway closed the connection");
                    return SessionEnd::Dropped;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "transport error");
                    return SessionEnd::Dropped;
                }
                None => return SessionEnd::Dropped,
            }
        }
    }
}

async fn emit(
    events: &mpsc::Sender<ConnectorEvent>,
    event: ConnectorEvent,
) -> Result<(), mpsc::error::SendError<ConnectorEvent>> {
    events.send(event).await
}
