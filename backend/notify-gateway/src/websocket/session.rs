/// WebSocket consumer session
///
/// One actor per connected consumer. On start it registers a bounded channel
/// handle in the registry (the delivery engine writes into that channel) and
/// bridges the channel to its own mailbox; on stop it cleans its registration
/// up. The session answers both protocol-level pings and the JSON-level
/// `{"type":"ping"}` keepalive; neither ever reaches the notification queue.
use std::time::{Duration, Instant};

use actix::{Actor, ActorContext, AsyncContext, Handler, Message as ActixMessage, StreamHandler};
use actix_web_actors::ws;
use notify_wire::{WireMessage, TYPE_PING};

use crate::metrics;
use crate::websocket::{ClientSender, ConnectionRegistry};

/// Protocol ping cadence
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// Disconnect after this long without any sign of life
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

// Message type for frames fanned out by the delivery engine
#[derive(ActixMessage)]
#[rtype(result = "()")]
struct OutboundText(String);

pub struct WsSession {
    client_id: String,
    registry: ConnectionRegistry,
    buffer_size: usize,
    hb: Instant,
    handle: Option<ClientSender>,
    forwarder: Option<tokio::task::JoinHandle<()>>,
}

impl WsSession {
    pub fn new(client_id: String, registry: ConnectionRegistry, buffer_size: usize) -> Self {
        Self {
            client_id,
            registry,
            buffer_size,
            hb: Instant::now(),
            handle: None,
            forwarder: None,
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                tracing::warn!(client_id = %act.client_id, "heartbeat timed out, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(client_id = %self.client_id, "websocket session started");

        self.hb(ctx);

        // The registry handle is a bounded channel; a forwarding task drains
        // it into this actor's mailbox so the delivery engine never touches
        // actix types directly
        let (tx, mut rx) = tokio::sync::mpsc::channel::<String>(self.buffer_size);
        let addr = ctx.address();
        self.forwarder = Some(tokio::spawn(async move {
            while let Some(text) = rx.recv().await {
                if addr.try_send(OutboundText(text)).is_err() {
                    break;
                }
            }
        }));
        self.handle = Some(tx.clone());

        let registry = self.registry.clone();
        let client_id = self.client_id.clone();
        actix::spawn(async move {
            registry.register(client_id, tx).await;
        });
        metrics::client_connected();

        match WireMessage::welcome(&self.client_id).to_json() {
            Ok(text) => ctx.text(text),
            Err(e) => tracing::error!(client_id = %self.client_id, error = %e, "failed to build WELCOME"),
        }
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(client_id = %self.client_id, "websocket session stopped");
        metrics::client_disconnected();

        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }

        if let Some(handle) = self.handle.take() {
            let registry = self.registry.clone();
            let client_id = self.client_id.clone();
            actix::spawn(async move {
                registry.unregister_if_current(&client_id, &handle).await;
            });
        }
    }
}

impl Handler<OutboundText> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: OutboundText, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.hb = Instant::now();
                match WireMessage::from_json(&text) {
                    Ok(frame) if frame.kind == TYPE_PING => {
                        if let Ok(pong) = WireMessage::pong().to_json() {
                            ctx.text(pong);
                        }
                    }
                    Ok(frame) => {
                        // Consumers only receive; anything else is noise
                        tracing::debug!(
                            client_id = %self.client_id,
                            kind = %frame.kind,
                            "ignoring inbound client frame"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(client_id = %self.client_id, error = %e, "unparseable client frame");
                    }
                }
            }
            Ok(ws::Message::Binary(_)) => {
                tracing::warn!(client_id = %self.client_id, "binary frames not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::info!(client_id = %self.client_id, ?reason, "close frame received");
                ctx.stop();
            }
            _ => {}
        }
    }
}
