use actix::{Actor, ActorContext, AsyncContext, Handler, Message as ActixMessage, StreamHandler};
use actix_web_actors::ws;
use std::time::Instant;
use tokio::sync::mpsc;

use super::registry::{ConnectionId, EventSender, RoomRegistry};
use super::{ClientFrame, ServerEvent};
use crate::config::WebSocketConfig;
use crate::metrics;
use crate::models::RecipientScope;
use crate::routing::{may_join, RoomKey};

// Registry -> actor bridge
#[derive(ActixMessage)]
#[rtype(result = "()")]
struct Deliver(ServerEvent);

/// One authenticated WebSocket connection.
///
/// The scope is fixed at handshake; every join request is checked against it.
pub struct WsSession {
    connection_id: ConnectionId,
    scope: RecipientScope,
    registry: RoomRegistry,
    heartbeat: WebSocketConfig,
    hb: Instant,
    sender: EventSender,
    receiver: Option<mpsc::UnboundedReceiver<ServerEvent>>,
}

impl WsSession {
    pub fn new(scope: RecipientScope, registry: RoomRegistry, heartbeat: WebSocketConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            connection_id: ConnectionId::new(),
            scope,
            registry,
            heartbeat,
            hb: Instant::now(),
            sender,
            receiver: Some(receiver),
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let timeout = self.heartbeat.client_timeout;
        ctx.run_interval(self.heartbeat.heartbeat_interval, move |act, ctx| {
            if Instant::now().duration_since(act.hb) > timeout {
                tracing::warn!(
                    connection = %act.connection_id,
                    "WebSocket heartbeat failed, disconnecting"
                );
                ctx.close(Some(ws::CloseReason {
                    code: ws::CloseCode::Away,
                    description: Some("heartbeat timeout".to_string()),
                }));
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn send_event(&self, event: &ServerEvent, ctx: &mut ws::WebsocketContext<Self>) {
        match event.to_json() {
            Ok(json) => ctx.text(json),
            Err(e) => tracing::error!(error = %e, "Failed to encode server event"),
        }
    }

    fn handle_frame(&mut self, frame: ClientFrame, ctx: &mut ws::WebsocketContext<Self>) {
        match frame {
            ClientFrame::Join { room } => {
                if !may_join(&self.scope, &room) {
                    tracing::warn!(
                        connection = %self.connection_id,
                        scope = %self.scope,
                        room = %room,
                        "Join rejected"
                    );
                    self.send_event(
                        &ServerEvent::error("FORBIDDEN_ROOM", format!("cannot join {}", room)),
                        ctx,
                    );
                    return;
                }
                self.join(room);
            }
            ClientFrame::Leave { room } => {
                let registry = self.registry.clone();
                let connection = self.connection_id;
                let sender = self.sender.clone();
                actix::spawn(async move {
                    registry.leave(&room, connection).await;
                    let _ = sender.send(ServerEvent::Left { room });
                });
            }
        }
    }

    fn join(&self, room: RoomKey) {
        let registry = self.registry.clone();
        let connection = self.connection_id;
        let sender = self.sender.clone();
        actix::spawn(async move {
            // Acknowledge either way; a repeated join is not an error
            registry.join(room.clone(), connection, sender.clone()).await;
            let _ = sender.send(ServerEvent::Joined { room });
        });
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(
            connection = %self.connection_id,
            scope = %self.scope,
            "WebSocket session started"
        );
        metrics::ws_connection_opened();

        self.hb(ctx);

        if let Some(mut receiver) = self.receiver.take() {
            let addr = ctx.address();
            actix::spawn(async move {
                while let Some(event) = receiver.recv().await {
                    addr.do_send(Deliver(event));
                }
            });
        }

        self.send_event(&ServerEvent::connected(self.connection_id), ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(connection = %self.connection_id, "WebSocket session stopped");
        metrics::ws_connection_closed();

        let registry = self.registry.clone();
        let connection = self.connection_id;
        actix::spawn(async move {
            let left = registry.leave_all(connection).await;
            tracing::debug!(connection = %connection, rooms = left.len(), "Released rooms");
        });
    }
}

impl Handler<Deliver> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: Deliver, ctx: &mut Self::Context) {
        self.send_event(&msg.0, ctx);
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
                match ClientFrame::from_json(&text) {
                    Ok(frame) => self.handle_frame(frame, ctx),
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to parse WS frame");
                        self.send_event(&ServerEvent::error("BAD_FRAME", e.to_string()), ctx);
                    }
                }
            }
            Ok(ws::Message::Binary(_)) => {
                tracing::warn!("Binary WebSocket messages not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::info!(reason = ?reason, "WebSocket close message received");
                ctx.close(reason);
                ctx.stop();
            }
            Err(e) => {
                tracing::warn!(error = %e, "WebSocket protocol error");
                ctx.stop();
            }
            _ => {}
        }
    }
}
