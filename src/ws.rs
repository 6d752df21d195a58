//! WebSocket surface. Each connected client gets its own actor subscribed to
//! the progress broadcast; every event is forwarded as one JSON text frame.
//! The socket is outbound-only: inbound frames beyond ping/close are ignored.

use actix::prelude::*;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

use crate::api::AppState;
use crate::events::ProgressEvent;

pub struct WsSession {
    events: Option<broadcast::Receiver<ProgressEvent>>,
}

impl WsSession {
    pub fn new(events: broadcast::Receiver<ProgressEvent>) -> Self {
        Self {
            events: Some(events),
        }
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::debug!("progress subscriber connected");
        if let Some(events) = self.events.take() {
            ctx.add_stream(BroadcastStream::new(events));
        }
    }
}

impl StreamHandler<Result<ProgressEvent, BroadcastStreamRecvError>> for WsSession {
    fn handle(
        &mut self,
        event: Result<ProgressEvent, BroadcastStreamRecvError>,
        ctx: &mut Self::Context,
    ) {
        match event {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(text) => ctx.text(text),
                Err(err) => tracing::error!(%err, "failed to serialize progress event"),
            },
            // this subscriber fell behind the broadcast buffer; the run
            // itself is unaffected, the client just misses old events
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "websocket subscriber lagged, events dropped");
            }
        }
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(payload)) => ctx.pong(&payload),
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(_) => {}
            Err(err) => {
                tracing::debug!(%err, "websocket protocol error, closing");
                ctx.stop();
            }
        }
    }
}

pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    ws::start(WsSession::new(state.publisher.subscribe()), &req, stream)
}
