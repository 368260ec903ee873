/// WebSocket entry point and connection bookkeeping endpoints
///
/// Consumers connect via /ws and are handed to a `WsSession` actor; the
/// status routes expose the registry for dashboards. Authenticating the
/// connecting client is the platform gateway's job, not ours — by the time a
/// socket reaches this service its identity query parameter is trusted.
use actix_web::{web, Error, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::config::Config;
use crate::websocket::{ConnectionRegistry, WsSession};

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub client_id: Option<String>,
}

/// Upgrade to a consumer WebSocket session
///
/// Endpoint: GET /ws?client_id=...
pub async fn ws_connect(
    req: HttpRequest,
    stream: web::Payload,
    registry: web::Data<ConnectionRegistry>,
    config: web::Data<Config>,
    query: web::Query<WsParams>,
) -> Result<HttpResponse, Error> {
    let client_id = query
        .into_inner()
        .client_id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let session = WsSession::new(
        client_id,
        registry.get_ref().clone(),
        config.queue.client_buffer_size,
    );

    ws::start(session, &req, stream)
}

/// Connection status for one client
///
/// Endpoint: GET /api/v1/ws/status/{client_id}
pub async fn ws_status(
    path: web::Path<String>,
    registry: web::Data<ConnectionRegistry>,
) -> ActixResult<HttpResponse> {
    let client_id = path.into_inner();
    let connected = registry.contains(&client_id).await;

    Ok(HttpResponse::Ok().json(json!({
        "client_id": client_id,
        "connected": connected,
    })))
}

/// List all connected client ids
///
/// Endpoint: GET /api/v1/ws/clients
pub async fn list_connected_clients(
    registry: web::Data<ConnectionRegistry>,
) -> ActixResult<HttpResponse> {
    let client_ids = registry.client_ids().await;

    Ok(HttpResponse::Ok().json(json!({
        "count": client_ids.len(),
        "clients": client_ids,
    })))
}

/// Register WebSocket routes
pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/ws", web::get().to(ws_connect)).service(
        web::scope("/api/v1/ws")
            .route("/status/{client_id}", web::get().to(ws_status))
            .route("/clients", web::get().to(list_connected_clients)),
    );
}
