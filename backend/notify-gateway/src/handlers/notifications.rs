/// Producer-facing notification endpoints
///
/// The approval-flow and CRUD services publish notifications through these
/// routes; delivery is fire-and-forget and the caller only ever gets the
/// envelope id back.
use actix_web::{web, HttpResponse, Result as ActixResult};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{EnqueueOptions, NotificationPriority};
use crate::services::NotificationQueue;

/// Request to enqueue a notification
#[derive(Debug, Clone, Deserialize)]
pub struct EnqueuePayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: serde_json::Value,
    pub priority: Option<String>,
    pub max_retries: Option<u32>,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
    pub target_clients: Option<Vec<String>>,
    pub metadata: Option<serde_json::Value>,
}

/// API Response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

/// Enqueue a notification for realtime delivery
///
/// Endpoint: POST /api/v1/notifications
pub async fn enqueue_notification(
    queue: web::Data<NotificationQueue>,
    req: web::Json<EnqueuePayload>,
) -> ActixResult<HttpResponse> {
    let req = req.into_inner();

    if req.kind.trim().is_empty() {
        return Err(AppError::BadRequest(
            "notification type must be a non-empty string".to_string(),
        )
        .into());
    }

    let options = EnqueueOptions {
        priority: NotificationPriority::parse(req.priority.as_deref().unwrap_or("normal")),
        max_retries: req.max_retries,
        expires_at: req.expires_at,
        target_clients: req.target_clients,
        metadata: req.metadata,
    };

    let id = queue.enqueue(req.kind, req.payload, options).await;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(serde_json::json!({ "id": id }))))
}

/// Queue status snapshot
///
/// Endpoint: GET /api/v1/notifications/queue/status
pub async fn queue_status(queue: web::Data<NotificationQueue>) -> ActixResult<HttpResponse> {
    let status = queue.status().await;
    Ok(HttpResponse::Ok().json(ApiResponse::ok(status)))
}

/// Fetch a pending envelope by id
///
/// Endpoint: GET /api/v1/notifications/{id}
pub async fn get_notification(
    queue: web::Data<NotificationQueue>,
    path: web::Path<String>,
) -> ActixResult<HttpResponse> {
    let id = path.into_inner();

    match queue.get(&id).await {
        Some(envelope) => Ok(HttpResponse::Ok().json(ApiResponse::ok(envelope))),
        None => Err(AppError::NotFound.into()),
    }
}

/// Cancel a still-pending envelope
///
/// Endpoint: DELETE /api/v1/notifications/{id}
pub async fn remove_notification(
    queue: web::Data<NotificationQueue>,
    path: web::Path<String>,
) -> ActixResult<HttpResponse> {
    let id = path.into_inner();
    let removed = queue.remove(&id).await;

    Ok(HttpResponse::Ok().json(ApiResponse::ok(serde_json::json!({ "removed": removed }))))
}

/// Register notification routes
pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1/notifications")
            .route("", web::post().to(enqueue_notification))
            .route("/queue/status", web::get().to(queue_status))
            .route("/{id}", web::get().to(get_notification))
            .route("/{id}", web::delete().to(remove_notification)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enqueue_payload_parsing() {
        let payload: EnqueuePayload = serde_json::from_str(
            r#"{
                "type": "visitor_request",
                "payload": {"house": "A-12"},
                "priority": "critical",
                "target_clients": ["guard-desk"]
            }"#,
        )
        .unwrap();

        assert_eq!(payload.kind, "visitor_request");
        assert_eq!(payload.priority.as_deref(), Some("critical"));
        assert_eq!(payload.target_clients.as_deref(), Some(&["guard-desk".to_string()][..]));
        assert!(payload.max_retries.is_none());
    }

    #[test]
    fn test_api_response_shapes() {
        let ok = ApiResponse::ok(1);
        assert!(ok.success);
        assert_eq!(ok.data, Some(1));

        let err = ApiResponse::<i32>::err("boom".to_string());
        assert!(!err.success);
        assert_eq!(err.error.as_deref(), Some("boom"));
    }
}
