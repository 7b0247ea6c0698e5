//! Status facade - control panel API, gateway webhook, panel page
//!
//! One API endpoint disambiguated by an `action` query parameter, the way
//! the panel polls it. CORS is fully open; preflight OPTIONS is answered
//! by the CORS layer.

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, Json};
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use crate::application::errors::BotError;
use crate::application::services::SupervisorHandle;
use crate::infrastructure::adapters::gateway::GatewayClient;

#[derive(Clone)]
pub struct AppState {
    pub supervisor: SupervisorHandle,
    pub gateway: Option<Arc<GatewayClient>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiQuery {
    pub action: Option<String>,
    pub number: Option<String>,
    pub message: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(panel))
        .route("/api/whatsapp", get(api_handler))
        .route("/webhook", post(webhook_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the shutdown token fires.
pub async fn serve(
    state: AppState,
    addr: String,
    shutdown: CancellationToken,
) -> Result<(), BotError> {
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| BotError::Network(format!("bind {}: {}", addr, e)))?;

    tracing::info!("Control panel listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| BotError::Network(e.to_string()))
}

async fn panel() -> Html<&'static str> {
    Html(include_str!("../../../static/panel.html"))
}

async fn api_handler(
    State(state): State<AppState>,
    Query(query): Query<ApiQuery>,
) -> (StatusCode, Json<Value>) {
    match query.action.as_deref() {
        Some("status") => (StatusCode::OK, Json(status_document(&state))),
        Some("qr") => (StatusCode::OK, Json(qr_document(&state))),
        Some("test") => send_test(&state, &query).await,
        _ => (StatusCode::OK, Json(discovery_document())),
    }
}

async fn webhook_handler(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> StatusCode {
    if let Some(gateway) = &state.gateway {
        gateway.handle_webhook(&payload).await;
    }
    StatusCode::OK
}

fn status_document(state: &AppState) -> Value {
    let phase = state.supervisor.session().phase();
    json!({
        "ready": phase.is_ready(),
        "phase": phase.as_str(),
        "status": if phase.is_ready() { "Connected to WhatsApp" } else { "Not connected" },
    })
}

fn qr_document(state: &AppState) -> Value {
    match state.supervisor.session().artifact() {
        Some(artifact) => json!({
            "success": true,
            "qrCode": artifact.data_uri,
            "generatedAt": artifact.generated_at.to_rfc3339(),
            "status": "Scan QR code with WhatsApp",
        }),
        None => json!({
            "success": false,
            "status": "Generating QR code...",
        }),
    }
}

async fn send_test(state: &AppState, query: &ApiQuery) -> (StatusCode, Json<Value>) {
    let (Some(number), Some(message)) = (query.number.as_deref(), query.message.as_deref())
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "number and message query params required" })),
        );
    };

    match state.supervisor.send_test(number, message).await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({ "success": true, "message": "Message sent" })),
        ),
        Err(BotError::NotConnected) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": BotError::NotConnected.to_string() })),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        ),
    }
}

fn discovery_document() -> Value {
    json!({
        "message": "wabot API",
        "endpoints": {
            "/api/whatsapp?action=qr": "Get QR code",
            "/api/whatsapp?action=status": "Check connection status",
            "/api/whatsapp?action=test&number=123&message=hello": "Send test message",
        },
    })
}
