use axum::{
    body::Bytes,
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use http::{header, StatusCode};
use serde_json::json;
use std::sync::Arc;
use tracing::error;

use crate::{gateway::ToolGateway, metrics::gather_metrics};

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

/// JSON-RPC endpoint. Every response is HTTP 200; notifications get 202.
pub async fn mcp(State(gateway): State<Arc<ToolGateway>>, body: Bytes) -> Response {
    match gateway.handle_bytes(&body).await {
        Some(response) => Json(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

pub async fn metrics() -> Response {
    match gather_metrics() {
        Ok(text) => ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], text).into_response(),
        Err(e) => {
            error!("Error gathering metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
