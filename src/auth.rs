// src/auth.rs

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

/// Bearer token expected on protected routes. `None` leaves the API open.
#[derive(Debug, Clone, Default)]
pub struct ApiKey(pub Option<Arc<str>>);

impl ApiKey {
    pub fn new(key: Option<&str>) -> Self {
        Self(key.map(Arc::from))
    }
}

pub async fn api_key_auth(
    State(ApiKey(expected)): State<ApiKey>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected) = expected else {
        return next.run(req).await;
    };

    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match token {
        Some(token) if token == &*expected => next.run(req).await,
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "ok": false,
                "error": "Unauthorized"
            })),
        )
            .into_response(),
    }
}
