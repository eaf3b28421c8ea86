use axum::{
    extract::{Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use sentinel_core::AlertSink;
use sentinel_notify::ChatState;
use sentinel_types::MetricSnapshot;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::AppState;

const DEFAULT_ALERT_LIMIT: usize = 50;
const MAX_ALERT_LIMIT: usize = 500;

#[derive(Deserialize)]
pub struct AlertsQuery {
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct ChatUpdateRequest {
    pub handle: String,
    pub text: String,
}

#[derive(Deserialize)]
pub struct ChatCodeRequest {
    pub handle: String,
    pub code: String,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/v1/snapshots", post(submit_snapshot))
        .route("/api/v1/alerts", get(list_alerts))
        .route("/api/v1/releases", get(list_releases))
        .route("/api/v1/chat/updates", post(chat_update))
        .route("/api/v1/chat/codes", post(issue_chat_code))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn submit_snapshot(
    State(state): State<Arc<AppState>>,
    Json(snapshot): Json<MetricSnapshot>,
) -> impl IntoResponse {
    let alerts = state.pipeline.submit_snapshot(snapshot).await;
    let alerts: Vec<_> = alerts.iter().map(|a| a.as_ref()).collect();

    (StatusCode::OK, Json(json!({ "alerts": alerts })))
}

async fn list_alerts(
    State(state): State<Arc<AppState>>,
    Query(q): Query<AlertsQuery>,
) -> impl IntoResponse {
    let limit = q.limit.unwrap_or(DEFAULT_ALERT_LIMIT).min(MAX_ALERT_LIMIT);

    match state.alert_log.recent(limit).await {
        Ok(records) => (StatusCode::OK, Json(json!({ "alerts": records }))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        ),
    }
}

async fn list_releases(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let releases = match state.calendar.load().await {
        Ok(releases) => releases,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            );
        }
    };

    let now = Utc::now();

    let items: Vec<_> = releases
        .iter()
        .map(|release| {
            json!({
                "release": release,
                "phase": state.scheduler.phase(release, now),
            })
        })
        .collect();

    (StatusCode::OK, Json(json!({ "releases": items })))
}

/// 会话只在内存中，重启后按订阅者保存的聊天标记恢复
async fn restore_session(state: &AppState, handle: &str) {
    if state.sessions.get(handle).await.is_some() {
        return;
    }

    match state.delivery.repository().chat_flags(handle).await {
        Ok(Some((enabled, verified))) => {
            let restored = ChatState::from_subscriber_flags(enabled, verified);
            state.sessions.seed(handle, restored).await;
        }
        Ok(None) => {}
        Err(e) => warn!(handle = %handle, error = %e, "Failed to load chat state from subscriber"),
    }
}

/// 配置了 admin_token 时要求 `Authorization: Bearer <token>`
fn authorized(state: &AppState, headers: &HeaderMap) -> bool {
    let Some(expected) = state.config.server.admin_token.as_deref() else {
        return true;
    };

    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token == expected)
}

async fn chat_update(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatUpdateRequest>,
) -> impl IntoResponse {
    restore_session(&state, &req.handle).await;

    let reply = match state.sessions.handle_text(&req.handle, &req.text).await {
        Ok(reply) => reply,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": e.to_string() })),
            );
        }
    };

    if reply.changed() {
        let (enabled, verified) = reply.state.subscriber_flags();
        if let Err(e) = state
            .delivery
            .repository()
            .update_chat(&reply.handle, enabled, verified)
            .await
        {
            warn!(handle = %reply.handle, error = %e, "Failed to sync chat state to subscriber");
        }
    }

    (StatusCode::OK, Json(json!(reply)))
}

/// 验证码由账户系统签发，此路由不应对外暴露；配置 admin_token 后需携带令牌
async fn issue_chat_code(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ChatCodeRequest>,
) -> impl IntoResponse {
    if !authorized(&state, &headers) {
        warn!(handle = %req.handle, "Rejected unauthorized verification code request");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "unauthorized" })),
        );
    }

    restore_session(&state, &req.handle).await;

    if req.code.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "code must not be empty" })),
        );
    }

    state.sessions.issue_code(&req.handle, req.code.trim()).await;
    info!(handle = %req.handle, "Chat verification code issued");

    (StatusCode::OK, Json(json!({ "status": "ok" })))
}
