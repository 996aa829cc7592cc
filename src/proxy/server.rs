//! The aggregated info endpoint.
//!
//! One `GET` runs a time sync and an audit drain, in that order, and always
//! answers `200` with whatever each produced. Upstream failures only show up
//! in the logs.

use std::time::Duration;

use axum::extract::State;
use axum::http::Method;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::audit_log::AuditLogSession;
use super::channel::SignedChannel;
use super::config::ProxyConfig;
use super::time_sync::TimeSyncSession;
use crate::ProxyError;

/// Body of the info endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoResponse {
    /// Server time from the last handshake, empty if it failed
    #[serde(rename = "timeInSec")]
    pub time_in_sec: String,
    /// Entries from the last audit drain
    #[serde(rename = "auditLogs")]
    pub audit_logs: Vec<String>,
}

/// Sessions shared by every request.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Time sync session
    pub time_sync: TimeSyncSession,
    /// Audit log session
    pub audit_log: AuditLogSession,
}

impl AppState {
    /// Both sessions over one shared channel.
    pub fn from_channel(channel: SignedChannel) -> Self {
        Self {
            time_sync: TimeSyncSession::from_channel(channel.clone()),
            audit_log: AuditLogSession::from_channel(channel),
        }
    }
}

/// Builds the router serving [`InfoResponse`] at `info_path`.
///
/// CORS is fully permissive for `GET` and `OPTIONS`, with preflight results
/// cacheable for an hour.
pub fn router(state: AppState, info_path: &str) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route(info_path, get(info_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves the info endpoint on `listener` until the process exits.
pub async fn serve(listener: TcpListener, config: ProxyConfig) -> Result<(), ProxyError> {
    let info_path = config.info_path.clone();
    let state = AppState::from_channel(SignedChannel::from_config(config)?);
    let app = router(state, &info_path);

    if let Ok(addr) = listener.local_addr() {
        info!(%addr, path = %info_path, "info server listening");
    }

    axum::serve(listener, app)
        .await
        .map_err(|e| ProxyError::Transport(format!("server error: {e}")))
}

async fn info_handler(State(state): State<AppState>) -> Json<InfoResponse> {
    let time_in_sec = state
        .time_sync
        .handle_server_time()
        .await
        .unwrap_or_else(|err| {
            warn!(error = %err, "serving info without server time");
            String::new()
        });
    let audit_logs = state.audit_log.handle_audit_logs().await;

    Json(InfoResponse {
        time_in_sec,
        audit_logs,
    })
}
