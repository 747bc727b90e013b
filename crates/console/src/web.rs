use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::warn;

use crate::client::ControlAuthority;
use crate::commands::Controller;
use crate::error::{CommandError, NetworkError, ProtocolError, RemoteError};
use crate::model::{ControlConfig, Mode, PumpStatus};

/// Number of history rows handed to the chart.
const HISTORY_WINDOW: usize = 24;

pub struct AppState<A> {
    pub controller: Controller<A>,
    pub history_limit: u32,
}

impl<A> Clone for AppState<A> {
    fn clone(&self) -> Self {
        Self {
            controller: self.controller.clone(),
            history_limit: self.history_limit,
        }
    }
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn router<A: ControlAuthority>(state: AppState<A>) -> Router {
    Router::new()
        .route("/api/status", get(api_status::<A>))
        .route("/api/history", get(api_history::<A>))
        .route("/api/control/mode", post(api_mode::<A>))
        .route("/api/control/pump", post(api_pump::<A>))
        .route("/api/control/pump/toggle", post(api_toggle::<A>))
        .route("/api/control/thresholds", post(api_thresholds::<A>))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct ModeBody {
    mode: Mode,
}

#[derive(Debug, Deserialize)]
struct PumpBody {
    pump_status: PumpStatus,
}

#[derive(Debug, Deserialize)]
struct ThresholdsBody {
    low_threshold: Option<f64>,
    high_threshold: Option<f64>,
}

async fn api_status<A: ControlAuthority>(State(state): State<AppState<A>>) -> impl IntoResponse {
    Json(state.controller.store().to_status().await)
}

async fn api_history<A: ControlAuthority>(State(state): State<AppState<A>>) -> Response {
    match state
        .controller
        .authority()
        .fetch_history(state.history_limit)
        .await
    {
        Ok(records) => {
            let skip = records.len().saturating_sub(HISTORY_WINDOW);
            let window: Vec<_> = records.into_iter().skip(skip).collect();
            (StatusCode::OK, Json(json!({ "success": true, "data": window }))).into_response()
        }
        Err(e) => {
            warn!("history fetch failed: {e}");
            remote_error_response(&e)
        }
    }
}

async fn api_mode<A: ControlAuthority>(
    State(state): State<AppState<A>>,
    Json(body): Json<ModeBody>,
) -> Response {
    command_response(state.controller.set_mode(body.mode).await)
}

async fn api_pump<A: ControlAuthority>(
    State(state): State<AppState<A>>,
    Json(body): Json<PumpBody>,
) -> Response {
    command_response(state.controller.set_pump(body.pump_status).await)
}

async fn api_toggle<A: ControlAuthority>(State(state): State<AppState<A>>) -> Response {
    command_response(state.controller.toggle_pump().await)
}

async fn api_thresholds<A: ControlAuthority>(
    State(state): State<AppState<A>>,
    Json(body): Json<ThresholdsBody>,
) -> Response {
    let result = match (body.low_threshold, body.high_threshold) {
        (Some(low), Some(high)) => state.controller.set_thresholds(low, high).await,
        (Some(low), None) => state.controller.set_low_threshold(low).await,
        (None, Some(high)) => state.controller.set_high_threshold(high).await,
        (None, None) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "low_threshold or high_threshold is required".to_string(),
            )
        }
    };
    command_response(result)
}

// ---------------------------------------------------------------------------
// Response mapping
// ---------------------------------------------------------------------------

fn command_response(result: Result<ControlConfig, CommandError>) -> Response {
    match result {
        Ok(cfg) => (StatusCode::OK, Json(json!({ "success": true, "data": cfg }))).into_response(),
        Err(CommandError::Validation(e)) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
        Err(e @ CommandError::AutomaticMode) => error_response(StatusCode::CONFLICT, e.to_string()),
        Err(e @ CommandError::NotSynced) => {
            error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
        Err(CommandError::Remote(e)) => remote_error_response(&e),
    }
}

fn remote_error_response(e: &RemoteError) -> Response {
    let status = match e {
        RemoteError::Network(NetworkError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
        RemoteError::Network(_) => StatusCode::BAD_GATEWAY,
        RemoteError::Protocol(ProtocolError::Status { status, .. }) => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
        }
        RemoteError::Protocol(ProtocolError::Malformed(_)) => StatusCode::BAD_GATEWAY,
    };
    let message = match e {
        RemoteError::Protocol(ProtocolError::Status {
            detail: Some(d), ..
        }) => d.clone(),
        other => other.to_string(),
    };
    error_response(status, message)
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(json!({ "success": false, "error": error }))).into_response()
}

// ---------------------------------------------------------------------------
// Server entry-point
// ---------------------------------------------------------------------------

pub async fn serve<A: ControlAuthority>(state: AppState<A>, port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    tracing::info!("local api listening on http://{addr}");

    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ===========================================================================
// Tests
// ===========================================================================
