//! Typed access to the control authority's HTTP API.
//!
//! | call                        | endpoint            |
//! |-----------------------------|---------------------|
//! | `fetch_latest_telemetry`    | `GET /latest`       |
//! | `fetch_control_status`      | `GET /status`       |
//! | `push_control`              | `POST /control`     |
//! | `fetch_history`             | `GET /data?limit=N` |
//!
//! Every call is bounded by the client's request timeout and is safe to
//! retry.

use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use time::OffsetDateTime;
use tracing::debug;

use crate::error::{NetworkError, ProtocolError, RemoteError};
use crate::model::{
    ControlConfig, ControlSettings, DetailMsg, HistoryMsg, HistoryRecord, LatestMsg, LatestReading,
};

// ---------------------------------------------------------------------------
// Seam used by the sync loop and command surface
// ---------------------------------------------------------------------------

pub trait ControlAuthority: Send + Sync + 'static {
    fn fetch_latest_telemetry(
        &self,
    ) -> impl Future<Output = Result<LatestReading, RemoteError>> + Send;

    fn fetch_control_status(
        &self,
    ) -> impl Future<Output = Result<ControlSettings, RemoteError>> + Send;

    /// Send the full configuration; the backend replaces its state with it.
    /// Returns the configuration the backend accepted.
    fn push_control(
        &self,
        cmd: ControlConfig,
    ) -> impl Future<Output = Result<ControlConfig, RemoteError>> + Send;

    fn fetch_history(
        &self,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<HistoryRecord>, RemoteError>> + Send;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct HttpAuthority {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAuthority {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| NetworkError::Request(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, RemoteError> {
        let resp = self.http.get(self.url(path)).send().await?;
        read_json(resp).await
    }
}

/// Decode a response body, turning non-2xx into `ProtocolError::Status` with
/// the backend's `detail` when it sent one.
async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, RemoteError> {
    let status = resp.status();
    let body = resp.bytes().await?;

    if !status.is_success() {
        let detail = serde_json::from_slice::<DetailMsg>(&body)
            .ok()
            .map(|d| d.message());
        return Err(ProtocolError::Status {
            status: status.as_u16(),
            detail,
        }
        .into());
    }

    serde_json::from_slice(&body).map_err(|e| ProtocolError::Malformed(e.to_string()).into())
}

impl ControlAuthority for HttpAuthority {
    async fn fetch_latest_telemetry(&self) -> Result<LatestReading, RemoteError> {
        let msg: LatestMsg = self.get_json("/latest").await?;
        Ok(msg.into_reading(OffsetDateTime::now_utc()))
    }

    async fn fetch_control_status(&self) -> Result<ControlSettings, RemoteError> {
        self.get_json("/status").await
    }

    async fn push_control(&self, cmd: ControlConfig) -> Result<ControlConfig, RemoteError> {
        debug!(?cmd, "push_control");
        let resp = self.http.post(self.url("/control")).json(&cmd).send().await?;
        let accepted: ControlConfig = read_json(resp).await?;
        debug!(?accepted, "push_control accepted");
        Ok(accepted)
    }

    async fn fetch_history(&self, limit: u32) -> Result<Vec<HistoryRecord>, RemoteError> {
        let msg: HistoryMsg = self.get_json(&format!("/data?limit={limit}")).await?;
        Ok(msg.into_records())
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Mode, PumpStatus};
    use axum::extract::{Query, State};
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Json};
    use axum::routing::get;
    use axum::Router;
    use serde_json::json;
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};
    use tokio::net::TcpListener;

    // -- Mock backend -------------------------------------------------------

    #[derive(Clone)]
    struct Backend {
        control: Arc<Mutex<ControlConfig>>,
    }

    async fn latest(State(b): State<Backend>) -> impl IntoResponse {
        let pump = b.control.lock().unwrap().pump_status.is_on();
        Json(json!({"temperature": 24.5, "humidity": 61.0, "soil": 33.2, "pump_status": pump}))
    }

    async fn status(State(b): State<Backend>) -> impl IntoResponse {
        let c = *b.control.lock().unwrap();
        Json(json!({
            "mode": c.mode,
            "low_threshold": c.low_threshold,
            "high_threshold": c.high_threshold,
        }))
    }

    async fn control(
        State(b): State<Backend>,
        Json(body): Json<serde_json::Value>,
    ) -> axum::response::Response {
        match serde_json::from_value::<ControlConfig>(body) {
            Ok(cfg) => {
                *b.control.lock().unwrap() = cfg;
                Json(cfg).into_response()
            }
            Err(_) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({"detail": "invalid control payload"})),
            )
                .into_response(),
        }
    }

    async fn data(Query(q): Query<HashMap<String, String>>) -> impl IntoResponse {
        let limit: usize = q.get("limit").and_then(|s| s.parse().ok()).unwrap_or(0);
        let records: Vec<_> = (0..limit.min(3))
            .map(|i| json!([format!("2024-05-01T12:0{i}:00"), 20 + i, 50, 30]))
            .collect();
        Json(json!({ "records": records }))
    }

    async fn broken() -> impl IntoResponse {
        (StatusCode::INTERNAL_SERVER_ERROR, "oops")
    }

    async fn garbage() -> impl IntoResponse {
        "not json"
    }

    async fn slow() -> impl IntoResponse {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Json(json!({}))
    }

    async fn spawn_backend() -> (SocketAddr, Backend) {
        let backend = Backend {
            control: Arc::new(Mutex::new(ControlConfig::default())),
        };
        let app = Router::new()
            .route("/latest", get(latest))
            .route("/status", get(status))
            .route("/control", axum::routing::post(control))
            .route("/data", get(data))
            .route("/broken/status", get(broken))
            .route("/garbage/status", get(garbage))
            .route("/slow/status", get(slow))
            .with_state(backend.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (addr, backend)
    }

    fn client(base: String) -> HttpAuthority {
        HttpAuthority::new(&base, Duration::from_secs(2)).unwrap()
    }

    // -- Reads --------------------------------------------------------------

    #[tokio::test]
    async fn fetch_latest_parses_sample() {
        let (addr, _b) = spawn_backend().await;
        let c = client(format!("http://{addr}"));

        let reading = c.fetch_latest_telemetry().await.unwrap();
        assert_eq!(reading.sample.soil_moisture, 33.2);
        assert_eq!(reading.sample.humidity, 61.0);
        assert_eq!(reading.pump_status, PumpStatus::Off);
    }

    #[tokio::test]
    async fn fetch_status_parses_settings() {
        let (addr, _b) = spawn_backend().await;
        let c = client(format!("http://{addr}/"));

        let s = c.fetch_control_status().await.unwrap();
        assert_eq!(s.mode, Mode::Automatic);
        assert_eq!(s.low_threshold, 30.0);
        assert_eq!(s.high_threshold, 60.0);
    }

    #[tokio::test]
    async fn fetch_history_passes_limit() {
        let (addr, _b) = spawn_backend().await;
        let c = client(format!("http://{addr}"));

        let records = c.fetch_history(2).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].temperature, 21.0);
    }

    // -- Writes -------------------------------------------------------------

    #[tokio::test]
    async fn pushed_config_reads_back() {
        let (addr, _b) = spawn_backend().await;
        let c = client(format!("http://{addr}"));

        let cmd = ControlConfig {
            mode: Mode::Manual,
            low_threshold: 20.0,
            high_threshold: 80.0,
            pump_status: PumpStatus::On,
        };
        let accepted = c.push_control(cmd).await.unwrap();
        assert_eq!(accepted, cmd);

        let settings = c.fetch_control_status().await.unwrap();
        let latest = c.fetch_latest_telemetry().await.unwrap();
        assert_eq!(settings.with_pump(latest.pump_status), cmd);
    }

    // -- Failures -----------------------------------------------------------

    #[tokio::test]
    async fn non_2xx_is_protocol_error() {
        let (addr, _b) = spawn_backend().await;
        let c = client(format!("http://{addr}/broken"));

        let err = c.fetch_control_status().await.unwrap_err();
        assert_eq!(
            err,
            RemoteError::Protocol(ProtocolError::Status {
                status: 500,
                detail: None
            })
        );
    }

    #[tokio::test]
    async fn rejected_push_carries_detail() {
        let (addr, b) = spawn_backend().await;
        let c = client(format!("http://{addr}"));

        // Non-finite thresholds serialize as null, which the backend rejects.
        let cmd = ControlConfig {
            low_threshold: f64::NAN,
            ..ControlConfig::default()
        };
        let err = c.push_control(cmd).await.unwrap_err();
        assert_eq!(
            err,
            RemoteError::Protocol(ProtocolError::Status {
                status: 422,
                detail: Some("invalid control payload".into())
            })
        );
        assert_eq!(*b.control.lock().unwrap(), ControlConfig::default());
    }

    #[tokio::test]
    async fn malformed_body_is_protocol_error() {
        let (addr, _b) = spawn_backend().await;
        let c = client(format!("http://{addr}/garbage"));

        let err = c.fetch_control_status().await.unwrap_err();
        assert!(matches!(
            err,
            RemoteError::Protocol(ProtocolError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let (addr, _b) = spawn_backend().await;
        let c = HttpAuthority::new(&format!("http://{addr}/slow"), Duration::from_millis(200))
            .unwrap();

        let err = c.fetch_control_status().await.unwrap_err();
        assert_eq!(err, RemoteError::Network(NetworkError::Timeout));
    }

    #[tokio::test]
    async fn refused_connection_is_network_error() {
        // Bind then drop to get a port nobody is listening on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let c = client(format!("http://{addr}"));
        let err = c.fetch_latest_telemetry().await.unwrap_err();
        assert!(matches!(err, RemoteError::Network(_)), "got {err:?}");
    }
}
