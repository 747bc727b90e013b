//! In-memory control authority for tests.

use std::sync::Mutex;

use crate::client::ControlAuthority;
use crate::error::{NetworkError, ProtocolError, RemoteError};
use crate::model::{
    ControlConfig, ControlSettings, HistoryRecord, LatestReading, PumpStatus, TelemetrySample,
};
use crate::store::ControlStateStore;
use time::OffsetDateTime;

pub(crate) struct FakeState {
    pub(crate) config: ControlConfig,
    pub(crate) soil: f64,
    /// Number of upcoming polls that time out.
    pub(crate) failing_polls: u32,
    /// Reject the next pushes with this status code.
    pub(crate) reject_push: Option<u16>,
    pub(crate) pushes: Vec<ControlConfig>,
    pub(crate) status_calls: u32,
    /// Applied to the store while `/status` is in flight, simulating a user
    /// command that completes mid-poll.
    pub(crate) mid_poll_command: Option<(ControlStateStore, ControlConfig)>,
    pub(crate) history: Vec<HistoryRecord>,
}

pub(crate) struct FakeAuthority {
    pub(crate) state: Mutex<FakeState>,
}

impl FakeAuthority {
    pub(crate) fn new(config: ControlConfig, soil: f64) -> Self {
        Self {
            state: Mutex::new(FakeState {
                config,
                soil,
                failing_polls: 0,
                reject_push: None,
                pushes: Vec::new(),
                status_calls: 0,
                mid_poll_command: None,
                history: Vec::new(),
            }),
        }
    }

    pub(crate) fn pushes(&self) -> Vec<ControlConfig> {
        self.state.lock().unwrap().pushes.clone()
    }

    pub(crate) fn set_soil(&self, soil: f64) {
        self.state.lock().unwrap().soil = soil;
    }

    pub(crate) fn fail_polls(&self, n: u32) {
        self.state.lock().unwrap().failing_polls = n;
    }

    pub(crate) fn reject_push(&self, status: Option<u16>) {
        self.state.lock().unwrap().reject_push = status;
    }

    pub(crate) fn remote_config(&self) -> ControlConfig {
        self.state.lock().unwrap().config
    }
}

impl ControlAuthority for FakeAuthority {
    async fn fetch_latest_telemetry(&self) -> Result<LatestReading, RemoteError> {
        let mut st = self.state.lock().unwrap();
        if st.failing_polls > 0 {
            st.failing_polls -= 1;
            return Err(NetworkError::Timeout.into());
        }
        Ok(LatestReading {
            sample: TelemetrySample {
                temperature: 21.0,
                humidity: 50.0,
                soil_moisture: st.soil,
                observed_at: OffsetDateTime::now_utc(),
            },
            pump_status: st.config.pump_status,
        })
    }

    async fn fetch_control_status(&self) -> Result<ControlSettings, RemoteError> {
        let (settings, command) = {
            let mut st = self.state.lock().unwrap();
            st.status_calls += 1;
            let c = st.config;
            (
                ControlSettings {
                    mode: c.mode,
                    low_threshold: c.low_threshold,
                    high_threshold: c.high_threshold,
                },
                st.mid_poll_command.take(),
            )
        };
        if let Some((store, cfg)) = command {
            self.state.lock().unwrap().config = cfg;
            store.apply(cfg).await;
        }
        Ok(settings)
    }

    async fn push_control(&self, cmd: ControlConfig) -> Result<ControlConfig, RemoteError> {
        // Let overlapping callers run while this write is in flight.
        tokio::task::yield_now().await;
        let mut st = self.state.lock().unwrap();
        if let Some(status) = st.reject_push {
            return Err(ProtocolError::Status {
                status,
                detail: Some("rejected".into()),
            }
            .into());
        }
        st.pushes.push(cmd);
        st.config = cmd;
        Ok(cmd)
    }

    async fn fetch_history(&self, limit: u32) -> Result<Vec<HistoryRecord>, RemoteError> {
        let st = self.state.lock().unwrap();
        Ok(st.history.iter().take(limit as usize).cloned().collect())
    }
}

pub(crate) fn running(config: ControlConfig) -> ControlConfig {
    ControlConfig {
        pump_status: PumpStatus::On,
        ..config
    }
}
