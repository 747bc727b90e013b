use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use tokio::sync::{watch, RwLock};

use crate::model::{ControlConfig, PumpStatus, TelemetrySample};

/// Maximum number of events retained in the ring buffer.
const MAX_EVENTS: usize = 200;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

/// Point-in-time copy of everything the console knows about the rig.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncState {
    pub config: ControlConfig,
    pub telemetry: Option<TelemetrySample>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_activated: Option<OffsetDateTime>,
    pub stale: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_success: Option<OffsetDateTime>,
    pub consecutive_failures: u32,
    /// False until the backend has confirmed a configuration; before that
    /// `config` only holds placeholders.
    pub confirmed: bool,
    /// Bumped whenever `config` changes.
    pub revision: u64,
}

/// Where the sync loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    Idle,
    Polling,
    Reconciling,
    Stopped,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncEvent {
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    pub kind: EventKind,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Poll,
    Pump,
    Command,
    Error,
    System,
}

/// Result of folding a poll into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The remote configuration is now the held configuration.
    Applied,
    /// A command landed while the poll was in flight; the poll's
    /// configuration was older than what the store holds and was dropped.
    Superseded,
}

// ---------------------------------------------------------------------------
// JSON response (what the API returns)
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct StatusResponse {
    pub uptime_secs: u64,
    pub phase: SyncPhase,
    #[serde(flatten)]
    pub state: SyncState,
    pub events: Vec<SyncEvent>,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

struct Inner {
    started_at: Instant,
    phase: SyncPhase,
    state: SyncState,
    events: VecDeque<SyncEvent>,
}

/// The single owner of the console's control view. Cloning yields another
/// handle to the same store.
///
/// All mutation goes through the write lock; readers only ever get copies.
#[derive(Clone)]
pub struct ControlStateStore {
    inner: Arc<RwLock<Inner>>,
    notify: Arc<watch::Sender<SyncState>>,
}

impl ControlStateStore {
    /// Store holding `placeholder` until the first poll or confirmed write.
    pub fn new(placeholder: ControlConfig) -> Self {
        Self::with_config(placeholder, false)
    }

    /// Store that already mirrors the backend.
    #[cfg(test)]
    pub(crate) fn confirmed(config: ControlConfig) -> Self {
        Self::with_config(config, true)
    }

    fn with_config(initial: ControlConfig, confirmed: bool) -> Self {
        let state = SyncState {
            config: initial,
            telemetry: None,
            last_activated: None,
            stale: false,
            last_success: None,
            consecutive_failures: 0,
            confirmed,
            revision: 0,
        };
        let (notify, _) = watch::channel(state.clone());

        Self {
            inner: Arc::new(RwLock::new(Inner {
                started_at: Instant::now(),
                phase: SyncPhase::Idle,
                state,
                events: VecDeque::with_capacity(MAX_EVENTS),
            })),
            notify: Arc::new(notify),
        }
    }

    pub async fn read(&self) -> SyncState {
        self.inner.read().await.state.clone()
    }

    /// Observe every change. The receiver starts at the current state.
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.notify.subscribe()
    }

    /// Replace the held configuration with a confirmed one.
    pub async fn apply(&self, update: ControlConfig) {
        let mut inner = self.inner.write().await;
        inner.replace_config(update);
        self.notify.send_replace(inner.state.clone());
    }

    /// Record a successful poll. Telemetry and freshness are always taken;
    /// the remote configuration only if no command was applied since
    /// `seen_revision` was read.
    pub async fn merge_poll(
        &self,
        seen_revision: u64,
        sample: TelemetrySample,
        remote: ControlConfig,
    ) -> MergeOutcome {
        let mut inner = self.inner.write().await;

        let recovered_from = inner.state.consecutive_failures;
        inner.state.telemetry = Some(sample);
        inner.state.stale = false;
        inner.state.consecutive_failures = 0;
        inner.state.last_success = Some(OffsetDateTime::now_utc());

        if recovered_from > 0 {
            inner.push_event(
                EventKind::Poll,
                format!("poll recovered after {recovered_from} failure(s)"),
            );
        }

        let outcome = if inner.state.revision == seen_revision {
            inner.replace_config(remote);
            MergeOutcome::Applied
        } else {
            MergeOutcome::Superseded
        };

        self.notify.send_replace(inner.state.clone());
        outcome
    }

    /// Flag the held view as out of date. Configuration and telemetry are
    /// left exactly as they were.
    pub async fn mark_stale(&self, reason: &str) {
        let mut inner = self.inner.write().await;
        inner.state.stale = true;
        inner.state.consecutive_failures = inner.state.consecutive_failures.saturating_add(1);
        inner.push_event(EventKind::Error, reason.to_string());
        self.notify.send_replace(inner.state.clone());
    }

    pub async fn set_phase(&self, phase: SyncPhase) {
        self.inner.write().await.phase = phase;
    }

    /// Record a user command outcome.
    pub async fn record_command(&self, detail: String) {
        self.inner.write().await.push_event(EventKind::Command, detail);
    }

    /// Record an error event.
    pub async fn record_error(&self, detail: String) {
        self.inner.write().await.push_event(EventKind::Error, detail);
    }

    /// Record a generic system event.
    pub async fn record_system(&self, detail: String) {
        self.inner.write().await.push_event(EventKind::System, detail);
    }

    /// Build the JSON-serialisable status snapshot.
    pub async fn to_status(&self) -> StatusResponse {
        let inner = self.inner.read().await;
        StatusResponse {
            uptime_secs: inner.started_at.elapsed().as_secs(),
            phase: inner.phase,
            state: inner.state.clone(),
            events: inner.events.iter().rev().cloned().collect(),
        }
    }
}

impl Inner {
    fn replace_config(&mut self, update: ControlConfig) {
        // The first confirmation replaces placeholders; a pump found running
        // then was switched on at some unknown earlier time.
        let first = !self.state.confirmed;
        self.state.confirmed = true;

        let previous = self.state.config;
        if previous == update {
            return;
        }

        if previous.pump_status != update.pump_status {
            if update.pump_status == PumpStatus::On && !first {
                self.state.last_activated = Some(OffsetDateTime::now_utc());
            }
            let state_str = if update.pump_status.is_on() { "ON" } else { "OFF" };
            self.push_event(EventKind::Pump, format!("pump {state_str}"));
        }

        self.state.config = update;
        self.state.revision += 1;
    }

    fn push_event(&mut self, kind: EventKind, detail: String) {
        if self.events.len() >= MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(SyncEvent {
            ts: OffsetDateTime::now_utc(),
            kind,
            detail,
        });
    }
}

// ===========================================================================
// Tests
// ===========================================================================
