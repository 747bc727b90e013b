//! Synchronization loop: polls the control authority, folds the result into
//! the store, and corrects the pump when the hysteresis decision disagrees
//! with what the backend reports.
//!
//! ## Loop state machine
//!
//! ```text
//! Idle ──[tick]──▶ Polling ──[both reads ok]──▶ Reconciling ──▶ Idle
//!  ▲                  │                               │
//!  └──[read failed: mark stale]                       └──[push failed: mark stale]
//!
//! any state ──[shutdown]──▶ Stopped
//! ```
//!
//! Failures never end the loop; the next tick simply tries again.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::client::ControlAuthority;
use crate::commands::Controller;
use crate::hysteresis::decide;
use crate::model::{ControlConfig, Mode, PumpStatus};
use crate::store::{MergeOutcome, SyncPhase};
use crate::validate::validate;

/// What a single tick did. Returned for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// One of the reads failed; the store was marked stale.
    PollFailed,
    /// A command was applied while the poll was in flight; reconciliation
    /// waits for the next tick.
    Superseded,
    /// Remote pump state already matches the decision.
    InSync,
    /// A corrective write was confirmed.
    Corrected(PumpStatus),
    /// The corrective command failed validation; nothing was sent.
    Rejected,
    /// The corrective write failed; the store was marked stale.
    PushFailed,
}

pub struct SyncLoop<A> {
    controller: Controller<A>,
    period: Duration,
}

impl<A: ControlAuthority> SyncLoop<A> {
    pub fn new(controller: Controller<A>, period: Duration) -> Self {
        Self { controller, period }
    }

    /// Run until `shutdown` flips to `true` (or its sender is dropped).
    /// Intended to be `tokio::spawn`-ed from main.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let store = self.controller.store().clone();

        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(period_ms = self.period.as_millis() as u64, "sync loop started");
        store
            .record_system(format!("sync loop started (every {:?})", self.period))
            .await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let outcome = self.tick().await;
                    debug!(?outcome, "tick complete");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        store.set_phase(SyncPhase::Stopped).await;
        store.record_system("sync loop stopped".to_string()).await;
        info!("sync loop stopped");
    }

    /// One Polling → Reconciling pass.
    pub async fn tick(&self) -> TickOutcome {
        let store = self.controller.store();
        let authority = self.controller.authority();

        // ── Polling ─────────────────────────────────────────────────
        store.set_phase(SyncPhase::Polling).await;
        let seen_revision = store.read().await.revision;

        let (latest, settings) = tokio::join!(
            authority.fetch_latest_telemetry(),
            authority.fetch_control_status()
        );

        let (latest, settings) = match (latest, settings) {
            (Ok(l), Ok(s)) => (l, s),
            (Err(e), _) | (_, Err(e)) => {
                warn!("sync: poll failed: {e}");
                store.mark_stale(&format!("poll failed: {e}")).await;
                store.set_phase(SyncPhase::Idle).await;
                return TickOutcome::PollFailed;
            }
        };

        let remote = settings.with_pump(latest.pump_status);
        let moisture = latest.sample.soil_moisture;

        if store.merge_poll(seen_revision, latest.sample, remote).await == MergeOutcome::Superseded
        {
            debug!("sync: poll superseded by a newer command");
            store.set_phase(SyncPhase::Idle).await;
            return TickOutcome::Superseded;
        }

        // ── Reconciling ─────────────────────────────────────────────
        store.set_phase(SyncPhase::Reconciling).await;
        let outcome = self.reconcile(remote, moisture).await;
        store.set_phase(SyncPhase::Idle).await;
        outcome
    }

    async fn reconcile(&self, remote: ControlConfig, moisture: f64) -> TickOutcome {
        let store = self.controller.store();

        let desired = decide(
            remote.mode,
            moisture,
            remote.low_threshold,
            remote.high_threshold,
            remote.pump_status,
        );

        if desired == remote.pump_status || remote.mode != Mode::Automatic {
            return TickOutcome::InSync;
        }

        let _gate = self.controller.write_gate().lock().await;

        // A user command may have slipped in while we waited for the gate.
        let held = store.read().await.config;
        if held != remote {
            debug!("sync: configuration changed before correction; deferring");
            return TickOutcome::Superseded;
        }

        let cmd = match validate(ControlConfig {
            pump_status: desired,
            ..held
        }) {
            Ok(c) => c,
            Err(e) => {
                warn!("sync: corrective command rejected: {e}");
                store.record_error(format!("corrective command rejected: {e}")).await;
                return TickOutcome::Rejected;
            }
        };

        info!(
            moisture = format!("{moisture:.1}"),
            low = format!("{:.1}", held.low_threshold),
            high = format!("{:.1}", held.high_threshold),
            pump = ?desired,
            "sync: pump out of band, correcting"
        );

        match self.controller.authority().push_control(cmd).await {
            Ok(accepted) => {
                store.apply(accepted).await;
                TickOutcome::Corrected(accepted.pump_status)
            }
            Err(e) => {
                warn!("sync: corrective push failed: {e}");
                store.mark_stale(&format!("push failed: {e}")).await;
                TickOutcome::PushFailed
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
