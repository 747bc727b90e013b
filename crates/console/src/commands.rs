//! User-initiated control commands.
//!
//! Commands skip the poll schedule: validate, push the full configuration,
//! then apply whatever the backend echoed. The store is never touched before
//! the backend confirms, and never touched at all when the write fails.
//!
//! Commands are refused until the store holds a confirmed configuration, so
//! placeholder thresholds are never written back to the backend.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::client::ControlAuthority;
use crate::error::CommandError;
use crate::model::{ControlConfig, Mode, PumpStatus};
use crate::store::ControlStateStore;
use crate::validate::validate;

/// Authority + store + the write gate that serializes every push, whether it
/// comes from a user or from the sync loop.
pub struct Controller<A> {
    authority: Arc<A>,
    store: ControlStateStore,
    write_gate: Arc<Mutex<()>>,
}

impl<A> Clone for Controller<A> {
    fn clone(&self) -> Self {
        Self {
            authority: Arc::clone(&self.authority),
            store: self.store.clone(),
            write_gate: Arc::clone(&self.write_gate),
        }
    }
}

impl<A: ControlAuthority> Controller<A> {
    pub fn new(authority: Arc<A>, store: ControlStateStore) -> Self {
        Self {
            authority,
            store,
            write_gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn store(&self) -> &ControlStateStore {
        &self.store
    }

    pub fn authority(&self) -> &A {
        &self.authority
    }

    pub(crate) fn write_gate(&self) -> &Mutex<()> {
        &self.write_gate
    }

    pub async fn set_mode(&self, mode: Mode) -> Result<ControlConfig, CommandError> {
        self.submit(&format!("mode -> {mode:?}"), |held| {
            Ok(ControlConfig { mode, ..held })
        })
        .await
    }

    /// Manual pump switch. Refused while the rig is in automatic mode.
    pub async fn set_pump(&self, pump_status: PumpStatus) -> Result<ControlConfig, CommandError> {
        self.submit(&format!("pump -> {pump_status:?}"), |held| {
            manual_pump(held, pump_status)
        })
        .await
    }

    /// Flip the pump relative to the held state, read under the write gate.
    pub async fn toggle_pump(&self) -> Result<ControlConfig, CommandError> {
        self.submit("pump toggle", |held| {
            manual_pump(held, held.pump_status.toggled())
        })
        .await
    }

    pub async fn set_low_threshold(&self, low: f64) -> Result<ControlConfig, CommandError> {
        self.submit(&format!("low_threshold -> {low}"), |held| {
            Ok(ControlConfig {
                low_threshold: low,
                ..held
            })
        })
        .await
    }

    pub async fn set_high_threshold(&self, high: f64) -> Result<ControlConfig, CommandError> {
        self.submit(&format!("high_threshold -> {high}"), |held| {
            Ok(ControlConfig {
                high_threshold: high,
                ..held
            })
        })
        .await
    }

    pub async fn set_thresholds(&self, low: f64, high: f64) -> Result<ControlConfig, CommandError> {
        self.submit(&format!("thresholds -> {low}/{high}"), |held| {
            Ok(ControlConfig {
                low_threshold: low,
                high_threshold: high,
                ..held
            })
        })
        .await
    }

    /// Build a command from the last confirmed configuration, validate it,
    /// push it, and apply the backend's echo.
    async fn submit<F>(&self, label: &str, edit: F) -> Result<ControlConfig, CommandError>
    where
        F: FnOnce(ControlConfig) -> Result<ControlConfig, CommandError>,
    {
        let _gate = self.write_gate.lock().await;

        let held = self.store.read().await;
        if !held.confirmed {
            warn!(command = label, "command refused: no confirmed configuration yet");
            return Err(CommandError::NotSynced);
        }

        let cmd = match edit(held.config).and_then(|c| validate(c).map_err(CommandError::from)) {
            Ok(c) => c,
            Err(e) => {
                warn!(command = label, "command rejected: {e}");
                self.store.record_command(format!("{label}: rejected ({e})")).await;
                return Err(e);
            }
        };

        match self.authority.push_control(cmd).await {
            Ok(accepted) => {
                info!(command = label, ?accepted, "command confirmed");
                self.store.apply(accepted).await;
                self.store.record_command(format!("{label}: confirmed")).await;
                Ok(accepted)
            }
            Err(e) => {
                warn!(command = label, "command write failed: {e}");
                self.store.record_error(format!("{label}: write failed ({e})")).await;
                Err(e.into())
            }
        }
    }
}

fn manual_pump(
    held: ControlConfig,
    pump_status: PumpStatus,
) -> Result<ControlConfig, CommandError> {
    if held.mode == Mode::Automatic {
        return Err(CommandError::AutomaticMode);
    }
    Ok(ControlConfig { pump_status, ..held })
}

// ===========================================================================
// Tests
// ===========================================================================
