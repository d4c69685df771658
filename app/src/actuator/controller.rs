use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::control::AngleOutbox;
use crate::core::unit::{DegreeCelsius, OpeningPercentage, TargetTemperature};
use crate::persistence::{PersistedSettings, SettingsStore};
use crate::thermostat::auto_opening;

use super::{ActuatorStatus, ControlError, StatusFlags, snap_to_slider_step};

/// Angles reported by the backend outside this band mean the servo lost its calibration.
const PLAUSIBLE_ANGLE: std::ops::RangeInclusive<f64> = -5.0..=105.0;

#[derive(Debug, Clone, Deserialize)]
pub struct ActuatorSettings {
    #[serde(default)]
    pub travel_time_ms: u64,
    #[serde(default = "default_settle_window_ms")]
    pub settle_window_ms: u64,
}

fn default_settle_window_ms() -> u64 {
    2_000
}

impl Default for ActuatorSettings {
    fn default() -> Self {
        Self {
            travel_time_ms: 0,
            settle_window_ms: default_settle_window_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ControllerView {
    pub opening: OpeningPercentage,
    pub status: ActuatorStatus,
    pub is_open: bool,
    pub is_auto: bool,
    pub target: Option<TargetTemperature>,
    pub fault: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Applied(OpeningPercentage),
    Unchanged,
    Stale,
    Busy,
    Faulted,
}

#[derive(Debug, Clone, Copy)]
struct Travel {
    destination: OpeningPercentage,
    arrives_at: Instant,
}

pub struct ActuatorController {
    store: Arc<dyn SettingsStore>,
    outbox: AngleOutbox,
    travel_time: Duration,
    settle_window: Duration,

    opening: OpeningPercentage,
    is_open: bool,
    is_auto: bool,
    target: Option<TargetTemperature>,
    fault: Option<String>,
    travel: Option<Travel>,
    dragging: bool,
    last_commit_at: Option<Instant>,
    last_committed: Option<OpeningPercentage>,
}

impl ActuatorController {
    /// Restores the last persisted state. Nothing is sent to the backend until the first commit.
    pub fn new(store: Arc<dyn SettingsStore>, outbox: AngleOutbox, settings: &ActuatorSettings) -> Self {
        let persisted = PersistedSettings::load(store.as_ref());
        tracing::info!(
            "Restored opening {}, auto mode {}, target {:?}",
            persisted.opening,
            persisted.is_auto,
            persisted.target.map(|t| t.celsius().0)
        );

        Self {
            store,
            outbox,
            travel_time: Duration::from_millis(settings.travel_time_ms),
            settle_window: Duration::from_millis(settings.settle_window_ms),
            opening: persisted.opening,
            is_open: persisted.is_open,
            is_auto: persisted.is_auto,
            target: persisted.target,
            fault: None,
            travel: None,
            dragging: false,
            last_commit_at: None,
            last_committed: None,
        }
    }

    pub fn opening(&self) -> OpeningPercentage {
        self.opening
    }

    pub fn is_auto(&self) -> bool {
        self.is_auto
    }

    pub fn target(&self) -> Option<TargetTemperature> {
        self.target
    }

    pub fn is_moving(&self) -> bool {
        self.travel.is_some()
    }

    pub fn status(&self) -> ActuatorStatus {
        ActuatorStatus::resolve(StatusFlags {
            is_error: self.fault.is_some(),
            is_moving: self.is_moving(),
            is_auto: self.is_auto,
            is_open: self.opening.is_open(),
        })
    }

    pub fn view(&self) -> ControllerView {
        ControllerView {
            opening: self.opening,
            status: self.status(),
            is_open: self.is_open,
            is_auto: self.is_auto,
            target: self.target,
            fault: self.fault.clone(),
        }
    }

    pub fn open(&mut self, now: Instant) -> Result<(), ControlError> {
        self.ensure_operational()?;
        self.ensure_still()?;

        if self.opening.is_fully_open() {
            return Err(ControlError::AlreadyOpen);
        }

        self.is_auto = false;
        self.move_to(OpeningPercentage::FULLY_OPEN, now);
        Ok(())
    }

    pub fn close(&mut self, now: Instant) -> Result<(), ControlError> {
        self.ensure_operational()?;
        self.ensure_still()?;

        if !self.opening.is_open() {
            return Err(ControlError::AlreadyClosed);
        }

        self.is_auto = false;
        self.move_to(OpeningPercentage::CLOSED, now);
        Ok(())
    }

    /// Live slider update. The value is shown but only committed on release.
    pub fn slider_drag(&mut self, value: f64) -> Result<OpeningPercentage, ControlError> {
        self.ensure_operational()?;
        self.ensure_still()?;

        self.is_auto = false;
        self.dragging = true;
        self.opening = snap_to_slider_step(value);

        Ok(self.opening)
    }

    pub fn slider_release(&mut self, now: Instant) -> Result<(), ControlError> {
        self.ensure_operational()?;
        self.ensure_still()?;

        self.dragging = false;
        self.commit(now);
        Ok(())
    }

    pub fn set_target(&mut self, target: Option<f64>) -> Result<(), ControlError> {
        self.ensure_operational()?;

        let target = match target {
            Some(value) => Some(TargetTemperature::new(value).ok_or(ControlError::TargetOutOfRange)?),
            None => None,
        };

        self.target = target;
        if target.is_none() && self.is_auto {
            tracing::info!("Target temperature cleared, leaving auto mode");
            self.is_auto = false;
        }

        self.persist();
        Ok(())
    }

    pub fn set_auto(&mut self, enabled: bool) -> Result<(), ControlError> {
        self.ensure_operational()?;

        if enabled && self.target.is_none() {
            return Err(ControlError::NoTarget);
        }

        self.is_auto = enabled;
        self.persist();
        Ok(())
    }

    /// Completes a pending open/close once its travel time is over.
    pub fn finish_travel(&mut self, now: Instant) -> bool {
        match self.travel {
            Some(travel) if travel.arrives_at <= now && self.fault.is_none() => {
                self.travel = None;
                self.opening = travel.destination;
                self.commit(now);
                true
            }
            _ => false,
        }
    }

    /// Recomputes the opening from the temperature error while in auto mode and commits it
    /// when it differs from what was committed last.
    pub fn apply_auto(&mut self, inside: DegreeCelsius, now: Instant) -> Option<OpeningPercentage> {
        if self.fault.is_some() || self.is_moving() || !self.is_auto {
            return None;
        }

        let target = self.target?;
        let opening = auto_opening(inside, target);

        if self.last_committed == Some(opening) && self.opening == opening {
            return None;
        }

        tracing::debug!("Auto mode: inside {}, target {} -> opening {}", inside, target, opening);
        self.opening = opening;
        self.commit(now);
        Some(opening)
    }

    /// Reconciles an angle read back from the backend. A poll issued before the last local
    /// commit had time to settle is discarded, the later local write wins.
    pub fn accept_polled(&mut self, angle: f64, requested_at: Instant) -> PollOutcome {
        if self.fault.is_some() {
            return PollOutcome::Faulted;
        }

        if !angle.is_finite() || !PLAUSIBLE_ANGLE.contains(&angle) {
            self.latch_fault(format!("Backend reported implausible angle {}", angle));
            return PollOutcome::Faulted;
        }

        if self.dragging || self.is_moving() {
            return PollOutcome::Busy;
        }

        if let Some(last_commit_at) = self.last_commit_at {
            if requested_at < last_commit_at + self.settle_window {
                return PollOutcome::Stale;
            }
        }

        let polled = OpeningPercentage::from_f64(angle);
        if polled == self.opening {
            return PollOutcome::Unchanged;
        }

        tracing::info!("Backend reports opening {}, replacing local {}", polled, self.opening);
        self.opening = polled;
        self.is_open = polled.is_open();
        self.last_committed = Some(polled);
        self.persist();

        PollOutcome::Applied(polled)
    }

    /// Terminal. Every mutating operation is rejected from here on.
    pub fn latch_fault(&mut self, reason: String) {
        if self.fault.is_none() {
            tracing::error!("Actuator entering error state: {}", reason);
            self.fault = Some(reason);
            self.travel = None;
            self.dragging = false;
        }
    }

    fn ensure_operational(&self) -> Result<(), ControlError> {
        match self.fault {
            Some(_) => Err(ControlError::Faulted),
            None => Ok(()),
        }
    }

    fn ensure_still(&self) -> Result<(), ControlError> {
        if self.is_moving() {
            Err(ControlError::Moving)
        } else {
            Ok(())
        }
    }

    fn move_to(&mut self, destination: OpeningPercentage, now: Instant) {
        self.dragging = false;

        if self.travel_time.is_zero() {
            self.opening = destination;
            self.commit(now);
        } else {
            tracing::info!("Moving to {}, arriving in {:?}", destination, self.travel_time);
            self.travel = Some(Travel {
                destination,
                arrives_at: now + self.travel_time,
            });
        }
    }

    fn commit(&mut self, now: Instant) {
        self.dragging = false;
        self.is_open = self.opening.is_open();
        self.last_commit_at = Some(now);
        self.last_committed = Some(self.opening);

        tracing::info!("Committing opening {} (auto: {})", self.opening, self.is_auto);
        self.persist();
        self.outbox.request(self.opening);
    }

    fn persist(&self) {
        let settings = PersistedSettings {
            opening: self.opening,
            is_open: self.is_open,
            is_auto: self.is_auto,
            target: self.target,
        };

        if let Err(e) = settings.save(self.store.as_ref()) {
            tracing::error!("Error persisting settings: {:?}", e);
        }
    }
}
