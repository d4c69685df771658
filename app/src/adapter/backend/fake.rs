use std::sync::Mutex;

use chrono::{DateTime, FixedOffset};

use crate::core::unit::OpeningPercentage;

use super::{ActuatorBackend, ScheduledTimer, TimerId};

#[derive(Debug, Default)]
struct FakeState {
    angle: f64,
    sent_angles: Vec<u8>,
    timers: Vec<ScheduledTimer>,
    next_timer_id: i64,
    failing_set_angle_calls: u32,
    offline: bool,
}

/// In-process stand-in for the actuator service. Records every call and can be told to fail.
#[derive(Debug, Default)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
}

impl FakeBackend {
    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn sent_angles(&self) -> Vec<u8> {
        self.state().sent_angles.clone()
    }

    pub fn set_reported_angle(&self, angle: f64) {
        self.state().angle = angle;
    }

    pub fn fail_next_set_angle_calls(&self, count: u32) {
        self.state().failing_set_angle_calls = count;
    }

    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    pub fn timers(&self) -> Vec<ScheduledTimer> {
        self.state().timers.clone()
    }
}

impl ActuatorBackend for FakeBackend {
    async fn set_angle(&self, angle: OpeningPercentage) -> anyhow::Result<()> {
        let mut state = self.state();

        if state.offline {
            anyhow::bail!("backend offline");
        }

        if state.failing_set_angle_calls > 0 {
            state.failing_set_angle_calls -= 1;
            anyhow::bail!("servo busy");
        }

        state.sent_angles.push(angle.value());
        state.angle = angle.value() as f64;
        Ok(())
    }

    async fn get_angle(&self) -> anyhow::Result<f64> {
        let state = self.state();

        if state.offline {
            anyhow::bail!("backend offline");
        }

        Ok(state.angle)
    }

    async fn set_timer(&self, time: DateTime<FixedOffset>, angle: OpeningPercentage) -> anyhow::Result<()> {
        let mut state = self.state();

        if state.offline {
            anyhow::bail!("backend offline");
        }

        state.next_timer_id += 1;
        let id = TimerId::Number(state.next_timer_id);
        state.timers.push(ScheduledTimer {
            id,
            time: time.to_rfc3339(),
            display_angle: angle.value() as f64,
        });
        Ok(())
    }

    async fn get_timers(&self) -> anyhow::Result<Vec<ScheduledTimer>> {
        let state = self.state();

        if state.offline {
            anyhow::bail!("backend offline");
        }

        Ok(state.timers.clone())
    }

    async fn remove_timer(&self, id: &TimerId) -> anyhow::Result<()> {
        let mut state = self.state();

        if state.offline {
            anyhow::bail!("backend offline");
        }

        let before = state.timers.len();
        state.timers.retain(|t| &t.id != id);
        if state.timers.len() == before {
            anyhow::bail!("Timer {} not found", id);
        }
        Ok(())
    }
}
