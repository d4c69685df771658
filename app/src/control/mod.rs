mod outbox;
mod timers;

pub use outbox::{AngleOutbox, OutboxWorker};
pub use timers::TimerBoard;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use derive_more::derive::{Display, Error};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::actuator::{ActuatorController, ActuatorSettings, ControlError, ControllerView, PollOutcome};
use crate::adapter::backend::{ActuatorBackend, BackendConfig, ScheduledTimer};
use crate::core::unit::{DegreeCelsius, OpeningPercentage};
use crate::persistence::SettingsStore;
use crate::thermostat::{ThermostatConfig, ThermostatSimulator};

#[derive(Debug)]
pub enum BackendReport {
    Delivered(OpeningPercentage),
    DeliveryFailed {
        angle: OpeningPercentage,
        error: String,
        gave_up: bool,
    },
    Angle {
        angle: f64,
        requested_at: Instant,
    },
    AnglePollFailed(String),
    Timers(Vec<ScheduledTimer>),
    TimerPollFailed(String),
    TimersChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeSource {
    Delivery,
    AnglePoll,
    TimerPoll,
}

/// Transient banner describing the latest backend problem.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notice {
    pub source: NoticeSource,
    pub message: String,
    pub since: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlSnapshot {
    #[serde(flatten)]
    pub actuator: ControllerView,
    pub inside_temperature: DegreeCelsius,
    pub notice: Option<Notice>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActuatorAction {
    Open,
    Close,
    SliderDrag(f64),
    SliderRelease,
    SetTarget(Option<f64>),
    SetAuto(bool),
}

#[derive(Debug, Display, Error)]
pub enum TimerRequestError {
    #[display("{reason}")]
    Rejected { reason: ControlError },

    #[display("Backend request failed: {message}")]
    Backend { message: String },
}

pub enum ControlCommand {
    Actuate {
        action: ActuatorAction,
        respond_to: oneshot::Sender<Result<ControlSnapshot, ControlError>>,
    },
    AddTimer {
        time: DateTime<FixedOffset>,
        opening: OpeningPercentage,
        respond_to: oneshot::Sender<Result<(), TimerRequestError>>,
    },
    RemoveTimer {
        id: String,
        respond_to: oneshot::Sender<Result<(), TimerRequestError>>,
    },
}

/// Owns all control state. Commands, simulation ticks, auto control, commits and poll
/// results are handled one at a time on this task.
pub struct ControlRunner<B> {
    controller: ActuatorController,
    simulator: ThermostatSimulator,
    backend: Arc<B>,
    outbox: Option<OutboxWorker<B>>,

    tick: Duration,
    angle_poll_interval: Duration,
    timer_poll_interval: Duration,

    command_tx: mpsc::Sender<ControlCommand>,
    command_rx: mpsc::Receiver<ControlCommand>,
    report_tx: mpsc::Sender<BackendReport>,
    report_rx: mpsc::Receiver<BackendReport>,
    snapshot_tx: watch::Sender<ControlSnapshot>,
    timers_tx: watch::Sender<TimerBoard>,

    notices: BTreeMap<NoticeSource, Notice>,
    angle_poll_in_flight: bool,
    timer_poll_in_flight: bool,
    timer_refresh_pending: bool,
    cancel: CancellationToken,
}

#[derive(Clone)]
pub struct ControlClient {
    command_tx: mpsc::Sender<ControlCommand>,
    snapshot_rx: watch::Receiver<ControlSnapshot>,
    timers_rx: watch::Receiver<TimerBoard>,
}

impl<B: ActuatorBackend> ControlRunner<B> {
    pub fn new(
        backend: Arc<B>,
        store: Arc<dyn SettingsStore>,
        thermostat: &ThermostatConfig,
        actuator: &ActuatorSettings,
        backend_config: &BackendConfig,
        cancel: CancellationToken,
    ) -> Self {
        let (outbox, outbox_rx) = AngleOutbox::new();
        let (command_tx, command_rx) = mpsc::channel(32);
        let (report_tx, report_rx) = mpsc::channel(64);

        let controller = ActuatorController::new(store, outbox, actuator);
        let simulator = ThermostatSimulator::new(thermostat);

        let outbox = OutboxWorker::new(
            backend.clone(),
            outbox_rx,
            backend_config.retry.clone(),
            report_tx.clone(),
            cancel.child_token(),
        );

        let (snapshot_tx, _) = watch::channel(ControlSnapshot {
            actuator: controller.view(),
            inside_temperature: simulator.inside(),
            notice: None,
        });
        let (timers_tx, _) = watch::channel(TimerBoard::default());

        Self {
            controller,
            simulator,
            backend,
            outbox: Some(outbox),
            tick: thermostat.tick(),
            angle_poll_interval: backend_config.angle_poll_interval(),
            timer_poll_interval: backend_config.timer_poll_interval(),
            command_tx,
            command_rx,
            report_tx,
            report_rx,
            snapshot_tx,
            timers_tx,
            notices: BTreeMap::new(),
            angle_poll_in_flight: false,
            timer_poll_in_flight: false,
            timer_refresh_pending: false,
            cancel,
        }
    }

    pub fn client(&self) -> ControlClient {
        ControlClient {
            command_tx: self.command_tx.clone(),
            snapshot_rx: self.snapshot_tx.subscribe(),
            timers_rx: self.timers_tx.subscribe(),
        }
    }

    pub async fn run(mut self) {
        let outbox_task = self.outbox.take().map(|worker| tokio::spawn(worker.run()));

        let mut sim_tick = new_interval(self.tick);
        let mut angle_poll = new_interval(self.angle_poll_interval);
        let mut timer_poll = new_interval(self.timer_poll_interval);

        tracing::info!(
            "Control loop started (tick {:?}, angle poll {:?}, timer poll {:?})",
            self.tick,
            self.angle_poll_interval,
            self.timer_poll_interval
        );

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,

                Some(command) = self.command_rx.recv() => self.handle_command(command),
                Some(report) = self.report_rx.recv() => self.handle_report(report),

                _ = sim_tick.tick() => self.on_tick(),
                _ = angle_poll.tick() => self.poll_angle(),
                _ = timer_poll.tick() => self.poll_timers(),
            }

            self.publish();
        }

        if let Some(task) = outbox_task {
            if let Err(e) = task.await {
                tracing::error!("Angle outbox task failed: {}", e);
            }
        }

        tracing::info!("Control loop stopped");
    }

    fn on_tick(&mut self) {
        let now = Instant::now();

        self.controller.finish_travel(now);
        let inside = self.simulator.tick(self.controller.opening());
        self.controller.apply_auto(inside, now);
    }

    fn handle_command(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::Actuate { action, respond_to } => {
                let result = self.actuate(action).map(|_| self.snapshot());

                if let Err(e) = &result {
                    tracing::info!("Rejected {:?}: {}", action, e);
                }

                let _ = respond_to.send(result);
            }
            ControlCommand::AddTimer {
                time,
                opening,
                respond_to,
            } => {
                tracing::info!("Scheduling opening {} at {}", opening, time);
                let backend = self.backend.clone();
                self.spawn_timer_update(respond_to, async move { backend.set_timer(time, opening).await });
            }
            ControlCommand::RemoveTimer { id, respond_to } => {
                let id = self.timers_tx.borrow().resolve_id(&id);
                tracing::info!("Removing timer {}", id);
                let backend = self.backend.clone();
                self.spawn_timer_update(respond_to, async move { backend.remove_timer(&id).await });
            }
        }
    }

    fn actuate(&mut self, action: ActuatorAction) -> Result<(), ControlError> {
        let now = Instant::now();

        match action {
            ActuatorAction::Open => self.controller.open(now),
            ActuatorAction::Close => self.controller.close(now),
            ActuatorAction::SliderDrag(value) => self.controller.slider_drag(value).map(|_| ()),
            ActuatorAction::SliderRelease => self.controller.slider_release(now),
            ActuatorAction::SetTarget(target) => {
                self.controller.set_target(target)?;
                self.controller.apply_auto(self.simulator.inside(), now);
                Ok(())
            }
            ActuatorAction::SetAuto(enabled) => {
                self.controller.set_auto(enabled)?;
                self.controller.apply_auto(self.simulator.inside(), now);
                Ok(())
            }
        }
    }

    fn handle_report(&mut self, report: BackendReport) {
        match report {
            BackendReport::Delivered(_) => self.clear_notice(NoticeSource::Delivery),
            BackendReport::DeliveryFailed { angle, error, gave_up } => {
                let message = if gave_up {
                    format!("Could not move window to {}: {}", angle, error)
                } else {
                    format!("Retrying to move window to {}: {}", angle, error)
                };
                self.raise_notice(NoticeSource::Delivery, message);
            }
            BackendReport::Angle { angle, requested_at } => {
                self.angle_poll_in_flight = false;
                self.clear_notice(NoticeSource::AnglePoll);

                match self.controller.accept_polled(angle, requested_at) {
                    PollOutcome::Applied(opening) => tracing::debug!("Applied polled opening {}", opening),
                    PollOutcome::Stale => tracing::trace!("Discarded polled angle {} older than last commit", angle),
                    PollOutcome::Unchanged | PollOutcome::Busy | PollOutcome::Faulted => {}
                }
            }
            BackendReport::AnglePollFailed(error) => {
                self.angle_poll_in_flight = false;
                self.raise_notice(NoticeSource::AnglePoll, format!("Could not read window position: {}", error));
            }
            BackendReport::Timers(timers) => {
                self.finish_timer_poll();
                self.clear_notice(NoticeSource::TimerPoll);

                let now = Utc::now();
                self.timers_tx.send_modify(|board| {
                    if board.replace(timers, now) {
                        tracing::debug!("Timer list changed, {} timers scheduled", board.timers.len());
                    }
                });
            }
            BackendReport::TimerPollFailed(error) => {
                self.finish_timer_poll();
                self.raise_notice(NoticeSource::TimerPoll, format!("Could not load timers: {}", error));
            }
            BackendReport::TimersChanged => self.refresh_timers(),
        }
    }

    fn poll_angle(&mut self) {
        if self.angle_poll_in_flight {
            return;
        }
        self.angle_poll_in_flight = true;

        let backend = self.backend.clone();
        let reports = self.report_tx.clone();
        let requested_at = Instant::now();

        tokio::spawn(async move {
            let report = match backend.get_angle().await {
                Ok(angle) => BackendReport::Angle { angle, requested_at },
                Err(e) => BackendReport::AnglePollFailed(format!("{:#}", e)),
            };
            let _ = reports.send(report).await;
        });
    }

    fn poll_timers(&mut self) {
        if self.timer_poll_in_flight {
            return;
        }
        self.timer_poll_in_flight = true;

        let backend = self.backend.clone();
        let reports = self.report_tx.clone();

        tokio::spawn(async move {
            let report = match backend.get_timers().await {
                Ok(timers) => BackendReport::Timers(timers),
                Err(e) => BackendReport::TimerPollFailed(format!("{:#}", e)),
            };
            let _ = reports.send(report).await;
        });
    }

    /// Polls right away, or as soon as the running poll is done, so the result reflects
    /// a mutation that has just completed.
    fn refresh_timers(&mut self) {
        if self.timer_poll_in_flight {
            self.timer_refresh_pending = true;
        } else {
            self.poll_timers();
        }
    }

    fn finish_timer_poll(&mut self) {
        self.timer_poll_in_flight = false;

        if self.timer_refresh_pending {
            self.timer_refresh_pending = false;
            self.poll_timers();
        }
    }

    fn spawn_timer_update<F>(&self, respond_to: oneshot::Sender<Result<(), TimerRequestError>>, request: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let reports = self.report_tx.clone();

        tokio::spawn(async move {
            let result = request.await.map_err(|e| {
                tracing::warn!("Timer request failed: {:?}", e);
                TimerRequestError::Backend {
                    message: format!("{:#}", e),
                }
            });

            let _ = respond_to.send(result);
            let _ = reports.send(BackendReport::TimersChanged).await;
        });
    }

    fn raise_notice(&mut self, source: NoticeSource, message: String) {
        tracing::warn!("{}", message);

        let since = match self.notices.get(&source) {
            Some(existing) => existing.since,
            None => Utc::now(),
        };

        self.notices.insert(source, Notice { source, message, since });
    }

    fn clear_notice(&mut self, source: NoticeSource) {
        if self.notices.remove(&source).is_some() {
            tracing::info!("Backend recovered ({:?})", source);
        }
    }

    fn snapshot(&self) -> ControlSnapshot {
        ControlSnapshot {
            actuator: self.controller.view(),
            inside_temperature: self.simulator.inside(),
            notice: self.notices.values().max_by_key(|n| n.since).cloned(),
        }
    }

    fn publish(&self) {
        let snapshot = self.snapshot();

        self.snapshot_tx.send_if_modified(|current| {
            if *current != snapshot {
                *current = snapshot;
                true
            } else {
                false
            }
        });
    }
}

fn new_interval(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

impl ControlClient {
    pub fn snapshot(&self) -> ControlSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ControlSnapshot> {
        self.snapshot_rx.clone()
    }

    pub fn timers(&self) -> TimerBoard {
        self.timers_rx.borrow().clone()
    }

    pub async fn open(&self) -> Result<ControlSnapshot, ControlError> {
        self.actuate(ActuatorAction::Open).await
    }

    pub async fn close(&self) -> Result<ControlSnapshot, ControlError> {
        self.actuate(ActuatorAction::Close).await
    }

    pub async fn slider_drag(&self, value: f64) -> Result<ControlSnapshot, ControlError> {
        self.actuate(ActuatorAction::SliderDrag(value)).await
    }

    pub async fn slider_release(&self) -> Result<ControlSnapshot, ControlError> {
        self.actuate(ActuatorAction::SliderRelease).await
    }

    pub async fn set_target(&self, target: Option<f64>) -> Result<ControlSnapshot, ControlError> {
        self.actuate(ActuatorAction::SetTarget(target)).await
    }

    pub async fn set_auto(&self, enabled: bool) -> Result<ControlSnapshot, ControlError> {
        self.actuate(ActuatorAction::SetAuto(enabled)).await
    }

    pub async fn add_timer(&self, time: DateTime<FixedOffset>, opening: i64) -> Result<(), TimerRequestError> {
        let opening = u8::try_from(opening)
            .ok()
            .filter(|o| *o <= 100)
            .map(OpeningPercentage::new)
            .ok_or(TimerRequestError::Rejected {
                reason: ControlError::OpeningOutOfRange,
            })?;

        let (respond_to, response) = oneshot::channel();
        self.send(ControlCommand::AddTimer {
            time,
            opening,
            respond_to,
        })
        .await
        .map_err(|reason| TimerRequestError::Rejected { reason })?;

        response.await.unwrap_or(Err(TimerRequestError::Rejected {
            reason: ControlError::Stopped,
        }))
    }

    pub async fn remove_timer(&self, id: &str) -> Result<(), TimerRequestError> {
        let (respond_to, response) = oneshot::channel();
        self.send(ControlCommand::RemoveTimer {
            id: id.to_owned(),
            respond_to,
        })
        .await
        .map_err(|reason| TimerRequestError::Rejected { reason })?;

        response.await.unwrap_or(Err(TimerRequestError::Rejected {
            reason: ControlError::Stopped,
        }))
    }

    async fn actuate(&self, action: ActuatorAction) -> Result<ControlSnapshot, ControlError> {
        let (respond_to, response) = oneshot::channel();
        self.send(ControlCommand::Actuate { action, respond_to }).await?;

        response.await.map_err(|_| ControlError::Stopped)?
    }

    async fn send(&self, command: ControlCommand) -> Result<(), ControlError> {
        self.command_tx.send(command).await.map_err(|_| ControlError::Stopped)
    }
}
