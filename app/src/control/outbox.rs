use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::adapter::backend::ActuatorBackend;
use crate::core::resilience::RetryConfig;
use crate::core::unit::OpeningPercentage;

use super::BackendReport;

/// Handle for requesting an angle on the backend. Only the latest request is kept, a newer
/// one replaces anything not yet delivered.
#[derive(Clone)]
pub struct AngleOutbox {
    tx: watch::Sender<Option<OpeningPercentage>>,
}

impl AngleOutbox {
    pub fn new() -> (Self, watch::Receiver<Option<OpeningPercentage>>) {
        let (tx, rx) = watch::channel(None);
        (Self { tx }, rx)
    }

    pub fn request(&self, opening: OpeningPercentage) {
        self.tx.send_replace(Some(opening));
    }
}

enum DeliveryEnd {
    Done,
    Superseded(OpeningPercentage),
    Cancelled,
}

/// Sends requested angles one at a time, so an older angle can never overtake a newer one.
pub struct OutboxWorker<B> {
    backend: Arc<B>,
    rx: watch::Receiver<Option<OpeningPercentage>>,
    retry: RetryConfig,
    reports: mpsc::Sender<BackendReport>,
    cancel: CancellationToken,
}

impl<B: ActuatorBackend> OutboxWorker<B> {
    pub fn new(
        backend: Arc<B>,
        rx: watch::Receiver<Option<OpeningPercentage>>,
        retry: RetryConfig,
        reports: mpsc::Sender<BackendReport>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            backend,
            rx,
            retry,
            reports,
            cancel,
        }
    }

    pub async fn run(mut self) {
        let mut next: Option<OpeningPercentage> = None;

        loop {
            let angle = match next.take() {
                Some(angle) => angle,
                None => {
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        changed = self.rx.changed() => if changed.is_err() { break },
                    }

                    match *self.rx.borrow_and_update() {
                        Some(angle) => angle,
                        None => continue,
                    }
                }
            };

            match self.deliver(angle).await {
                DeliveryEnd::Done => {}
                DeliveryEnd::Superseded(newer) => next = Some(newer),
                DeliveryEnd::Cancelled => break,
            }
        }

        tracing::info!("Angle outbox stopped");
    }

    async fn deliver(&mut self, angle: OpeningPercentage) -> DeliveryEnd {
        let mut backoff = self.retry.backoff();

        loop {
            let result = tokio::select! {
                _ = self.cancel.cancelled() => return DeliveryEnd::Cancelled,
                result = self.backend.set_angle(angle) => result,
            };

            let retry_delay = match result {
                Ok(()) => {
                    tracing::debug!("Delivered opening {}", angle);
                    self.report(BackendReport::Delivered(angle)).await;
                    return DeliveryEnd::Done;
                }
                Err(e) => {
                    let delay = backoff.next_delay();
                    backoff.bump();
                    let gave_up = backoff.is_exhausted();

                    tracing::warn!(
                        "Error sending opening {} (attempt {}{}): {:?}",
                        angle,
                        backoff.attempts(),
                        if gave_up { ", giving up" } else { "" },
                        e
                    );

                    self.report(BackendReport::DeliveryFailed {
                        angle,
                        error: format!("{:#}", e),
                        gave_up,
                    })
                    .await;

                    if gave_up {
                        return DeliveryEnd::Done;
                    }

                    delay
                }
            };

            tokio::select! {
                _ = self.cancel.cancelled() => return DeliveryEnd::Cancelled,
                _ = tokio::time::sleep(retry_delay) => {},
                changed = self.rx.changed() => {
                    if changed.is_err() {
                        return DeliveryEnd::Cancelled;
                    }
                    if let Some(newer) = *self.rx.borrow_and_update() {
                        tracing::debug!("Opening {} superseded by {} while retrying", angle, newer);
                        return DeliveryEnd::Superseded(newer);
                    }
                },
            }
        }
    }

    async fn report(&self, report: BackendReport) {
        if self.reports.send(report).await.is_err() {
            tracing::debug!("Control loop gone, dropping backend report");
        }
    }
}
