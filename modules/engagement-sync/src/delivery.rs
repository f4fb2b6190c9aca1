//! DeliveryWorker: one-at-a-time, paced, best-effort delivery.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{error, info};

use crate::builder::OutboundEvent;
use crate::traits::EventSink;

/// Minimum interval between the starts of two successive delivery calls.
/// A self-imposed throttle for the sink's undocumented rate limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingPolicy {
    min_interval: Duration,
}

impl PacingPolicy {
    pub const fn fixed(min_interval: Duration) -> Self {
        Self { min_interval }
    }

    /// No delay at all. For tests.
    pub const fn none() -> Self {
        Self::fixed(Duration::ZERO)
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    async fn wait(&self, last_call: Option<Instant>) {
        if let Some(last) = last_call {
            if !self.min_interval.is_zero() {
                tokio::time::sleep_until(last + self.min_interval).await;
            }
        }
    }
}

impl Default for PacingPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryFailure {
    pub index: usize,
    pub email: String,
    pub status: Option<u16>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    /// Nothing to send.
    Empty,
    Complete,
    Partial,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub attempted: usize,
    pub sent: usize,
    pub failures: Vec<DeliveryFailure>,
}

impl DeliveryReport {
    pub fn outcome(&self) -> DeliveryOutcome {
        if self.attempted == 0 {
            DeliveryOutcome::Empty
        } else if self.failures.is_empty() {
            DeliveryOutcome::Complete
        } else if self.sent == 0 {
            DeliveryOutcome::Failed
        } else {
            DeliveryOutcome::Partial
        }
    }

    /// Fold another run's report into this one.
    pub fn absorb(&mut self, other: DeliveryReport) {
        let offset = self.attempted;
        self.attempted += other.attempted;
        self.sent += other.sent;
        self.failures
            .extend(other.failures.into_iter().map(|f| DeliveryFailure {
                index: f.index + offset,
                ..f
            }));
    }
}

pub struct DeliveryWorker {
    sink: Arc<dyn EventSink>,
    pacing: PacingPolicy,
    /// Start of the most recent call, across batches. Held for the whole
    /// batch, so concurrent batches are sent one after another.
    last_call: Mutex<Option<Instant>>,
}

impl DeliveryWorker {
    pub fn new(sink: Arc<dyn EventSink>, pacing: PacingPolicy) -> Self {
        Self {
            sink,
            pacing,
            last_call: Mutex::new(None),
        }
    }

    /// Send each event individually, in order. A failed event is logged and
    /// recorded; it is not retried and does not stop the batch.
    pub async fn deliver(&self, events: &[OutboundEvent]) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        let mut last_call = self.last_call.lock().await;

        for (index, event) in events.iter().enumerate() {
            self.pacing.wait(*last_call).await;
            *last_call = Some(Instant::now());

            let payload = serde_json::to_string(event).unwrap_or_default();
            info!(index, email = event.email(), %payload, "Sending event to Regal");

            report.attempted += 1;
            match self.sink.send(event).await {
                Ok(body) => {
                    report.sent += 1;
                    info!(index, email = event.email(), response = %body, "Event delivered");
                }
                Err(e) => {
                    error!(
                        index,
                        email = event.email(),
                        status = ?e.status(),
                        error = %e,
                        %payload,
                        "Failed to send event to Regal"
                    );
                    report.failures.push(DeliveryFailure {
                        index,
                        email: event.email().to_string(),
                        status: e.status(),
                        message: e.to_string(),
                    });
                }
            }
        }

        info!(
            attempted = report.attempted,
            sent = report.sent,
            failed = report.failures.len(),
            "Delivery finished"
        );
        report
    }
}
