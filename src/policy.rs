//! Retry/failure policy and the per-cycle outcome summary.
//!
//! Each batch moves `Pending -> {Delivered, Deferred}` exactly once. A deferred batch is
//! dropped, not queued: the next cycle re-sends full current state, which supersedes it.

use std::fmt;

use crate::error::PipelineError;
use crate::report::ReportBatch;
use crate::transport::{DeliveryOutcome, RemoteError};

/// Remote errors logged individually per cycle; the rest are summarised as a count.
const LOGGED_REMOTE_ERRORS: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchState {
    Pending,
    Delivered,
    Deferred,
}

impl BatchState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Delivered => "delivered",
            Self::Deferred => "deferred",
        }
    }
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drop-on-failure policy with exactly one attempt per batch.
#[derive(Clone, Copy, Debug, Default)]
pub struct RetryPolicy;

impl RetryPolicy {
    pub fn new() -> Self {
        Self
    }

    /// Terminal state for a batch after its single delivery attempt.
    pub fn assess(&self, outcome: &DeliveryOutcome) -> BatchState {
        match outcome {
            DeliveryOutcome::Success { .. } => BatchState::Delivered,
            DeliveryOutcome::PartialSuccess { updated, .. } if *updated > 0 => {
                BatchState::Delivered
            }
            DeliveryOutcome::PartialSuccess { .. } | DeliveryOutcome::Failure(_) => {
                BatchState::Deferred
            }
        }
    }

    /// Assess the outcome and build the operator-facing summary for the cycle.
    pub fn conclude(&self, batch: &ReportBatch, outcome: DeliveryOutcome) -> CycleSummary {
        let state = self.assess(&outcome);
        let records_updated = outcome.updated();
        let (errors, failure) = match outcome {
            DeliveryOutcome::Success { .. } => (Vec::new(), None),
            DeliveryOutcome::PartialSuccess { errors, .. } => (errors, None),
            DeliveryOutcome::Failure(err) => (Vec::new(), Some(err)),
        };
        CycleSummary {
            cycle: batch.cycle(),
            lot_id: batch.lot_id().to_string(),
            camera_id: batch.camera_id().to_string(),
            records_sent: batch.len(),
            records_updated,
            occupied: batch.occupied_count(),
            errors,
            failure,
            state,
        }
    }
}

/// What happened in one cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct CycleSummary {
    pub cycle: u64,
    pub lot_id: String,
    pub camera_id: String,
    pub records_sent: usize,
    pub records_updated: u32,
    pub occupied: usize,
    /// Per-record rejections reported by the service.
    pub errors: Vec<RemoteError>,
    /// Set when nothing was accepted.
    pub failure: Option<PipelineError>,
    pub state: BatchState,
}

impl CycleSummary {
    pub fn error_count(&self) -> usize {
        self.errors.len() + usize::from(self.failure.is_some())
    }

    pub fn is_delivered(&self) -> bool {
        self.state == BatchState::Delivered
    }

    /// Emit the one-line summary plus any failure detail.
    pub fn log(&self) {
        if let Some(failure) = &self.failure {
            if failure.is_transport() {
                log::warn!(
                    "camera {}: delivery failed, next cycle will refresh: {}",
                    self.camera_id,
                    failure
                );
            } else {
                log::warn!("camera {}: {}", self.camera_id, failure);
            }
        }
        for err in self.errors.iter().take(LOGGED_REMOTE_ERRORS) {
            log::warn!(
                "camera {}: {}",
                self.camera_id,
                PipelineError::from(err.clone())
            );
        }
        if self.errors.len() > LOGGED_REMOTE_ERRORS {
            log::warn!(
                "camera {}: ... and {} more rejected records",
                self.camera_id,
                self.errors.len() - LOGGED_REMOTE_ERRORS
            );
        }
        log::info!("{}", self);
    }
}

impl fmt::Display for CycleSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cycle={} lot={} camera={} sent={} updated={} errors={} occupied={}/{} state={}",
            self.cycle,
            self.lot_id,
            self.camera_id,
            self.records_sent,
            self.records_updated,
            self.error_count(),
            self.occupied,
            self.records_sent,
            self.state
        )
    }
}
