//! Error taxonomy for the detection-to-report pipeline.

use thiserror::Error;

/// Errors raised while turning detections into delivered reports.
///
/// Only `Configuration` halts a pipeline. The remaining variants are absorbed by the
/// retry policy and surface in the cycle summary.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum PipelineError {
    /// Bad or missing zone data, or a deployment mismatch for the lot.
    #[error("configuration error for lot {lot_id}: {reason}")]
    Configuration {
        /// Lot whose pipeline is affected.
        lot_id: String,
        /// What was wrong.
        reason: String,
    },

    /// Network failure, timeout or non-2xx status.
    #[error("transport error: {0}")]
    Transport(String),

    /// Per-record rejection inside an otherwise well-formed response.
    #[error("remote rejected report for spot {}: {message}", spot_label(.spot_id))]
    RemoteValidation {
        /// Spot the rejected record referred to, `None` for lot-level records.
        spot_id: Option<String>,
        /// Message returned by the service.
        message: String,
    },

    /// Response body could not be parsed.
    #[error("malformed response body: {0}")]
    Serialization(String),
}

impl PipelineError {
    pub fn configuration(lot_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            lot_id: lot_id.into(),
            reason: reason.into(),
        }
    }

    /// True for failures of the transmission itself. A malformed body counts as one.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Serialization(_))
    }

    /// True for errors that must stop the affected lot's pipeline.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }
}

fn spot_label(spot_id: &Option<String>) -> &str {
    spot_id.as_deref().unwrap_or("<lot>")
}
