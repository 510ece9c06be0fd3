//! Response parsing and outcome classification.
//!
//! The service answers `{"success": bool, "updated_spots": int, "errors": [...]}`. Error
//! entries arrive either as `{"spot_id": .., "error": ..}` or wrapped as
//! `{"report": {"spot_id": .., ...}, "error": ..}`; spot ids may be strings or integers.

use serde::Deserialize;
use serde_json::Value;

use crate::error::PipelineError;

#[derive(Debug, Deserialize)]
pub struct RemoteResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub updated_spots: u32,
    #[serde(default)]
    errors: Vec<RemoteErrorEntry>,
}

impl RemoteResponse {
    pub fn errors(&self) -> Vec<RemoteError> {
        self.errors.iter().map(RemoteErrorEntry::to_remote_error).collect()
    }
}

#[derive(Debug, Deserialize)]
struct RemoteErrorEntry {
    #[serde(default)]
    spot_id: Option<Value>,
    #[serde(default)]
    report: Option<ReportEcho>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReportEcho {
    #[serde(default)]
    spot_id: Option<Value>,
}

impl RemoteErrorEntry {
    fn to_remote_error(&self) -> RemoteError {
        let spot = self
            .spot_id
            .as_ref()
            .or_else(|| self.report.as_ref().and_then(|r| r.spot_id.as_ref()));
        let spot_id = match spot {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };
        let error = self
            .error
            .clone()
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| "unknown error".to_string());
        RemoteError { spot_id, error }
    }
}

/// One record the service refused.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteError {
    pub spot_id: Option<String>,
    pub error: String,
}

impl From<RemoteError> for PipelineError {
    fn from(err: RemoteError) -> Self {
        PipelineError::RemoteValidation {
            spot_id: err.spot_id,
            message: err.error,
        }
    }
}

/// Result of one delivery attempt.
#[derive(Clone, Debug, PartialEq)]
pub enum DeliveryOutcome {
    /// Every record was accepted.
    Success { updated: u32 },
    /// The service accepted some records and refused others.
    PartialSuccess {
        updated: u32,
        errors: Vec<RemoteError>,
    },
    /// Nothing was accepted: transport failure, unreadable body or overall refusal.
    Failure(PipelineError),
}

impl DeliveryOutcome {
    pub fn updated(&self) -> u32 {
        match self {
            Self::Success { updated } | Self::PartialSuccess { updated, .. } => *updated,
            Self::Failure(_) => 0,
        }
    }

    pub fn errors(&self) -> &[RemoteError] {
        match self {
            Self::PartialSuccess { errors, .. } => errors,
            _ => &[],
        }
    }

    pub fn failure(&self) -> Option<&PipelineError> {
        match self {
            Self::Failure(err) => Some(err),
            _ => None,
        }
    }
}

pub fn parse_response(body: &[u8]) -> Result<RemoteResponse, PipelineError> {
    serde_json::from_slice(body).map_err(|e| PipelineError::Serialization(e.to_string()))
}

/// Classify a 2xx response body.
pub fn classify_response(body: &[u8]) -> DeliveryOutcome {
    let response = match parse_response(body) {
        Ok(response) => response,
        Err(err) => return DeliveryOutcome::Failure(err),
    };

    let errors = response.errors();
    if !errors.is_empty() {
        // The service flips `success` off whenever any record failed.
        return DeliveryOutcome::PartialSuccess {
            updated: response.updated_spots,
            errors,
        };
    }
    if response.success {
        return DeliveryOutcome::Success {
            updated: response.updated_spots,
        };
    }
    DeliveryOutcome::Failure(PipelineError::RemoteValidation {
        spot_id: None,
        message: response
            .message
            .unwrap_or_else(|| "service reported failure".to_string()),
    })
}
