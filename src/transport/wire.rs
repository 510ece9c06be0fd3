//! Request body for the camera report endpoint.
//!
//! `{"reports": [{"lot_id": "1", "spot_id": "A2", "occupied": true, "camera_id": "cam_1"}, ...]}`
//!
//! Lot-level records carry `"spot_id": null`. Capture timestamps stay in-process.

use serde::Serialize;

use crate::error::PipelineError;
use crate::report::ReportBatch;

#[derive(Debug, Serialize, PartialEq)]
pub struct CameraReportRequest<'a> {
    pub reports: Vec<WireReport<'a>>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct WireReport<'a> {
    pub lot_id: &'a str,
    pub spot_id: Option<&'a str>,
    pub occupied: bool,
    pub camera_id: &'a str,
}

impl<'a> From<&'a ReportBatch> for CameraReportRequest<'a> {
    fn from(batch: &'a ReportBatch) -> Self {
        Self {
            reports: batch
                .records()
                .iter()
                .map(|record| WireReport {
                    lot_id: &record.lot_id,
                    spot_id: record.spot_id.as_deref(),
                    occupied: record.occupied,
                    camera_id: &record.camera_id,
                })
                .collect(),
        }
    }
}

/// Serialize a whole batch into one request body.
pub fn encode_batch(batch: &ReportBatch) -> Result<Vec<u8>, PipelineError> {
    serde_json::to_vec(&CameraReportRequest::from(batch))
        .map_err(|e| PipelineError::Serialization(format!("encode batch: {}", e)))
}
