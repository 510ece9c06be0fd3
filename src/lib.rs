//! parkwatch - parking occupancy reporter
//!
//! This crate turns periodic object-detection observations of a parking area into
//! occupancy reports delivered to a remote tracking service.
//!
//! # Architecture
//!
//! One pipeline runs per camera/lot pairing:
//!
//! 1. A `DetectionSource` yields per-frame evidence (object boxes or a vehicle count).
//! 2. The `CycleScheduler` decides which frames start a reporting cycle.
//! 3. The `OccupancyEngine` turns evidence into one record per spot, or one lot aggregate.
//! 4. The records of a cycle form a single `ReportBatch`.
//! 5. A `ReportClient` delivers the batch in one request and classifies the outcome.
//! 6. The `RetryPolicy` marks the batch delivered or deferred. Deferred batches are dropped;
//!    the next cycle re-sends full state.
//!
//! Pipelines share no mutable state; each owns its client and cadence.
//!
//! # Module Structure
//!
//! - `detect`: evidence types and detection sources
//! - `zones`: spot geometry and zone configuration loading
//! - `decision`, `schedule`, `report`, `policy`: the per-cycle logic
//! - `transport`: wire format and HTTP delivery
//! - `pipeline`: the run loop tying them together
//! - Core types: OccupancyRecord, identifier discipline, StopSignal

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod config;
pub mod decision;
pub mod detect;
pub mod error;
pub mod pipeline;
pub mod policy;
pub mod report;
pub mod schedule;
pub mod transport;
pub mod zones;

pub use decision::{DecisionMode, OccupancyEngine, ZoneMatch};
pub use detect::{BoundingBox, DetectedObject, DetectionEvidence, DetectionSource};
pub use error::PipelineError;
pub use pipeline::{Pipeline, PipelineStats};
pub use policy::{BatchState, CycleSummary, RetryPolicy};
pub use report::ReportBatch;
pub use schedule::{CycleGate, CycleScheduler};
pub use transport::{DeliveryOutcome, HttpReportClient, RemoteError, ReportClient};
pub use zones::{LotZones, Point, Polygon, SpotZone};

// -------------------- Identifier Discipline --------------------

/// Lot, spot and camera identifiers are short opaque tokens.
///
/// Allowed: "1", "BK1", "A2", "yolo_camera_001", "lot:north-3"
/// Disallowed: empty strings, whitespace, slashes, anything over 64 chars.
pub fn validate_identifier(kind: &str, value: &str) -> Result<()> {
    static ID_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = ID_RE.get_or_init(|| {
        regex::Regex::new(r"^[A-Za-z0-9_.:-]{1,64}$").expect("identifier pattern compiles")
    });

    if !re.is_match(value) {
        return Err(anyhow!(
            "{} '{}' must match ^[A-Za-z0-9_.:-]{{1,64}}$",
            kind,
            value
        ));
    }
    Ok(())
}

// -------------------- Occupancy Records --------------------

/// One occupancy decision for one spot, or for a whole lot when `spot_id` is `None`.
///
/// Records are produced fresh every cycle and never mutated afterwards.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct OccupancyRecord {
    pub lot_id: String,
    /// `None` marks a lot-level aggregate standing in for every spot of the lot.
    pub spot_id: Option<String>,
    pub occupied: bool,
    pub camera_id: String,
    /// Capture instant of the evidence, seconds since epoch.
    pub captured_at_epoch_s: u64,
}

impl OccupancyRecord {
    pub fn is_lot_level(&self) -> bool {
        self.spot_id.is_none()
    }
}

/// Seconds since epoch for a capture instant.
pub fn epoch_seconds(at: SystemTime) -> Result<u64> {
    Ok(at.duration_since(UNIX_EPOCH)?.as_secs())
}

// -------------------- Stop Signal --------------------

/// Cooperative stop flag shared between a pipeline and whoever may stop it.
///
/// Pipelines check the flag before pulling a frame and before starting a cycle; a
/// delivery already in flight always completes.
#[derive(Clone, Debug, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn identifiers_accept_plain_tokens() {
        for id in ["1", "BK1", "A2", "yolo_camera_001", "lot:north-3", "cam.7"] {
            assert!(validate_identifier("lot_id", id).is_ok(), "{}", id);
        }
    }

    #[test]
    fn identifiers_reject_whitespace_and_paths() {
        for id in ["", "front door", "lots/1", &"x".repeat(65)] {
            assert!(validate_identifier("camera_id", id).is_err(), "{}", id);
        }
    }

    #[test]
    fn lot_level_record_has_no_spot() {
        let record = OccupancyRecord {
            lot_id: "1".to_string(),
            spot_id: None,
            occupied: true,
            camera_id: "cam".to_string(),
            captured_at_epoch_s: 0,
        };
        assert!(record.is_lot_level());
    }

    #[test]
    fn epoch_seconds_truncates() {
        let at = UNIX_EPOCH + Duration::from_millis(1_999);
        assert_eq!(epoch_seconds(at).unwrap(), 1);
    }

    #[test]
    fn stop_signal_is_shared_between_clones() {
        let stop = StopSignal::new();
        let observer = stop.clone();
        assert!(!observer.is_triggered());
        stop.trigger();
        assert!(observer.is_triggered());
    }
}
