//! Occupancy decision engine.
//!
//! Turns one frame's detection evidence into occupancy records:
//! - spot-level: one record per configured zone, in zone file order
//! - lot-level: one aggregate record (`spot_id = None`) for the whole lot
//!
//! Decisions are pure functions of (zones, evidence, thresholds). There is no hidden state
//! and no randomness, so identical inputs always produce identical records.

use crate::detect::{DetectedObject, DetectionEvidence, VehicleFilter};
use crate::error::PipelineError;
use crate::zones::{LotZones, SpotZone};
use crate::OccupancyRecord;

const THRESHOLD_EPSILON: f64 = 1e-9;

/// How a detection is matched against a zone.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ZoneMatch {
    /// The box centre lies inside the zone (edges inclusive).
    Center,
    /// At least `min_fraction` of the box area lies inside the zone.
    Overlap { min_fraction: f64 },
}

impl ZoneMatch {
    pub fn matches(&self, zone: &SpotZone, object: &DetectedObject) -> bool {
        let Some(region) = object.region else {
            return false;
        };
        match *self {
            ZoneMatch::Center => zone.boundary.contains(region.center()),
            ZoneMatch::Overlap { min_fraction } => {
                zone.boundary.overlap_fraction(&region) + THRESHOLD_EPSILON >= min_fraction
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum DecisionMode {
    /// Per-spot decisions against configured zones.
    Spot {
        zones: Vec<SpotZone>,
        matching: ZoneMatch,
    },
    /// Single aggregate decision from a vehicle count.
    Lot { capacity: u32, fraction: f64 },
}

impl DecisionMode {
    pub fn spot_level(zones: LotZones, matching: ZoneMatch) -> Self {
        Self::Spot {
            zones: zones.spots,
            matching,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Spot { .. } => "spot",
            Self::Lot { .. } => "lot",
        }
    }
}

/// Decision engine for one lot seen by one camera.
#[derive(Clone, Debug)]
pub struct OccupancyEngine {
    lot_id: String,
    camera_id: String,
    mode: DecisionMode,
    filter: VehicleFilter,
}

impl OccupancyEngine {
    /// Build an engine, rejecting configurations that could never produce records.
    pub fn new(
        lot_id: &str,
        camera_id: &str,
        mode: DecisionMode,
        filter: VehicleFilter,
    ) -> Result<Self, PipelineError> {
        match &mode {
            DecisionMode::Spot { zones, matching } => {
                if zones.is_empty() {
                    return Err(PipelineError::configuration(
                        lot_id,
                        "spot-level mode needs at least one zone",
                    ));
                }
                if let ZoneMatch::Overlap { min_fraction } = matching {
                    if !(*min_fraction > 0.0 && *min_fraction <= 1.0) {
                        return Err(PipelineError::configuration(
                            lot_id,
                            format!("overlap threshold {} outside (0, 1]", min_fraction),
                        ));
                    }
                }
            }
            DecisionMode::Lot { capacity, fraction } => {
                if *capacity == 0 {
                    return Err(PipelineError::configuration(
                        lot_id,
                        "lot-level mode needs a capacity > 0",
                    ));
                }
                if !(*fraction > 0.0 && *fraction <= 1.0) {
                    return Err(PipelineError::configuration(
                        lot_id,
                        format!("occupancy fraction {} outside (0, 1]", fraction),
                    ));
                }
            }
        }
        Ok(Self {
            lot_id: lot_id.to_string(),
            camera_id: camera_id.to_string(),
            mode,
            filter,
        })
    }

    pub fn lot_id(&self) -> &str {
        &self.lot_id
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    pub fn mode(&self) -> &DecisionMode {
        &self.mode
    }

    /// Records expected from every cycle.
    pub fn records_per_cycle(&self) -> usize {
        match &self.mode {
            DecisionMode::Spot { zones, .. } => zones.len(),
            DecisionMode::Lot { .. } => 1,
        }
    }

    /// Decide occupancy for one frame of evidence captured at `captured_at_epoch_s`.
    ///
    /// Spot-level mode requires object evidence; a bare count cannot be placed in zones
    /// and is reported as a configuration error for the lot.
    pub fn decide(
        &self,
        evidence: &DetectionEvidence,
        captured_at_epoch_s: u64,
    ) -> Result<Vec<OccupancyRecord>, PipelineError> {
        match (&self.mode, evidence) {
            (DecisionMode::Spot { zones, matching }, DetectionEvidence::Objects(objects)) => {
                let vehicles: Vec<&DetectedObject> = objects
                    .iter()
                    .filter(|object| self.filter.admits(object))
                    .collect();
                Ok(zones
                    .iter()
                    .map(|zone| {
                        let occupied = vehicles.iter().any(|object| matching.matches(zone, object));
                        self.record(Some(zone.spot_id.clone()), occupied, captured_at_epoch_s)
                    })
                    .collect())
            }
            (DecisionMode::Spot { .. }, DetectionEvidence::VehicleCount(_)) => {
                Err(PipelineError::configuration(
                    &self.lot_id,
                    "spot-level mode received a vehicle count; the source must report object regions",
                ))
            }
            (DecisionMode::Lot { capacity, fraction }, evidence) => {
                let count = match evidence {
                    DetectionEvidence::VehicleCount(count) => *count,
                    DetectionEvidence::Objects(objects) => self.filter.count(objects),
                };
                let occupied = lot_occupied(count, *capacity, *fraction);
                Ok(vec![self.record(None, occupied, captured_at_epoch_s)])
            }
        }
    }

    fn record(&self, spot_id: Option<String>, occupied: bool, at: u64) -> OccupancyRecord {
        OccupancyRecord {
            lot_id: self.lot_id.clone(),
            spot_id,
            occupied,
            camera_id: self.camera_id.clone(),
            captured_at_epoch_s: at,
        }
    }
}

/// Smallest vehicle count that marks a lot occupied.
pub fn occupancy_threshold(capacity: u32, fraction: f64) -> u32 {
    (capacity as f64 * fraction - THRESHOLD_EPSILON).ceil().max(0.0) as u32
}

/// Lot-level aggregate: occupied once the count reaches `fraction` of `capacity`.
///
/// This is a coarse proxy. It says nothing about which spots are taken, only whether the
/// count crossed a threshold of uncertain calibration.
pub fn lot_occupied(vehicle_count: u32, capacity: u32, fraction: f64) -> bool {
    vehicle_count >= occupancy_threshold(capacity, fraction)
}
