//! Simulated detection source.
//!
//! Stand-in for a live camera and model: spot layouts get a vehicle parked at each zone
//! with a fixed probability, count layouts get a uniformly drawn vehicle count. Seeded, so
//! a given seed always yields the same frame sequence.

use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};

use crate::detect::evidence::{BoundingBox, DetectedObject, DetectionEvidence};
use crate::detect::source::DetectionSource;
use crate::zones::{Point, SpotZone};

/// Probability that a simulated spot holds a vehicle in a given frame.
pub const PARKED_PROBABILITY: f64 = 0.3;

const SIMULATED_BOX_SIDE: f64 = 1e-3;

#[derive(Clone, Debug)]
pub enum SimulatedLayout {
    /// One candidate parking position per zone.
    Spots(Vec<Point>),
    /// Counts drawn from `0..=capacity`.
    Count { capacity: u32 },
}

impl SimulatedLayout {
    pub fn from_zones(zones: &[SpotZone]) -> Self {
        Self::Spots(
            zones
                .iter()
                .map(|zone| zone.boundary.bounds_center())
                .collect(),
        )
    }
}

pub struct SimulatedSource {
    layout: SimulatedLayout,
    rng: StdRng,
    frame_interval: Duration,
    last_frame_at: Option<Instant>,
    frame_count: u64,
    frame_limit: Option<u64>,
}

impl SimulatedSource {
    pub fn new(layout: SimulatedLayout, seed: u64, target_fps: u32) -> Result<Self> {
        if target_fps == 0 {
            return Err(anyhow!("simulated source fps must be > 0"));
        }
        Ok(Self {
            layout,
            rng: StdRng::seed_from_u64(seed),
            frame_interval: Duration::from_secs_f64(1.0 / target_fps as f64),
            last_frame_at: None,
            frame_count: 0,
            frame_limit: None,
        })
    }

    /// End the source after `limit` frames instead of running forever.
    pub fn with_frame_limit(mut self, limit: u64) -> Self {
        self.frame_limit = Some(limit);
        self
    }

    /// Produce frames as fast as they are requested.
    pub fn unpaced(mut self) -> Self {
        self.frame_interval = Duration::ZERO;
        self
    }

    pub fn frames_generated(&self) -> u64 {
        self.frame_count
    }

    fn pace(&mut self) {
        if let Some(last) = self.last_frame_at {
            let elapsed = last.elapsed();
            if elapsed < self.frame_interval {
                std::thread::sleep(self.frame_interval - elapsed);
            }
        }
        self.last_frame_at = Some(Instant::now());
    }

    fn sample(&mut self) -> DetectionEvidence {
        match &self.layout {
            SimulatedLayout::Spots(centers) => {
                let objects = centers
                    .iter()
                    .filter(|_| self.rng.gen_bool(PARKED_PROBABILITY))
                    .map(|center| {
                        DetectedObject::vehicle(BoundingBox::new(
                            center.x - SIMULATED_BOX_SIDE / 2.0,
                            center.y - SIMULATED_BOX_SIDE / 2.0,
                            SIMULATED_BOX_SIDE,
                            SIMULATED_BOX_SIDE,
                        ))
                    })
                    .collect();
                DetectionEvidence::Objects(objects)
            }
            SimulatedLayout::Count { capacity } => {
                DetectionEvidence::VehicleCount(self.rng.gen_range(0..=*capacity))
            }
        }
    }
}

impl DetectionSource for SimulatedSource {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn next_evidence(&mut self) -> Result<Option<DetectionEvidence>> {
        if self.frame_limit.is_some_and(|limit| self.frame_count >= limit) {
            return Ok(None);
        }
        self.pace();
        self.frame_count += 1;
        Ok(Some(self.sample()))
    }
}
