mod evidence;
mod source;
pub mod sources;

pub use evidence::{
    BoundingBox, DetectedObject, DetectionEvidence, VehicleFilter, COCO_BUS, COCO_CAR,
    COCO_TRUCK, DEFAULT_VEHICLE_CLASSES,
};
pub use source::DetectionSource;
pub use sources::{JsonLinesSource, ScriptedSource};

#[cfg(feature = "simulated-source")]
pub use sources::SimulatedSource;
