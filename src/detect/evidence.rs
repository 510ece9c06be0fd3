use serde::{Deserialize, Serialize};

use crate::zones::Point;

/// COCO class ids counted as vehicles by default.
pub const COCO_CAR: u32 = 2;
pub const COCO_BUS: u32 = 5;
pub const COCO_TRUCK: u32 = 7;
pub const DEFAULT_VEHICLE_CLASSES: &[u32] = &[COCO_CAR, COCO_BUS, COCO_TRUCK];

/// Evidence captured for one frame.
///
/// Which variant a source produces is a deployment choice; it is never negotiated at runtime.
/// On the wire: `{"objects": [...]}` or `{"vehicle_count": 45}`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum DetectionEvidence {
    /// Detected object instances for the frame.
    Objects(Vec<DetectedObject>),
    /// Raw vehicle count when no spatial resolution is available.
    VehicleCount(u32),
}

impl DetectionEvidence {
    /// Evidence with no detections at all.
    pub fn empty() -> Self {
        Self::Objects(Vec::new())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DetectedObject {
    pub class_id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default = "full_confidence")]
    pub confidence: f32,
    /// Box in the same coordinate space as the zone polygons.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<BoundingBox>,
}

impl DetectedObject {
    pub fn vehicle(region: BoundingBox) -> Self {
        Self {
            class_id: COCO_CAR,
            label: None,
            confidence: 1.0,
            region: Some(region),
        }
    }
}

fn full_confidence() -> f32 {
    1.0
}

/// Axis-aligned box; `(x, y)` is the top-left corner.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl BoundingBox {
    pub fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Self { x, y, w, h }
    }

    /// Representative point used for centre matching.
    pub fn center(&self) -> Point {
        Point::new(self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    pub fn area(&self) -> f64 {
        self.w * self.h
    }

    pub fn min(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn max(&self) -> Point {
        Point::new(self.x + self.w, self.y + self.h)
    }

    /// Finite coordinates and a strictly positive extent.
    pub fn is_valid(&self) -> bool {
        [self.x, self.y, self.w, self.h].iter().all(|v| v.is_finite()) && self.w > 0.0 && self.h > 0.0
    }
}

/// Decides which detections count as vehicles.
#[derive(Clone, Debug, PartialEq)]
pub struct VehicleFilter {
    pub classes: Vec<u32>,
    pub min_confidence: f32,
}

impl Default for VehicleFilter {
    fn default() -> Self {
        Self {
            classes: DEFAULT_VEHICLE_CLASSES.to_vec(),
            min_confidence: 0.0,
        }
    }
}

impl VehicleFilter {
    pub fn admits(&self, object: &DetectedObject) -> bool {
        if !self.classes.contains(&object.class_id) {
            log::debug!("ignoring detection of class {}", object.class_id);
            return false;
        }
        if object.confidence < self.min_confidence {
            log::debug!(
                "ignoring low confidence detection: {:.2} < {:.2}",
                object.confidence,
                self.min_confidence
            );
            return false;
        }
        true
    }

    /// Number of admitted detections in a frame.
    pub fn count(&self, objects: &[DetectedObject]) -> u32 {
        objects.iter().filter(|object| self.admits(object)).count() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evidence_parses_both_shapes() {
        let objects: DetectionEvidence = serde_json::from_str(
            r#"{"objects": [{"class_id": 2, "confidence": 0.8, "region": {"x": 1, "y": 2, "w": 3, "h": 4}}]}"#,
        )
        .unwrap();
        let DetectionEvidence::Objects(list) = objects else {
            panic!("expected object evidence");
        };
        assert_eq!(list[0].class_id, 2);
        assert_eq!(list[0].region, Some(BoundingBox::new(1.0, 2.0, 3.0, 4.0)));

        let count: DetectionEvidence = serde_json::from_str(r#"{"vehicle_count": 45}"#).unwrap();
        assert_eq!(count, DetectionEvidence::VehicleCount(45));
    }

    #[test]
    fn missing_confidence_defaults_to_full() {
        let object: DetectedObject = serde_json::from_str(r#"{"class_id": 7}"#).unwrap();
        assert_eq!(object.confidence, 1.0);
        assert!(object.region.is_none());
    }

    #[test]
    fn box_center_and_validity() {
        let bbox = BoundingBox::new(10.0, 20.0, 4.0, 6.0);
        assert_eq!(bbox.center(), Point::new(12.0, 23.0));
        assert_eq!(bbox.area(), 24.0);
        assert!(bbox.is_valid());
        assert!(!BoundingBox::new(0.0, 0.0, 0.0, 1.0).is_valid());
        assert!(!BoundingBox::new(f64::NAN, 0.0, 1.0, 1.0).is_valid());
    }

    #[test]
    fn filter_drops_non_vehicles_and_low_confidence() {
        let filter = VehicleFilter {
            classes: DEFAULT_VEHICLE_CLASSES.to_vec(),
            min_confidence: 0.5,
        };
        let person = DetectedObject {
            class_id: 0,
            label: Some("person".into()),
            confidence: 0.9,
            region: None,
        };
        let faint_car = DetectedObject {
            class_id: COCO_CAR,
            label: None,
            confidence: 0.3,
            region: None,
        };
        let truck = DetectedObject {
            class_id: COCO_TRUCK,
            label: None,
            confidence: 0.7,
            region: None,
        };
        assert_eq!(filter.count(&[person, faint_car, truck]), 1);
    }
}
