//! Spot zones: monitored parking spaces and their geometry.
//!
//! Zones are loaded once from a lot's zone file and never change afterwards. Two file
//! shapes are accepted:
//!
//! ```text
//! {"lot_id": "1", "capacity": 120, "spots": [{"spot_id": "A1", "points": [[0,0],[10,0],[10,5],[0,5]]}]}
//! [{"points": [[0,0],[10,0],[10,5],[0,5]]}, ...]
//! ```
//!
//! The bare array is the annotation-tool layout; its spots are numbered "1", "2", ... in
//! file order.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::detect::BoundingBox;
use crate::error::PipelineError;

const EPSILON: f64 = 1e-9;

// -------------------- Geometry --------------------

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Simple polygon, vertices in either winding order, implicitly closed.
#[derive(Clone, Debug, PartialEq)]
pub struct Polygon {
    points: Vec<Point>,
}

impl Polygon {
    pub fn new(points: Vec<Point>) -> Result<Self, String> {
        if points.len() < 3 {
            return Err(format!("polygon needs at least 3 points, got {}", points.len()));
        }
        if points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err("polygon coordinates must be finite".to_string());
        }
        let polygon = Self { points };
        if polygon.area() <= EPSILON {
            return Err("polygon has zero area".to_string());
        }
        Ok(polygon)
    }

    pub fn rectangle(min: Point, max: Point) -> Result<Self, String> {
        Self::new(vec![
            min,
            Point::new(max.x, min.y),
            max,
            Point::new(min.x, max.y),
        ])
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Absolute area (shoelace formula).
    pub fn area(&self) -> f64 {
        shoelace(&self.points)
    }

    /// Centre of the axis-aligned bounding rectangle.
    pub fn bounds_center(&self) -> Point {
        let (mut min_x, mut min_y) = (f64::INFINITY, f64::INFINITY);
        let (mut max_x, mut max_y) = (f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in &self.points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Point::new((min_x + max_x) / 2.0, (min_y + max_y) / 2.0)
    }

    /// Point-in-polygon test. Points on an edge count as inside.
    pub fn contains(&self, point: Point) -> bool {
        let n = self.points.len();
        for i in 0..n {
            if on_segment(self.points[i], self.points[(i + 1) % n], point) {
                return true;
            }
        }

        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let (a, b) = (self.points[i], self.points[j]);
            if (a.y > point.y) != (b.y > point.y) {
                let cross_x = a.x + (point.y - a.y) * (b.x - a.x) / (b.y - a.y);
                if point.x < cross_x {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }

    /// Fraction of the box's area lying inside this polygon, in `0.0..=1.0`.
    pub fn overlap_fraction(&self, bbox: &BoundingBox) -> f64 {
        if !bbox.is_valid() {
            return 0.0;
        }
        let clipped = clip_to_box(&self.points, bbox);
        if clipped.len() < 3 {
            return 0.0;
        }
        (shoelace(&clipped) / bbox.area()).clamp(0.0, 1.0)
    }
}

fn shoelace(points: &[Point]) -> f64 {
    let n = points.len();
    let twice: f64 = (0..n)
        .map(|i| {
            let (a, b) = (points[i], points[(i + 1) % n]);
            a.x * b.y - b.x * a.y
        })
        .sum();
    twice.abs() / 2.0
}

fn on_segment(a: Point, b: Point, p: Point) -> bool {
    let cross = (b.x - a.x) * (p.y - a.y) - (b.y - a.y) * (p.x - a.x);
    if cross.abs() > EPSILON {
        return false;
    }
    p.x >= a.x.min(b.x) - EPSILON
        && p.x <= a.x.max(b.x) + EPSILON
        && p.y >= a.y.min(b.y) - EPSILON
        && p.y <= a.y.max(b.y) + EPSILON
}

#[derive(Clone, Copy)]
enum Edge {
    Left(f64),
    Right(f64),
    Top(f64),
    Bottom(f64),
}

impl Edge {
    fn keeps(self, p: Point) -> bool {
        match self {
            Edge::Left(x) => p.x >= x,
            Edge::Right(x) => p.x <= x,
            Edge::Top(y) => p.y >= y,
            Edge::Bottom(y) => p.y <= y,
        }
    }

    fn intersect(self, a: Point, b: Point) -> Point {
        match self {
            Edge::Left(x) | Edge::Right(x) => {
                let t = (x - a.x) / (b.x - a.x);
                Point::new(x, a.y + t * (b.y - a.y))
            }
            Edge::Top(y) | Edge::Bottom(y) => {
                let t = (y - a.y) / (b.y - a.y);
                Point::new(a.x + t * (b.x - a.x), y)
            }
        }
    }
}

/// Sutherland-Hodgman clip of a polygon against an axis-aligned box.
fn clip_to_box(points: &[Point], bbox: &BoundingBox) -> Vec<Point> {
    let (min, max) = (bbox.min(), bbox.max());
    let edges = [
        Edge::Left(min.x),
        Edge::Right(max.x),
        Edge::Top(min.y),
        Edge::Bottom(max.y),
    ];

    let mut output = points.to_vec();
    for edge in edges {
        if output.is_empty() {
            break;
        }
        let input = std::mem::take(&mut output);
        let mut prev = input[input.len() - 1];
        for &current in &input {
            match (edge.keeps(current), edge.keeps(prev)) {
                (true, true) => output.push(current),
                (true, false) => {
                    output.push(edge.intersect(prev, current));
                    output.push(current);
                }
                (false, true) => output.push(edge.intersect(prev, current)),
                (false, false) => {}
            }
            prev = current;
        }
    }
    output
}

// -------------------- Spot Zones --------------------

/// A monitored parking space.
#[derive(Clone, Debug, PartialEq)]
pub struct SpotZone {
    pub spot_id: String,
    pub boundary: Polygon,
}

impl SpotZone {
    pub fn new(spot_id: impl Into<String>, boundary: Polygon) -> Self {
        Self {
            spot_id: spot_id.into(),
            boundary,
        }
    }
}

/// The zone configuration of one lot.
#[derive(Clone, Debug, PartialEq)]
pub struct LotZones {
    pub lot_id: String,
    /// Declared capacity; falls back to the number of spots.
    pub capacity: u32,
    pub spots: Vec<SpotZone>,
}

#[derive(Debug)]
enum ZoneFile {
    Lot(LotZoneFile),
    Annotations(Vec<AnnotationEntry>),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LotZoneFile {
    lot_id: Option<IdValue>,
    capacity: Option<u32>,
    spots: Vec<SpotZoneFile>,
}

#[derive(Debug, Deserialize)]
struct SpotZoneFile {
    spot_id: IdValue,
    points: Vec<[f64; 2]>,
}

#[derive(Debug, Deserialize)]
struct AnnotationEntry {
    points: Vec<[f64; 2]>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IdValue {
    Text(String),
    Number(u64),
}

impl IdValue {
    fn into_string(self) -> String {
        match self {
            IdValue::Text(text) => text,
            IdValue::Number(number) => number.to_string(),
        }
    }
}

impl LotZones {
    /// Load and validate a lot's zone file.
    ///
    /// Any problem (missing file, bad JSON, degenerate polygon, duplicate or empty spot set,
    /// lot mismatch) is a configuration error for `lot_id`.
    pub fn load(path: &Path, lot_id: &str) -> Result<Self, PipelineError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::configuration(
                lot_id,
                format!("failed to read zone file {}: {}", path.display(), e),
            )
        })?;
        Self::parse(&raw, lot_id).map_err(|err| match err {
            PipelineError::Configuration { lot_id, reason } => PipelineError::Configuration {
                lot_id,
                reason: format!("{} ({})", reason, path.display()),
            },
            other => other,
        })
    }

    pub fn parse(raw: &str, lot_id: &str) -> Result<Self, PipelineError> {
        let invalid = |e: serde_json::Error| {
            PipelineError::configuration(lot_id, format!("invalid zone file: {}", e))
        };
        // The leading token selects the shape; each is parsed on its own.
        let file = if raw.trim_start().starts_with('[') {
            ZoneFile::Annotations(serde_json::from_str(raw).map_err(invalid)?)
        } else {
            ZoneFile::Lot(serde_json::from_str(raw).map_err(invalid)?)
        };

        let (declared_lot, capacity, entries) = match file {
            ZoneFile::Lot(lot) => (
                lot.lot_id.map(IdValue::into_string),
                lot.capacity,
                lot.spots
                    .into_iter()
                    .map(|spot| (spot.spot_id.into_string(), spot.points))
                    .collect::<Vec<_>>(),
            ),
            ZoneFile::Annotations(entries) => (
                None,
                None,
                entries
                    .into_iter()
                    .enumerate()
                    .map(|(index, entry)| ((index + 1).to_string(), entry.points))
                    .collect(),
            ),
        };

        if let Some(declared) = declared_lot {
            if declared != lot_id {
                return Err(PipelineError::configuration(
                    lot_id,
                    format!("zone file belongs to lot '{}'", declared),
                ));
            }
        }

        Self::from_entries(lot_id, capacity, entries)
    }

    fn from_entries(
        lot_id: &str,
        capacity: Option<u32>,
        entries: Vec<(String, Vec<[f64; 2]>)>,
    ) -> Result<Self, PipelineError> {
        if entries.is_empty() {
            return Err(PipelineError::configuration(lot_id, "zone file defines no spots"));
        }

        let mut seen = HashSet::new();
        let mut spots = Vec::with_capacity(entries.len());
        for (spot_id, points) in entries {
            crate::validate_identifier("spot_id", &spot_id)
                .map_err(|e| PipelineError::configuration(lot_id, e.to_string()))?;
            if !seen.insert(spot_id.clone()) {
                return Err(PipelineError::configuration(
                    lot_id,
                    format!("duplicate spot_id '{}'", spot_id),
                ));
            }
            let points = points.into_iter().map(|[x, y]| Point::new(x, y)).collect();
            let boundary = Polygon::new(points).map_err(|reason| {
                PipelineError::configuration(lot_id, format!("spot '{}': {}", spot_id, reason))
            })?;
            spots.push(SpotZone::new(spot_id, boundary));
        }

        let capacity = match capacity {
            Some(0) => {
                return Err(PipelineError::configuration(lot_id, "capacity must be > 0"));
            }
            Some(capacity) => capacity,
            None => spots.len() as u32,
        };

        Ok(Self {
            lot_id: lot_id.to_string(),
            capacity,
            spots,
        })
    }
}
