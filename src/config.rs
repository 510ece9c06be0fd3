use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::decision::{DecisionMode, ZoneMatch};
use crate::detect::sources::SourceSpec;
use crate::detect::{VehicleFilter, DEFAULT_VEHICLE_CLASSES};
use crate::error::PipelineError;
use crate::schedule::CycleGate;
use crate::zones::LotZones;

pub const DEFAULT_ENDPOINT: &str = "http://localhost/api/update_camera";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_INTERVAL_SECS: u64 = 10;
const DEFAULT_LOT_ID: &str = "1";
const DEFAULT_CAMERA_ID: &str = "camera_001";
const DEFAULT_OCCUPANCY_FRACTION: f64 = 0.5;
const DEFAULT_OVERLAP_THRESHOLD: f64 = 0.5;
const DEFAULT_SOURCE: &str = "simulated";
const DEFAULT_SOURCE_FPS: u32 = 10;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DaemonConfigFile {
    endpoint: Option<String>,
    timeout_secs: Option<u64>,
    pipelines: Option<Vec<PipelineConfigFile>>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PipelineConfigFile {
    lot_id: Option<String>,
    camera_id: Option<String>,
    endpoint: Option<String>,
    timeout_secs: Option<u64>,
    interval_secs: Option<u64>,
    interval_frames: Option<u32>,
    mode: Option<ReportMode>,
    zones_path: Option<PathBuf>,
    capacity: Option<u32>,
    occupancy_fraction: Option<f64>,
    zone_match: Option<ZoneMatchKind>,
    overlap_threshold: Option<f64>,
    vehicle_classes: Option<Vec<u32>>,
    min_confidence: Option<f32>,
    source: Option<String>,
    source_fps: Option<u32>,
    seed: Option<u64>,
}

/// Spot-level or lot-level reporting.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReportMode {
    Spot,
    Lot,
}

impl ReportMode {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "spot" => Ok(Self::Spot),
            "lot" => Ok(Self::Lot),
            other => Err(anyhow!("mode must be 'spot' or 'lot', got '{}'", other)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Spot => "spot",
            Self::Lot => "lot",
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum ZoneMatchKind {
    Center,
    Overlap,
}

/// Everything one camera pipeline needs, resolved against defaults.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub lot_id: String,
    pub camera_id: String,
    pub endpoint: String,
    pub timeout: Duration,
    pub gate: CycleGate,
    pub mode: ReportMode,
    pub zones_path: Option<PathBuf>,
    pub capacity: Option<u32>,
    pub occupancy_fraction: f64,
    pub zone_match: ZoneMatch,
    pub vehicle_classes: Vec<u32>,
    pub min_confidence: f32,
    pub source: SourceSpec,
    pub source_fps: u32,
    pub seed: Option<u64>,
}

impl PipelineSettings {
    pub fn vehicle_filter(&self) -> VehicleFilter {
        VehicleFilter {
            classes: self.vehicle_classes.clone(),
            min_confidence: self.min_confidence,
        }
    }

    /// Load zone data and build the decision mode.
    ///
    /// Failures are configuration errors for this lot only.
    pub fn decision_mode(&self) -> Result<DecisionMode, PipelineError> {
        let zones = match &self.zones_path {
            Some(path) => Some(LotZones::load(path, &self.lot_id)?),
            None => None,
        };
        match self.mode {
            ReportMode::Spot => {
                let zones = zones.ok_or_else(|| {
                    PipelineError::configuration(&self.lot_id, "spot mode requires zones_path")
                })?;
                Ok(DecisionMode::spot_level(zones, self.zone_match))
            }
            ReportMode::Lot => {
                let capacity = self
                    .capacity
                    .or_else(|| zones.as_ref().map(|zones| zones.capacity))
                    .ok_or_else(|| {
                        PipelineError::configuration(
                            &self.lot_id,
                            "lot mode requires capacity or zones_path",
                        )
                    })?;
                Ok(DecisionMode::Lot {
                    capacity,
                    fraction: self.occupancy_fraction,
                })
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub pipelines: Vec<PipelineSettings>,
}

impl DaemonConfig {
    /// Load from `path`, or from `PARKWATCH_CONFIG` when no path is given, then apply
    /// environment overrides and validate. With no file at all a single pipeline is built
    /// from defaults and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path
            .map(Path::to_path_buf)
            .or_else(|| env_value("PARKWATCH_CONFIG").map(PathBuf::from));
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: DaemonConfigFile) -> Result<Self> {
        let endpoint = file
            .endpoint
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let timeout_secs = file.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        let entries = match file.pipelines {
            Some(entries) if !entries.is_empty() => entries,
            _ => vec![PipelineConfigFile::default()],
        };
        let pipelines = entries
            .into_iter()
            .enumerate()
            .map(|(index, entry)| {
                resolve_pipeline(entry, &endpoint, timeout_secs)
                    .with_context(|| format!("pipelines[{}]", index))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { pipelines })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(endpoint) = env_value("PARKWATCH_ENDPOINT") {
            for pipeline in &mut self.pipelines {
                pipeline.endpoint = endpoint.clone();
            }
        }
        if let Some(timeout) = env_value("PARKWATCH_TIMEOUT_SECS") {
            let seconds: u64 = timeout.parse().map_err(|_| {
                anyhow!("PARKWATCH_TIMEOUT_SECS must be an integer number of seconds")
            })?;
            for pipeline in &mut self.pipelines {
                pipeline.timeout = Duration::from_secs(seconds);
            }
        }
        if let Some(interval) = env_value("PARKWATCH_INTERVAL_SECS") {
            let seconds: u64 = interval.parse().map_err(|_| {
                anyhow!("PARKWATCH_INTERVAL_SECS must be an integer number of seconds")
            })?;
            for pipeline in &mut self.pipelines {
                pipeline.gate = CycleGate::Every(Duration::from_secs(seconds));
            }
        }

        let lot_id = env_value("PARKWATCH_LOT_ID");
        let camera_id = env_value("PARKWATCH_CAMERA_ID");
        let mode = env_value("PARKWATCH_MODE");
        let zones_path = env_value("PARKWATCH_ZONES_PATH");
        let capacity = env_value("PARKWATCH_CAPACITY");
        let per_pipeline = [&lot_id, &camera_id, &mode, &zones_path, &capacity];
        if per_pipeline.iter().all(|value| value.is_none()) {
            return Ok(());
        }
        let [pipeline] = self.pipelines.as_mut_slice() else {
            return Err(anyhow!(
                "PARKWATCH_LOT_ID, PARKWATCH_CAMERA_ID, PARKWATCH_MODE, PARKWATCH_ZONES_PATH and \
                 PARKWATCH_CAPACITY only apply when exactly one pipeline is configured"
            ));
        };
        if let Some(lot_id) = lot_id {
            pipeline.lot_id = lot_id;
        }
        if let Some(camera_id) = camera_id {
            pipeline.camera_id = camera_id;
        }
        if let Some(mode) = mode {
            pipeline.mode = ReportMode::parse(&mode)?;
        }
        if let Some(path) = zones_path {
            pipeline.zones_path = Some(PathBuf::from(path));
        }
        if let Some(capacity) = capacity {
            let capacity: u32 = capacity
                .parse()
                .map_err(|_| anyhow!("PARKWATCH_CAPACITY must be a positive integer"))?;
            pipeline.capacity = Some(capacity);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let mut cameras = HashSet::new();
        let mut stdin_sources = 0;
        for pipeline in &self.pipelines {
            validate_pipeline(pipeline)
                .with_context(|| format!("pipeline for camera '{}'", pipeline.camera_id))?;
            if !cameras.insert(pipeline.camera_id.as_str()) {
                return Err(anyhow!(
                    "camera_id '{}' is configured more than once",
                    pipeline.camera_id
                ));
            }
            if pipeline.source == SourceSpec::Stdin {
                stdin_sources += 1;
            }
        }
        if stdin_sources > 1 {
            return Err(anyhow!("at most one pipeline may read from stdin"));
        }
        Ok(())
    }
}

fn resolve_pipeline(
    file: PipelineConfigFile,
    endpoint: &str,
    timeout_secs: u64,
) -> Result<PipelineSettings> {
    let gate = match (file.interval_secs, file.interval_frames) {
        (Some(_), Some(_)) => {
            return Err(anyhow!(
                "interval_secs and interval_frames are mutually exclusive"
            ))
        }
        (_, Some(frames)) => CycleGate::EveryFrames(frames),
        (secs, None) => CycleGate::Every(Duration::from_secs(
            secs.unwrap_or(DEFAULT_INTERVAL_SECS),
        )),
    };
    let zone_match = match file.zone_match.unwrap_or(ZoneMatchKind::Center) {
        ZoneMatchKind::Center => ZoneMatch::Center,
        ZoneMatchKind::Overlap => ZoneMatch::Overlap {
            min_fraction: file.overlap_threshold.unwrap_or(DEFAULT_OVERLAP_THRESHOLD),
        },
    };
    let source = SourceSpec::parse(file.source.as_deref().unwrap_or(DEFAULT_SOURCE))?;

    Ok(PipelineSettings {
        lot_id: file.lot_id.unwrap_or_else(|| DEFAULT_LOT_ID.to_string()),
        camera_id: file
            .camera_id
            .unwrap_or_else(|| DEFAULT_CAMERA_ID.to_string()),
        endpoint: file.endpoint.unwrap_or_else(|| endpoint.to_string()),
        timeout: Duration::from_secs(file.timeout_secs.unwrap_or(timeout_secs)),
        gate,
        mode: file.mode.unwrap_or(ReportMode::Spot),
        zones_path: file.zones_path,
        capacity: file.capacity,
        occupancy_fraction: file
            .occupancy_fraction
            .unwrap_or(DEFAULT_OCCUPANCY_FRACTION),
        zone_match,
        vehicle_classes: file
            .vehicle_classes
            .unwrap_or_else(|| DEFAULT_VEHICLE_CLASSES.to_vec()),
        min_confidence: file.min_confidence.unwrap_or(0.0),
        source,
        source_fps: file.source_fps.unwrap_or(DEFAULT_SOURCE_FPS),
        seed: file.seed,
    })
}

fn validate_pipeline(pipeline: &PipelineSettings) -> Result<()> {
    crate::validate_identifier("lot_id", &pipeline.lot_id)?;
    crate::validate_identifier("camera_id", &pipeline.camera_id)?;
    crate::transport::validate_endpoint(&pipeline.endpoint)?;

    if pipeline.timeout.is_zero() {
        return Err(anyhow!("timeout_secs must be greater than zero"));
    }
    match pipeline.gate {
        CycleGate::EveryFrames(0) => return Err(anyhow!("interval_frames must be greater than zero")),
        CycleGate::Every(interval) if interval.is_zero() => {
            return Err(anyhow!("interval_secs must be greater than zero"))
        }
        _ => {}
    }
    if !in_unit_interval(pipeline.occupancy_fraction) {
        return Err(anyhow!(
            "occupancy_fraction must be in (0, 1], got {}",
            pipeline.occupancy_fraction
        ));
    }
    if let ZoneMatch::Overlap { min_fraction } = pipeline.zone_match {
        if !in_unit_interval(min_fraction) {
            return Err(anyhow!(
                "overlap_threshold must be in (0, 1], got {}",
                min_fraction
            ));
        }
    }
    if pipeline.vehicle_classes.is_empty() {
        return Err(anyhow!("vehicle_classes must not be empty"));
    }
    if !(0.0..=1.0).contains(&pipeline.min_confidence) {
        return Err(anyhow!(
            "min_confidence must be in [0, 1], got {}",
            pipeline.min_confidence
        ));
    }
    if pipeline.source_fps == 0 {
        return Err(anyhow!("source_fps must be greater than zero"));
    }
    if pipeline.capacity == Some(0) {
        return Err(anyhow!("capacity must be greater than zero"));
    }
    match pipeline.mode {
        ReportMode::Spot if pipeline.zones_path.is_none() => {
            Err(anyhow!("spot mode requires zones_path"))
        }
        ReportMode::Lot if pipeline.capacity.is_none() && pipeline.zones_path.is_none() => {
            Err(anyhow!("lot mode requires capacity or zones_path"))
        }
        _ => Ok(()),
    }
}

fn in_unit_interval(value: f64) -> bool {
    value > 0.0 && value <= 1.0
}

fn read_config_file(path: &Path) -> Result<DaemonConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
