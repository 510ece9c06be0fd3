use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use parkwatch::config::{DaemonConfig, ReportMode};
use parkwatch::detect::sources::SourceSpec;
use parkwatch::{CycleGate, DecisionMode, ZoneMatch};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "PARKWATCH_CONFIG",
        "PARKWATCH_ENDPOINT",
        "PARKWATCH_TIMEOUT_SECS",
        "PARKWATCH_INTERVAL_SECS",
        "PARKWATCH_LOT_ID",
        "PARKWATCH_CAMERA_ID",
        "PARKWATCH_MODE",
        "PARKWATCH_ZONES_PATH",
        "PARKWATCH_CAPACITY",
    ] {
        std::env::remove_var(key);
    }
}

fn write_file(suffix: &str, contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp file");
    file.write_all(contents.as_bytes()).expect("write temp file");
    file
}

fn zone_file() -> NamedTempFile {
    write_file(
        ".json",
        r#"{
            "lot_id": "1",
            "capacity": 3,
            "spots": [
                {"spot_id": "A1", "points": [[0, 0], [100, 0], [100, 200], [0, 200]]},
                {"spot_id": "A2", "points": [[100, 0], [200, 0], [200, 200], [100, 200]]},
                {"spot_id": "A3", "points": [[200, 0], [300, 0], [300, 200], [200, 200]]}
            ]
        }"#,
    )
}

#[test]
fn loads_json_config_with_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let zones = zone_file();
    let json = format!(
        r#"{{
            "endpoint": "http://tracker.local/api/update_camera",
            "timeout_secs": 5,
            "pipelines": [{{
                "lot_id": "1",
                "camera_id": "yolo_camera_001",
                "interval_frames": 30,
                "zones_path": "{}",
                "zone_match": "overlap",
                "overlap_threshold": 0.4,
                "min_confidence": 0.25,
                "source": "stdin"
            }}]
        }}"#,
        zones.path().display()
    );
    let file = write_file(".json", &json);

    std::env::set_var("PARKWATCH_CONFIG", file.path());
    std::env::set_var("PARKWATCH_TIMEOUT_SECS", "3");
    std::env::set_var("PARKWATCH_CAMERA_ID", "cam_north");

    let cfg = DaemonConfig::load(None).expect("load config");
    assert_eq!(cfg.pipelines.len(), 1);
    let pipeline = &cfg.pipelines[0];
    assert_eq!(pipeline.endpoint, "http://tracker.local/api/update_camera");
    assert_eq!(pipeline.timeout, Duration::from_secs(3));
    assert_eq!(pipeline.camera_id, "cam_north");
    assert_eq!(pipeline.gate, CycleGate::EveryFrames(30));
    assert_eq!(pipeline.mode, ReportMode::Spot);
    assert_eq!(pipeline.zone_match, ZoneMatch::Overlap { min_fraction: 0.4 });
    assert_eq!(pipeline.min_confidence, 0.25);
    assert_eq!(pipeline.source, SourceSpec::Stdin);

    match pipeline.decision_mode().expect("zones load") {
        DecisionMode::Spot { zones, .. } => {
            let ids: Vec<&str> = zones.iter().map(|z| z.spot_id.as_str()).collect();
            assert_eq!(ids, vec!["A1", "A2", "A3"]);
        }
        other => panic!("unexpected mode {:?}", other),
    }

    clear_env();
}

#[test]
fn loads_toml_config_with_several_pipelines() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let zones = zone_file();
    let toml = format!(
        r#"
endpoint = "https://abc123.ngrok.io/api/update_camera"

[[pipelines]]
lot_id = "1"
camera_id = "cam_spots"
zones_path = "{}"
interval_secs = 5

[[pipelines]]
lot_id = "BK1"
camera_id = "cam_lot"
mode = "lot"
capacity = 120
occupancy_fraction = 0.6
vehicle_classes = [2]
seed = 7
"#,
        zones.path().display()
    );
    let file = write_file(".toml", &toml);

    std::env::set_var("PARKWATCH_INTERVAL_SECS", "20");

    let cfg = DaemonConfig::load(Some(file.path())).expect("load config");
    assert_eq!(cfg.pipelines.len(), 2);

    let spots = &cfg.pipelines[0];
    assert_eq!(spots.endpoint, "https://abc123.ngrok.io/api/update_camera");
    assert_eq!(spots.gate, CycleGate::Every(Duration::from_secs(20)));
    assert_eq!(spots.timeout, Duration::from_secs(10));

    let lot = &cfg.pipelines[1];
    assert_eq!(lot.mode, ReportMode::Lot);
    assert_eq!(lot.vehicle_classes, vec![2]);
    assert_eq!(lot.seed, Some(7));
    assert_eq!(
        lot.decision_mode().unwrap(),
        DecisionMode::Lot {
            capacity: 120,
            fraction: 0.6
        }
    );

    clear_env();
}

#[test]
fn builds_single_pipeline_from_env_only() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("PARKWATCH_ENDPOINT", "http://127.0.0.1:8000/api/update_camera");
    std::env::set_var("PARKWATCH_LOT_ID", "BK1");
    std::env::set_var("PARKWATCH_MODE", "lot");
    std::env::set_var("PARKWATCH_CAPACITY", "40");

    let cfg = DaemonConfig::load(None).expect("load config");
    assert_eq!(cfg.pipelines.len(), 1);
    let pipeline = &cfg.pipelines[0];
    assert_eq!(pipeline.lot_id, "BK1");
    assert_eq!(pipeline.capacity, Some(40));
    assert_eq!(pipeline.source, SourceSpec::Simulated);

    clear_env();
}

#[test]
fn per_pipeline_env_requires_a_single_pipeline() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let json = r#"{
        "pipelines": [
            {"camera_id": "cam_a", "mode": "lot", "capacity": 10},
            {"camera_id": "cam_b", "mode": "lot", "capacity": 10}
        ]
    }"#;
    let file = write_file(".json", json);
    std::env::set_var("PARKWATCH_LOT_ID", "2");

    assert!(DaemonConfig::load(Some(file.path())).is_err());

    clear_env();
}

#[test]
fn rejects_invalid_configurations() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cases = [
        // duplicate camera
        r#"{"pipelines": [
            {"camera_id": "cam", "mode": "lot", "capacity": 10},
            {"camera_id": "cam", "mode": "lot", "capacity": 10}
        ]}"#,
        // two stdin readers
        r#"{"pipelines": [
            {"camera_id": "a", "mode": "lot", "capacity": 10, "source": "stdin"},
            {"camera_id": "b", "mode": "lot", "capacity": 10, "source": "-"}
        ]}"#,
        // spot mode without zones
        r#"{"pipelines": [{"camera_id": "cam"}]}"#,
        // lot mode without capacity
        r#"{"pipelines": [{"camera_id": "cam", "mode": "lot"}]}"#,
        // unknown mode
        r#"{"pipelines": [{"camera_id": "cam", "mode": "zone", "capacity": 10}]}"#,
        // unknown field
        r#"{"pipelines": [{"camera_id": "cam", "mode": "lot", "capacity": 10, "spots": 4}]}"#,
        // bad endpoint
        r#"{"endpoint": "not a url", "pipelines": [{"mode": "lot", "capacity": 10}]}"#,
    ];
    for json in cases {
        let file = write_file(".json", json);
        assert!(
            DaemonConfig::load(Some(file.path())).is_err(),
            "accepted: {}",
            json
        );
    }

    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let result = DaemonConfig::load(Some(Path::new("/nonexistent/parkwatch.toml")));
    assert!(result.is_err());
}
