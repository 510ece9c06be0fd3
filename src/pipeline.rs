//! Per-camera pipeline: source -> scheduler -> decision -> batch -> delivery -> policy.
//!
//! One `Pipeline` owns one engine, one scheduler and one client. Nothing is shared between
//! pipelines, so several can run on separate threads without locking.

use anyhow::Result;
use std::time::{Instant, SystemTime};

use crate::config::PipelineSettings;
use crate::decision::{DecisionMode, OccupancyEngine};
use crate::detect::sources::{JsonLinesSource, SourceSpec};
use crate::detect::{DetectionEvidence, DetectionSource};
use crate::error::PipelineError;
use crate::policy::{BatchState, CycleSummary, RetryPolicy};
use crate::report::ReportBatch;
use crate::schedule::{CycleGate, CycleScheduler};
use crate::transport::{HttpReportClient, ReportClient};
use crate::StopSignal;

/// Running totals for one pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames: u64,
    pub cycles: u64,
    pub delivered: u64,
    pub deferred: u64,
    pub records_sent: u64,
}

pub struct Pipeline<C: ReportClient> {
    engine: OccupancyEngine,
    scheduler: CycleScheduler,
    client: C,
    policy: RetryPolicy,
    stats: PipelineStats,
}

impl Pipeline<HttpReportClient> {
    /// Build a pipeline from resolved settings, loading the lot's zones.
    pub fn from_settings(settings: &PipelineSettings) -> Result<Self> {
        let engine = OccupancyEngine::new(
            &settings.lot_id,
            &settings.camera_id,
            settings.decision_mode()?,
            settings.vehicle_filter(),
        )?;
        let client = HttpReportClient::new(&settings.endpoint, settings.timeout)?;
        Self::new(engine, settings.gate, client)
    }
}

impl<C: ReportClient> Pipeline<C> {
    pub fn new(engine: OccupancyEngine, gate: CycleGate, client: C) -> Result<Self> {
        Ok(Self {
            engine,
            scheduler: CycleScheduler::new(gate)?,
            client,
            policy: RetryPolicy::new(),
            stats: PipelineStats::default(),
        })
    }

    pub fn engine(&self) -> &OccupancyEngine {
        &self.engine
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Run one full cycle on `evidence`: decide, batch, deliver once, assess.
    ///
    /// Only configuration errors come back as `Err`; delivery problems end up in the
    /// summary and leave the pipeline runnable.
    pub fn run_cycle(
        &mut self,
        evidence: &DetectionEvidence,
        captured_at_epoch_s: u64,
    ) -> Result<CycleSummary, PipelineError> {
        let records = self.engine.decide(evidence, captured_at_epoch_s)?;
        let cycle = self.stats.cycles + 1;
        let batch = ReportBatch::assemble(cycle, records)?;

        let outcome = self.client.deliver(&batch);
        let summary = self.policy.conclude(&batch, outcome);

        self.stats.cycles = cycle;
        self.stats.records_sent += batch.len() as u64;
        match summary.state {
            BatchState::Delivered => self.stats.delivered += 1,
            BatchState::Deferred => self.stats.deferred += 1,
            BatchState::Pending => {}
        }
        summary.log();
        Ok(summary)
    }

    /// Pull frames until the source is exhausted or `stop` is triggered.
    ///
    /// The stop flag is checked before each frame and again before a cycle starts; a
    /// delivery already in progress is never interrupted.
    pub fn run<S>(&mut self, source: &mut S, stop: &StopSignal) -> Result<PipelineStats>
    where
        S: DetectionSource + ?Sized,
    {
        log::info!(
            "camera {}: lot {} in {} mode, {} from {} to {}",
            self.engine.camera_id(),
            self.engine.lot_id(),
            self.engine.mode().name(),
            self.scheduler.gate(),
            source.name(),
            self.client.endpoint()
        );

        loop {
            if stop.is_triggered() {
                log::info!("camera {}: stop requested", self.engine.camera_id());
                break;
            }
            let Some(evidence) = source.next_evidence()? else {
                log::info!(
                    "camera {}: {} source exhausted",
                    self.engine.camera_id(),
                    source.name()
                );
                break;
            };
            self.stats.frames += 1;

            if !self.scheduler.observe_frame(Instant::now()) {
                continue;
            }
            if stop.is_triggered() {
                log::info!("camera {}: stop requested", self.engine.camera_id());
                break;
            }
            let captured_at = crate::epoch_seconds(SystemTime::now())?;
            self.run_cycle(&evidence, captured_at)?;
        }

        log::info!(
            "camera {}: stopped after {} cycles ({} delivered, {} deferred, {} frames, {} ticks skipped)",
            self.engine.camera_id(),
            self.stats.cycles,
            self.stats.delivered,
            self.stats.deferred,
            self.stats.frames,
            self.scheduler.ticks_skipped()
        );
        Ok(self.stats)
    }
}

/// Open the detection source a pipeline was configured with.
///
/// Line-based sources watch `stop` themselves so an idle detector cannot hold the
/// pipeline past a stop request.
pub fn open_source(
    settings: &PipelineSettings,
    mode: &DecisionMode,
    stop: &StopSignal,
) -> Result<Box<dyn DetectionSource>> {
    match &settings.source {
        SourceSpec::Simulated => simulated_source(settings, mode),
        SourceSpec::Stdin => Ok(Box::new(JsonLinesSource::stdin()?.with_stop(stop.clone()))),
        SourceSpec::JsonLines(path) => {
            Ok(Box::new(JsonLinesSource::open(path)?.with_stop(stop.clone())))
        }
    }
}

#[cfg(feature = "simulated-source")]
fn simulated_source(
    settings: &PipelineSettings,
    mode: &DecisionMode,
) -> Result<Box<dyn DetectionSource>> {
    use crate::detect::sources::simulated::SimulatedLayout;
    use crate::detect::SimulatedSource;

    let layout = match mode {
        DecisionMode::Spot { zones, .. } => SimulatedLayout::from_zones(zones),
        DecisionMode::Lot { capacity, .. } => SimulatedLayout::Count {
            capacity: *capacity,
        },
    };
    let seed = settings.seed.unwrap_or_else(rand::random);
    log::info!(
        "camera {}: simulated detections (seed {})",
        settings.camera_id,
        seed
    );
    Ok(Box::new(SimulatedSource::new(
        layout,
        seed,
        settings.source_fps,
    )?))
}

#[cfg(not(feature = "simulated-source"))]
fn simulated_source(
    settings: &PipelineSettings,
    _mode: &DecisionMode,
) -> Result<Box<dyn DetectionSource>> {
    Err(anyhow::anyhow!(
        "camera {}: simulated source requested but the simulated-source feature is disabled",
        settings.camera_id
    ))
}

/// Build and run the pipeline for `settings` until stopped.
///
/// Configuration errors end this pipeline only and come back as `Err`.
pub fn run_configured(settings: &PipelineSettings, stop: &StopSignal) -> Result<PipelineStats> {
    let mut pipeline = Pipeline::from_settings(settings)?;
    let mut source = open_source(settings, pipeline.engine().mode(), stop)?;
    pipeline.run(&mut source, stop)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, DetectedObject, ScriptedSource, VehicleFilter};
    use crate::transport::{DeliveryOutcome, RemoteError};
    use crate::zones::{Point, Polygon, SpotZone};
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Records every batch and answers with queued outcomes.
    struct RecordingClient {
        batches: Vec<ReportBatch>,
        outcomes: VecDeque<DeliveryOutcome>,
        stop_during_delivery: Option<StopSignal>,
    }

    impl RecordingClient {
        fn answering(outcomes: impl IntoIterator<Item = DeliveryOutcome>) -> Self {
            Self {
                batches: Vec::new(),
                outcomes: outcomes.into_iter().collect(),
                stop_during_delivery: None,
            }
        }

        /// Triggers `stop` while the first delivery is in flight.
        fn stopping(stop: StopSignal) -> Self {
            Self {
                stop_during_delivery: Some(stop),
                ..Self::answering([])
            }
        }
    }

    impl ReportClient for RecordingClient {
        fn endpoint(&self) -> &str {
            "memory://recording"
        }

        fn deliver(&mut self, batch: &ReportBatch) -> DeliveryOutcome {
            if let Some(stop) = &self.stop_during_delivery {
                stop.trigger();
            }
            self.batches.push(batch.clone());
            self.outcomes.pop_front().unwrap_or(DeliveryOutcome::Success {
                updated: batch.len() as u32,
            })
        }
    }

    fn zone(id: &str, x: f64) -> SpotZone {
        SpotZone::new(
            id,
            Polygon::rectangle(Point::new(x, 0.0), Point::new(x + 100.0, 200.0)).unwrap(),
        )
    }

    fn engine() -> OccupancyEngine {
        OccupancyEngine::new(
            "1",
            "yolo_camera_001",
            DecisionMode::Spot {
                zones: vec![zone("A1", 0.0), zone("A2", 100.0), zone("A3", 200.0)],
                matching: crate::ZoneMatch::Center,
            },
            VehicleFilter::default(),
        )
        .unwrap()
    }

    fn car_in_a2() -> DetectionEvidence {
        DetectionEvidence::Objects(vec![DetectedObject::vehicle(BoundingBox::new(
            120.0, 40.0, 60.0, 120.0,
        ))])
    }

    #[test]
    fn each_cycle_is_one_batch_and_one_delivery() {
        let client = RecordingClient::answering([]);
        let mut pipeline = Pipeline::new(engine(), CycleGate::EveryFrames(30), client).unwrap();
        let mut source = ScriptedSource::repeat(car_in_a2(), 90);

        let stats = pipeline.run(&mut source, &StopSignal::new()).unwrap();

        assert_eq!(stats.frames, 90);
        assert_eq!(stats.cycles, 3);
        assert_eq!(stats.delivered, 3);
        assert_eq!(stats.records_sent, 9);
        let batches = &pipeline.client().batches;
        assert_eq!(batches.len(), 3);
        for (index, batch) in batches.iter().enumerate() {
            assert_eq!(batch.cycle(), index as u64 + 1);
            let occupied: Vec<bool> = batch.records().iter().map(|r| r.occupied).collect();
            assert_eq!(occupied, vec![false, true, false]);
        }
    }

    #[test]
    fn transport_failure_does_not_stop_the_pipeline() {
        let client = RecordingClient::answering([
            DeliveryOutcome::Failure(PipelineError::Transport("connection refused".into())),
            DeliveryOutcome::Success { updated: 3 },
        ]);
        let mut pipeline = Pipeline::new(engine(), CycleGate::EveryFrames(1), client).unwrap();
        let mut source = ScriptedSource::repeat(car_in_a2(), 2);

        let stats = pipeline.run(&mut source, &StopSignal::new()).unwrap();

        assert_eq!(stats.cycles, 2);
        assert_eq!(stats.deferred, 1);
        assert_eq!(stats.delivered, 1);
        // The deferred batch is not replayed; the second request carries fresh state.
        assert_eq!(pipeline.client().batches.len(), 2);
        assert_eq!(pipeline.client().batches[1].cycle(), 2);
    }

    #[test]
    fn partial_success_surfaces_remote_errors() {
        let client = RecordingClient::answering([DeliveryOutcome::PartialSuccess {
            updated: 2,
            errors: vec![RemoteError {
                spot_id: Some("A3".into()),
                error: "unknown spot".into(),
            }],
        }]);
        let mut pipeline = Pipeline::new(engine(), CycleGate::EveryFrames(1), client).unwrap();

        let summary = pipeline.run_cycle(&car_in_a2(), 1_700_000_000).unwrap();

        assert_eq!(summary.records_sent, 3);
        assert_eq!(summary.records_updated, 2);
        assert_eq!(summary.error_count(), 1);
        assert_eq!(summary.state, BatchState::Delivered);
    }

    #[test]
    fn stop_signal_prevents_new_cycles() {
        let client = RecordingClient::answering([]);
        let mut pipeline = Pipeline::new(engine(), CycleGate::EveryFrames(1), client).unwrap();
        let mut source = ScriptedSource::repeat(car_in_a2(), 5);
        let stop = StopSignal::new();
        stop.trigger();

        let stats = pipeline.run(&mut source, &stop).unwrap();

        assert_eq!(stats.cycles, 0);
        assert_eq!(source.remaining(), 5);
        assert!(pipeline.client().batches.is_empty());
    }

    #[test]
    fn stop_during_delivery_completes_the_cycle_and_starts_no_other() {
        let stop = StopSignal::new();
        let client = RecordingClient::stopping(stop.clone());
        let mut pipeline = Pipeline::new(engine(), CycleGate::EveryFrames(1), client).unwrap();
        let mut source = ScriptedSource::repeat(car_in_a2(), 5);

        let stats = pipeline.run(&mut source, &stop).unwrap();

        assert_eq!(pipeline.client().batches.len(), 1);
        assert_eq!(stats.cycles, 1);
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.frames, 1);
        assert_eq!(source.remaining(), 4);
    }

    #[test]
    fn vehicle_count_in_spot_mode_is_a_configuration_error() {
        let client = RecordingClient::answering([]);
        let mut pipeline = Pipeline::new(engine(), CycleGate::EveryFrames(1), client).unwrap();
        let mut source = ScriptedSource::new([DetectionEvidence::VehicleCount(4)]);

        let err = pipeline.run(&mut source, &StopSignal::new()).unwrap_err();

        let err = err.downcast_ref::<PipelineError>().expect("pipeline error");
        assert!(err.is_fatal());
        assert!(pipeline.client().batches.is_empty());
    }

    #[test]
    fn time_gate_runs_first_frame_immediately() {
        let client = RecordingClient::answering([]);
        let gate = CycleGate::Every(Duration::from_secs(3600));
        let mut pipeline = Pipeline::new(engine(), gate, client).unwrap();
        let mut source = ScriptedSource::repeat(car_in_a2(), 10);

        let stats = pipeline.run(&mut source, &StopSignal::new()).unwrap();

        assert_eq!(stats.frames, 10);
        assert_eq!(stats.cycles, 1);
    }

    #[test]
    fn lot_mode_reports_a_single_aggregate() {
        let engine = OccupancyEngine::new(
            "BK1",
            "cam_lot",
            DecisionMode::Lot {
                capacity: 120,
                fraction: 0.5,
            },
            VehicleFilter::default(),
        )
        .unwrap();
        let client = RecordingClient::answering([DeliveryOutcome::Success { updated: 0 }]);
        let mut pipeline = Pipeline::new(engine, CycleGate::EveryFrames(1), client).unwrap();

        let summary = pipeline
            .run_cycle(&DetectionEvidence::VehicleCount(60), 1_700_000_000)
            .unwrap();

        assert_eq!(summary.records_sent, 1);
        assert_eq!(summary.occupied, 1);
        assert!(summary.is_delivered());
        let record = &pipeline.client().batches[0].records()[0];
        assert!(record.is_lot_level());
        assert_eq!(record.lot_id, "BK1");
    }
}
