//! Report batching.
//!
//! Every cycle's records go out together as one batch, submitted once. Records are sent
//! every cycle even when nothing changed: the service treats each report as a state
//! refresh, so there is no delta suppression and no cross-cycle merging.

use crate::error::PipelineError;
use crate::OccupancyRecord;

/// The records of one cycle, delivered as a single unit.
///
/// All records share one lot, one camera and one capture instant.
#[derive(Clone, Debug, PartialEq)]
pub struct ReportBatch {
    cycle: u64,
    records: Vec<OccupancyRecord>,
}

impl ReportBatch {
    /// Assemble the batch for cycle `cycle` from the decision engine's output.
    pub fn assemble(cycle: u64, records: Vec<OccupancyRecord>) -> Result<Self, PipelineError> {
        let Some(first) = records.first() else {
            return Err(PipelineError::configuration(
                "<unknown>",
                format!("cycle {} produced no occupancy records", cycle),
            ));
        };

        for record in &records[1..] {
            if record.camera_id != first.camera_id
                || record.lot_id != first.lot_id
                || record.captured_at_epoch_s != first.captured_at_epoch_s
            {
                return Err(PipelineError::configuration(
                    &first.lot_id,
                    format!(
                        "cycle {} mixes records from camera {} lot {} and camera {} lot {}",
                        cycle, first.camera_id, first.lot_id, record.camera_id, record.lot_id
                    ),
                ));
            }
        }

        Ok(Self { cycle, records })
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn records(&self) -> &[OccupancyRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn lot_id(&self) -> &str {
        &self.records[0].lot_id
    }

    pub fn camera_id(&self) -> &str {
        &self.records[0].camera_id
    }

    pub fn captured_at_epoch_s(&self) -> u64 {
        self.records[0].captured_at_epoch_s
    }

    pub fn occupied_count(&self) -> usize {
        self.records.iter().filter(|r| r.occupied).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(spot: &str, camera: &str, occupied: bool) -> OccupancyRecord {
        OccupancyRecord {
            lot_id: "1".to_string(),
            spot_id: Some(spot.to_string()),
            occupied,
            camera_id: camera.to_string(),
            captured_at_epoch_s: 1_700_000_000,
        }
    }

    #[test]
    fn batch_keeps_record_order() {
        let batch = ReportBatch::assemble(
            4,
            vec![
                record("A1", "cam", false),
                record("A2", "cam", true),
                record("A3", "cam", false),
            ],
        )
        .unwrap();
        assert_eq!(batch.cycle(), 4);
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.occupied_count(), 1);
        assert_eq!(batch.camera_id(), "cam");
        assert_eq!(batch.records()[1].spot_id.as_deref(), Some("A2"));
    }

    #[test]
    fn empty_batches_are_refused() {
        let err = ReportBatch::assemble(1, vec![]).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn mixed_cameras_are_refused() {
        let result =
            ReportBatch::assemble(1, vec![record("A1", "cam_1", true), record("A2", "cam_2", true)]);
        assert!(result.is_err());
    }

    #[test]
    fn unchanged_state_is_still_batched() {
        let first = ReportBatch::assemble(1, vec![record("A1", "cam", true)]).unwrap();
        let second = ReportBatch::assemble(2, vec![record("A1", "cam", true)]).unwrap();
        assert_eq!(first.records(), second.records());
        assert_eq!(second.len(), 1);
    }
}
