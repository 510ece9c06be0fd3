//! Cycle scheduling.
//!
//! Frames may arrive much faster than reports are wanted. The scheduler looks at every
//! processed frame and says whether it starts a reporting cycle, either every N frames or
//! every T seconds of monotonic time.
//!
//! Time gating never accumulates per-tick deltas: deadlines are `origin + k * T`, so a
//! slow delivery delays at most one cycle and later cycles land back on the grid.

use anyhow::{anyhow, Result};
use std::fmt;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleGate {
    /// A cycle on the first frame, then every `n` processed frames.
    EveryFrames(u32),
    /// A cycle on the first frame, then on the first frame at or after each deadline.
    Every(Duration),
}

impl fmt::Display for CycleGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EveryFrames(n) => write!(f, "every {} frames", n),
            Self::Every(interval) => write!(f, "every {:.3}s", interval.as_secs_f64()),
        }
    }
}

#[derive(Debug)]
pub struct CycleScheduler {
    gate: CycleGate,
    frames_seen: u64,
    origin: Option<Instant>,
    next_due: Option<Instant>,
    next_index: u128,
    cycles_started: u64,
    ticks_skipped: u64,
}

impl CycleScheduler {
    pub fn new(gate: CycleGate) -> Result<Self> {
        match gate {
            CycleGate::EveryFrames(0) => return Err(anyhow!("frame interval must be > 0")),
            CycleGate::Every(interval) if interval.is_zero() => {
                return Err(anyhow!("report interval must be > 0"))
            }
            _ => {}
        }
        Ok(Self {
            gate,
            frames_seen: 0,
            origin: None,
            next_due: None,
            next_index: 0,
            cycles_started: 0,
            ticks_skipped: 0,
        })
    }

    pub fn gate(&self) -> CycleGate {
        self.gate
    }

    /// Record a processed frame observed at `now`. Returns true when it starts a cycle.
    pub fn observe_frame(&mut self, now: Instant) -> bool {
        self.frames_seen += 1;
        let due = match self.gate {
            CycleGate::EveryFrames(n) => (self.frames_seen - 1) % n as u64 == 0,
            CycleGate::Every(interval) => self.time_due(now, interval),
        };
        if due {
            self.cycles_started += 1;
        }
        due
    }

    fn time_due(&mut self, now: Instant, interval: Duration) -> bool {
        let origin = *self.origin.get_or_insert(now);
        if self.next_due.is_some_and(|next_due| now < next_due) {
            return false;
        }

        // Index of the next grid point strictly after `now`.
        let period = interval.as_nanos();
        let elapsed = now.saturating_duration_since(origin).as_nanos();
        let next_index = elapsed / period + 1;

        if self.next_due.is_some() {
            // This frame serves grid point `next_index - 1`; earlier unserved points are lost.
            let missed = (next_index - 1).saturating_sub(self.next_index) as u64;
            if missed > 0 {
                log::debug!("skipped {} report ticks while busy", missed);
                self.ticks_skipped += missed;
            }
        }
        self.next_index = next_index;
        self.next_due = Some(origin + nanos(period * next_index));
        true
    }

    /// Deadline of the next time-gated cycle, once the first frame has been seen.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.next_due
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    pub fn cycles_started(&self) -> u64 {
        self.cycles_started
    }

    /// Grid instants that passed without a cycle because the pipeline was busy.
    pub fn ticks_skipped(&self) -> u64 {
        self.ticks_skipped
    }
}

fn nanos(value: u128) -> Duration {
    Duration::new(
        (value / 1_000_000_000) as u64,
        (value % 1_000_000_000) as u32,
    )
}
