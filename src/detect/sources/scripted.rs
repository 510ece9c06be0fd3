use anyhow::Result;
use std::collections::VecDeque;

use crate::detect::evidence::DetectionEvidence;
use crate::detect::source::DetectionSource;

/// Replays a fixed sequence of evidence, then reports exhaustion.
#[derive(Clone, Debug, Default)]
pub struct ScriptedSource {
    frames: VecDeque<DetectionEvidence>,
}

impl ScriptedSource {
    pub fn new(frames: impl IntoIterator<Item = DetectionEvidence>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }

    /// The same evidence repeated `count` times.
    pub fn repeat(evidence: DetectionEvidence, count: usize) -> Self {
        Self::new(std::iter::repeat(evidence).take(count))
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl DetectionSource for ScriptedSource {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn next_evidence(&mut self) -> Result<Option<DetectionEvidence>> {
        Ok(self.frames.pop_front())
    }
}
