//! JSON-lines evidence source.
//!
//! An external detector process writes one JSON document per frame:
//!
//! ```text
//! {"objects": [{"class_id": 2, "confidence": 0.91, "region": {"x": 412, "y": 210, "w": 96, "h": 54}}]}
//! {"vehicle_count": 45}
//! ```
//!
//! Blank lines are skipped. Malformed lines (bad JSON or invalid UTF-8) are logged and
//! skipped. EOF ends the source.
//!
//! Lines are read on a separate thread, so a detector that goes quiet never keeps the
//! pipeline from noticing a stop request.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::thread;
use std::time::Duration;

use crate::detect::evidence::DetectionEvidence;
use crate::detect::source::DetectionSource;
use crate::StopSignal;

/// How often a waiting source re-checks its stop signal.
const STOP_POLL: Duration = Duration::from_millis(100);
/// Lines buffered ahead of the pipeline.
const LINE_BUFFER: usize = 64;

pub struct JsonLinesSource {
    lines: Receiver<io::Result<Vec<u8>>>,
    origin: String,
    stop: Option<StopSignal>,
    frames_read: u64,
    lines_rejected: u64,
}

impl JsonLinesSource {
    pub fn from_reader<R: BufRead + Send + 'static>(reader: R, origin: &str) -> Result<Self> {
        let (tx, rx) = mpsc::sync_channel(LINE_BUFFER);
        thread::Builder::new()
            .name(format!("evidence-reader-{}", origin))
            .spawn(move || read_lines(reader, tx))
            .with_context(|| format!("failed to start reader for {}", origin))?;
        Ok(Self {
            lines: rx,
            origin: origin.to_string(),
            stop: None,
            frames_read: 0,
            lines_rejected: 0,
        })
    }

    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open evidence file {}", path.display()))?;
        Self::from_reader(BufReader::new(file), &path.display().to_string())
    }

    pub fn stdin() -> Result<Self> {
        Self::from_reader(BufReader::new(io::stdin()), "stdin")
    }

    /// End the source as soon as `stop` is triggered, even while no line is pending.
    pub fn with_stop(mut self, stop: StopSignal) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    pub fn lines_rejected(&self) -> u64 {
        self.lines_rejected
    }

    fn stop_requested(&self) -> bool {
        self.stop.as_ref().is_some_and(StopSignal::is_triggered)
    }

    fn reject(&mut self, reason: impl std::fmt::Display) {
        self.lines_rejected += 1;
        log::warn!("skipping malformed evidence from {}: {}", self.origin, reason);
    }
}

fn read_lines<R: BufRead>(mut reader: R, lines: SyncSender<io::Result<Vec<u8>>>) {
    loop {
        let mut line = Vec::new();
        match reader.read_until(b'\n', &mut line) {
            Ok(0) => return,
            Ok(_) => {
                if lines.send(Ok(line)).is_err() {
                    return;
                }
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                let _ = lines.send(Err(err));
                return;
            }
        }
    }
}

impl DetectionSource for JsonLinesSource {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    fn next_evidence(&mut self) -> Result<Option<DetectionEvidence>> {
        loop {
            if self.stop_requested() {
                log::info!("evidence source {} stopped", self.origin);
                return Ok(None);
            }
            let line = match self.lines.recv_timeout(STOP_POLL) {
                Ok(line) => line.with_context(|| format!("failed to read {}", self.origin))?,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    log::info!(
                        "evidence source {} ended after {} frames ({} rejected lines)",
                        self.origin,
                        self.frames_read,
                        self.lines_rejected
                    );
                    return Ok(None);
                }
            };

            let text = match std::str::from_utf8(&line) {
                Ok(text) => text.trim(),
                Err(err) => {
                    self.reject(err);
                    continue;
                }
            };
            if text.is_empty() {
                continue;
            }

            match serde_json::from_str::<DetectionEvidence>(text) {
                Ok(evidence) => {
                    self.frames_read += 1;
                    return Ok(Some(evidence));
                }
                Err(err) => self.reject(err),
            }
        }
    }
}
