use anyhow::Result;

use crate::detect::evidence::DetectionEvidence;

/// Supplier of per-frame detection evidence.
///
/// The live detector (model inference, camera decoding) sits behind this trait so the
/// decision logic can be driven by explicit evidence. Sources may block until the next
/// frame is available and may pace themselves to a frame rate.
pub trait DetectionSource: Send {
    /// Source identifier for logs.
    fn name(&self) -> &'static str;

    /// Evidence for the next frame. `Ok(None)` means the source is exhausted.
    fn next_evidence(&mut self) -> Result<Option<DetectionEvidence>>;
}

impl<S: DetectionSource + ?Sized> DetectionSource for Box<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn next_evidence(&mut self) -> Result<Option<DetectionEvidence>> {
        (**self).next_evidence()
    }
}
