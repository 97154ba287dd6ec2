use anyhow::{anyhow, Result};
use std::sync::Arc;

use super::completion::Completion;
use super::result::DetectionResult;
use crate::frame::Frame;

/// Detection capabilities a backend can offer.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectionCapability {
    TextRecognition,
    ObjectDetection,
    Motion,
}

impl DetectionCapability {
    /// Parse a capability name as used on the command line.
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "text" | "ocr" | "text-recognition" => Ok(DetectionCapability::TextRecognition),
            "object" | "objects" | "object-detection" => Ok(DetectionCapability::ObjectDetection),
            "motion" => Ok(DetectionCapability::Motion),
            other => Err(anyhow!("unknown detection capability: {}", other)),
        }
    }
}

/// Asynchronous detector, as seen by the admission controller.
///
/// `detect` starts work and returns without waiting for it. The outcome is
/// reported through `completion`, from any thread. The detector is owned by
/// the caller, which releases it after stopping the controller.
pub trait Detector: Send + Sync + 'static {
    type Output: Send + 'static;

    /// Detector identifier, used in logs.
    fn name(&self) -> &str;

    /// Begin detection on `frame`.
    fn detect(&self, frame: Arc<Frame>, completion: Completion<Self::Output>);
}

/// Synchronous detector backend.
///
/// Backends see the frame only for the duration of `detect`. Wrap one in
/// `ThreadedDetector` to run it off the caller's thread.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Returns true when the backend supports a capability.
    fn supports(&self, capability: DetectionCapability) -> bool;

    /// Run detection on a frame.
    fn detect(&mut self, frame: &Frame) -> Result<DetectionResult>;

    /// Optional warm-up hook, run once before the first detection.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
