use anyhow::{anyhow, Result};
use rand::Rng;
use std::time::Duration;

use crate::detect::backend::{DetectionCapability, DetectorBackend};
use crate::detect::result::{BoundingBox, Detection, DetectionResult, TextBlock};
use crate::frame::Frame;

/// Deterministic stand-in for an on-device recognizer.
///
/// Every call sleeps for the configured latency (plus optional jitter) and
/// reports one labelled object and one text block naming the frame. Calls
/// that land on the `fail_every` cadence return an error instead.
pub struct ScriptedBackend {
    latency: Duration,
    jitter: Duration,
    fail_every: Option<u64>,
    label: String,
    calls: u64,
}

impl ScriptedBackend {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            jitter: Duration::ZERO,
            fail_every: None,
            label: "object".to_string(),
            calls: 0,
        }
    }

    /// Fail every `n`th call. `0` disables failures.
    pub fn with_fail_every(mut self, n: u64) -> Self {
        self.fail_every = (n > 0).then_some(n);
        self
    }

    /// Add up to `jitter` of random extra latency per call.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }

    fn delay(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.latency;
        }
        self.latency + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        matches!(
            capability,
            DetectionCapability::ObjectDetection | DetectionCapability::TextRecognition
        )
    }

    fn detect(&mut self, frame: &Frame) -> Result<DetectionResult> {
        self.calls += 1;
        let delay = self.delay();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        if self.fail_every.is_some_and(|n| self.calls % n == 0) {
            return Err(anyhow!(
                "scripted failure on call {} (frame #{})",
                self.calls,
                frame.sequence()
            ));
        }

        let bounds = BoundingBox {
            x: 0.25,
            y: 0.25,
            w: 0.5,
            h: 0.5,
        };
        Ok(DetectionResult {
            detections: vec![Detection {
                bounds,
                label: self.label.clone(),
                confidence: 0.9,
            }],
            text_blocks: vec![TextBlock {
                bounds,
                text: format!("frame #{}", frame.sequence()),
            }],
        })
    }
}
