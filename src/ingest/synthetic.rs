//! Synthetic camera source.
//!
//! Produces frames of the configured size and pixel format with a pattern
//! that drifts every frame and jumps every 50 frames, simulating a scene with
//! occasional changes. Timestamps advance by exactly one frame interval, so
//! runs are reproducible. Pacing is left to the caller.

use anyhow::{anyhow, Result};
use std::time::Duration;

use crate::frame::{Frame, FrameMetadata, PixelFormat, Rotation};

/// Configuration for a synthetic source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceConfig {
    /// Frames per second the source pretends to capture at.
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub rotation: Rotation,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            target_fps: 30,
            width: 640,
            height: 480,
            format: PixelFormat::Nv21,
            rotation: Rotation::Deg0,
        }
    }
}

/// Statistics for a synthetic source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SourceStats {
    pub frames_produced: u64,
}

pub struct SyntheticSource {
    config: SourceConfig,
    frame_count: u64,
    /// Simulated scene, bumped every 50 frames.
    scene_state: u8,
}

impl SyntheticSource {
    pub fn new(config: SourceConfig) -> Result<Self> {
        if config.target_fps == 0 {
            return Err(anyhow!("target_fps must be >= 1"));
        }
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!(
                "frame size must be non-zero ({}x{})",
                config.width,
                config.height
            ));
        }
        Ok(Self {
            config,
            frame_count: 0,
            scene_state: 0,
        })
    }

    /// Synthetic sources are always connected.
    pub fn connect(&mut self) -> Result<()> {
        log::info!(
            "SyntheticSource: {}x{} {:?} at {} fps",
            self.config.width,
            self.config.height,
            self.config.format,
            self.config.target_fps
        );
        Ok(())
    }

    /// Time between consecutive frames at the target rate.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.config.target_fps
    }

    pub fn next_frame(&mut self) -> Result<Frame> {
        let sequence = self.frame_count;
        self.frame_count += 1;
        if sequence > 0 && sequence % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }

        let metadata = FrameMetadata {
            width: self.config.width,
            height: self.config.height,
            rotation: self.config.rotation,
            format: self.config.format,
            source_timestamp: self.frame_interval() * sequence as u32,
            sequence,
        };
        Frame::new(self.generate_pixels(sequence), metadata)
    }

    fn generate_pixels(&self, sequence: u64) -> Vec<u8> {
        let len = self
            .config
            .format
            .expected_len(self.config.width, self.config.height);
        let offset = sequence + self.scene_state as u64 * 97;
        (0..len)
            .map(|i| ((i as u64 + offset) % 256) as u8)
            .collect()
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            frames_produced: self.frame_count,
        }
    }
}
