//! Captured frames and their metadata.
//!
//! - `Frame`: immutable pixel buffer plus capture metadata. Bytes are private.
//! - `FrameMetadata`: dimensions, rotation, pixel format, source timestamp, sequence.
//!
//! A frame is created by a source, handed to the admission controller, and
//! released either when a newer frame supersedes it or when its detection
//! completes. The controller shares frames with detectors as `Arc<Frame>`.

use anyhow::{anyhow, Result};
use std::time::{Duration, Instant};
use zeroize::Zeroize;

// ----------------------------------------------------------------------------
// Metadata
// ----------------------------------------------------------------------------

/// Pixel layout of a frame buffer.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUV 4:2:0, interleaved VU plane (camera preview default).
    Nv21,
    /// YUV 4:2:0, planar.
    Yv12,
    Rgb8,
    Gray8,
}

impl PixelFormat {
    /// Number of bytes a `width` x `height` frame occupies in this format.
    pub fn expected_len(self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            PixelFormat::Nv21 | PixelFormat::Yv12 => pixels + 2 * (pixels / 4),
            PixelFormat::Rgb8 => pixels * 3,
            PixelFormat::Gray8 => pixels,
        }
    }

    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "nv21" => Ok(PixelFormat::Nv21),
            "yv12" => Ok(PixelFormat::Yv12),
            "rgb8" | "rgb" => Ok(PixelFormat::Rgb8),
            "gray8" | "gray" => Ok(PixelFormat::Gray8),
            other => Err(anyhow!("unknown pixel format '{}'", other)),
        }
    }
}

/// Clockwise rotation needed to display the frame upright.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn from_degrees(degrees: u32) -> Result<Self> {
        match degrees {
            0 => Ok(Rotation::Deg0),
            90 => Ok(Rotation::Deg90),
            180 => Ok(Rotation::Deg180),
            270 => Ok(Rotation::Deg270),
            other => Err(anyhow!("rotation must be a multiple of 90, got {}", other)),
        }
    }

    pub fn degrees(self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }
}

/// Capture metadata. Copied freely; listeners receive it with every result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameMetadata {
    pub width: u32,
    pub height: u32,
    pub rotation: Rotation,
    pub format: PixelFormat,
    /// Capture time relative to the source's own epoch.
    pub source_timestamp: Duration,
    /// Source-assigned frame counter.
    pub sequence: u64,
}

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// One captured frame. There is no `Clone`; share it through `Arc<Frame>`.
pub struct Frame {
    /// Private pixel data, read-only once captured.
    pixels: Vec<u8>,
    pub metadata: FrameMetadata,
    /// Monotonic instant the frame entered the process.
    captured_at: Instant,
}

impl Frame {
    /// Build a frame, validating dimensions against the pixel format.
    pub fn new(pixels: Vec<u8>, metadata: FrameMetadata) -> Result<Self> {
        if metadata.width == 0 || metadata.height == 0 {
            return Err(anyhow!(
                "frame dimensions must be non-zero ({}x{})",
                metadata.width,
                metadata.height
            ));
        }
        let expected = metadata
            .format
            .expected_len(metadata.width, metadata.height);
        if pixels.len() != expected {
            return Err(anyhow!(
                "{:?} frame {}x{} needs {} bytes, got {}",
                metadata.format,
                metadata.width,
                metadata.height,
                expected,
                pixels.len()
            ));
        }
        Ok(Self {
            pixels,
            metadata,
            captured_at: Instant::now(),
        })
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn width(&self) -> u32 {
        self.metadata.width
    }

    pub fn height(&self) -> u32 {
        self.metadata.height
    }

    pub fn sequence(&self) -> u64 {
        self.metadata.sequence
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Pixel content stays out of logs.
        f.debug_struct("Frame")
            .field("metadata", &self.metadata)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        self.pixels.zeroize();
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
