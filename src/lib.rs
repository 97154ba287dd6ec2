//! Frame admission kernel for on-device vision pipelines.
//!
//! Cameras deliver frames faster than recognizers consume them. This crate
//! sits between the two and decides which frames reach the detector:
//!
//! 1. **One in flight**: at most one live detection runs at a time.
//! 2. **Latest wins**: while busy, a new frame replaces the queued one.
//! 3. **Strict sequencing**: a task's result is delivered before the next
//!    frame is dispatched.
//! 4. **Terminal stop**: after `stop` nothing is dispatched and late
//!    results are suppressed.
//!
//! # Module Structure
//!
//! - `frame`: Frames and capture metadata
//! - `admission`: `FrameAdmissionController`, listeners, task ids
//! - `detect`: Detector seams, backends, registry, worker-thread adapter
//! - `stats`: Latency window and FPS counter
//! - `ingest`: Synthetic frame source
//! - `config`: File + env configuration for the demo pipeline
//! - `ui`: Progress output for the demo binary

pub mod admission;
pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod stats;
pub mod ui;

pub use admission::{
    Admission, AdmissionConfig, AdmissionCounters, AdmissionState, ChannelListener,
    FrameAdmissionController, LogListener, ReleaseHook, StillCallback, TaskEvent, TaskId,
    TaskInfo, TaskListener, TaskOrigin,
};
pub use detect::{
    BackendRegistry, BoundingBox, Completion, Detection, DetectionCapability, DetectionError,
    DetectionResult, Detector, DetectorBackend, MotionBackend, ScriptedBackend, TextBlock,
    ThreadedDetector,
};
pub use frame::{Frame, FrameMetadata, PixelFormat, Rotation};
pub use ingest::{SourceConfig, SyntheticSource};
pub use stats::{FpsCounter, LatencyStats, LatencySummary, StatsSnapshot};
