//! Frame admission and backpressure.
//!
//! Frames arrive faster than the detector can consume them. The controller
//! keeps at most one detection in flight and at most one frame queued behind
//! it; a newer frame replaces the queued one, so the detector always picks up
//! the freshest frame once it is free.
//!
//! - `slot`: the admission state machine, free of locks and threads.
//! - `controller`: `FrameAdmissionController`, the locked shell that dispatches
//!   to a `Detector` and delivers results to a `TaskListener`.
//! - `listener`: result delivery (trait, channel adapter, log adapter).

mod controller;
mod listener;
mod slot;
mod task;

pub use controller::{AdmissionConfig, FrameAdmissionController, ReleaseHook, StillCallback};
pub use listener::{ChannelListener, LogListener, TaskEvent, TaskListener};
pub use slot::{Admission, AdmissionCounters, AdmissionState};
pub use task::{TaskId, TaskInfo, TaskOrigin};
