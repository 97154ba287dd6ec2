use std::fmt;
use std::time::Duration;

use crate::frame::FrameMetadata;

/// Correlates a dispatched frame with its result. Starts at 1 and only grows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) const fn new(id: u64) -> Self {
        TaskId(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which path dispatched a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskOrigin {
    /// Live stream, subject to admission.
    Live,
    /// Single still image, never dropped.
    Still,
}

/// Everything a listener learns about a finished task besides its result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskInfo {
    pub task_id: TaskId,
    pub origin: TaskOrigin,
    pub metadata: FrameMetadata,
    /// Submission to completion.
    pub frame_latency: Duration,
    /// Dispatch to completion.
    pub detector_latency: Duration,
}
