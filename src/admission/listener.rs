use std::fmt::Debug;
use std::sync::mpsc;

use super::task::TaskInfo;
use crate::detect::DetectionError;
use crate::frame::FrameMetadata;

/// Receives results for dispatched frames.
///
/// Each dispatched task produces exactly one `on_success` or `on_failure`,
/// unless the controller was stopped first. Callbacks run on whatever
/// thread completed the detection. They may call `submit` and `stop`.
pub trait TaskListener<T>: Send + Sync {
    fn on_success(&self, task: &TaskInfo, result: &T);

    fn on_failure(&self, task: &TaskInfo, error: &DetectionError) {
        let _ = (task, error);
    }

    /// A queued frame was replaced before dispatch. Only called when the
    /// controller is configured with `notify_superseded`.
    fn on_superseded(&self, metadata: &FrameMetadata) {
        let _ = metadata;
    }
}

/// Result delivered through a `ChannelListener`.
#[derive(Clone, Debug, PartialEq)]
pub enum TaskEvent<T> {
    Succeeded { task: TaskInfo, result: T },
    Failed { task: TaskInfo, error: DetectionError },
    Superseded { metadata: FrameMetadata },
}

/// Forwards every callback as a `TaskEvent` over a channel.
pub struct ChannelListener<T> {
    tx: mpsc::Sender<TaskEvent<T>>,
}

impl<T> ChannelListener<T> {
    pub fn new() -> (Self, mpsc::Receiver<TaskEvent<T>>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }
}

impl<T: Clone + Send> TaskListener<T> for ChannelListener<T> {
    fn on_success(&self, task: &TaskInfo, result: &T) {
        // A dropped receiver means nobody is listening any more.
        let _ = self.tx.send(TaskEvent::Succeeded {
            task: *task,
            result: result.clone(),
        });
    }

    fn on_failure(&self, task: &TaskInfo, error: &DetectionError) {
        let _ = self.tx.send(TaskEvent::Failed {
            task: *task,
            error: error.clone(),
        });
    }

    fn on_superseded(&self, metadata: &FrameMetadata) {
        let _ = self.tx.send(TaskEvent::Superseded {
            metadata: *metadata,
        });
    }
}

/// Logs each result. Useful when only the side effects of detection matter.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogListener;

impl<T: Debug> TaskListener<T> for LogListener {
    fn on_success(&self, task: &TaskInfo, result: &T) {
        log::debug!(
            "task {} ({:?}, frame #{}) succeeded in {:?}: {:?}",
            task.task_id,
            task.origin,
            task.metadata.sequence,
            task.frame_latency,
            result
        );
    }

    fn on_failure(&self, task: &TaskInfo, error: &DetectionError) {
        log::warn!(
            "task {} ({:?}, frame #{}) failed: {}",
            task.task_id,
            task.origin,
            task.metadata.sequence,
            error
        );
    }

    fn on_superseded(&self, metadata: &FrameMetadata) {
        log::trace!("frame #{} superseded before dispatch", metadata.sequence);
    }
}
