use std::sync::Arc;
use std::time::Instant;

use super::task::TaskId;
use crate::frame::Frame;

/// Observable admission state.
///
/// A frame submitted while idle is dispatched before `submit` returns, so
/// there is no observable "queued but idle" state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdmissionState {
    /// Nothing queued, nothing in flight.
    Idle,
    /// One detection in flight, zero or one frame queued behind it.
    Detecting,
    /// Terminal. Submissions are ignored and late results suppressed.
    ShutDown,
}

/// What happened to a submitted frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Handed to the detector immediately.
    Dispatched(TaskId),
    /// Waiting behind the in-flight detection. `replaced` is true when an
    /// older queued frame was dropped to make room.
    Queued { replaced: bool },
    /// The controller is shut down; the frame was dropped.
    Rejected,
}

/// Lifetime totals for the live path.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AdmissionCounters {
    pub submitted: u64,
    pub dispatched: u64,
    pub superseded: u64,
    pub rejected: u64,
}

/// A frame accepted but not yet dispatched.
pub(crate) struct QueuedFrame {
    pub frame: Frame,
    pub submitted_at: Instant,
}

/// A frame leaving the slot for the detector.
pub(crate) struct Dispatch {
    pub task_id: TaskId,
    pub frame: Arc<Frame>,
    pub submitted_at: Instant,
    pub dispatched_at: Instant,
}

pub(crate) struct SubmitOutcome {
    pub admission: Admission,
    pub dispatch: Option<Dispatch>,
    /// Frame dropped by this submission (displaced or rejected). Drop it outside the lock.
    pub released: Option<QueuedFrame>,
}

#[derive(Debug)]
pub(crate) enum CompleteOutcome {
    /// The queued frame goes out next.
    Next(Dispatch),
    /// Nothing queued; the slot is idle again.
    Idle,
    /// Shut down, or not the task in flight. State untouched.
    Ignored,
}

impl std::fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatch")
            .field("task_id", &self.task_id)
            .field("sequence", &self.frame.sequence())
            .finish()
    }
}

/// Admission state machine.
///
/// Holds the queued frame and the id of the in-flight task. Every method is
/// a single transition; callers serialize access with a lock and perform
/// dispatch and delivery after releasing it.
pub(crate) struct AdmissionSlot {
    queued: Option<QueuedFrame>,
    in_flight: Option<TaskId>,
    shut_down: bool,
    last_task_id: u64,
    counters: AdmissionCounters,
}

impl AdmissionSlot {
    pub fn new() -> Self {
        Self {
            queued: None,
            in_flight: None,
            shut_down: false,
            last_task_id: 0,
            counters: AdmissionCounters::default(),
        }
    }

    pub fn state(&self) -> AdmissionState {
        if self.shut_down {
            AdmissionState::ShutDown
        } else if self.in_flight.is_some() {
            AdmissionState::Detecting
        } else {
            AdmissionState::Idle
        }
    }

    pub fn counters(&self) -> AdmissionCounters {
        self.counters
    }

    fn next_task_id(&mut self) -> TaskId {
        self.last_task_id += 1;
        TaskId::new(self.last_task_id)
    }

    pub fn submit(&mut self, frame: Frame, now: Instant) -> SubmitOutcome {
        if self.shut_down {
            self.counters.rejected += 1;
            return SubmitOutcome {
                admission: Admission::Rejected,
                dispatch: None,
                released: Some(QueuedFrame {
                    frame,
                    submitted_at: now,
                }),
            };
        }
        self.counters.submitted += 1;

        let incoming = QueuedFrame {
            frame,
            submitted_at: now,
        };
        if self.in_flight.is_some() {
            let superseded = self.queued.replace(incoming);
            if superseded.is_some() {
                self.counters.superseded += 1;
            }
            return SubmitOutcome {
                admission: Admission::Queued {
                    replaced: superseded.is_some(),
                },
                dispatch: None,
                released: superseded,
            };
        }

        let dispatch = self.start(incoming, now);
        SubmitOutcome {
            admission: Admission::Dispatched(dispatch.task_id),
            dispatch: Some(dispatch),
            released: None,
        }
    }

    pub fn complete(&mut self, task_id: TaskId, now: Instant) -> CompleteOutcome {
        if self.shut_down || self.in_flight != Some(task_id) {
            return CompleteOutcome::Ignored;
        }
        self.in_flight = None;
        match self.queued.take() {
            Some(next) => CompleteOutcome::Next(self.start(next, now)),
            None => CompleteOutcome::Idle,
        }
    }

    /// Enter the terminal state. Returns the queued frame, if any, for release.
    pub fn stop(&mut self) -> Option<QueuedFrame> {
        self.shut_down = true;
        self.in_flight = None;
        self.queued.take()
    }

    /// Id for a task that bypasses the queue (still image or direct live frame).
    pub fn allocate_task(&mut self) -> Option<TaskId> {
        if self.shut_down {
            return None;
        }
        Some(self.next_task_id())
    }

    fn start(&mut self, queued: QueuedFrame, now: Instant) -> Dispatch {
        let task_id = self.next_task_id();
        self.in_flight = Some(task_id);
        self.counters.dispatched += 1;
        Dispatch {
            task_id,
            frame: Arc::new(queued.frame),
            submitted_at: queued.submitted_at,
            dispatched_at: now,
        }
    }
}
