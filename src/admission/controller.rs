use anyhow::Result;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use super::listener::TaskListener;
use super::slot::{Admission, AdmissionCounters, AdmissionSlot, AdmissionState, CompleteOutcome, Dispatch};
use super::task::{TaskId, TaskInfo, TaskOrigin};
use crate::detect::{Completion, DetectionError, Detector};
use crate::frame::{Frame, FrameMetadata};
use crate::stats::{
    FpsCounter, FpsTicker, LatencyStats, StatsSnapshot, DEFAULT_FPS_INTERVAL, DEFAULT_STATS_WINDOW,
};

/// Per-task callback for the still-image path. Invoked once, then discarded.
pub type StillCallback<T> = Box<dyn FnOnce(TaskId, Result<&T, &DetectionError>) + Send>;

/// Returns a directly processed frame's buffer to its producer.
pub type ReleaseHook = Box<dyn FnOnce() + Send>;

/// Tunables for a `FrameAdmissionController`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdmissionConfig {
    /// Latency samples kept before the counters start over.
    pub stats_window: u32,
    /// FPS sampling interval.
    pub fps_interval: Duration,
    /// Report queued frames replaced before dispatch via `on_superseded`.
    /// Off by default: superseded frames are dropped silently.
    pub notify_superseded: bool,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            stats_window: DEFAULT_STATS_WINDOW,
            fps_interval: DEFAULT_FPS_INTERVAL,
            notify_superseded: false,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn wait<'a, T>(condvar: &Condvar, guard: MutexGuard<'a, T>) -> MutexGuard<'a, T> {
    condvar.wait(guard).unwrap_or_else(PoisonError::into_inner)
}

// ----------------------------------------------------------------------------
// Delivery gate
// ----------------------------------------------------------------------------

/// Serializes listener callbacks against `stop`.
///
/// Callbacks run while a thread owns the gate, and `stop` waits for the
/// owner after raising the shutdown flag, so once `stop` returns no callback
/// is running and none will start. Threads queued for the gate give up as
/// soon as the flag is raised. The owning thread may re-enter (a listener
/// that submits or stops from inside a callback).
struct DeliveryGate {
    owner: Mutex<Option<ThreadId>>,
    released: Condvar,
}

struct GateRelease<'a>(&'a DeliveryGate);

impl Drop for GateRelease<'_> {
    fn drop(&mut self) {
        *lock(&self.0.owner) = None;
        self.0.released.notify_all();
    }
}

impl DeliveryGate {
    fn new() -> Self {
        Self {
            owner: Mutex::new(None),
            released: Condvar::new(),
        }
    }

    fn run(&self, shut_down: &AtomicBool, deliver: impl FnOnce()) {
        let me = thread::current().id();
        let mut owner = lock(&self.owner);
        if *owner == Some(me) {
            drop(owner);
            if !shut_down.load(Ordering::Acquire) {
                deliver();
            }
            return;
        }
        while owner.is_some() && !shut_down.load(Ordering::Acquire) {
            owner = wait(&self.released, owner);
        }
        if shut_down.load(Ordering::Acquire) {
            return;
        }
        *owner = Some(me);
        drop(owner);

        let _release = GateRelease(self);
        deliver();
    }

    /// Wake threads queued for the gate so they observe the shutdown flag.
    fn wake(&self) {
        let _owner = lock(&self.owner);
        self.released.notify_all();
    }

    /// Wait for a delivery on another thread to finish.
    fn wait_idle(&self) {
        let me = thread::current().id();
        let mut owner = lock(&self.owner);
        while matches!(*owner, Some(id) if id != me) {
            owner = wait(&self.released, owner);
        }
    }
}

// ----------------------------------------------------------------------------
// Dispatch tracker
// ----------------------------------------------------------------------------

/// Threads currently inside `Detector::detect`.
///
/// Entry is refused once the shutdown flag is up, and `stop` waits for every
/// entry held by another thread, so the detector is never called after
/// `stop` returns.
struct DispatchTracker {
    active: Mutex<Vec<ThreadId>>,
    idle: Condvar,
}

struct DispatchGuard<'a>(&'a DispatchTracker);

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        let me = thread::current().id();
        let mut active = lock(&self.0.active);
        if let Some(pos) = active.iter().rposition(|id| *id == me) {
            active.swap_remove(pos);
        }
        self.0.idle.notify_all();
    }
}

impl DispatchTracker {
    fn new() -> Self {
        Self {
            active: Mutex::new(Vec::new()),
            idle: Condvar::new(),
        }
    }

    fn enter(&self, shut_down: &AtomicBool) -> Option<DispatchGuard<'_>> {
        let mut active = lock(&self.active);
        if shut_down.load(Ordering::Acquire) {
            return None;
        }
        active.push(thread::current().id());
        Some(DispatchGuard(self))
    }

    fn wait_idle(&self) {
        let me = thread::current().id();
        let mut active = lock(&self.active);
        while active.iter().any(|id| *id != me) {
            active = wait(&self.idle, active);
        }
    }
}

// ----------------------------------------------------------------------------
// Controller
// ----------------------------------------------------------------------------

struct Telemetry {
    latency: LatencyStats,
    fps: FpsCounter,
}

struct InFlight {
    task_id: TaskId,
    origin: TaskOrigin,
    /// Dispatched from the admission slot; completion advances the queue.
    admitted: bool,
    metadata: FrameMetadata,
    submitted_at: Instant,
    dispatched_at: Instant,
}

struct Inner<D: Detector> {
    detector: Arc<D>,
    listener: Arc<dyn TaskListener<D::Output>>,
    notify_superseded: bool,
    slot: Mutex<AdmissionSlot>,
    telemetry: Arc<Mutex<Telemetry>>,
    still_callbacks: Mutex<HashMap<TaskId, StillCallback<D::Output>>>,
    gate: DeliveryGate,
    dispatches: DispatchTracker,
    shut_down: AtomicBool,
    ticker: Mutex<Option<FpsTicker>>,
}

/// Throttles a stream of frames against a slower asynchronous detector.
///
/// - At most one live detection is in flight.
/// - At most one frame waits behind it; a newer frame replaces it.
/// - A task's result reaches the listener before the next frame is dispatched.
/// - `stop` is terminal: later submissions are ignored and late results
///   suppressed. The detector stays owned by the caller.
///
/// Two paths skip admission: `process_still` for single images and
/// `process_direct` for producers that throttle themselves.
///
/// Handles are cheap to clone and can be shared between the camera thread
/// and whoever stops the pipeline.
pub struct FrameAdmissionController<D: Detector> {
    inner: Arc<Inner<D>>,
}

impl<D: Detector> Clone for FrameAdmissionController<D> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<D: Detector> FrameAdmissionController<D> {
    pub fn new(
        detector: Arc<D>,
        listener: Arc<dyn TaskListener<D::Output>>,
        config: AdmissionConfig,
    ) -> Result<Self> {
        let telemetry = Arc::new(Mutex::new(Telemetry {
            latency: LatencyStats::new(config.stats_window),
            fps: FpsCounter::default(),
        }));
        let ticking = telemetry.clone();
        let interval = config.fps_interval.max(Duration::from_millis(1));
        let ticker = FpsTicker::spawn(interval, move || lock(&ticking).fps.tick())?;

        log::info!(
            "admission controller started for detector {} (stats window {}, superseded notifications {})",
            detector.name(),
            config.stats_window,
            if config.notify_superseded { "on" } else { "off" }
        );

        Ok(Self {
            inner: Arc::new(Inner {
                detector,
                listener,
                notify_superseded: config.notify_superseded,
                slot: Mutex::new(AdmissionSlot::new()),
                telemetry,
                still_callbacks: Mutex::new(HashMap::new()),
                gate: DeliveryGate::new(),
                dispatches: DispatchTracker::new(),
                shut_down: AtomicBool::new(false),
                ticker: Mutex::new(Some(ticker)),
            }),
        })
    }

    /// Offer a live frame. Never blocks on detection and never fails.
    ///
    /// While a detection is in flight the frame replaces any queued one; the
    /// replaced frame is dropped without a result. After `stop` the frame is
    /// dropped and `Admission::Rejected` returned.
    pub fn submit(&self, frame: Frame) -> Admission {
        let outcome = lock(&self.inner.slot).submit(frame, Instant::now());
        if let Some(released) = outcome.released {
            if matches!(outcome.admission, Admission::Queued { replaced: true }) {
                self.inner.superseded(&released.frame.metadata);
            }
        }
        if let Some(dispatch) = outcome.dispatch {
            self.inner.dispatch(dispatch);
        }
        outcome.admission
    }

    /// Run detection on a single still image, bypassing admission.
    ///
    /// Still tasks are never dropped or queued and may overlap live
    /// detection. `on_done` is invoked once with the task's outcome, in
    /// addition to the controller's listener. Returns `None` after `stop`.
    pub fn process_still(
        &self,
        frame: Frame,
        on_done: Option<StillCallback<D::Output>>,
    ) -> Option<TaskId> {
        let submitted_at = Instant::now();
        let task_id = {
            let mut slot = lock(&self.inner.slot);
            let task_id = slot.allocate_task()?;
            if let Some(callback) = on_done {
                lock(&self.inner.still_callbacks).insert(task_id, callback);
            }
            task_id
        };
        let task = InFlight {
            task_id,
            origin: TaskOrigin::Still,
            admitted: false,
            metadata: frame.metadata,
            submitted_at,
            dispatched_at: Instant::now(),
        };
        self.inner.start_detection(task, Arc::new(frame), None);
        Some(task_id)
    }

    /// Dispatch a live frame straight to the detector, bypassing the slot.
    ///
    /// For producers that hold back their next frame until the current one
    /// is released, so throttling happens upstream. Results go to the
    /// listener as `TaskOrigin::Live` and count towards the statistics.
    /// `on_release` always runs exactly once: after the result is delivered,
    /// when the result is suppressed by `stop`, or immediately when the
    /// controller is already stopped (then `None` is returned).
    pub fn process_direct(
        &self,
        frame: Frame,
        on_release: Option<ReleaseHook>,
    ) -> Option<TaskId> {
        let submitted_at = Instant::now();
        let allocated = lock(&self.inner.slot).allocate_task();
        let Some(task_id) = allocated else {
            log::trace!("frame #{} released unprocessed after shutdown", frame.sequence());
            drop(frame);
            if let Some(release) = on_release {
                release();
            }
            return None;
        };
        let task = InFlight {
            task_id,
            origin: TaskOrigin::Live,
            admitted: false,
            metadata: frame.metadata,
            submitted_at,
            dispatched_at: Instant::now(),
        };
        self.inner.start_detection(task, Arc::new(frame), on_release);
        Some(task_id)
    }

    /// Shut down. Idempotent.
    ///
    /// Drops any queued frame, suppresses results of detections still in
    /// flight, resets latency statistics and stops the FPS ticker. When this
    /// returns no listener callback is running or will run, and the detector
    /// is not being called and will not be called again. The detector itself
    /// is not touched; release it after stopping.
    pub fn stop(&self) {
        let first = !self.inner.shut_down.swap(true, Ordering::AcqRel);
        let released = lock(&self.inner.slot).stop();
        drop(released);
        self.inner.gate.wake();
        self.inner.gate.wait_idle();
        self.inner.dispatches.wait_idle();
        if !first {
            return;
        }

        lock(&self.inner.telemetry).latency.reset();
        lock(&self.inner.still_callbacks).clear();
        let ticker = lock(&self.inner.ticker).take();
        if let Some(mut ticker) = ticker {
            ticker.stop();
        }
        log::info!(
            "admission controller stopped for detector {}",
            self.inner.detector.name()
        );
    }

    pub fn state(&self) -> AdmissionState {
        lock(&self.inner.slot).state()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.is_shut_down()
    }

    pub fn counters(&self) -> AdmissionCounters {
        lock(&self.inner.slot).counters()
    }

    pub fn stats(&self) -> StatsSnapshot {
        let telemetry = lock(&self.inner.telemetry);
        StatsSnapshot::capture(&telemetry.latency, &telemetry.fps)
    }

    pub fn detector(&self) -> &Arc<D> {
        &self.inner.detector
    }
}

impl<D: Detector> Inner<D> {
    fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    fn superseded(&self, metadata: &FrameMetadata) {
        log::trace!("frame #{} superseded before dispatch", metadata.sequence);
        if self.notify_superseded {
            self.gate
                .run(&self.shut_down, || self.listener.on_superseded(metadata));
        }
    }

    fn dispatch(self: &Arc<Self>, dispatch: Dispatch) {
        let Dispatch {
            task_id,
            frame,
            submitted_at,
            dispatched_at,
        } = dispatch;
        let task = InFlight {
            task_id,
            origin: TaskOrigin::Live,
            admitted: true,
            metadata: frame.metadata,
            submitted_at,
            dispatched_at,
        };
        self.start_detection(task, frame, None);
    }

    fn start_detection(
        self: &Arc<Self>,
        task: InFlight,
        frame: Arc<Frame>,
        on_release: Option<ReleaseHook>,
    ) {
        let task_id = task.task_id;
        log::trace!(
            "dispatching task {} ({:?}) for frame #{}",
            task_id,
            task.origin,
            task.metadata.sequence
        );
        let weak: Weak<Self> = Arc::downgrade(self);
        let completion = Completion::new(move |result| {
            if let Some(inner) = weak.upgrade() {
                inner.finish(task, result);
            }
            if let Some(release) = on_release {
                release();
            }
        });

        match self.dispatches.enter(&self.shut_down) {
            Some(_guard) => self.detector.detect(frame, completion),
            None => {
                // Stopped between allocation and dispatch: the completion
                // reports `Abandoned`, which is suppressed, and the frame is released.
                log::debug!("task {} not dispatched after shutdown", task_id);
                drop(frame);
                drop(completion);
            }
        }
    }

    fn finish(self: &Arc<Self>, task: InFlight, result: Result<D::Output, DetectionError>) {
        if self.is_shut_down() {
            log::debug!("ignoring result for task {} after shutdown", task.task_id);
            return;
        }

        let now = Instant::now();
        let info = TaskInfo {
            task_id: task.task_id,
            origin: task.origin,
            metadata: task.metadata,
            frame_latency: now.saturating_duration_since(task.submitted_at),
            detector_latency: now.saturating_duration_since(task.dispatched_at),
        };
        let still_callback = match task.origin {
            TaskOrigin::Still => lock(&self.still_callbacks).remove(&task.task_id),
            TaskOrigin::Live => None,
        };

        match &result {
            Ok(output) => {
                self.record_success(&info);
                self.gate.run(&self.shut_down, || {
                    self.listener.on_success(&info, output);
                    if let Some(callback) = still_callback {
                        callback(info.task_id, Ok(output));
                    }
                });
            }
            Err(error) => {
                log::warn!("task {} failed: {}", info.task_id, error);
                self.gate.run(&self.shut_down, || {
                    self.listener.on_failure(&info, error);
                    if let Some(callback) = still_callback {
                        callback(info.task_id, Err(error));
                    }
                });
            }
        }

        if task.admitted {
            let next = lock(&self.slot).complete(task.task_id, Instant::now());
            match next {
                CompleteOutcome::Next(dispatch) => self.dispatch(dispatch),
                CompleteOutcome::Idle => log::trace!("admission idle"),
                CompleteOutcome::Ignored => {}
            }
        }
    }

    fn record_success(&self, info: &TaskInfo) {
        let mut telemetry = lock(&self.telemetry);
        // Checked under the telemetry lock so a reset in `stop` cannot be undone.
        if self.is_shut_down() {
            return;
        }
        telemetry
            .latency
            .record(info.frame_latency, info.detector_latency);

        // Log once per interval: on the first frame completed in it.
        if telemetry.fps.record() == 1 {
            let frame = telemetry.latency.frame_latency();
            let detector = telemetry.latency.detector_latency();
            log::debug!("num of runs: {}", telemetry.latency.runs());
            log::debug!(
                "frame latency: max={:?}, min={:?}, avg={:?}",
                frame.max,
                frame.min,
                frame.avg
            );
            log::debug!(
                "detector latency: max={:?}, min={:?}, avg={:?}",
                detector.max,
                detector.min,
                detector.avg
            );
        }
    }
}
