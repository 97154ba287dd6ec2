use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread;
use std::time::{Duration, Instant};

use vision_admission::{
    Admission, AdmissionConfig, AdmissionState, ChannelListener, Completion, DetectionError,
    DetectionResult, Detector, Frame, FrameAdmissionController, FrameMetadata, PixelFormat,
    ReleaseHook, Rotation, ScriptedBackend, StillCallback, TaskEvent, TaskId, TaskInfo,
    TaskListener, TaskOrigin, ThreadedDetector,
};

fn frame(sequence: u64) -> Frame {
    let metadata = FrameMetadata {
        width: 2,
        height: 2,
        rotation: Rotation::Deg90,
        format: PixelFormat::Gray8,
        source_timestamp: Duration::from_millis(sequence * 33),
        sequence,
    };
    Frame::new(vec![sequence as u8; 4], metadata).unwrap()
}

/// Detector whose results are produced by the test, one call at a time.
#[derive(Default)]
struct ManualDetector {
    pending: Mutex<VecDeque<(Arc<Frame>, Completion<u64>)>>,
}

impl ManualDetector {
    fn pending_sequences(&self) -> Vec<u64> {
        self.pending
            .lock()
            .unwrap()
            .iter()
            .map(|(frame, _)| frame.sequence())
            .collect()
    }

    /// Remove the pending detection for `sequence`. Never holds the lock
    /// while the caller completes it.
    fn take(&self, sequence: u64) -> Completion<u64> {
        let mut pending = self.pending.lock().unwrap();
        let index = pending
            .iter()
            .position(|(frame, _)| frame.sequence() == sequence)
            .unwrap_or_else(|| panic!("frame #{} is not pending", sequence));
        pending.remove(index).unwrap().1
    }

    fn succeed(&self, sequence: u64) {
        self.take(sequence).succeed(sequence);
    }
}

impl Detector for ManualDetector {
    type Output = u64;

    fn name(&self) -> &str {
        "manual"
    }

    fn detect(&self, frame: Arc<Frame>, completion: Completion<u64>) {
        self.pending.lock().unwrap().push_back((frame, completion));
    }
}

struct Harness {
    controller: FrameAdmissionController<ManualDetector>,
    detector: Arc<ManualDetector>,
    events: Receiver<TaskEvent<u64>>,
}

fn harness(config: AdmissionConfig) -> Harness {
    let detector = Arc::new(ManualDetector::default());
    let (listener, events) = ChannelListener::new();
    let controller =
        FrameAdmissionController::new(detector.clone(), Arc::new(listener), config).unwrap();
    Harness {
        controller,
        detector,
        events,
    }
}

fn drain(events: &Receiver<TaskEvent<u64>>) -> Vec<TaskEvent<u64>> {
    events.try_iter().collect()
}

fn succeeded(event: &TaskEvent<u64>) -> (u64, u64) {
    match event {
        TaskEvent::Succeeded { task, result } => (task.task_id.get(), *result),
        other => panic!("expected success, got {:?}", other),
    }
}

#[test]
fn latest_frame_replaces_queued_frame() {
    let h = harness(AdmissionConfig::default());

    assert!(matches!(h.controller.submit(frame(1)), Admission::Dispatched(id) if id.get() == 1));
    assert_eq!(h.controller.submit(frame(2)), Admission::Queued { replaced: false });
    assert_eq!(h.controller.submit(frame(3)), Admission::Queued { replaced: true });
    assert_eq!(h.detector.pending_sequences(), vec![1]);

    h.detector.succeed(1);
    assert_eq!(h.detector.pending_sequences(), vec![3]);
    h.detector.succeed(3);

    let events = drain(&h.events);
    let delivered: Vec<_> = events.iter().map(succeeded).collect();
    assert_eq!(delivered, vec![(1, 1), (2, 3)]);
    assert_eq!(h.controller.state(), AdmissionState::Idle);

    let counters = h.controller.counters();
    assert_eq!(counters.submitted, 3);
    assert_eq!(counters.dispatched, 2);
    assert_eq!(counters.superseded, 1);
}

#[test]
fn result_is_delivered_before_next_dispatch() {
    struct Recorder {
        detector: Arc<ManualDetector>,
        pending_at_delivery: Mutex<Vec<Vec<u64>>>,
    }
    impl TaskListener<u64> for Recorder {
        fn on_success(&self, _task: &TaskInfo, _result: &u64) {
            self.pending_at_delivery
                .lock()
                .unwrap()
                .push(self.detector.pending_sequences());
        }
    }

    let detector = Arc::new(ManualDetector::default());
    let recorder = Arc::new(Recorder {
        detector: detector.clone(),
        pending_at_delivery: Mutex::new(Vec::new()),
    });
    let controller = FrameAdmissionController::new(
        detector.clone(),
        recorder.clone(),
        AdmissionConfig::default(),
    )
    .unwrap();

    controller.submit(frame(1));
    controller.submit(frame(2));
    detector.succeed(1);

    // Frame 2 had not been dispatched while frame 1's result was delivered.
    assert_eq!(*recorder.pending_at_delivery.lock().unwrap(), vec![Vec::<u64>::new()]);
    assert_eq!(detector.pending_sequences(), vec![2]);
    controller.stop();
}

#[test]
fn stop_suppresses_in_flight_result_and_drops_queue() {
    let h = harness(AdmissionConfig::default());
    h.controller.submit(frame(1));
    h.controller.submit(frame(2));

    h.controller.stop();
    assert_eq!(h.controller.state(), AdmissionState::ShutDown);

    h.detector.succeed(1);
    assert!(drain(&h.events).is_empty());
    assert!(h.detector.pending_sequences().is_empty());

    assert_eq!(h.controller.submit(frame(4)), Admission::Rejected);
    assert!(h.detector.pending_sequences().is_empty());
    assert_eq!(h.controller.state(), AdmissionState::ShutDown);
    assert_eq!(h.controller.counters().rejected, 1);
}

#[test]
fn stop_is_idempotent() {
    let h = harness(AdmissionConfig::default());
    h.controller.stop();
    h.controller.stop();
    assert!(h.controller.is_shut_down());
    assert_eq!(h.controller.state(), AdmissionState::ShutDown);
}

#[test]
fn stop_before_any_frame_rejects_everything() {
    let h = harness(AdmissionConfig::default());
    h.controller.stop();
    assert_eq!(h.controller.submit(frame(1)), Admission::Rejected);
    assert!(h.controller.process_still(frame(2), None).is_none());
    assert!(h.detector.pending_sequences().is_empty());
}

#[test]
fn failure_is_reported_and_queue_advances() {
    let h = harness(AdmissionConfig::default());
    h.controller.submit(frame(1));
    h.controller.submit(frame(2));

    h.detector
        .take(1)
        .fail(DetectionError::Backend("model not loaded".into()));

    match drain(&h.events).as_slice() {
        [TaskEvent::Failed { task, error }] => {
            assert_eq!(task.task_id.get(), 1);
            assert_eq!(task.metadata.sequence, 1);
            assert_eq!(*error, DetectionError::Backend("model not loaded".into()));
        }
        other => panic!("unexpected events {:?}", other),
    }
    assert_eq!(h.detector.pending_sequences(), vec![2]);
    assert_eq!(h.controller.stats().runs, 0);
}

#[test]
fn abandoned_completion_counts_as_failure() {
    let h = harness(AdmissionConfig::default());
    h.controller.submit(frame(1));
    h.controller.submit(frame(2));

    drop(h.detector.take(1));

    match drain(&h.events).as_slice() {
        [TaskEvent::Failed { error, .. }] => assert_eq!(*error, DetectionError::Abandoned),
        other => panic!("unexpected events {:?}", other),
    }
    assert_eq!(h.detector.pending_sequences(), vec![2]);
}

#[test]
fn drains_to_idle_after_burst() {
    let h = harness(AdmissionConfig::default());
    for seq in 0..10 {
        h.controller.submit(frame(seq));
    }
    h.detector.succeed(0);
    h.detector.succeed(9);
    assert_eq!(h.controller.state(), AdmissionState::Idle);

    // Idle again: the next frame goes straight out.
    assert!(matches!(h.controller.submit(frame(10)), Admission::Dispatched(id) if id.get() == 3));
}

#[test]
fn still_images_bypass_admission() {
    let h = harness(AdmissionConfig::default());
    h.controller.submit(frame(1));

    let (tx, still_rx) = mpsc::channel();
    let on_done: StillCallback<u64> = Box::new(
        move |task_id: TaskId, result: Result<&u64, &DetectionError>| {
            tx.send((task_id.get(), result.map(|v| *v).map_err(Clone::clone)))
                .unwrap();
        },
    );
    let still_id = h.controller.process_still(frame(10), Some(on_done)).unwrap();
    assert_eq!(still_id.get(), 2);
    assert!(h.controller.process_still(frame(11), None).is_some());

    // Live frame 1 and both stills are in flight together.
    assert_eq!(h.detector.pending_sequences(), vec![1, 10, 11]);
    assert_eq!(h.controller.submit(frame(2)), Admission::Queued { replaced: false });

    h.detector.succeed(10);
    assert_eq!(still_rx.try_recv().unwrap(), (2, Ok(10)));
    match drain(&h.events).as_slice() {
        [TaskEvent::Succeeded { task, result: 10 }] => assert_eq!(task.origin, TaskOrigin::Still),
        other => panic!("unexpected events {:?}", other),
    }
    // Completing a still never advances the live queue.
    assert_eq!(h.detector.pending_sequences(), vec![1, 11]);

    h.detector.succeed(1);
    assert_eq!(h.detector.pending_sequences(), vec![11, 2]);
    h.detector.succeed(11);
    h.detector.succeed(2);
    assert_eq!(h.controller.state(), AdmissionState::Idle);
}

#[test]
fn stop_discards_pending_still_callbacks() {
    let h = harness(AdmissionConfig::default());
    let (tx, still_rx) = mpsc::channel::<u64>();
    let on_done: StillCallback<u64> = Box::new(
        move |task_id: TaskId, _result: Result<&u64, &DetectionError>| {
            tx.send(task_id.get()).unwrap();
        },
    );
    h.controller.process_still(frame(1), Some(on_done)).unwrap();

    h.controller.stop();
    h.detector.succeed(1);

    assert_eq!(still_rx.try_recv(), Err(TryRecvError::Disconnected));
    assert!(drain(&h.events).is_empty());
}

#[test]
fn superseded_frames_are_silent_by_default() {
    let h = harness(AdmissionConfig::default());
    for seq in 1..=3 {
        h.controller.submit(frame(seq));
    }
    assert!(drain(&h.events).is_empty());
}

#[test]
fn superseded_frames_are_reported_when_enabled() {
    let h = harness(AdmissionConfig {
        notify_superseded: true,
        ..AdmissionConfig::default()
    });
    for seq in 1..=4 {
        h.controller.submit(frame(seq));
    }
    let superseded: Vec<u64> = drain(&h.events)
        .into_iter()
        .map(|event| match event {
            TaskEvent::Superseded { metadata } => metadata.sequence,
            other => panic!("unexpected event {:?}", other),
        })
        .collect();
    assert_eq!(superseded, vec![2, 3]);
}

#[test]
fn task_info_carries_frame_metadata_and_latency() {
    let h = harness(AdmissionConfig::default());
    h.controller.submit(frame(7));
    thread::sleep(Duration::from_millis(5));
    h.detector.succeed(7);

    match drain(&h.events).as_slice() {
        [TaskEvent::Succeeded { task, .. }] => {
            assert_eq!(task.origin, TaskOrigin::Live);
            assert_eq!(task.metadata.rotation, Rotation::Deg90);
            assert_eq!(task.metadata.source_timestamp, Duration::from_millis(231));
            assert!(task.frame_latency >= Duration::from_millis(5));
            assert!(task.frame_latency >= task.detector_latency);
        }
        other => panic!("unexpected events {:?}", other),
    }
}

#[test]
fn stats_count_successes_and_reset_on_stop() {
    let h = harness(AdmissionConfig::default());
    for seq in 0..3 {
        h.controller.submit(frame(seq));
        h.detector.succeed(seq);
    }
    let stats = h.controller.stats();
    assert_eq!(stats.runs, 3);
    assert!(stats.frame_latency.max >= stats.frame_latency.min);

    h.controller.stop();
    assert_eq!(h.controller.stats().runs, 0);
}

#[test]
fn listener_may_stop_from_callback() {
    struct StopOnFirst {
        controller: OnceLock<FrameAdmissionController<ManualDetector>>,
        seen: AtomicU64,
    }
    impl TaskListener<u64> for StopOnFirst {
        fn on_success(&self, _task: &TaskInfo, _result: &u64) {
            self.seen.fetch_add(1, Ordering::SeqCst);
            if let Some(controller) = self.controller.get() {
                controller.stop();
            }
        }
    }

    let detector = Arc::new(ManualDetector::default());
    let listener = Arc::new(StopOnFirst {
        controller: OnceLock::new(),
        seen: AtomicU64::new(0),
    });
    let controller = FrameAdmissionController::new(
        detector.clone(),
        listener.clone(),
        AdmissionConfig::default(),
    )
    .unwrap();
    let _ = listener.controller.set(controller.clone());

    controller.submit(frame(1));
    controller.submit(frame(2));
    detector.succeed(1);

    assert_eq!(listener.seen.load(Ordering::SeqCst), 1);
    assert!(detector.pending_sequences().is_empty());
    assert_eq!(controller.state(), AdmissionState::ShutDown);
}

#[test]
fn listener_may_submit_from_callback() {
    struct Resubmit {
        controller: OnceLock<FrameAdmissionController<ManualDetector>>,
        admissions: Mutex<Vec<Admission>>,
    }
    impl TaskListener<u64> for Resubmit {
        fn on_success(&self, _task: &TaskInfo, result: &u64) {
            if let Some(controller) = self.controller.get() {
                let admission = controller.submit(frame(result + 100));
                self.admissions.lock().unwrap().push(admission);
            }
        }
    }

    let detector = Arc::new(ManualDetector::default());
    let listener = Arc::new(Resubmit {
        controller: OnceLock::new(),
        admissions: Mutex::new(Vec::new()),
    });
    let controller = FrameAdmissionController::new(
        detector.clone(),
        listener.clone(),
        AdmissionConfig::default(),
    )
    .unwrap();
    let _ = listener.controller.set(controller.clone());

    controller.submit(frame(1));
    detector.succeed(1);

    // Submitted while task 1 was still being delivered, so it queued.
    assert_eq!(
        *listener.admissions.lock().unwrap(),
        vec![Admission::Queued { replaced: false }]
    );
    assert_eq!(detector.pending_sequences(), vec![101]);
    controller.stop();
}

/// Runs each detection on its own thread and records peak concurrency.
struct SpawningDetector {
    latency: Duration,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Detector for SpawningDetector {
    type Output = u64;

    fn name(&self) -> &str {
        "spawning"
    }

    fn detect(&self, frame: Arc<Frame>, completion: Completion<u64>) {
        let latency = self.latency;
        let active = self.active.clone();
        let peak = self.peak.clone();
        thread::spawn(move || {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(latency);
            active.fetch_sub(1, Ordering::SeqCst);
            completion.succeed(frame.sequence());
        });
    }
}

#[derive(Default)]
struct Collect {
    delivered: Mutex<Vec<(u64, u64)>>,
}

impl TaskListener<u64> for Collect {
    fn on_success(&self, task: &TaskInfo, result: &u64) {
        self.delivered
            .lock()
            .unwrap()
            .push((task.task_id.get(), *result));
    }
}

fn wait_idle<D: Detector>(controller: &FrameAdmissionController<D>) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while controller.state() != AdmissionState::Idle {
        assert!(Instant::now() < deadline, "controller never went idle");
        thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn fast_source_never_overlaps_live_detections() {
    let peak = Arc::new(AtomicUsize::new(0));
    let detector = Arc::new(SpawningDetector {
        latency: Duration::from_millis(3),
        active: Arc::new(AtomicUsize::new(0)),
        peak: peak.clone(),
    });
    let listener = Arc::new(Collect::default());
    let controller =
        FrameAdmissionController::new(detector, listener.clone(), AdmissionConfig::default())
            .unwrap();

    for seq in 0..100 {
        controller.submit(frame(seq));
        thread::sleep(Duration::from_micros(300));
    }
    wait_idle(&controller);

    assert_eq!(peak.load(Ordering::SeqCst), 1);

    let delivered = listener.delivered.lock().unwrap().clone();
    assert!(delivered.windows(2).all(|w| w[0].0 < w[1].0 && w[0].1 < w[1].1));
    assert_eq!(delivered.last().map(|d| d.1), Some(99));

    let counters = controller.counters();
    assert_eq!(counters.submitted, 100);
    assert_eq!(counters.dispatched, delivered.len() as u64);
    assert_eq!(counters.submitted, counters.dispatched + counters.superseded);
    assert!(counters.superseded > 0);
    controller.stop();
}

#[test]
fn threaded_backend_end_to_end() {
    let detector = Arc::new(
        ThreadedDetector::new(ScriptedBackend::new(Duration::from_millis(2)).with_fail_every(4))
            .unwrap(),
    );
    let (listener, events) = ChannelListener::<DetectionResult>::new();
    let controller =
        FrameAdmissionController::new(detector.clone(), Arc::new(listener), AdmissionConfig::default())
            .unwrap();

    for seq in 0..30 {
        controller.submit(frame(seq));
        thread::sleep(Duration::from_micros(500));
    }
    wait_idle(&controller);
    controller.stop();

    let events: Vec<_> = events.try_iter().collect();
    assert_eq!(events.len() as u64, controller.counters().dispatched);
    let failures = events
        .iter()
        .filter(|e| matches!(e, TaskEvent::Failed { error: DetectionError::Backend(_), .. }))
        .count();
    assert_eq!(failures, events.len() / 4);
    for event in &events {
        if let TaskEvent::Succeeded { task, result } = event {
            assert_eq!(
                result.text_blocks[0].text,
                format!("frame #{}", task.metadata.sequence)
            );
        }
    }

    // The detector outlives the controller and is released by its owner.
    drop(controller);
    drop(detector);
}

#[test]
fn stop_waits_for_callback_on_another_thread() {
    struct BlockingListener {
        entered: Mutex<mpsc::Sender<u64>>,
        resume: Mutex<Receiver<()>>,
        delivered: AtomicU64,
    }
    impl TaskListener<u64> for BlockingListener {
        fn on_success(&self, task: &TaskInfo, _result: &u64) {
            self.delivered.fetch_add(1, Ordering::SeqCst);
            let _ = self.entered.lock().unwrap().send(task.task_id.get());
            let _ = self
                .resume
                .lock()
                .unwrap()
                .recv_timeout(Duration::from_secs(10));
        }
    }

    let (entered_tx, entered_rx) = mpsc::channel();
    let (resume_tx, resume_rx) = mpsc::channel();
    let detector = Arc::new(ManualDetector::default());
    let listener = Arc::new(BlockingListener {
        entered: Mutex::new(entered_tx),
        resume: Mutex::new(resume_rx),
        delivered: AtomicU64::new(0),
    });
    let controller = FrameAdmissionController::new(
        detector.clone(),
        listener.clone(),
        AdmissionConfig::default(),
    )
    .unwrap();

    controller.submit(frame(1));
    controller.process_still(frame(2), None).unwrap();

    let completing = {
        let detector = detector.clone();
        thread::spawn(move || detector.succeed(1))
    };
    assert_eq!(entered_rx.recv_timeout(Duration::from_secs(5)).unwrap(), 1);

    let (stopped_tx, stopped_rx) = mpsc::channel();
    let stopping = {
        let controller = controller.clone();
        thread::spawn(move || {
            controller.stop();
            stopped_tx.send(()).unwrap();
        })
    };

    // The callback is still running, so stop must not have returned.
    assert_eq!(
        stopped_rx.recv_timeout(Duration::from_millis(100)),
        Err(mpsc::RecvTimeoutError::Timeout)
    );
    resume_tx.send(()).unwrap();
    stopped_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    stopping.join().unwrap();
    completing.join().unwrap();

    // A result arriving after stop returned is not delivered.
    detector.succeed(2);
    assert_eq!(listener.delivered.load(Ordering::SeqCst), 1);
    assert!(entered_rx.try_recv().is_err());
    assert_eq!(controller.state(), AdmissionState::ShutDown);
}

/// Holds inside `detect` long enough for `stop` to run concurrently.
struct SlowDispatch {
    entered: Mutex<Option<mpsc::Sender<()>>>,
    hold: Duration,
    finished: AtomicBool,
    pending: Mutex<Vec<Completion<u64>>>,
}

impl Detector for SlowDispatch {
    type Output = u64;

    fn name(&self) -> &str {
        "slow-dispatch"
    }

    fn detect(&self, _frame: Arc<Frame>, completion: Completion<u64>) {
        if let Some(tx) = self.entered.lock().unwrap().take() {
            let _ = tx.send(());
        }
        thread::sleep(self.hold);
        self.finished.store(true, Ordering::SeqCst);
        self.pending.lock().unwrap().push(completion);
    }
}

#[test]
fn stop_waits_for_detect_call_in_progress() {
    let (entered_tx, entered_rx) = mpsc::channel();
    let detector = Arc::new(SlowDispatch {
        entered: Mutex::new(Some(entered_tx)),
        hold: Duration::from_millis(50),
        finished: AtomicBool::new(false),
        pending: Mutex::new(Vec::new()),
    });
    let controller = FrameAdmissionController::new(
        detector.clone(),
        Arc::new(Collect::default()),
        AdmissionConfig::default(),
    )
    .unwrap();

    let submitting = {
        let controller = controller.clone();
        thread::spawn(move || controller.submit(frame(1)))
    };
    entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    controller.stop();
    // The detector may be released now: nothing is still inside it.
    assert!(detector.finished.load(Ordering::SeqCst));
    assert!(matches!(submitting.join().unwrap(), Admission::Dispatched(_)));
}

/// Counts `detect` calls made after the test marked the controller stopped.
#[derive(Default)]
struct LateCallCounter {
    stopped: AtomicBool,
    late: AtomicUsize,
}

impl Detector for LateCallCounter {
    type Output = u64;

    fn name(&self) -> &str {
        "late-call-counter"
    }

    fn detect(&self, frame: Arc<Frame>, completion: Completion<u64>) {
        if self.stopped.load(Ordering::SeqCst) {
            self.late.fetch_add(1, Ordering::SeqCst);
        }
        completion.succeed(frame.sequence());
    }
}

#[test]
fn stop_races_with_submitting_thread() {
    for round in 0..200u32 {
        let detector = Arc::new(LateCallCounter::default());
        let controller = FrameAdmissionController::new(
            detector.clone(),
            Arc::new(Collect::default()),
            AdmissionConfig::default(),
        )
        .unwrap();

        let submitting = {
            let controller = controller.clone();
            thread::spawn(move || {
                for seq in 0..50 {
                    controller.submit(frame(seq));
                    controller.process_direct(frame(1000 + seq), None);
                }
            })
        };
        for _ in 0..(round % 7) {
            thread::yield_now();
        }
        controller.stop();
        detector.stopped.store(true, Ordering::SeqCst);
        submitting.join().unwrap();

        assert_eq!(
            detector.late.load(Ordering::SeqCst),
            0,
            "detect called after stop returned (round {})",
            round
        );
    }
}

fn release_counter() -> (Arc<AtomicUsize>, impl Fn() -> ReleaseHook) {
    let released = Arc::new(AtomicUsize::new(0));
    let counter = released.clone();
    let hook = move || -> ReleaseHook {
        let counter = counter.clone();
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    };
    (released, hook)
}

#[test]
fn direct_frames_skip_the_slot() {
    let h = harness(AdmissionConfig::default());
    let (released, hook) = release_counter();

    let first = h.controller.process_direct(frame(1), Some(hook())).unwrap();
    let second = h.controller.process_direct(frame(2), Some(hook())).unwrap();
    assert_eq!((first.get(), second.get()), (1, 2));
    // Nothing replaced, nothing queued: both reach the detector.
    assert_eq!(h.detector.pending_sequences(), vec![1, 2]);
    assert_eq!(h.controller.state(), AdmissionState::Idle);

    h.detector.succeed(2);
    assert_eq!(released.load(Ordering::SeqCst), 1);
    h.detector
        .take(1)
        .fail(DetectionError::Backend("camera buffer lost".into()));
    assert_eq!(released.load(Ordering::SeqCst), 2);

    match drain(&h.events).as_slice() {
        [TaskEvent::Succeeded { task: ok, result: 2 }, TaskEvent::Failed { task: failed, .. }] => {
            assert_eq!((ok.task_id.get(), ok.origin), (2, TaskOrigin::Live));
            assert_eq!((failed.task_id.get(), failed.origin), (1, TaskOrigin::Live));
        }
        other => panic!("unexpected events {:?}", other),
    }
    assert_eq!(h.controller.stats().runs, 1);
    assert_eq!(h.controller.counters().dispatched, 0);
}

#[test]
fn direct_frames_share_task_ids_with_queued_frames() {
    let h = harness(AdmissionConfig::default());
    assert!(matches!(h.controller.submit(frame(1)), Admission::Dispatched(id) if id.get() == 1));
    assert_eq!(h.controller.process_direct(frame(2), None).map(TaskId::get), Some(2));
    assert_eq!(h.controller.submit(frame(3)), Admission::Queued { replaced: false });

    // Completing a direct frame leaves the queued frame waiting.
    h.detector.succeed(2);
    assert_eq!(h.detector.pending_sequences(), vec![1]);
    h.detector.succeed(1);
    assert_eq!(h.detector.pending_sequences(), vec![3]);
}

#[test]
fn direct_release_runs_even_after_stop() {
    let Harness {
        controller,
        detector,
        events,
    } = harness(AdmissionConfig::default());
    let (released, hook) = release_counter();

    controller.process_direct(frame(1), Some(hook())).unwrap();
    controller.process_direct(frame(2), Some(hook())).unwrap();
    controller.stop();

    detector.succeed(1);
    assert_eq!(released.load(Ordering::SeqCst), 1);
    assert!(drain(&events).is_empty());

    assert!(controller.process_direct(frame(3), Some(hook())).is_none());
    assert_eq!(released.load(Ordering::SeqCst), 2);
    assert_eq!(detector.pending_sequences(), vec![2]);

    // Even with every controller handle gone.
    drop(controller);
    detector.succeed(2);
    assert_eq!(released.load(Ordering::SeqCst), 3);
}
