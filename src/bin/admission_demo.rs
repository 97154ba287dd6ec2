//! admission_demo - synthetic camera feeding a slow detector through the admission controller
//!
//! This binary:
//! 1. Loads configuration (file via --config or VISION_CONFIG, env overrides, flags)
//! 2. Registers the bundled backends and runs the selected one (by name, or by
//!    capability with --capability) on a worker thread
//! 3. Runs one still-image detection
//! 4. Streams synthetic frames at the source rate until the duration ends or Ctrl-C,
//!    through the admission slot or, with --direct, straight to the detector
//! 5. Drains the in-flight detection, stops the controller, then releases the detector

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use vision_admission::config::{DemoConfig, DetectorSettings};
use vision_admission::ui::Ui;
use vision_admission::{
    AdmissionState, BackendRegistry, DetectionCapability, DetectionError, DetectionResult,
    Detector, FrameAdmissionController, FrameMetadata, MotionBackend, ReleaseHook,
    ScriptedBackend, StillCallback, SyntheticSource, TaskId, TaskInfo, TaskListener,
    ThreadedDetector,
};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// JSON config file (overrides VISION_CONFIG).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Duration of the run in seconds.
    #[arg(long, default_value_t = 5)]
    seconds: u64,
    /// Source frames per second.
    #[arg(long)]
    fps: Option<u32>,
    /// Detector backend (scripted, motion).
    #[arg(long)]
    backend: Option<String>,
    /// Pick the backend by capability (text, objects, motion) instead of by name.
    #[arg(long)]
    capability: Option<String>,
    /// Scripted backend latency per detection, in milliseconds.
    #[arg(long)]
    latency_ms: Option<u64>,
    /// Make the scripted backend fail every Nth detection.
    #[arg(long)]
    fail_every: Option<u64>,
    /// Report frames replaced before dispatch.
    #[arg(long)]
    notify_superseded: bool,
    /// Dispatch every frame directly; the source withholds new frames until
    /// the previous one is released.
    #[arg(long)]
    direct: bool,
    /// Output style: auto, plain, pretty.
    #[arg(long)]
    ui: Option<String>,
}

#[derive(Default)]
struct DemoListener {
    succeeded: AtomicU64,
    failed: AtomicU64,
    superseded: AtomicU64,
}

impl TaskListener<DetectionResult> for DemoListener {
    fn on_success(&self, task: &TaskInfo, result: &DetectionResult) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        let labels: Vec<&str> = result
            .detections
            .iter()
            .map(|d| d.label.as_str())
            .collect();
        log::debug!(
            "task {} frame #{}: {:?} in {:?} (detector {:?})",
            task.task_id,
            task.metadata.sequence,
            labels,
            task.frame_latency,
            task.detector_latency
        );
    }

    fn on_failure(&self, task: &TaskInfo, error: &DetectionError) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        log::warn!(
            "task {} frame #{} failed: {}",
            task.task_id,
            task.metadata.sequence,
            error
        );
    }

    fn on_superseded(&self, metadata: &FrameMetadata) {
        self.superseded.fetch_add(1, Ordering::Relaxed);
        log::trace!("frame #{} superseded", metadata.sequence);
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = match args.config.as_deref() {
        Some(path) => DemoConfig::load_from(Some(path))?,
        None => DemoConfig::load()?,
    };
    apply_args(&mut cfg, &args)?;

    let registry = build_registry(&cfg.detector)?;
    let backend = match args.capability.as_deref() {
        Some(name) => registry.backend_for_capability(DetectionCapability::parse(name)?)?,
        None => registry
            .default_backend()
            .ok_or_else(|| anyhow!("no detector backend registered"))?,
    };
    let detector = Arc::new(ThreadedDetector::spawn(backend)?);
    log::info!(
        "backends: {} (using {})",
        registry.list().join(", "),
        detector.name()
    );

    let listener = Arc::new(DemoListener::default());
    let controller =
        FrameAdmissionController::new(detector.clone(), listener.clone(), cfg.admission.clone())?;

    let mut source = SyntheticSource::new(cfg.source.clone())?;
    source.connect()?;

    run_still(&controller, &mut source)?;

    let running = Arc::new(AtomicBool::new(true));
    let signal = running.clone();
    ctrlc::set_handler(move || signal.store(false, Ordering::SeqCst))
        .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let total_frames = args.seconds.saturating_mul(cfg.source.target_fps as u64);
    let ui = Ui::from_args(args.ui.as_deref(), std::io::stderr().is_terminal());
    let mut progress = ui.run_progress(total_frames);

    // Direct mode: the source holds a single buffer, like a camera analysis
    // stream that stalls until the previous image is closed.
    let buffer_busy = Arc::new(AtomicBool::new(false));
    let mut withheld = 0u64;

    let interval = source.frame_interval();
    let mut next_at = Instant::now();
    for produced in 1..=total_frames {
        if !running.load(Ordering::SeqCst) {
            log::info!("interrupted after {} frames", produced - 1);
            break;
        }
        let frame = source.next_frame()?;
        if args.direct {
            if buffer_busy.swap(true, Ordering::AcqRel) {
                withheld += 1;
            } else {
                let busy = buffer_busy.clone();
                let release: ReleaseHook = Box::new(move || busy.store(false, Ordering::Release));
                controller.process_direct(frame, Some(release));
            }
        } else {
            controller.submit(frame);
        }
        progress.update(produced, &controller.counters(), &controller.stats());

        next_at += interval;
        let now = Instant::now();
        if next_at > now {
            std::thread::sleep(next_at - now);
        }
    }

    let deadline = Instant::now() + DRAIN_TIMEOUT;
    while (controller.state() == AdmissionState::Detecting || buffer_busy.load(Ordering::Acquire))
        && Instant::now() < deadline
    {
        std::thread::sleep(Duration::from_millis(5));
    }

    let counters = controller.counters();
    let stats = controller.stats();
    controller.stop();
    progress.finish(&counters, &stats);

    log::info!(
        "frames: produced={} submitted={} dispatched={} superseded={}",
        source.stats().frames_produced,
        counters.submitted,
        counters.dispatched,
        counters.superseded
    );
    if args.direct {
        log::info!("direct mode: {} frames withheld by the source", withheld);
    }
    log::info!(
        "results: succeeded={} failed={} superseded notifications={}",
        listener.succeeded.load(Ordering::Relaxed),
        listener.failed.load(Ordering::Relaxed),
        listener.superseded.load(Ordering::Relaxed)
    );
    log::info!(
        "frame latency: min={:?} max={:?} avg={:?} over {} runs",
        stats.frame_latency.min,
        stats.frame_latency.max,
        stats.frame_latency.avg,
        stats.runs
    );

    // The detector belongs to us, not the controller: release it after stop.
    drop(controller);
    drop(detector);
    Ok(())
}

fn apply_args(cfg: &mut DemoConfig, args: &Args) -> Result<()> {
    if let Some(fps) = args.fps {
        if fps == 0 {
            return Err(anyhow!("fps must be >= 1"));
        }
        cfg.source.target_fps = fps;
    }
    if let Some(backend) = &args.backend {
        cfg.detector.backend = backend.to_lowercase();
    }
    if let Some(latency_ms) = args.latency_ms {
        cfg.detector.latency = Duration::from_millis(latency_ms);
    }
    if let Some(fail_every) = args.fail_every {
        cfg.detector.fail_every = fail_every;
    }
    if args.notify_superseded {
        cfg.admission.notify_superseded = true;
    }
    Ok(())
}

fn build_registry(settings: &DetectorSettings) -> Result<BackendRegistry> {
    let mut registry = BackendRegistry::new();
    registry.register(
        ScriptedBackend::new(settings.latency)
            .with_jitter(settings.jitter)
            .with_fail_every(settings.fail_every),
    );
    registry.register(MotionBackend::new());
    registry.set_default(&settings.backend)?;
    Ok(registry)
}

fn run_still(
    controller: &FrameAdmissionController<ThreadedDetector>,
    source: &mut SyntheticSource,
) -> Result<()> {
    let (tx, rx) = mpsc::channel();
    let on_done: StillCallback<DetectionResult> = Box::new(
        move |task_id: TaskId, result: Result<&DetectionResult, &DetectionError>| {
            let summary = match result {
                Ok(result) => format!("{} detections", result.detections.len()),
                Err(error) => format!("failed: {}", error),
            };
            let _ = tx.send((task_id, summary));
        },
    );
    let task_id = controller
        .process_still(source.next_frame()?, Some(on_done))
        .ok_or_else(|| anyhow!("controller stopped before still image"))?;
    match rx.recv_timeout(DRAIN_TIMEOUT) {
        Ok((done, summary)) => log::info!("still image task {}: {}", done, summary),
        Err(_) => log::warn!("still image task {} did not finish in time", task_id),
    }
    Ok(())
}
