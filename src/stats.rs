//! Latency and throughput statistics for dispatched frames.
//!
//! Observability only: nothing here feeds back into admission decisions.

use anyhow::{Context, Result};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Samples accumulated before the latency counters start over.
pub const DEFAULT_STATS_WINDOW: u32 = 500;

/// Length of one FPS sampling interval.
pub const DEFAULT_FPS_INTERVAL: Duration = Duration::from_secs(1);

// ----------------------------------------------------------------------------
// LatencyStats
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Accumulator {
    total: Duration,
    min: Option<Duration>,
    max: Duration,
}

impl Accumulator {
    fn add(&mut self, sample: Duration) {
        self.total += sample;
        self.max = self.max.max(sample);
        self.min = Some(self.min.map_or(sample, |min| min.min(sample)));
    }

    fn summary(&self, runs: u32) -> LatencySummary {
        if runs == 0 {
            return LatencySummary::default();
        }
        LatencySummary {
            min: self.min.unwrap_or_default(),
            max: self.max,
            avg: self.total / runs,
        }
    }
}

/// min / max / average over the current window.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LatencySummary {
    pub min: Duration,
    pub max: Duration,
    pub avg: Duration,
}

/// Running frame and detector latency over a bounded window of samples.
///
/// Frame latency runs from submission to completion; detector latency from
/// dispatch to completion. Once `window` samples have been taken, the next
/// sample resets every accumulator before it is counted.
#[derive(Clone, Debug)]
pub struct LatencyStats {
    window: u32,
    runs: u32,
    frame: Accumulator,
    detector: Accumulator,
}

impl LatencyStats {
    pub fn new(window: u32) -> Self {
        Self {
            window: window.max(1),
            runs: 0,
            frame: Accumulator::default(),
            detector: Accumulator::default(),
        }
    }

    pub fn record(&mut self, frame_latency: Duration, detector_latency: Duration) {
        if self.runs >= self.window {
            self.reset();
        }
        self.runs += 1;
        self.frame.add(frame_latency);
        self.detector.add(detector_latency);
    }

    pub fn reset(&mut self) {
        self.runs = 0;
        self.frame = Accumulator::default();
        self.detector = Accumulator::default();
    }

    pub fn runs(&self) -> u32 {
        self.runs
    }

    pub fn frame_latency(&self) -> LatencySummary {
        self.frame.summary(self.runs)
    }

    pub fn detector_latency(&self) -> LatencySummary {
        self.detector.summary(self.runs)
    }
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self::new(DEFAULT_STATS_WINDOW)
    }
}

// ----------------------------------------------------------------------------
// FpsCounter
// ----------------------------------------------------------------------------

/// Completed frames per sampling interval.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FpsCounter {
    in_interval: u32,
    per_second: u32,
}

impl FpsCounter {
    /// Count one completed frame. Returns the count so far in this interval.
    pub fn record(&mut self) -> u32 {
        self.in_interval += 1;
        self.in_interval
    }

    /// Close the current interval.
    pub fn tick(&mut self) {
        self.per_second = self.in_interval;
        self.in_interval = 0;
    }

    pub fn frames_per_second(&self) -> u32 {
        self.per_second
    }

    pub fn frames_in_interval(&self) -> u32 {
        self.in_interval
    }
}

// ----------------------------------------------------------------------------
// Snapshot
// ----------------------------------------------------------------------------

/// Point-in-time copy of the controller's statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub runs: u32,
    pub frame_latency: LatencySummary,
    pub detector_latency: LatencySummary,
    pub frames_per_second: u32,
    pub frames_in_interval: u32,
}

impl StatsSnapshot {
    pub fn capture(latency: &LatencyStats, fps: &FpsCounter) -> Self {
        Self {
            runs: latency.runs(),
            frame_latency: latency.frame_latency(),
            detector_latency: latency.detector_latency(),
            frames_per_second: fps.frames_per_second(),
            frames_in_interval: fps.frames_in_interval(),
        }
    }
}

// ----------------------------------------------------------------------------
// FpsTicker
// ----------------------------------------------------------------------------

/// Background thread that calls `on_tick` once per interval until stopped.
pub struct FpsTicker {
    stop_tx: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl FpsTicker {
    pub fn spawn<F>(interval: Duration, mut on_tick: F) -> Result<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("fps-ticker".to_string())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => on_tick(),
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .context("failed to spawn fps ticker")?;
        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Stop ticking. Idempotent.
    pub fn stop(&mut self) {
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for FpsTicker {
    fn drop(&mut self) {
        self.stop();
    }
}
