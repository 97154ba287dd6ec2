use anyhow::{anyhow, Context, Result};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use super::backend::{Detector, DetectorBackend};
use super::completion::Completion;
use super::error::DetectionError;
use super::registry::SharedBackend;
use super::result::DetectionResult;
use crate::frame::Frame;

struct Job {
    frame: Arc<Frame>,
    completion: Completion<DetectionResult>,
}

/// Runs a synchronous `DetectorBackend` on a dedicated worker thread.
///
/// Jobs are handed over a channel, so `detect` returns immediately and the
/// completion fires on the worker thread. Dropping the detector closes the
/// channel; the worker finishes the job in hand and exits.
pub struct ThreadedDetector {
    name: String,
    jobs: Mutex<Option<mpsc::Sender<Job>>>,
    worker: Option<JoinHandle<()>>,
}

impl ThreadedDetector {
    /// Take ownership of a backend and start its worker.
    pub fn new<B: DetectorBackend + 'static>(backend: B) -> Result<Self> {
        Self::spawn(Arc::new(Mutex::new(backend)))
    }

    /// Start a worker for a backend shared with a `BackendRegistry`.
    pub fn spawn(backend: SharedBackend) -> Result<Self> {
        let name = {
            let mut guard = backend
                .lock()
                .map_err(|_| anyhow!("backend lock poisoned"))?;
            guard
                .warm_up()
                .with_context(|| format!("warm-up failed for backend {}", guard.name()))?;
            guard.name().to_string()
        };

        let (tx, rx) = mpsc::channel::<Job>();
        let worker = thread::Builder::new()
            .name(format!("detector-{}", name))
            .spawn(move || run_worker(backend, rx))
            .context("failed to spawn detector worker")?;
        log::debug!("detector worker started for backend {}", name);

        Ok(Self {
            name,
            jobs: Mutex::new(Some(tx)),
            worker: Some(worker),
        })
    }
}

fn run_worker(backend: SharedBackend, jobs: mpsc::Receiver<Job>) {
    for job in jobs {
        let result = match backend.lock() {
            Ok(mut guard) => guard.detect(&job.frame).map_err(DetectionError::backend),
            Err(_) => Err(DetectionError::Poisoned),
        };
        // Release the frame before reporting, so a superseded frame is not
        // kept alive by the next dispatch.
        drop(job.frame);
        job.completion.complete(result);
    }
}

impl Detector for ThreadedDetector {
    type Output = DetectionResult;

    fn name(&self) -> &str {
        &self.name
    }

    fn detect(&self, frame: Arc<Frame>, completion: Completion<DetectionResult>) {
        let job = Job { frame, completion };
        let sent = match self.jobs.lock() {
            Ok(guard) => match guard.as_ref() {
                Some(tx) => tx.send(job).map_err(|err| err.0),
                None => Err(job),
            },
            Err(_) => Err(job),
        };
        if let Err(job) = sent {
            job.completion.fail(DetectionError::Backend(format!(
                "detector worker {} is not running",
                self.name
            )));
        }
    }
}

impl Drop for ThreadedDetector {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.jobs.lock() {
            guard.take();
        }
        if let Some(worker) = self.worker.take() {
            // The last handle may be released from a completion on the worker itself.
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
        log::debug!("detector worker stopped for backend {}", self.name);
    }
}
