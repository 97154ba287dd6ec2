use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::admission::AdmissionConfig;
use crate::frame::{PixelFormat, Rotation};
use crate::ingest::SourceConfig;
use crate::stats::{DEFAULT_FPS_INTERVAL, DEFAULT_STATS_WINDOW};

const DEFAULT_BACKEND: &str = "scripted";
const DEFAULT_DETECT_LATENCY_MS: u64 = 80;

#[derive(Debug, Deserialize, Default)]
struct DemoConfigFile {
    source: Option<SourceConfigFile>,
    detector: Option<DetectorConfigFile>,
    admission: Option<AdmissionConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    format: Option<String>,
    rotation: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    latency_ms: Option<u64>,
    jitter_ms: Option<u64>,
    fail_every: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct AdmissionConfigFile {
    stats_window: Option<u32>,
    fps_interval_ms: Option<u64>,
    notify_superseded: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemoConfig {
    pub source: SourceConfig,
    pub detector: DetectorSettings,
    pub admission: AdmissionConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorSettings {
    /// Registered backend name.
    pub backend: String,
    pub latency: Duration,
    pub jitter: Duration,
    /// Fail every Nth detection; 0 never fails.
    pub fail_every: u64,
}

impl DemoConfig {
    /// Load from the file named by `VISION_CONFIG` (if set), then apply env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("VISION_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    /// Load from an explicit file (if given), then apply env overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: DemoConfigFile) -> Result<Self> {
        let source_file = file.source.unwrap_or_default();
        let defaults = SourceConfig::default();
        let source = SourceConfig {
            target_fps: source_file.fps.unwrap_or(defaults.target_fps),
            width: source_file.width.unwrap_or(defaults.width),
            height: source_file.height.unwrap_or(defaults.height),
            format: match source_file.format.as_deref() {
                Some(name) => PixelFormat::parse(name)?,
                None => defaults.format,
            },
            rotation: match source_file.rotation {
                Some(degrees) => Rotation::from_degrees(degrees)?,
                None => defaults.rotation,
            },
        };

        let detector_file = file.detector.unwrap_or_default();
        let detector = DetectorSettings {
            backend: detector_file
                .backend
                .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
            latency: Duration::from_millis(
                detector_file
                    .latency_ms
                    .unwrap_or(DEFAULT_DETECT_LATENCY_MS),
            ),
            jitter: Duration::from_millis(detector_file.jitter_ms.unwrap_or(0)),
            fail_every: detector_file.fail_every.unwrap_or(0),
        };

        let admission_file = file.admission.unwrap_or_default();
        let admission = AdmissionConfig {
            stats_window: admission_file.stats_window.unwrap_or(DEFAULT_STATS_WINDOW),
            fps_interval: admission_file
                .fps_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_FPS_INTERVAL),
            notify_superseded: admission_file.notify_superseded.unwrap_or(false),
        };

        Ok(Self {
            source,
            detector,
            admission,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(backend) = std::env::var("VISION_BACKEND") {
            if !backend.trim().is_empty() {
                self.detector.backend = backend.trim().to_string();
            }
        }
        if let Ok(fps) = std::env::var("VISION_SOURCE_FPS") {
            self.source.target_fps = fps
                .trim()
                .parse()
                .map_err(|_| anyhow!("VISION_SOURCE_FPS must be an integer"))?;
        }
        if let Ok(latency) = std::env::var("VISION_DETECT_LATENCY_MS") {
            let ms: u64 = latency
                .trim()
                .parse()
                .map_err(|_| anyhow!("VISION_DETECT_LATENCY_MS must be an integer number of milliseconds"))?;
            self.detector.latency = Duration::from_millis(ms);
        }
        if let Ok(flag) = std::env::var("VISION_NOTIFY_SUPERSEDED") {
            self.admission.notify_superseded = parse_bool(&flag).ok_or_else(|| {
                anyhow!("VISION_NOTIFY_SUPERSEDED must be true/false/1/0")
            })?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.source.target_fps == 0 {
            return Err(anyhow!("source fps must be greater than zero"));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source frame size must be non-zero"));
        }
        if self.detector.backend.is_empty() {
            return Err(anyhow!("detector backend must be named"));
        }
        self.detector.backend = self.detector.backend.to_lowercase();
        if self.admission.stats_window == 0 {
            return Err(anyhow!("stats window must be greater than zero"));
        }
        if self.admission.fps_interval.is_zero() {
            return Err(anyhow!("fps interval must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<DemoConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
