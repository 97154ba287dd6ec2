use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

use crate::admission::AdmissionCounters;
use crate::stats::StatsSnapshot;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

/// Terminal presentation for the demo: a live progress line on a TTY,
/// periodic plain lines otherwise.
#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        Self { mode, is_tty }
    }

    pub fn from_args(ui_flag: Option<&str>, is_tty: bool) -> Self {
        let mode = match ui_flag {
            Some("plain") => UiMode::Plain,
            Some("pretty") => UiMode::Pretty,
            _ => UiMode::Auto,
        };
        Self::new(mode, is_tty)
    }

    fn use_pretty(&self) -> bool {
        self.is_tty && self.mode != UiMode::Plain
    }

    /// Start a progress display for a run of `total_frames` frames.
    pub fn run_progress(&self, total_frames: u64) -> RunProgress {
        let bar = self.use_pretty().then(|| {
            let bar = ProgressBar::new(total_frames);
            bar.set_draw_target(ProgressDrawTarget::stderr());
            let style = ProgressStyle::with_template("{bar:30} {pos}/{len} frames {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(style);
            bar
        });
        RunProgress {
            bar,
            started: Instant::now(),
            last_line: Instant::now(),
        }
    }
}

pub struct RunProgress {
    bar: Option<ProgressBar>,
    started: Instant,
    last_line: Instant,
}

impl RunProgress {
    pub fn update(&mut self, frames: u64, counters: &AdmissionCounters, stats: &StatsSnapshot) {
        let message = format_status(counters, stats);
        match &self.bar {
            Some(bar) => {
                bar.set_position(frames);
                bar.set_message(message);
            }
            None => {
                if self.last_line.elapsed() >= Duration::from_secs(1) {
                    eprintln!("==> {} frames {}", frames, message);
                    self.last_line = Instant::now();
                }
            }
        }
    }

    pub fn finish(self, counters: &AdmissionCounters, stats: &StatsSnapshot) {
        let message = format!(
            "✔ {} ({})",
            format_status(counters, stats),
            format_duration(self.started.elapsed())
        );
        match self.bar {
            Some(bar) => bar.finish_with_message(message),
            None => eprintln!("{message}"),
        }
    }
}

fn format_status(counters: &AdmissionCounters, stats: &StatsSnapshot) -> String {
    format!(
        "dispatched={} superseded={} fps={} avg_frame={}",
        counters.dispatched,
        counters.superseded,
        stats.frames_per_second,
        format_duration(stats.frame_latency.avg)
    )
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
