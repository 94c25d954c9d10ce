//! Adapter between raw fetcher progress callbacks and the job's [`ProgressBus`]

use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use super::bus::ProgressBus;
use super::event::{ProgressEvent, STAGE_DOWNLOAD_FINISHED};

/// CSI / OSC / two-byte escape sequences
static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[@-Z\\-_]")
        .expect("ANSI escape pattern is valid")
});

pub const STATUS_DOWNLOADING: &str = "downloading";
pub const STATUS_FINISHED: &str = "finished";

/// Progress record as reported by a fetcher, before normalisation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawProgress {
    pub status: String,
    pub percent: Option<String>,
    pub speed: Option<String>,
    pub eta: Option<String>,
    pub filename: Option<String>,
    /// The fetcher's own rendering of this update, when it provides one
    pub line: Option<String>,
}

impl RawProgress {
    pub fn downloading(percent: &str, speed: &str, eta: &str) -> Self {
        Self {
            status: STATUS_DOWNLOADING.to_string(),
            percent: Some(percent.to_string()),
            speed: Some(speed.to_string()),
            eta: Some(eta.to_string()),
            filename: None,
            line: None,
        }
    }

    pub fn finished(filename: Option<String>) -> Self {
        Self {
            status: STATUS_FINISHED.to_string(),
            filename,
            ..Default::default()
        }
    }
}

/// Remove terminal escape sequences and control characters
pub fn strip_ansi(input: &str) -> String {
    ANSI_ESCAPE
        .replace_all(input, "")
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Parse a percentage such as `" 42.5%"`; anything unparseable becomes 0
pub fn parse_percent(raw: Option<&str>) -> f64 {
    let Some(raw) = raw else {
        return 0.0;
    };
    let cleaned = strip_ansi(raw);
    let number = cleaned.trim_end_matches('%').trim();

    match number.parse::<f64>() {
        Ok(value) if value.is_finite() => value.clamp(0.0, 100.0),
        _ => 0.0,
    }
}

/// Normalises raw callbacks into [`ProgressEvent`]s for one job
///
/// Every progress event lands in the bus. Only one intermediate update per
/// `interval` is flagged for live forwarding; the final 100% update and
/// stage changes are always forwarded.
#[derive(Debug)]
pub struct ProgressHook {
    bus: Arc<ProgressBus>,
    interval: Duration,
    last_forwarded: Option<Instant>,
    finished: bool,
}

impl ProgressHook {
    pub fn new(bus: Arc<ProgressBus>, interval: Duration) -> Self {
        Self {
            bus,
            interval,
            last_forwarded: None,
            finished: false,
        }
    }

    pub fn bus(&self) -> &Arc<ProgressBus> {
        &self.bus
    }

    /// Handle one raw callback, returning the event it produced (if any)
    pub fn on_progress(&mut self, raw: &RawProgress) -> Option<ProgressEvent> {
        match raw.status.as_str() {
            STATUS_DOWNLOADING => Some(self.on_downloading(raw)),
            STATUS_FINISHED if !self.finished => {
                self.finished = true;
                let message = match raw.filename.as_deref().map(strip_ansi) {
                    Some(name) if !name.is_empty() => format!("Download finished: {name}"),
                    _ => "Download finished".to_string(),
                };
                let event = ProgressEvent::status(STAGE_DOWNLOAD_FINISHED, message);
                self.publish(event.clone(), true);
                Some(event)
            }
            _ => None,
        }
    }

    fn on_downloading(&mut self, raw: &RawProgress) -> ProgressEvent {
        let percent = parse_percent(raw.percent.as_deref());
        let transfer_rate = raw.speed.as_deref().map(strip_ansi).unwrap_or_default();
        let eta = raw.eta.as_deref().map(strip_ansi).unwrap_or_default();
        let raw_line = raw
            .line
            .as_deref()
            .map(strip_ansi)
            .filter(|line| !line.is_empty())
            .unwrap_or_else(|| format!("[download] {percent:>5.1}% at {transfer_rate} ETA {eta}"));

        let now = Instant::now();
        let live = percent >= 100.0
            || self
                .last_forwarded
                .is_none_or(|last| now.duration_since(last) >= self.interval);
        if live {
            self.last_forwarded = Some(now);
        }

        let event = ProgressEvent::Progress {
            percent,
            transfer_rate,
            eta,
            raw_line,
        };
        self.publish(event.clone(), live);
        event
    }

    fn publish(&self, event: ProgressEvent, live: bool) {
        let result = if live {
            self.bus.append(event)
        } else {
            self.bus.record(event)
        };
        if let Err(e) = result {
            debug!(key = self.bus.key(), error = %e, "Dropping progress after terminal event");
        }
    }
}
