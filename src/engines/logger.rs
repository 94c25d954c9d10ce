//! Logging interface handed to fetchers

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::progress::{ProgressBus, ProgressEvent, STAGE_LOG, strip_ansi};

/// Severity-tiered sink for fetcher diagnostics
pub trait FetchLogger: Send + Sync {
    fn debug(&self, message: &str);
    fn info(&self, message: &str);
    fn warning(&self, message: &str);
    fn error(&self, message: &str);
}

/// Relays fetcher output to tracing and to the job's event log.
/// Debug lines are traced but never reach clients.
pub struct BusLogger {
    bus: Arc<ProgressBus>,
}

impl BusLogger {
    pub fn new(bus: Arc<ProgressBus>) -> Self {
        Self { bus }
    }

    fn relay(&self, message: &str) {
        let message = strip_ansi(message);
        if message.is_empty() {
            return;
        }
        // Late lines after a terminal event are only traced
        let _ = self.bus.append(ProgressEvent::status(STAGE_LOG, message));
    }
}

impl FetchLogger for BusLogger {
    fn debug(&self, message: &str) {
        debug!(key = self.bus.key(), "{}", strip_ansi(message));
    }

    fn info(&self, message: &str) {
        info!(key = self.bus.key(), "{}", strip_ansi(message));
        self.relay(message);
    }

    fn warning(&self, message: &str) {
        warn!(key = self.bus.key(), "{}", strip_ansi(message));
        self.relay(message);
    }

    fn error(&self, message: &str) {
        error!(key = self.bus.key(), "{}", strip_ansi(message));
        self.relay(message);
    }
}
