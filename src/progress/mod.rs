//! Job progress: event model, per-job bus, fetcher hook adapter and stream encoder
//!
//! ## Key Components
//!
//! - [`ProgressEvent`] - immutable record appended for a job
//! - [`ProgressBus`] - ordered, concurrently readable event log for one job
//! - [`ProgressHook`] - turns raw fetcher callbacks into events, throttling live forwarding
//! - [`StreamEncoder`] - lazy push stream ending in a single `[DONE]` sentinel

pub mod bus;
pub mod event;
pub mod hook;
pub mod stream;

pub use bus::{BusEntry, ProgressBus};
pub use event::{
    DONE_SENTINEL, ProgressEvent, STAGE_DOWNLOAD_FINISHED, STAGE_LOG, STAGE_TRANSCODE_COMPLETE,
    STAGE_TRANSCODE_START, WireMessage,
};
pub use hook::{ProgressHook, RawProgress, parse_percent, strip_ansi};
pub use stream::{StreamEncoder, StreamItem};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProgressError {
    #[error("job {0} already has a terminal event")]
    Sealed(String),
}
