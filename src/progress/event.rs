use serde::{Deserialize, Serialize};

/// Stage tag emitted once the fetcher reports a finished download
pub const STAGE_DOWNLOAD_FINISHED: &str = "download_finished";
/// Stage tag emitted when the audio extraction step begins
pub const STAGE_TRANSCODE_START: &str = "transcode_start";
/// Stage tag emitted when the audio extraction step succeeds
pub const STAGE_TRANSCODE_COMPLETE: &str = "transcode_complete";
/// Stage tag for fetcher log lines relayed to clients
pub const STAGE_LOG: &str = "log";

/// Literal sentinel closing every event stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// A single progress record for one job. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressEvent {
    Progress {
        percent: f64,
        transfer_rate: String,
        eta: String,
        raw_line: String,
    },
    StatusChange {
        stage: String,
        message: String,
    },
    Error {
        message: String,
    },
    Complete {
        output_filename: String,
    },
}

impl ProgressEvent {
    pub fn status(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StatusChange {
            stage: stage.into(),
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn complete(output_filename: impl Into<String>) -> Self {
        Self::Complete {
            output_filename: output_filename.into(),
        }
    }

    /// Complete and Error end a job's sequence
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }

    pub fn is_stage(&self, wanted: &str) -> bool {
        matches!(self, Self::StatusChange { stage, .. } if stage == wanted)
    }
}

/// JSON payload sent to clients, discriminated by `type`
///
/// Both the polling endpoint and the event stream use this shape so a client
/// sees the same taxonomy regardless of transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    Progress {
        percent: f64,
        speed: String,
        eta: String,
        line: String,
    },
    Log {
        stage: String,
        message: String,
    },
    Mp3ConversionStart {
        message: String,
    },
    Mp3ConversionComplete {
        message: String,
    },
    Complete {
        filename: String,
    },
    Error {
        message: String,
    },
}

impl From<&ProgressEvent> for WireMessage {
    fn from(event: &ProgressEvent) -> Self {
        match event {
            ProgressEvent::Progress {
                percent,
                transfer_rate,
                eta,
                raw_line,
            } => WireMessage::Progress {
                percent: *percent,
                speed: transfer_rate.clone(),
                eta: eta.clone(),
                line: raw_line.clone(),
            },
            ProgressEvent::StatusChange { stage, message } => match stage.as_str() {
                STAGE_TRANSCODE_START => WireMessage::Mp3ConversionStart {
                    message: message.clone(),
                },
                STAGE_TRANSCODE_COMPLETE => WireMessage::Mp3ConversionComplete {
                    message: message.clone(),
                },
                _ => WireMessage::Log {
                    stage: stage.clone(),
                    message: message.clone(),
                },
            },
            ProgressEvent::Error { message } => WireMessage::Error {
                message: message.clone(),
            },
            ProgressEvent::Complete { output_filename } => WireMessage::Complete {
                filename: output_filename.clone(),
            },
        }
    }
}

impl WireMessage {
    pub fn to_json(&self) -> String {
        // Plain enum of strings and floats; serialization cannot fail
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}
