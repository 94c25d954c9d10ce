//! [`Transcoder`] backed by `ffmpeg`

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::traits::{EngineError, Transcoder};
use crate::config::TranscoderConfig;

#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    binary: String,
    sample_rate: u32,
    bitrate: String,
}

impl FfmpegTranscoder {
    pub fn new(config: &TranscoderConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            sample_rate: config.sample_rate,
            bitrate: config.bitrate.clone(),
        }
    }

    fn build_args(&self, input: &Path, output: &Path) -> Vec<String> {
        vec![
            "-y".into(),
            "-hide_banner".into(),
            "-nostats".into(),
            "-loglevel".into(),
            "error".into(),
            "-i".into(),
            input.to_string_lossy().into_owned(),
            "-vn".into(),
            "-c:a".into(),
            "libmp3lame".into(),
            "-b:a".into(),
            self.bitrate.clone(),
            "-ar".into(),
            self.sample_rate.to_string(),
            output.to_string_lossy().into_owned(),
        ]
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode_to_audio(
        &self,
        input: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, EngineError> {
        let output = self.audio_path_for(input);
        if output == input {
            return Err(EngineError::Transcode(format!(
                "input {} is already audio",
                input.display()
            )));
        }

        let args = self.build_args(input, &output);
        debug!(?args, "Spawning ffmpeg");

        let child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Spawn {
                binary: self.binary.clone(),
                message: e.to_string(),
            })?;

        // Dropping the wait future kills the child
        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            result = child.wait_with_output() => result?,
        };

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let detail = stderr
                .lines()
                .rev()
                .find(|line| !line.trim().is_empty())
                .unwrap_or("no diagnostic output");
            return Err(EngineError::Transcode(format!(
                "ffmpeg exited with {}: {}",
                result.status, detail
            )));
        }

        info!(input = %input.display(), output = %output.display(), "Audio extracted");
        Ok(output)
    }
}
