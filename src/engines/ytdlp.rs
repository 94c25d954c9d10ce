//! [`Fetcher`] backed by the `yt-dlp` command line tool

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::logger::FetchLogger;
use super::traits::{EngineError, Fetcher};
use super::types::{FetchOutput, FetchRequest, FormatOption, MediaInfo, MediaMetadata};
use crate::config::FetcherConfig;
use crate::progress::{ProgressHook, RawProgress};

const PROGRESS_PREFIX: &str = "[progress] ";
const FILE_MARKER: &str = "mediabox-file=";
const TITLE_MARKER: &str = "mediabox-title=";
const EXTRACTOR_MARKER: &str = "mediabox-extractor=";
const DURATION_MARKER: &str = "mediabox-duration=";

const PROGRESS_TEMPLATE: &str = "download:[progress] %(progress.status)s|%(progress._percent_str)s|%(progress._speed_str)s|%(progress._eta_str)s|%(progress._default_template)s";

/// One line of yt-dlp output, classified
#[derive(Debug, Clone, PartialEq)]
enum OutputLine {
    Progress(RawProgress),
    File(PathBuf),
    Title(String),
    Extractor(String),
    Duration(f64),
    Debug(String),
    Info(String),
    Warning(String),
    Error(String),
}

#[derive(Debug, Clone)]
pub struct YtDlpFetcher {
    binary: String,
    restrict_filenames: bool,
    extra_args: Vec<String>,
}

impl YtDlpFetcher {
    pub fn new(config: &FetcherConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            restrict_filenames: config.restrict_filenames,
            extra_args: config.extra_args.clone(),
        }
    }

    fn build_fetch_args(&self, request: &FetchRequest) -> Vec<String> {
        let template = request.output_dir.join("%(title)s.%(ext)s");

        let mut args: Vec<String> = vec![
            "--no-playlist".into(),
            "--newline".into(),
            "--progress".into(),
            "--no-simulate".into(),
            "--progress-template".into(),
            PROGRESS_TEMPLATE.into(),
            "--print".into(),
            format!("after_move:{FILE_MARKER}%(filepath)s"),
            "--print".into(),
            format!("after_move:{TITLE_MARKER}%(title)s"),
            "--print".into(),
            format!("after_move:{EXTRACTOR_MARKER}%(extractor)s"),
            "--print".into(),
            format!("after_move:{DURATION_MARKER}%(duration)s"),
            "-f".into(),
            request.format_selector.clone(),
            "-o".into(),
            template.to_string_lossy().into_owned(),
        ];

        if self.restrict_filenames {
            args.push("--restrict-filenames".into());
        }
        args.extend(self.extra_args.iter().cloned());
        args.push("--".into());
        args.push(request.url.clone());
        args
    }

    fn build_listing_args(&self, url: &str) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-J".into(),
            "--no-playlist".into(),
            "--no-warnings".into(),
        ];
        args.extend(self.extra_args.iter().cloned());
        args.push("--".into());
        args.push(url.to_string());
        args
    }

    fn spawn(&self, args: &[String]) -> Result<Child, EngineError> {
        Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Spawn {
                binary: self.binary.clone(),
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl Fetcher for YtDlpFetcher {
    async fn list_formats(&self, url: &str) -> Result<MediaInfo, EngineError> {
        let args = self.build_listing_args(url);
        debug!(url, "Listing formats with yt-dlp");

        let output = self.spawn(&args)?.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::Fetch(last_error_line(&stderr).unwrap_or_else(
                || format!("yt-dlp exited with {}", output.status),
            )));
        }

        parse_media_info(&output.stdout)
    }

    async fn fetch(
        &self,
        request: &FetchRequest,
        hook: &mut ProgressHook,
        logger: &dyn FetchLogger,
        cancel: &CancellationToken,
    ) -> Result<FetchOutput, EngineError> {
        let args = self.build_fetch_args(request);
        debug!(url = %request.url, ?args, "Spawning yt-dlp");

        let mut child = self.spawn(&args)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Parse("yt-dlp stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::Parse("yt-dlp stderr not captured".into()))?;

        let mut stdout = BufReader::new(stdout).split(b'\n');
        let mut stderr = BufReader::new(stderr).split(b'\n');
        let (mut stdout_open, mut stderr_open) = (true, true);

        let mut path = None;
        let mut metadata = MediaMetadata::default();
        let mut last_error = None;

        while stdout_open || stderr_open {
            let line = tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = child.kill().await;
                    return Err(EngineError::Cancelled);
                }
                line = stdout.next_segment(), if stdout_open => {
                    let line = line?;
                    stdout_open = line.is_some();
                    line.map(decode_line)
                }
                line = stderr.next_segment(), if stderr_open => {
                    let line = line?;
                    stderr_open = line.is_some();
                    line.map(decode_line)
                }
            };
            let Some(line) = line else { continue };

            match classify_line(&line) {
                OutputLine::Progress(raw) => {
                    hook.on_progress(&raw);
                }
                OutputLine::File(file) => path = Some(file),
                OutputLine::Title(title) => metadata.title = Some(title),
                OutputLine::Extractor(name) => metadata.extractor = Some(name),
                OutputLine::Duration(secs) => metadata.duration_secs = Some(secs),
                OutputLine::Debug(message) => logger.debug(&message),
                OutputLine::Info(message) => logger.info(&message),
                OutputLine::Warning(message) => logger.warning(&message),
                OutputLine::Error(message) => {
                    logger.error(&message);
                    last_error = Some(message);
                }
            }
        }

        let status = tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                return Err(EngineError::Cancelled);
            }
            status = child.wait() => status?,
        };

        if !status.success() {
            return Err(EngineError::Fetch(
                last_error.unwrap_or_else(|| format!("yt-dlp exited with {status}")),
            ));
        }

        let path =
            path.ok_or_else(|| EngineError::Parse("yt-dlp did not report an output file".into()))?;
        Ok(FetchOutput { path, metadata })
    }
}

/// Output may carry titles in any encoding; invalid bytes are replaced
fn decode_line(bytes: Vec<u8>) -> String {
    String::from_utf8_lossy(&bytes)
        .trim_end_matches('\r')
        .to_string()
}

fn classify_line(line: &str) -> OutputLine {
    let line = line.trim_end();

    if let Some(rest) = line.strip_prefix(PROGRESS_PREFIX) {
        // The default rendering comes last and may itself contain '|'
        let mut fields = rest.splitn(5, '|').map(str::trim);
        let status = fields.next().unwrap_or_default().to_string();
        let mut optional = || fields.next().filter(|v| !v.is_empty()).map(str::to_string);
        return OutputLine::Progress(RawProgress {
            status,
            percent: optional(),
            speed: optional(),
            eta: optional(),
            line: optional(),
            filename: None,
        });
    }
    if let Some(file) = line.strip_prefix(FILE_MARKER) {
        return OutputLine::File(PathBuf::from(file));
    }
    if let Some(title) = line.strip_prefix(TITLE_MARKER) {
        return OutputLine::Title(title.to_string());
    }
    if let Some(name) = line.strip_prefix(EXTRACTOR_MARKER) {
        return OutputLine::Extractor(name.to_string());
    }
    if let Some(raw) = line.strip_prefix(DURATION_MARKER) {
        return match raw.parse() {
            Ok(secs) => OutputLine::Duration(secs),
            Err(_) => OutputLine::Debug(line.to_string()),
        };
    }
    if line.starts_with("ERROR:") {
        return OutputLine::Error(line.to_string());
    }
    if line.starts_with("WARNING:") {
        return OutputLine::Warning(line.to_string());
    }
    if line.starts_with("[debug]") {
        return OutputLine::Debug(line.to_string());
    }
    OutputLine::Info(line.to_string())
}

fn last_error_line(stderr: &str) -> Option<String> {
    stderr
        .lines()
        .rev()
        .find(|line| line.starts_with("ERROR:"))
        .map(str::to_string)
}

#[derive(Debug, Deserialize)]
struct InfoJson {
    title: Option<String>,
    thumbnail: Option<String>,
    #[serde(default)]
    formats: Vec<FormatJson>,
}

#[derive(Debug, Deserialize)]
struct FormatJson {
    format_id: String,
    format_note: Option<String>,
    resolution: Option<String>,
    ext: Option<String>,
    filesize: Option<u64>,
    filesize_approx: Option<u64>,
}

fn parse_media_info(stdout: &[u8]) -> Result<MediaInfo, EngineError> {
    let info: InfoJson =
        serde_json::from_slice(stdout).map_err(|e| EngineError::Parse(e.to_string()))?;

    let formats = info
        .formats
        .into_iter()
        .map(|format| {
            let resolution = format.resolution.unwrap_or_else(|| "unknown".to_string());
            FormatOption {
                quality_label: format
                    .format_note
                    .filter(|note| !note.is_empty())
                    .unwrap_or_else(|| resolution.clone()),
                resolution,
                file_extension: format.ext.unwrap_or_default(),
                file_size_bytes: format.filesize.or(format.filesize_approx),
                format_id: format.format_id,
            }
        })
        .collect();

    Ok(MediaInfo {
        title: info.title.unwrap_or_default(),
        thumbnail: info.thumbnail,
        formats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher() -> YtDlpFetcher {
        YtDlpFetcher::new(&FetcherConfig::default())
    }

    #[test]
    fn test_fetch_args() {
        let request = FetchRequest {
            url: "https://example.com/v1".to_string(),
            format_selector: "best".to_string(),
            output_dir: PathBuf::from("/srv/out/.staging/abc"),
        };
        let args = fetcher().build_fetch_args(&request);

        let pos = |flag: &str| args.iter().position(|a| a == flag).unwrap();
        assert_eq!(args[pos("-f") + 1], "best");
        assert_eq!(args[pos("-o") + 1], "/srv/out/.staging/abc/%(title)s.%(ext)s");
        assert_eq!(args[pos("--") + 1], "https://example.com/v1");
        assert_eq!(args.last().unwrap(), "https://example.com/v1");
        assert!(args.contains(&"--restrict-filenames".to_string()));
        assert!(args.contains(&"--newline".to_string()));
    }

    #[test]
    fn test_classify_progress_line() {
        let line = "[progress] downloading|\x1b[0;94m 42.3%\x1b[0m|  1.20MiB/s|00:12|[download]  42.3% of 10.00MiB at  1.20MiB/s ETA 00:12";
        match classify_line(line) {
            OutputLine::Progress(raw) => {
                assert_eq!(raw.status, "downloading");
                assert_eq!(raw.percent.as_deref(), Some("\x1b[0;94m 42.3%\x1b[0m"));
                assert_eq!(raw.speed.as_deref(), Some("1.20MiB/s"));
                assert_eq!(raw.eta.as_deref(), Some("00:12"));
                assert_eq!(
                    raw.line.as_deref(),
                    Some("[download]  42.3% of 10.00MiB at  1.20MiB/s ETA 00:12")
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_decode_line_tolerates_invalid_utf8() {
        let line = decode_line(b"[youtube] Caf\xe9 \xff title\r".to_vec());
        assert_eq!(line, "[youtube] Caf\u{fffd} \u{fffd} title");
        assert!(matches!(classify_line(&line), OutputLine::Info(_)));
    }

    #[test]
    fn test_classify_finished_line_without_fields() {
        match classify_line("[progress] finished||||") {
            OutputLine::Progress(raw) => {
                assert_eq!(raw.status, "finished");
                assert!(raw.percent.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_classify_markers_and_levels() {
        assert_eq!(
            classify_line("mediabox-file=/out/My_Video.webm"),
            OutputLine::File(PathBuf::from("/out/My_Video.webm"))
        );
        assert_eq!(
            classify_line("mediabox-duration=12.5"),
            OutputLine::Duration(12.5)
        );
        assert!(matches!(classify_line("mediabox-duration=NA"), OutputLine::Debug(_)));
        assert!(matches!(classify_line("ERROR: [youtube] x: Video unavailable"), OutputLine::Error(_)));
        assert!(matches!(classify_line("WARNING: slow"), OutputLine::Warning(_)));
        assert!(matches!(classify_line("[debug] args"), OutputLine::Debug(_)));
        assert!(matches!(classify_line("[youtube] Extracting URL"), OutputLine::Info(_)));
    }

    #[test]
    fn test_parse_media_info() {
        let json = br#"{
            "title": "Sample",
            "thumbnail": "https://img.example.com/t.jpg",
            "formats": [
                {"format_id": "140", "format_note": "medium", "resolution": "audio only", "ext": "m4a", "filesize": 1000},
                {"format_id": "18", "resolution": "640x360", "ext": "mp4", "filesize_approx": 2048},
                {"format_id": "sb0"}
            ]
        }"#;

        let info = parse_media_info(json).unwrap();
        assert_eq!(info.title, "Sample");
        assert_eq!(info.thumbnail.as_deref(), Some("https://img.example.com/t.jpg"));
        assert_eq!(info.formats.len(), 3);
        assert_eq!(info.formats[0].quality_label, "medium");
        assert_eq!(info.formats[1].quality_label, "640x360");
        assert_eq!(info.formats[1].file_size_bytes, Some(2048));
        assert_eq!(info.formats[2].resolution, "unknown");
        assert!(info.formats[2].file_size_bytes.is_none());
    }

    #[test]
    fn test_parse_media_info_rejects_garbage() {
        assert!(matches!(
            parse_media_info(b"not json"),
            Err(EngineError::Parse(_))
        ));
    }

    #[test]
    fn test_last_error_line() {
        let stderr = "WARNING: a\nERROR: first\nERROR: second\n";
        assert_eq!(last_error_line(stderr).as_deref(), Some("ERROR: second"));
        assert!(last_error_line("fine").is_none());
    }
}
