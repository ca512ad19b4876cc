use std::{cmp::Ordering, collections::HashSet, io::ErrorKind, time::Duration};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::{process::Command, time::timeout};

use super::{ExtractionStrategy, loose_text};
use crate::{
    error::ExtractionError,
    models::{DownloadCandidate, ResolutionResult, VideoReference, format_filesize_mb},
};

/// Location of the local yt-dlp binary and the bound on one invocation.
#[derive(Debug, Clone)]
pub struct YtDlpTool {
    pub path: String,
    pub timeout: Duration,
}

impl YtDlpTool {
    pub fn new(path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            timeout,
        }
    }

    pub async fn run(&self, args: &[&str]) -> Result<std::process::Output, ExtractionError> {
        let command_future = Command::new(&self.path)
            .args(args)
            .kill_on_drop(true)
            .output();
        let output = timeout(self.timeout, command_future)
            .await
            .map_err(|_| ExtractionError::Timeout(self.timeout))?
            .map_err(|error| {
                if error.kind() == ErrorKind::NotFound {
                    ExtractionError::Tool(format!("{} is not installed", self.path))
                } else {
                    ExtractionError::Tool(format!("could not run {}: {error}", self.path))
                }
            })?;

        if !output.status.success() {
            return Err(ExtractionError::Tool(run_error_message(&output.stderr)));
        }

        Ok(output)
    }

    pub async fn version(&self) -> Result<String, ExtractionError> {
        let output = self.run(&["--version"]).await?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[derive(Debug, Deserialize)]
struct YtDlpVideoInfo {
    title: Option<Value>,
    uploader: Option<Value>,
    thumbnail: Option<Value>,
    #[serde(default)]
    formats: Vec<YtDlpFormat>,
}

#[derive(Debug, Deserialize)]
struct YtDlpFormat {
    format_id: Option<String>,
    url: Option<String>,
    ext: Option<String>,
    vcodec: Option<String>,
    acodec: Option<String>,
    height: Option<u32>,
    format_note: Option<String>,
    tbr: Option<f32>,
    filesize: Option<f64>,
    filesize_approx: Option<f64>,
}

/// Runs `yt-dlp -J` against the canonical page URL and keeps formats that
/// carry a direct URL.
pub struct YtDlp {
    tool: YtDlpTool,
}

impl YtDlp {
    pub fn new(tool: YtDlpTool) -> Self {
        Self { tool }
    }
}

#[async_trait]
impl ExtractionStrategy for YtDlp {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn attempt(&self, video: &VideoReference) -> Result<ResolutionResult, ExtractionError> {
        let page_url = video.page_url();
        let output = self
            .tool
            .run(&["-J", "--no-playlist", "--no-warnings", page_url.as_str()])
            .await?;
        let info: YtDlpVideoInfo = serde_json::from_slice(&output.stdout)?;

        build_result(video, self.name(), info)
    }
}

fn build_result(
    video: &VideoReference,
    source_tag: &str,
    info: YtDlpVideoInfo,
) -> Result<ResolutionResult, ExtractionError> {
    let candidates = build_candidates(&info.formats);

    ResolutionResult::builder(video, source_tag)
        .title(loose_text(info.title.as_ref()))
        .uploader(loose_text(info.uploader.as_ref()))
        .thumbnail(loose_text(info.thumbnail.as_ref()))
        .finish(candidates)
        .ok_or(ExtractionError::Empty)
}

/// Muxed formats when any exist, else video-only ones. Highest resolution
/// first, then bitrate; duplicate format ids are dropped.
fn build_candidates(formats: &[YtDlpFormat]) -> Vec<DownloadCandidate> {
    let muxed: Vec<&YtDlpFormat> = formats
        .iter()
        .filter(|item| has_video(item) && has_audio(item))
        .collect();
    let mut selected = if muxed.is_empty() {
        formats.iter().filter(|item| has_video(item)).collect()
    } else {
        muxed
    };

    selected.sort_by(|a, b| {
        b.height
            .unwrap_or_default()
            .cmp(&a.height.unwrap_or_default())
            .then_with(|| {
                b.tbr
                    .unwrap_or_default()
                    .partial_cmp(&a.tbr.unwrap_or_default())
                    .unwrap_or(Ordering::Equal)
            })
    });

    let mut seen_ids = HashSet::new();
    selected
        .into_iter()
        .filter(|item| {
            item.format_id
                .as_ref()
                .is_none_or(|id| seen_ids.insert(id.clone()))
        })
        .filter_map(|item| {
            let url = item.url.clone()?;
            let quality = item
                .height
                .map(|height| format!("{height}p"))
                .or_else(|| item.format_note.clone())
                .unwrap_or_else(|| "auto".to_string());
            let size = item
                .filesize
                .or(item.filesize_approx)
                .map(format_filesize_mb);

            Some(
                DownloadCandidate::new(quality, url)
                    .with_container(item.ext.clone().unwrap_or_else(|| "mp4".to_string()))
                    .with_size(size),
            )
        })
        .collect()
}

fn has_video(format: &YtDlpFormat) -> bool {
    matches!(format.vcodec.as_deref(), Some(value) if value != "none")
}

fn has_audio(format: &YtDlpFormat) -> bool {
    matches!(format.acodec.as_deref(), Some(value) if value != "none")
}

fn run_error_message(stderr: &[u8]) -> String {
    let message = String::from_utf8_lossy(stderr)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .unwrap_or("yt-dlp exited without output")
        .to_string();

    if message.to_ascii_lowercase().contains("unsupported url") {
        "yt-dlp does not support this URL".to_string()
    } else {
        message
    }
}
