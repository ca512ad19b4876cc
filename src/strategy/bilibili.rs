//! Bilibili parsing services and the official web API.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use super::{ExtractionStrategy, fetch_json, loose_number, loose_text, trim_base};
use crate::{
    error::ExtractionError,
    models::{DownloadCandidate, ResolutionResult, VideoReference, whole_megabytes},
};

const WEIBOMIAOPAI_SERVERS: usize = 16;

/// Label for renditions whose quality Bilibili sources do not report.
const UNKNOWN_QUALITY: &str = "未知";

fn positional_quality(index: usize, labels: &[&str]) -> String {
    labels
        .get(index)
        .copied()
        .unwrap_or(UNKNOWN_QUALITY)
        .to_string()
}

fn playurl_quality(code: Option<i64>) -> &'static str {
    match code {
        Some(112) => "1080p+",
        Some(80) => "1080p",
        Some(64) => "720p",
        Some(32) => "480p",
        Some(16) => "360p",
        _ => UNKNOWN_QUALITY,
    }
}

#[derive(Debug, Deserialize)]
struct Durl {
    url: Option<String>,
    size: Option<Value>,
}

pub struct Injahow {
    http: Client,
    base: String,
}

#[derive(Debug, Deserialize)]
struct InjahowResponse {
    title: Option<Value>,
    author: Option<Value>,
    data: Option<InjahowData>,
}

#[derive(Debug, Deserialize)]
struct InjahowData {
    durl: Option<Vec<Durl>>,
}

impl Injahow {
    pub fn new(http: Client) -> Self {
        Self::with_base(http, "https://api.injahow.cn")
    }

    pub fn with_base(http: Client, base: impl Into<String>) -> Self {
        Self {
            http,
            base: trim_base(base),
        }
    }
}

#[async_trait]
impl ExtractionStrategy for Injahow {
    fn name(&self) -> &'static str {
        "injahow"
    }

    async fn attempt(&self, video: &VideoReference) -> Result<ResolutionResult, ExtractionError> {
        let request = self.http.get(format!(
            "{}/bparse/?url={}&type=mp4",
            self.base,
            urlencoding::encode(&video.page_url())
        ));
        let response: InjahowResponse = fetch_json(request).await?;

        let durl = response
            .data
            .and_then(|data| data.durl)
            .ok_or_else(|| ExtractionError::Parse("missing data.durl".to_string()))?;

        let candidates = durl
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                DownloadCandidate::new(
                    positional_quality(index, &["高清", "标清"]),
                    item.url.unwrap_or_default(),
                )
            })
            .collect();

        ResolutionResult::builder(video, self.name())
            .title(loose_text(response.title.as_ref()))
            .uploader(loose_text(response.author.as_ref()))
            .finish(candidates)
            .ok_or(ExtractionError::Empty)
    }
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    code: Option<i64>,
    data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    fn into_data(self, what: &str) -> Result<T, ExtractionError> {
        match (self.code, self.data) {
            (Some(0), Some(data)) => Ok(data),
            (code, _) => Err(ExtractionError::Parse(format!(
                "{what} answered code {code:?} without data"
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct VideoInfo {
    title: Option<Value>,
    owner: Option<Owner>,
    cid: Option<Value>,
    #[serde(default)]
    pages: Vec<Page>,
}

impl VideoInfo {
    fn first_cid(&self) -> Option<String> {
        self.pages
            .first()
            .and_then(|page| loose_text(page.cid.as_ref()))
            .or_else(|| loose_text(self.cid.as_ref()))
    }

    fn owner_name(&self) -> Option<String> {
        self.owner
            .as_ref()
            .and_then(|owner| loose_text(owner.name.as_ref()))
    }
}

#[derive(Debug, Deserialize)]
struct Owner {
    name: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Page {
    cid: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct BiliGetDownload {
    url: Option<String>,
}

/// iiilab's BiliGet: metadata lookup, then one download URL for the first page.
pub struct BiliGet {
    http: Client,
    base: String,
}

impl BiliGet {
    pub fn new(http: Client) -> Self {
        Self::with_base(http, "https://bili.iiilab.com")
    }

    pub fn with_base(http: Client, base: impl Into<String>) -> Self {
        Self {
            http,
            base: trim_base(base),
        }
    }
}

#[async_trait]
impl ExtractionStrategy for BiliGet {
    fn name(&self) -> &'static str {
        "biliget"
    }

    async fn attempt(&self, video: &VideoReference) -> Result<ResolutionResult, ExtractionError> {
        let info_request = self
            .http
            .get(format!("{}/api/video/info", self.base))
            .query(&[("bvid", video.id.as_str())]);
        let info = fetch_json::<ApiEnvelope<VideoInfo>>(info_request)
            .await?
            .into_data("BiliGet info")?;

        let cid = info
            .pages
            .first()
            .and_then(|page| loose_text(page.cid.as_ref()))
            .ok_or_else(|| ExtractionError::Parse("BiliGet info has no pages".to_string()))?;

        let download_request = self
            .http
            .get(format!("{}/api/video/download", self.base))
            .query(&[
                ("bvid", video.id.as_str()),
                ("cid", cid.as_str()),
                ("qn", "80"),
                ("type", "mp4"),
            ]);
        let download = fetch_json::<ApiEnvelope<BiliGetDownload>>(download_request)
            .await?
            .into_data("BiliGet download")?;

        let candidates = vec![DownloadCandidate::new(
            "高清",
            download.url.unwrap_or_default(),
        )];

        ResolutionResult::builder(video, self.name())
            .uploader(info.owner_name())
            .title(loose_text(info.title.as_ref()))
            .finish(candidates)
            .ok_or(ExtractionError::Empty)
    }
}

pub struct Weibomiaopai {
    http: Client,
    base: String,
    next_server: AtomicUsize,
}

#[derive(Debug, Deserialize)]
struct WeibomiaopaiResponse {
    title: Option<Value>,
    author: Option<Value>,
    urls: Option<Vec<Value>>,
}

impl Weibomiaopai {
    pub fn new(http: Client) -> Self {
        Self::with_base(http, "https://weibomiaopai.com")
    }

    pub fn with_base(http: Client, base: impl Into<String>) -> Self {
        Self {
            http,
            base: trim_base(base),
            next_server: AtomicUsize::new(0),
        }
    }

    /// Rotates across the mirror servers on every attempt.
    fn server(&self) -> usize {
        self.next_server.fetch_add(1, Ordering::Relaxed) % WEIBOMIAOPAI_SERVERS
    }
}

#[async_trait]
impl ExtractionStrategy for Weibomiaopai {
    fn name(&self) -> &'static str {
        "weibomiaopai"
    }

    async fn attempt(&self, video: &VideoReference) -> Result<ResolutionResult, ExtractionError> {
        let request = self
            .http
            .get(format!(
                "{}/online-video-downloader/bilibili-api-server/api/video/",
                self.base
            ))
            .query(&[
                ("server", self.server().to_string()),
                ("video", video.page_url()),
            ])
            .header("Referer", format!("{}/", self.base));
        let response: WeibomiaopaiResponse = fetch_json(request).await?;

        let urls = response
            .urls
            .filter(|urls| !urls.is_empty())
            .ok_or_else(|| ExtractionError::Parse("missing urls".to_string()))?;

        let candidates = urls
            .iter()
            .enumerate()
            .map(|(index, url)| {
                DownloadCandidate::new(
                    positional_quality(index, &["1080p", "720p", "480p"]),
                    url.as_str().unwrap_or_default(),
                )
            })
            .collect();

        ResolutionResult::builder(video, self.name())
            .title(loose_text(response.title.as_ref()))
            .uploader(loose_text(response.author.as_ref()))
            .finish(candidates)
            .ok_or(ExtractionError::Empty)
    }
}

#[derive(Debug, Deserialize)]
struct PlayUrl {
    quality: Option<i64>,
    durl: Option<Vec<Durl>>,
}

/// `api.bilibili.com` view + playurl. Works for public, non-region-locked videos.
pub struct BilibiliOfficial {
    http: Client,
    base: String,
}

impl BilibiliOfficial {
    pub fn new(http: Client) -> Self {
        Self::with_base(http, "https://api.bilibili.com")
    }

    pub fn with_base(http: Client, base: impl Into<String>) -> Self {
        Self {
            http,
            base: trim_base(base),
        }
    }
}

#[async_trait]
impl ExtractionStrategy for BilibiliOfficial {
    fn name(&self) -> &'static str {
        "bilibili-official"
    }

    async fn attempt(&self, video: &VideoReference) -> Result<ResolutionResult, ExtractionError> {
        let view_request = self
            .http
            .get(format!("{}/x/web-interface/view", self.base))
            .query(&[("bvid", video.id.as_str())]);
        let info = fetch_json::<ApiEnvelope<VideoInfo>>(view_request)
            .await?
            .into_data("view")?;

        let cid = info
            .first_cid()
            .ok_or_else(|| ExtractionError::Parse("view has no cid".to_string()))?;

        let play_request = self
            .http
            .get(format!("{}/x/player/playurl", self.base))
            .query(&[
                ("bvid", video.id.as_str()),
                ("cid", cid.as_str()),
                ("qn", "80"),
                ("type", "mp4"),
            ])
            .header("Referer", video.page_url());
        let play = fetch_json::<ApiEnvelope<PlayUrl>>(play_request)
            .await?
            .into_data("playurl")?;

        let quality = playurl_quality(play.quality);
        let durl = play
            .durl
            .ok_or_else(|| ExtractionError::Parse("playurl has no durl".to_string()))?;

        let candidates = durl
            .into_iter()
            .map(|item| {
                DownloadCandidate::new(quality, item.url.unwrap_or_default())
                    .with_size(loose_number(item.size.as_ref()).map(whole_megabytes))
            })
            .collect();

        ResolutionResult::builder(video, self.name())
            .uploader(info.owner_name())
            .title(loose_text(info.title.as_ref()))
            .finish(candidates)
            .ok_or(ExtractionError::Empty)
    }
}
