//! Third-party YouTube parsing services. Each one is unversioned and may
//! change shape at any time, so every field is optional and validated here.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{ExtractionStrategy, fetch_json, loose_number, loose_text, trim_base};
use crate::{
    error::ExtractionError,
    models::{DownloadCandidate, ResolutionResult, UNKNOWN_LABEL, VideoReference, whole_megabytes},
};

pub struct Y2mate {
    http: Client,
    base: String,
}

#[derive(Debug, Deserialize)]
struct Y2mateResponse {
    title: Option<Value>,
    #[serde(rename = "a")]
    author: Option<Value>,
    thumbnail: Option<Value>,
    links: Option<Y2mateLinks>,
}

#[derive(Debug, Deserialize)]
struct Y2mateLinks {
    mp4: Option<Map<String, Value>>,
}

impl Y2mate {
    pub fn new(http: Client) -> Self {
        Self::with_base(http, "https://www.y2mate.com")
    }

    pub fn with_base(http: Client, base: impl Into<String>) -> Self {
        Self {
            http,
            base: trim_base(base),
        }
    }
}

#[async_trait]
impl ExtractionStrategy for Y2mate {
    fn name(&self) -> &'static str {
        "y2mate"
    }

    async fn attempt(&self, video: &VideoReference) -> Result<ResolutionResult, ExtractionError> {
        let page_url = video.page_url();
        let request = self
            .http
            .post(format!("{}/mates/analyzeV2/ajax", self.base))
            .header("X-Requested-With", "XMLHttpRequest")
            .header("Origin", self.base.as_str())
            .header("Referer", format!("{}/", self.base))
            .form(&[
                ("k_query", page_url.as_str()),
                ("k_page", "home"),
                ("hl", "en"),
                ("q_auto", "0"),
            ]);
        let data: Y2mateResponse = fetch_json(request).await?;

        let links = data
            .links
            .and_then(|links| links.mp4)
            .ok_or_else(|| ExtractionError::Parse("missing links.mp4".to_string()))?;

        let candidates = links
            .values()
            .filter(|item| item.get("f").and_then(Value::as_str) == Some("mp4"))
            .map(|item| {
                DownloadCandidate::new(
                    loose_text(item.get("q")).unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
                    loose_text(item.get("url")).unwrap_or_default(),
                )
                .with_size(loose_text(item.get("size")))
            })
            .collect();

        ResolutionResult::builder(video, self.name())
            .title(loose_text(data.title.as_ref()))
            .uploader(loose_text(data.author.as_ref()))
            .thumbnail(loose_text(data.thumbnail.as_ref()))
            .finish(candidates)
            .ok_or(ExtractionError::Empty)
    }
}

pub struct NineXBuddy {
    http: Client,
    base: String,
}

#[derive(Debug, Deserialize)]
struct NineXBuddyResponse {
    data: Option<NineXBuddyData>,
}

#[derive(Debug, Deserialize)]
struct NineXBuddyData {
    title: Option<Value>,
    thumbnail: Option<Value>,
    mp4: Option<Vec<Value>>,
}

impl NineXBuddy {
    pub fn new(http: Client) -> Self {
        Self::with_base(http, "https://9xbuddy.org")
    }

    pub fn with_base(http: Client, base: impl Into<String>) -> Self {
        Self {
            http,
            base: trim_base(base),
        }
    }
}

#[async_trait]
impl ExtractionStrategy for NineXBuddy {
    fn name(&self) -> &'static str {
        "9xbuddy"
    }

    async fn attempt(&self, video: &VideoReference) -> Result<ResolutionResult, ExtractionError> {
        let request = self.http.get(format!(
            "{}/process?url={}",
            self.base,
            urlencoding::encode(&video.page_url())
        ));
        let response: NineXBuddyResponse = fetch_json(request).await?;

        let data = response
            .data
            .ok_or_else(|| ExtractionError::Parse("missing data".to_string()))?;
        let items = data
            .mp4
            .ok_or_else(|| ExtractionError::Parse("missing data.mp4".to_string()))?;

        let candidates = items
            .iter()
            .map(|item| {
                DownloadCandidate::new(
                    loose_text(item.get("quality")).unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
                    loose_text(item.get("url")).unwrap_or_default(),
                )
                .with_size(loose_text(item.get("size")))
            })
            .collect();

        ResolutionResult::builder(video, self.name())
            .title(loose_text(data.title.as_ref()))
            .thumbnail(loose_text(data.thumbnail.as_ref()))
            .finish(candidates)
            .ok_or(ExtractionError::Empty)
    }
}

pub struct SsYoutube {
    http: Client,
    base: String,
}

#[derive(Debug, Deserialize)]
struct SsYoutubeResponse {
    url: Option<Vec<Value>>,
    meta: Option<SsYoutubeMeta>,
}

#[derive(Debug, Default, Deserialize)]
struct SsYoutubeMeta {
    title: Option<Value>,
    thumbnail: Option<Value>,
    author: Option<Value>,
}

impl SsYoutube {
    pub fn new(http: Client) -> Self {
        Self::with_base(http, "https://ssyoutube.com")
    }

    pub fn with_base(http: Client, base: impl Into<String>) -> Self {
        Self {
            http,
            base: trim_base(base),
        }
    }
}

#[async_trait]
impl ExtractionStrategy for SsYoutube {
    fn name(&self) -> &'static str {
        "ssyoutube"
    }

    async fn attempt(&self, video: &VideoReference) -> Result<ResolutionResult, ExtractionError> {
        let page_url = video.page_url();
        let request = self
            .http
            .post(format!("{}/api/convert", self.base))
            .form(&[("url", page_url.as_str())]);
        let data: SsYoutubeResponse = fetch_json(request).await?;

        let items = data
            .url
            .ok_or_else(|| ExtractionError::Parse("missing url list".to_string()))?;

        let candidates = items
            .iter()
            .filter(|item| {
                item.get("ext").and_then(Value::as_str) == Some("mp4")
                    && item
                        .get("type")
                        .and_then(Value::as_str)
                        .is_some_and(|kind| kind.contains("video"))
            })
            .map(|item| {
                let quality = loose_text(item.get("quality"))
                    .or_else(|| loose_text(item.get("subname")))
                    .unwrap_or_else(|| UNKNOWN_LABEL.to_string());
                DownloadCandidate::new(quality, loose_text(item.get("url")).unwrap_or_default())
                    .with_size(loose_number(item.get("filesize")).map(whole_megabytes))
            })
            .collect();

        let meta = data.meta.unwrap_or_default();
        ResolutionResult::builder(video, self.name())
            .title(loose_text(meta.title.as_ref()))
            .uploader(loose_text(meta.author.as_ref()))
            .thumbnail(loose_text(meta.thumbnail.as_ref()))
            .finish(candidates)
            .ok_or(ExtractionError::Empty)
    }
}

pub struct SaveFrom {
    http: Client,
    base: String,
}

#[derive(Debug, Deserialize)]
struct SaveFromResponse {
    title: Option<Value>,
    thumb: Option<Value>,
    uploader: Option<Value>,
    links: Option<Vec<Value>>,
}

impl SaveFrom {
    pub fn new(http: Client) -> Self {
        Self::with_base(http, "https://sfrom.net")
    }

    pub fn with_base(http: Client, base: impl Into<String>) -> Self {
        Self {
            http,
            base: trim_base(base),
        }
    }
}

#[async_trait]
impl ExtractionStrategy for SaveFrom {
    fn name(&self) -> &'static str {
        "savefrom"
    }

    async fn attempt(&self, video: &VideoReference) -> Result<ResolutionResult, ExtractionError> {
        let page_url = video.page_url();
        let request = self
            .http
            .post(format!("{}/api/convert", self.base))
            .form(&[("url", page_url.as_str())]);
        let data: SaveFromResponse = fetch_json(request).await?;

        let links = data
            .links
            .ok_or_else(|| ExtractionError::Parse("missing links".to_string()))?;

        let candidates = links
            .iter()
            .filter(|item| item.get("type").and_then(Value::as_str) == Some("mp4"))
            .map(|item| {
                DownloadCandidate::new(
                    loose_text(item.get("quality")).unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
                    loose_text(item.get("url")).unwrap_or_default(),
                )
                .with_size(loose_text(item.get("size")))
            })
            .collect();

        ResolutionResult::builder(video, self.name())
            .title(loose_text(data.title.as_ref()))
            .uploader(loose_text(data.uploader.as_ref()))
            .thumbnail(loose_text(data.thumb.as_ref()))
            .finish(candidates)
            .ok_or(ExtractionError::Empty)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::{
        Form, Json, Router,
        extract::Query,
        http::StatusCode,
        routing::{get, post},
    };
    use serde_json::json;

    use super::*;
    use crate::{models::Platform, test_support::spawn_stub};

    fn video() -> VideoReference {
        VideoReference::new(Platform::YouTube, "dQw4w9WgXcQ")
    }

    #[tokio::test]
    async fn y2mate_keeps_mp4_links_best_first() {
        let app = Router::new().route(
            "/mates/analyzeV2/ajax",
            post(|Form(form): Form<HashMap<String, String>>| async move {
                assert_eq!(
                    form.get("k_query").map(String::as_str),
                    Some("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
                );
                Json(json!({
                    "title": "Never Gonna Give You Up",
                    "a": "Rick Astley",
                    "links": { "mp4": {
                        "18": { "f": "mp4", "q": "360p", "size": "9.1 MB", "url": "https://cdn.example.com/360.mp4" },
                        "22": { "f": "mp4", "q": "720p", "size": "21 MB", "url": "https://cdn.example.com/720.mp4" },
                        "43": { "f": "webm", "q": "480p", "url": "https://cdn.example.com/480.webm" },
                        "auto": { "f": "mp4", "q": "auto", "url": "" }
                    }}
                }))
            }),
        );
        let base = spawn_stub(app).await;

        let result = Y2mate::with_base(Client::new(), base)
            .attempt(&video())
            .await
            .unwrap();

        assert_eq!(result.source_tag, "y2mate");
        assert_eq!(result.uploader, "Rick Astley");
        let qualities: Vec<_> = result.candidates.iter().map(|c| c.quality.as_str()).collect();
        assert_eq!(qualities, ["720p", "360p"]);
        assert_eq!(result.candidates[0].approximate_size, "21 MB");
    }

    #[tokio::test]
    async fn y2mate_without_links_is_a_parse_failure() {
        let app = Router::new().route(
            "/mates/analyzeV2/ajax",
            post(|| async { Json(json!({ "status": "fail" })) }),
        );
        let base = spawn_stub(app).await;

        let error = Y2mate::with_base(Client::new(), base)
            .attempt(&video())
            .await
            .unwrap_err();
        assert!(matches!(error, ExtractionError::Parse(_)));
    }

    #[tokio::test]
    async fn ninexbuddy_reports_http_status() {
        let app = Router::new().route(
            "/process",
            get(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down") }),
        );
        let base = spawn_stub(app).await;

        let error = NineXBuddy::with_base(Client::new(), base)
            .attempt(&video())
            .await
            .unwrap_err();
        assert!(matches!(error, ExtractionError::Status { status: 429 }));
    }

    #[tokio::test]
    async fn ninexbuddy_maps_data_list() {
        let app = Router::new().route(
            "/process",
            get(|Query(query): Query<HashMap<String, String>>| async move {
                assert_eq!(
                    query.get("url").map(String::as_str),
                    Some("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
                );
                Json(json!({ "data": {
                    "title": "Clip",
                    "mp4": [
                        { "quality": "480p", "url": "https://cdn.example.com/480.mp4" },
                        { "quality": "1080p", "size": "80 MB", "url": "https://cdn.example.com/1080.mp4" }
                    ]
                }}))
            }),
        );
        let base = spawn_stub(app).await;

        let result = NineXBuddy::with_base(Client::new(), base)
            .attempt(&video())
            .await
            .unwrap();
        assert_eq!(result.title, "Clip");
        assert_eq!(result.candidates[0].quality, "1080p");
        assert_eq!(result.candidates[1].approximate_size, UNKNOWN_LABEL);
    }

    #[tokio::test]
    async fn ssyoutube_filters_video_mp4_and_sizes_in_mb() {
        let app = Router::new().route(
            "/api/convert",
            post(|| async {
                Json(json!({
                    "meta": { "title": "Clip", "author": "Uploader" },
                    "url": [
                        { "ext": "mp4", "type": "video", "subname": "720", "filesize": 31457280, "url": "https://cdn.example.com/720.mp4" },
                        { "ext": "mp4", "type": "audio", "quality": "128k", "url": "https://cdn.example.com/a.mp4" },
                        { "ext": "webm", "type": "video", "quality": "1080", "url": "https://cdn.example.com/1080.webm" }
                    ]
                }))
            }),
        );
        let base = spawn_stub(app).await;

        let result = SsYoutube::with_base(Client::new(), base)
            .attempt(&video())
            .await
            .unwrap();
        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.candidates[0].quality, "720");
        assert_eq!(result.candidates[0].approximate_size, "30MB");
        assert_eq!(result.uploader, "Uploader");
    }

    #[tokio::test]
    async fn savefrom_with_only_empty_urls_is_empty() {
        let app = Router::new().route(
            "/api/convert",
            post(|| async {
                Json(json!({ "links": [ { "type": "mp4", "quality": "720p", "url": "" } ] }))
            }),
        );
        let base = spawn_stub(app).await;

        let error = SaveFrom::with_base(Client::new(), base)
            .attempt(&video())
            .await
            .unwrap_err();
        assert!(matches!(error, ExtractionError::Empty));
    }
}
