use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

pub const UNKNOWN_LABEL: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    YouTube,
    Bilibili,
}

impl Platform {
    pub fn default_title(self, id: &str) -> String {
        match self {
            Platform::YouTube => format!("YouTube video {id}"),
            Platform::Bilibili => format!("Bilibili video {id}"),
        }
    }

    pub fn default_uploader(self) -> &'static str {
        match self {
            Platform::YouTube => "YouTube",
            Platform::Bilibili => "Bilibili uploader",
        }
    }

    pub fn default_thumbnail(self, id: &str) -> Option<String> {
        match self {
            Platform::YouTube => Some(format!("https://img.youtube.com/vi/{id}/maxresdefault.jpg")),
            Platform::Bilibili => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::YouTube => write!(f, "youtube"),
            Platform::Bilibili => write!(f, "bilibili"),
        }
    }
}

/// Platform plus identifier pulled out of a user supplied page URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VideoReference {
    pub platform: Platform,
    pub id: String,
}

impl VideoReference {
    pub fn new(platform: Platform, id: impl Into<String>) -> Self {
        Self {
            platform,
            id: id.into(),
        }
    }

    /// Canonical page URL handed to upstream services.
    pub fn page_url(&self) -> String {
        match self.platform {
            Platform::YouTube => format!("https://www.youtube.com/watch?v={}", self.id),
            Platform::Bilibili => format!("https://www.bilibili.com/video/{}", self.id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadCandidate {
    pub quality: String,
    #[serde(rename = "format")]
    pub container: String,
    #[serde(rename = "size")]
    pub approximate_size: String,
    pub url: String,
}

impl DownloadCandidate {
    pub fn new(quality: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            quality: quality.into(),
            container: "mp4".to_string(),
            approximate_size: UNKNOWN_LABEL.to_string(),
            url: url.into(),
        }
    }

    pub fn with_size(mut self, size: Option<String>) -> Self {
        if let Some(size) = size.and_then(normalize_optional_text) {
            self.approximate_size = size;
        }
        self
    }

    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.container = container.into();
        self
    }

    fn has_valid_url(&self) -> bool {
        Url::parse(self.url.trim())
            .map(|parsed| matches!(parsed.scheme(), "http" | "https") && parsed.has_host())
            .unwrap_or(false)
    }
}

/// Output of one resolution. Serialized as the public `video-info` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionResult {
    pub id: String,
    pub title: String,
    pub uploader: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(rename = "formats")]
    pub candidates: Vec<DownloadCandidate>,
    #[serde(rename = "apiSource")]
    pub source_tag: String,
}

impl ResolutionResult {
    /// Starts a result with platform placeholders for every metadata field.
    pub fn builder(video: &VideoReference, source_tag: impl Into<String>) -> ResolutionBuilder {
        ResolutionBuilder {
            platform: video.platform,
            id: video.id.clone(),
            title: None,
            uploader: None,
            thumbnail: None,
            source_tag: source_tag.into(),
        }
    }
}

#[derive(Debug)]
pub struct ResolutionBuilder {
    platform: Platform,
    id: String,
    title: Option<String>,
    uploader: Option<String>,
    thumbnail: Option<String>,
    source_tag: String,
}

impl ResolutionBuilder {
    pub fn title(mut self, title: Option<String>) -> Self {
        self.title = title.and_then(normalize_optional_text);
        self
    }

    pub fn uploader(mut self, uploader: Option<String>) -> Self {
        self.uploader = uploader.and_then(normalize_optional_text);
        self
    }

    pub fn thumbnail(mut self, thumbnail: Option<String>) -> Self {
        self.thumbnail = thumbnail.and_then(normalize_optional_text);
        self
    }

    /// Filters and orders the candidates. Returns `None` when nothing usable
    /// survives, which strategies report as an empty extraction.
    pub fn finish(self, candidates: Vec<DownloadCandidate>) -> Option<ResolutionResult> {
        let candidates = order_candidates(usable_candidates(candidates));
        if candidates.is_empty() {
            return None;
        }

        Some(ResolutionResult {
            title: self
                .title
                .unwrap_or_else(|| self.platform.default_title(&self.id)),
            uploader: self
                .uploader
                .unwrap_or_else(|| self.platform.default_uploader().to_string()),
            thumbnail: self
                .thumbnail
                .or_else(|| self.platform.default_thumbnail(&self.id)),
            id: self.id,
            candidates,
            source_tag: self.source_tag,
        })
    }
}

pub fn usable_candidates(candidates: Vec<DownloadCandidate>) -> Vec<DownloadCandidate> {
    candidates
        .into_iter()
        .filter(DownloadCandidate::has_valid_url)
        .map(|mut candidate| {
            candidate.url = candidate.url.trim().to_string();
            if candidate.quality.trim().is_empty() {
                candidate.quality = UNKNOWN_LABEL.to_string();
            }
            candidate
        })
        .collect()
}

/// Numeric labels first, highest first; everything else keeps insertion order.
pub fn order_candidates(mut candidates: Vec<DownloadCandidate>) -> Vec<DownloadCandidate> {
    candidates.sort_by(|a, b| {
        match (quality_rank(&a.quality), quality_rank(&b.quality)) {
            (Some(left), Some(right)) => right.cmp(&left),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        }
    });
    candidates
}

fn quality_rank(label: &str) -> Option<u32> {
    let digits: String = label
        .trim()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

pub fn format_filesize_mb(bytes: f64) -> String {
    let mb = bytes / 1_048_576.0;
    if mb > 1024.0 {
        format!("{:.2} GB", mb / 1024.0)
    } else {
        format!("{mb:.1} MB")
    }
}

pub fn whole_megabytes(bytes: f64) -> String {
    format!("{}MB", (bytes / 1_048_576.0).round() as u64)
}

pub fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

pub fn normalize_optional_text(value: String) -> Option<String> {
    non_empty(&value).map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(quality: &str, url: &str) -> DownloadCandidate {
        DownloadCandidate::new(quality, url)
    }

    #[test]
    fn drops_candidates_without_usable_url() {
        let video = VideoReference::new(Platform::YouTube, "dQw4w9WgXcQ");
        let result = ResolutionResult::builder(&video, "stub")
            .finish(vec![
                candidate("720p", ""),
                candidate("480p", "   "),
                candidate("360p", "/relative/path.mp4"),
                candidate("1080p", "https://cdn.example.com/v.mp4"),
            ])
            .unwrap();

        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.candidates[0].quality, "1080p");
    }

    #[test]
    fn finish_returns_none_when_nothing_survives() {
        let video = VideoReference::new(Platform::Bilibili, "BV1xx411c7mD");
        let result = ResolutionResult::builder(&video, "stub").finish(vec![candidate("高清", "")]);
        assert!(result.is_none());
    }

    #[test]
    fn numeric_labels_sort_descending_and_others_keep_order() {
        let ordered = order_candidates(vec![
            candidate("高清", "https://a.example/1"),
            candidate("360p", "https://a.example/2"),
            candidate("标清", "https://a.example/3"),
            candidate("1080p+", "https://a.example/4"),
            candidate("720", "https://a.example/5"),
        ]);
        let labels: Vec<_> = ordered.iter().map(|c| c.quality.as_str()).collect();
        assert_eq!(labels, ["1080p+", "720", "360p", "高清", "标清"]);
    }

    #[test]
    fn placeholders_fill_missing_metadata() {
        let video = VideoReference::new(Platform::YouTube, "dQw4w9WgXcQ");
        let result = ResolutionResult::builder(&video, "stub")
            .title(Some("  ".to_string()))
            .finish(vec![candidate("720p", "https://cdn.example.com/v.mp4")])
            .unwrap();

        assert_eq!(result.title, "YouTube video dQw4w9WgXcQ");
        assert_eq!(result.uploader, "YouTube");
        assert_eq!(
            result.thumbnail.as_deref(),
            Some("https://img.youtube.com/vi/dQw4w9WgXcQ/maxresdefault.jpg")
        );
    }

    #[test]
    fn serializes_public_field_names() {
        let video = VideoReference::new(Platform::Bilibili, "BV1xx411c7mD");
        let result = ResolutionResult::builder(&video, "injahow")
            .finish(vec![candidate("高清", "https://cdn.example.com/v.mp4")])
            .unwrap();
        let value = serde_json::to_value(&result).unwrap();

        assert_eq!(value["apiSource"], "injahow");
        assert_eq!(value["formats"][0]["format"], "mp4");
        assert_eq!(value["formats"][0]["size"], "unknown");
        assert!(value.get("thumbnail").is_none());
    }
}
