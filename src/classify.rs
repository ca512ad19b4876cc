use std::sync::LazyLock;

use regex::Regex;
use reqwest::{Client, header::LOCATION};
use tracing::{debug, warn};
use url::Url;

use crate::{
    error::ClassifyError,
    models::{Platform, VideoReference},
};

static YOUTUBE_PATTERNS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r"[?&]v=([^&?#/]+)").unwrap(),
        Regex::new(r"youtu\.be/([^&?#/]+)").unwrap(),
        Regex::new(r"youtube\.com/embed/([^&?#/]+)").unwrap(),
    ]
});

static BILIBILI_PATTERNS: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new(r"bilibili\.com/video/([^/?&#]+)").unwrap(),
        Regex::new(r"b23\.tv/([^/?&#]+)").unwrap(),
    ]
});

pub fn detect_platform(raw_url: &str) -> Option<Platform> {
    let lower = raw_url.to_ascii_lowercase();
    if lower.contains("youtube.com") || lower.contains("youtu.be") {
        Some(Platform::YouTube)
    } else if lower.contains("bilibili.com") || lower.contains("b23.tv") {
        Some(Platform::Bilibili)
    } else {
        None
    }
}

/// Pure classification: platform by host pattern, then the first id shape
/// that matches.
pub fn classify(raw_url: &str) -> Result<VideoReference, ClassifyError> {
    let raw_url = raw_url.trim();
    let platform = detect_platform(raw_url).ok_or(ClassifyError::UnsupportedPlatform)?;
    let patterns: &[Regex] = match platform {
        Platform::YouTube => YOUTUBE_PATTERNS.as_slice(),
        Platform::Bilibili => BILIBILI_PATTERNS.as_slice(),
    };

    patterns
        .iter()
        .find_map(|pattern| {
            pattern
                .captures(raw_url)
                .and_then(|captures| captures.get(1))
                .map(|id| id.as_str())
                .filter(|id| !id.is_empty())
        })
        .map(|id| VideoReference::new(platform, id))
        .ok_or(ClassifyError::MissingId { platform })
}

pub const SHORT_LINK_HOST: &str = "b23.tv";

pub fn is_short_link(raw_url: &str, short_host: &str) -> bool {
    Url::parse(raw_url.trim())
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_ascii_lowercase))
        .is_some_and(|host| host == short_host || host.ends_with(&format!(".{short_host}")))
}

/// Expands `b23.tv` links before classifying. Holds a client with
/// redirects disabled so the first `Location` header can be read.
#[derive(Clone)]
pub struct ShortLinkExpander {
    no_redirect: Client,
    follow: Client,
    short_host: String,
}

impl ShortLinkExpander {
    pub fn new(no_redirect: Client, follow: Client) -> Self {
        Self {
            no_redirect,
            follow,
            short_host: SHORT_LINK_HOST.to_string(),
        }
    }

    #[cfg(test)]
    fn with_short_host(mut self, short_host: impl Into<String>) -> Self {
        self.short_host = short_host.into();
        self
    }

    /// Classifies `raw_url`, resolving short links first. A failed expansion
    /// falls through to classifying the unresolved URL.
    pub async fn classify(&self, raw_url: &str) -> Result<VideoReference, ClassifyError> {
        if is_short_link(raw_url, &self.short_host) {
            match self.expand(raw_url.trim()).await {
                Some(resolved) => {
                    debug!("short link {raw_url} expanded to {resolved}");
                    if let Ok(video) = classify(&resolved) {
                        return Ok(video);
                    }
                    warn!("expanded short link {resolved} carries no video id");
                }
                None => warn!("could not expand short link {raw_url}"),
            }
        }

        classify(raw_url)
    }

    /// HEAD without following redirects; falls back to a GET that follows
    /// them and reports the final URL.
    pub async fn expand(&self, short_url: &str) -> Option<String> {
        match self.no_redirect.head(short_url).send().await {
            Ok(response) => {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| absolutize(short_url, value));
                if location.is_some() {
                    return location;
                }
                debug!(
                    "HEAD {short_url} answered {} without Location",
                    response.status()
                );
            }
            Err(error) => debug!("HEAD {short_url} failed: {error}"),
        }

        match self.follow.get(short_url).send().await {
            Ok(response) => {
                let final_url = response.url().to_string();
                (final_url != short_url).then_some(final_url)
            }
            Err(error) => {
                debug!("GET {short_url} failed: {error}");
                None
            }
        }
    }
}

fn absolutize(base: &str, location: &str) -> Option<String> {
    let location = location.trim();
    if location.is_empty() {
        return None;
    }
    Url::parse(base)
        .and_then(|base| base.join(location))
        .map(|joined| joined.to_string())
        .ok()
}
