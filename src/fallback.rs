use crate::models::{
    DownloadCandidate, Platform, ResolutionResult, UNKNOWN_LABEL, VideoReference,
};

pub const STATIC_FALLBACK_TAG: &str = "static-fallback (unverified)";

/// One helper page. `{id}` in the template is replaced with the video id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperLink {
    pub quality: String,
    pub template: String,
}

impl HelperLink {
    pub fn new(quality: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            quality: quality.into(),
            template: template.into(),
        }
    }

    fn render(&self, id: &str) -> DownloadCandidate {
        DownloadCandidate::new(self.quality.clone(), self.template.replace("{id}", id))
    }
}

/// Hard-coded third-party redirect pages returned when every strategy fails.
/// None of them is checked to hold a real download.
#[derive(Debug, Clone)]
pub struct StaticFallback {
    youtube: Vec<HelperLink>,
    bilibili: Vec<HelperLink>,
}

impl Default for StaticFallback {
    fn default() -> Self {
        Self::new(
            vec![
                HelperLink::new("720p", "https://www.y2mate.com/youtube/{id}"),
                HelperLink::new(
                    "1080p",
                    "https://9xbuddy.org/download?url=https://www.youtube.com/watch?v={id}",
                ),
                HelperLink::new("best", "https://ssyoutube.com/watch?v={id}"),
            ],
            vec![
                HelperLink::new(
                    "高清",
                    "https://xbeibeix.com/api/bilibili/biliplayer/?url=https://www.bilibili.com/video/{id}",
                ),
                HelperLink::new("原始质量", "https://bili.iiilab.com/?bvid={id}"),
                HelperLink::new(
                    "标清",
                    "https://injahow.com/bparse/?url=https://www.bilibili.com/video/{id}",
                ),
            ],
        )
    }
}

impl StaticFallback {
    pub fn new(youtube: Vec<HelperLink>, bilibili: Vec<HelperLink>) -> Self {
        Self { youtube, bilibili }
    }

    pub fn links(&self, platform: Platform) -> &[HelperLink] {
        match platform {
            Platform::YouTube => &self.youtube,
            Platform::Bilibili => &self.bilibili,
        }
    }

    /// Always yields a result. Helper links go through the same filtering and
    /// ordering as strategy output; when the configured table renders nothing
    /// usable, the canonical page URL is offered instead.
    pub fn build(&self, video: &VideoReference) -> ResolutionResult {
        let candidates: Vec<DownloadCandidate> = self
            .links(video.platform)
            .iter()
            .map(|link| link.render(&video.id))
            .collect();

        ResolutionResult::builder(video, STATIC_FALLBACK_TAG)
            .finish(candidates)
            .unwrap_or_else(|| ResolutionResult {
                id: video.id.clone(),
                title: video.platform.default_title(&video.id),
                uploader: video.platform.default_uploader().to_string(),
                thumbnail: video.platform.default_thumbnail(&video.id),
                candidates: vec![DownloadCandidate::new(UNKNOWN_LABEL, video.page_url())],
                source_tag: STATIC_FALLBACK_TAG.to_string(),
            })
    }
}

/// Helper page for the `/api/download/youtube/{id}/{quality}` redirect.
pub fn youtube_redirect_target(video_id: &str, quality: &str) -> Option<String> {
    match quality {
        "360" | "auto" => Some(format!("https://www.y2mate.com/youtube/{video_id}")),
        "720" => Some(format!(
            "https://9xbuddy.org/download?url=https://www.youtube.com/watch?v={video_id}"
        )),
        "1080" => Some(format!("https://ssyoutube.com/watch?v={video_id}")),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn youtube_links_embed_the_id() {
        let video = VideoReference::new(Platform::YouTube, "dQw4w9WgXcQ");
        let result = StaticFallback::default().build(&video);

        assert_eq!(result.source_tag, STATIC_FALLBACK_TAG);
        assert_eq!(result.candidates.len(), 3);
        assert!(result
            .candidates
            .iter()
            .all(|candidate| candidate.url.contains("dQw4w9WgXcQ")));
        assert_eq!(result.title, "YouTube video dQw4w9WgXcQ");
    }

    #[test]
    fn bilibili_links_keep_declared_order() {
        let video = VideoReference::new(Platform::Bilibili, "BV1xx411c7mD");
        let result = StaticFallback::default().build(&video);

        let qualities: Vec<_> = result.candidates.iter().map(|c| c.quality.as_str()).collect();
        assert_eq!(qualities, ["高清", "原始质量", "标清"]);
        assert_eq!(result.uploader, "Bilibili uploader");
    }

    #[test]
    fn empty_table_still_yields_a_candidate() {
        let video = VideoReference::new(Platform::Bilibili, "BV1xx411c7mD");
        let result = StaticFallback::new(Vec::new(), Vec::new()).build(&video);

        assert_eq!(result.candidates.len(), 1);
        assert_eq!(
            result.candidates[0].url,
            "https://www.bilibili.com/video/BV1xx411c7mD"
        );
    }

    #[test]
    fn redirect_table() {
        assert_eq!(
            youtube_redirect_target("abc", "auto").as_deref(),
            Some("https://www.y2mate.com/youtube/abc")
        );
        assert!(youtube_redirect_target("abc", "720").unwrap().contains("9xbuddy"));
        assert!(youtube_redirect_target("abc", "1080").unwrap().contains("ssyoutube"));
        assert!(youtube_redirect_target("abc", "4k").is_none());
    }
}
