use std::{fmt, str::FromStr, sync::Arc};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::{
    error::ExtractionError,
    models::{Platform, ResolutionResult, VideoReference},
};

pub mod bilibili;
pub mod youtube;
pub mod ytdlp;

pub use bilibili::{BiliGet, BilibiliOfficial, Injahow, Weibomiaopai};
pub use youtube::{NineXBuddy, SaveFrom, SsYoutube, Y2mate};
pub use ytdlp::{YtDlp, YtDlpTool};

/// One upstream mechanism that may turn a `VideoReference` into download
/// candidates. Registered only under the platform it understands.
#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    /// Name used in logs and as the result's `apiSource`.
    fn name(&self) -> &'static str;

    /// Succeeds only with at least one candidate carrying a valid URL.
    async fn attempt(&self, video: &VideoReference) -> Result<ResolutionResult, ExtractionError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    Y2mate,
    NineXBuddy,
    SsYoutube,
    SaveFrom,
    Injahow,
    BiliGet,
    Weibomiaopai,
    BilibiliOfficial,
    YtDlp,
}

impl StrategyKind {
    pub const YOUTUBE_DEFAULT: [StrategyKind; 5] = [
        StrategyKind::Y2mate,
        StrategyKind::NineXBuddy,
        StrategyKind::SsYoutube,
        StrategyKind::SaveFrom,
        StrategyKind::YtDlp,
    ];

    pub const BILIBILI_DEFAULT: [StrategyKind; 5] = [
        StrategyKind::Injahow,
        StrategyKind::BiliGet,
        StrategyKind::Weibomiaopai,
        StrategyKind::BilibiliOfficial,
        StrategyKind::YtDlp,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::Y2mate => "y2mate",
            StrategyKind::NineXBuddy => "9xbuddy",
            StrategyKind::SsYoutube => "ssyoutube",
            StrategyKind::SaveFrom => "savefrom",
            StrategyKind::Injahow => "injahow",
            StrategyKind::BiliGet => "biliget",
            StrategyKind::Weibomiaopai => "weibomiaopai",
            StrategyKind::BilibiliOfficial => "bilibili-official",
            StrategyKind::YtDlp => "yt-dlp",
        }
    }

    pub fn supports(self, platform: Platform) -> bool {
        match self {
            StrategyKind::Y2mate
            | StrategyKind::NineXBuddy
            | StrategyKind::SsYoutube
            | StrategyKind::SaveFrom => platform == Platform::YouTube,
            StrategyKind::Injahow
            | StrategyKind::BiliGet
            | StrategyKind::Weibomiaopai
            | StrategyKind::BilibiliOfficial => platform == Platform::Bilibili,
            StrategyKind::YtDlp => true,
        }
    }

    /// Instantiates the strategy against its real upstream.
    pub fn build(self, http: &Client, tool: &YtDlpTool) -> Arc<dyn ExtractionStrategy> {
        let http = http.clone();
        match self {
            StrategyKind::Y2mate => Arc::new(Y2mate::new(http)),
            StrategyKind::NineXBuddy => Arc::new(NineXBuddy::new(http)),
            StrategyKind::SsYoutube => Arc::new(SsYoutube::new(http)),
            StrategyKind::SaveFrom => Arc::new(SaveFrom::new(http)),
            StrategyKind::Injahow => Arc::new(Injahow::new(http)),
            StrategyKind::BiliGet => Arc::new(BiliGet::new(http)),
            StrategyKind::Weibomiaopai => Arc::new(Weibomiaopai::new(http)),
            StrategyKind::BilibiliOfficial => Arc::new(BilibiliOfficial::new(http)),
            StrategyKind::YtDlp => Arc::new(YtDlp::new(tool.clone())),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim().to_ascii_lowercase();
        StrategyKind::YOUTUBE_DEFAULT
            .iter()
            .chain(StrategyKind::BILIBILI_DEFAULT.iter())
            .copied()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| format!("unknown strategy {value:?}"))
    }
}

/// Upper bound on a buffered upstream JSON body.
pub(crate) const MAX_UPSTREAM_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Sends `request`, rejects non-2xx answers and decodes the body as `T`.
pub(crate) async fn fetch_json<T: DeserializeOwned>(
    request: RequestBuilder,
) -> Result<T, ExtractionError> {
    fetch_json_limited(request, MAX_UPSTREAM_BODY_BYTES).await
}

async fn fetch_json_limited<T: DeserializeOwned>(
    request: RequestBuilder,
    limit: usize,
) -> Result<T, ExtractionError> {
    let mut response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ExtractionError::Status {
            status: status.as_u16(),
        });
    }

    if response
        .content_length()
        .is_some_and(|length| length > limit as u64)
    {
        return Err(ExtractionError::TooLarge { limit });
    }

    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        if body.len() + chunk.len() > limit {
            return Err(ExtractionError::TooLarge { limit });
        }
        body.extend_from_slice(&chunk);
    }

    Ok(serde_json::from_slice(&body)?)
}

/// Upstreams mix strings and numbers for the same field.
pub(crate) fn loose_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(text) => Some(text.trim().to_string()).filter(|text| !text.is_empty()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

pub(crate) fn loose_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn trim_base(base: impl Into<String>) -> String {
    base.into().trim_end_matches('/').to_string()
}
