use std::time::Duration;

use tracing::warn;

use crate::{
    models::{Platform, non_empty},
    strategy::StrategyKind,
};

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8787";
const DEFAULT_UPSTREAM_TIMEOUT_SECONDS: u64 = 15;
const DEFAULT_CACHE_TTL_SECONDS: u64 = 60 * 60;
const DEFAULT_CACHE_MAX_ENTRIES: usize = 1_000;
const DEFAULT_YT_DLP_PATH: &str = "yt-dlp";
const DEFAULT_YT_DLP_TIMEOUT_SECONDS: u64 = 60;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub allowed_origins: Vec<String>,
    pub upstream_timeout: Duration,
    pub cache_ttl: Duration,
    pub cache_max_entries: usize,
    pub yt_dlp_path: String,
    pub yt_dlp_timeout: Duration,
    pub youtube_strategies: Vec<StrategyKind>,
    pub bilibili_strategies: Vec<StrategyKind>,
    pub debug_errors: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            allowed_origins: Vec::new(),
            upstream_timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECONDS),
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECONDS),
            cache_max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            yt_dlp_path: DEFAULT_YT_DLP_PATH.to_string(),
            yt_dlp_timeout: Duration::from_secs(DEFAULT_YT_DLP_TIMEOUT_SECONDS),
            youtube_strategies: StrategyKind::YOUTUBE_DEFAULT.to_vec(),
            bilibili_strategies: StrategyKind::BILIBILI_DEFAULT.to_vec(),
            debug_errors: false,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: resolve_bind_addr(),
            allowed_origins: read_list_env("ALLOWED_ORIGINS"),
            upstream_timeout: read_u64_env("UPSTREAM_TIMEOUT_SECONDS")
                .filter(|value| *value > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.upstream_timeout),
            cache_ttl: read_u64_env("CACHE_TTL_SECONDS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_ttl),
            cache_max_entries: read_u64_env("CACHE_MAX_ENTRIES")
                .filter(|value| *value > 0)
                .map(|value| value as usize)
                .unwrap_or(defaults.cache_max_entries),
            yt_dlp_path: std::env::var("YT_DLP_PATH")
                .ok()
                .and_then(|value| non_empty(&value).map(ToString::to_string))
                .unwrap_or(defaults.yt_dlp_path),
            yt_dlp_timeout: read_u64_env("YT_DLP_TIMEOUT_SECONDS")
                .filter(|value| *value > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.yt_dlp_timeout),
            youtube_strategies: std::env::var("YOUTUBE_STRATEGIES")
                .ok()
                .map(|value| parse_strategy_order(&value, Platform::YouTube))
                .unwrap_or(defaults.youtube_strategies),
            bilibili_strategies: std::env::var("BILIBILI_STRATEGIES")
                .ok()
                .map(|value| parse_strategy_order(&value, Platform::Bilibili))
                .unwrap_or(defaults.bilibili_strategies),
            debug_errors: read_bool_env("DEBUG_ERRORS").unwrap_or(false),
        }
    }

    pub fn cache_enabled(&self) -> bool {
        !self.cache_ttl.is_zero()
    }

    /// The bound on a whole strategy attempt; multi-request strategies and
    /// the local tool get their own budget on top of the per-request one.
    pub fn attempt_timeout(&self) -> Duration {
        self.upstream_timeout
            .saturating_mul(2)
            .max(self.yt_dlp_timeout)
    }
}

/// Comma separated strategy names. Unknown names and strategies that do not
/// apply to `platform` are skipped with a warning; duplicates keep the first
/// position.
pub fn parse_strategy_order(value: &str, platform: Platform) -> Vec<StrategyKind> {
    let mut order = Vec::new();
    for name in value.split(',').filter_map(non_empty) {
        match name.parse::<StrategyKind>() {
            Ok(kind) if !kind.supports(platform) => {
                warn!("strategy {kind} does not apply to {platform}, skipping");
            }
            Ok(kind) => {
                if !order.contains(&kind) {
                    order.push(kind);
                }
            }
            Err(error) => warn!("{error} in {platform} strategy order, skipping"),
        }
    }
    order
}

pub fn read_bool_env(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    parse_bool(&value)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn read_u64_env(name: &str) -> Option<u64> {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
}

fn read_list_env(name: &str) -> Vec<String> {
    std::env::var(name)
        .ok()
        .map(|value| {
            value
                .split(',')
                .filter_map(non_empty)
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn resolve_bind_addr() -> String {
    if let Some(configured) = std::env::var("APP_ADDR")
        .ok()
        .and_then(|value| non_empty(&value).map(ToString::to_string))
    {
        return configured;
    }

    if let Some(port) = std::env::var("PORT")
        .ok()
        .and_then(|value| value.trim().parse::<u16>().ok())
    {
        return format!("0.0.0.0:{port}");
    }

    DEFAULT_BIND_ADDR.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strategy_order_skips_unknown_and_foreign_names() {
        let order = parse_strategy_order(
            "yt-dlp, injahow, nope, y2mate,,yt-dlp",
            Platform::YouTube,
        );
        assert_eq!(order, [StrategyKind::YtDlp, StrategyKind::Y2mate]);
    }

    #[test]
    fn empty_order_is_allowed() {
        assert!(parse_strategy_order("", Platform::Bilibili).is_empty());
    }

    #[test]
    fn bool_parsing() {
        assert_eq!(parse_bool(" Yes "), Some(true));
        assert_eq!(parse_bool("off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn defaults() {
        let config = AppConfig::default();
        assert!(config.cache_enabled());
        assert_eq!(config.youtube_strategies[0], StrategyKind::Y2mate);
        assert_eq!(config.bilibili_strategies[0], StrategyKind::Injahow);
        assert_eq!(config.attempt_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn huge_upstream_timeout_saturates() {
        let config = AppConfig {
            upstream_timeout: Duration::from_secs(u64::MAX),
            ..AppConfig::default()
        };
        assert_eq!(config.attempt_timeout(), Duration::MAX);
    }
}
