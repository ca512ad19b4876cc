use std::{fmt, sync::Arc, time::Duration};

use tokio::time::timeout;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::{
    cache::ResultCache,
    error::ExtractionError,
    fallback::StaticFallback,
    models::{Platform, ResolutionResult, VideoReference},
    strategy::ExtractionStrategy,
};

pub type StrategyList = Vec<Arc<dyn ExtractionStrategy>>;

/// A strategy that did not produce candidates during one resolution.
#[derive(Debug)]
pub struct StrategyFailure {
    pub strategy: &'static str,
    pub error: ExtractionError,
}

impl fmt::Display for StrategyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.strategy, self.error)
    }
}

/// One line naming every failed strategy and its error, in attempt order.
pub fn summarize_failures(failures: &[StrategyFailure]) -> String {
    if failures.is_empty() {
        return "no strategies configured".to_string();
    }
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Tries strategies in priority order and stops at the first success. When
/// all of them fail the static fallback answers, so resolution never errors.
pub struct FallbackResolver {
    youtube: StrategyList,
    bilibili: StrategyList,
    fallback: StaticFallback,
    cache: Option<Arc<ResultCache>>,
    attempt_timeout: Duration,
}

impl FallbackResolver {
    pub fn new(
        youtube: StrategyList,
        bilibili: StrategyList,
        fallback: StaticFallback,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            youtube,
            bilibili,
            fallback,
            cache: None,
            attempt_timeout,
        }
    }

    pub fn with_cache(mut self, cache: Arc<ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn strategies(&self, platform: Platform) -> &[Arc<dyn ExtractionStrategy>] {
        match platform {
            Platform::YouTube => &self.youtube,
            Platform::Bilibili => &self.bilibili,
        }
    }

    pub fn strategy_names(&self, platform: Platform) -> Vec<&'static str> {
        self.strategies(platform)
            .iter()
            .map(|strategy| strategy.name())
            .collect()
    }

    /// Resolves `video`, consulting and populating the cache under `cache_key`
    /// (the raw request URL) when a cache is attached.
    pub async fn resolve_cached(&self, cache_key: &str, video: &VideoReference) -> ResolutionResult {
        if let Some(cache) = &self.cache
            && let Some(hit) = cache.get(cache_key).await
        {
            debug!("cache hit for {cache_key}");
            return hit;
        }

        let result = self.resolve(video).await;

        if let Some(cache) = &self.cache {
            cache.put(cache_key, result.clone()).await;
            debug!("cached {cache_key}, {} entries held", cache.len().await);
        }

        result
    }

    pub async fn resolve(&self, video: &VideoReference) -> ResolutionResult {
        let span = info_span!(
            "resolve",
            request_id = %Uuid::new_v4(),
            platform = %video.platform,
            id = %video.id
        );

        async {
            let (result, failures) = self.run_chain(video).await;
            match result {
                Some(result) => result,
                None => {
                    warn!(
                        "all {} strategies failed ({}), answering with static fallback",
                        failures.len(),
                        summarize_failures(&failures)
                    );
                    self.fallback.build(video)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_chain(
        &self,
        video: &VideoReference,
    ) -> (Option<ResolutionResult>, Vec<StrategyFailure>) {
        let mut failures = Vec::new();

        for strategy in self.strategies(video.platform) {
            let attempt = timeout(self.attempt_timeout, strategy.attempt(video))
                .await
                .unwrap_or(Err(ExtractionError::Timeout(self.attempt_timeout)));

            match attempt {
                Ok(result) if !result.candidates.is_empty() => {
                    info!(
                        "{} produced {} candidate(s)",
                        strategy.name(),
                        result.candidates.len()
                    );
                    return (Some(result), failures);
                }
                Ok(_) => {
                    warn!("{} failed: {}", strategy.name(), ExtractionError::Empty);
                    failures.push(StrategyFailure {
                        strategy: strategy.name(),
                        error: ExtractionError::Empty,
                    });
                }
                Err(error) => {
                    warn!("{} failed: {error}", strategy.name());
                    failures.push(StrategyFailure {
                        strategy: strategy.name(),
                        error,
                    });
                }
            }
        }

        (None, failures)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::{
        fallback::STATIC_FALLBACK_TAG,
        models::DownloadCandidate,
    };

    enum Behaviour {
        Fail,
        Succeed(Vec<DownloadCandidate>),
        Hang,
    }

    struct FakeStrategy {
        name: &'static str,
        behaviour: Behaviour,
        calls: AtomicUsize,
    }

    impl FakeStrategy {
        fn new(name: &'static str, behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                name,
                behaviour,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ExtractionStrategy for FakeStrategy {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn attempt(
            &self,
            video: &VideoReference,
        ) -> Result<ResolutionResult, ExtractionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behaviour {
                Behaviour::Fail => Err(ExtractionError::Status { status: 503 }),
                Behaviour::Succeed(candidates) => ResolutionResult::builder(video, self.name)
                    .finish(candidates.clone())
                    .ok_or(ExtractionError::Empty),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(ExtractionError::Empty)
                }
            }
        }
    }

    fn youtube_video() -> VideoReference {
        VideoReference::new(Platform::YouTube, "dQw4w9WgXcQ")
    }

    fn candidates() -> Vec<DownloadCandidate> {
        vec![
            DownloadCandidate::new("360p", "https://cdn.example.com/360.mp4"),
            DownloadCandidate::new("720p", "https://cdn.example.com/720.mp4"),
        ]
    }

    fn resolver(youtube: StrategyList) -> FallbackResolver {
        FallbackResolver::new(
            youtube,
            Vec::new(),
            StaticFallback::default(),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn first_success_wins_and_later_strategies_are_skipped() {
        let first = FakeStrategy::new("first", Behaviour::Fail);
        let second = FakeStrategy::new("second", Behaviour::Fail);
        let third = FakeStrategy::new("third", Behaviour::Succeed(candidates()));
        let fourth = FakeStrategy::new("fourth", Behaviour::Succeed(candidates()));
        let resolver = resolver(vec![
            first.clone(),
            second.clone(),
            third.clone(),
            fourth.clone(),
        ]);

        let result = resolver.resolve(&youtube_video()).await;

        assert_eq!(result.source_tag, "third");
        let urls: Vec<_> = result.candidates.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(
            urls,
            ["https://cdn.example.com/720.mp4", "https://cdn.example.com/360.mp4"]
        );
        assert_eq!(
            [first.calls(), second.calls(), third.calls(), fourth.calls()],
            [1, 1, 1, 0]
        );
    }

    #[tokio::test]
    async fn all_failures_fall_back_to_static_links() {
        let resolver = resolver(vec![
            FakeStrategy::new("a", Behaviour::Fail),
            FakeStrategy::new("b", Behaviour::Succeed(vec![DownloadCandidate::new("720p", "")])),
        ]);

        let result = resolver.resolve(&youtube_video()).await;

        assert_eq!(result.source_tag, STATIC_FALLBACK_TAG);
        assert!(!result.candidates.is_empty());
        assert!(result
            .candidates
            .iter()
            .any(|candidate| candidate.url.contains("dQw4w9WgXcQ")));
    }

    #[tokio::test]
    async fn failures_are_recorded_in_attempt_order() {
        let resolver = resolver(vec![
            FakeStrategy::new("a", Behaviour::Fail),
            FakeStrategy::new("b", Behaviour::Succeed(vec![DownloadCandidate::new("720p", "")])),
        ]);

        let (result, failures) = resolver.run_chain(&youtube_video()).await;

        assert!(result.is_none());
        assert_eq!(
            summarize_failures(&failures),
            "a: upstream answered HTTP 503; b: upstream returned no usable download links"
        );
        assert_eq!(summarize_failures(&[]), "no strategies configured");
    }

    #[tokio::test]
    async fn empty_strategy_list_uses_fallback() {
        let resolver = resolver(Vec::new());
        let video = VideoReference::new(Platform::Bilibili, "BV1xx411c7mD");

        let result = resolver.resolve(&video).await;
        assert_eq!(result.source_tag, STATIC_FALLBACK_TAG);
        assert_eq!(result.id, "BV1xx411c7mD");
    }

    #[tokio::test]
    async fn hung_strategy_times_out_and_next_one_runs() {
        let hung = FakeStrategy::new("hung", Behaviour::Hang);
        let good = FakeStrategy::new("good", Behaviour::Succeed(candidates()));
        let resolver = FallbackResolver::new(
            vec![hung.clone(), good.clone()],
            Vec::new(),
            StaticFallback::default(),
            Duration::from_millis(50),
        );

        let result = resolver.resolve(&youtube_video()).await;
        assert_eq!(result.source_tag, "good");
        assert_eq!(hung.calls(), 1);
    }

    #[tokio::test]
    async fn warm_cache_skips_strategies() {
        let strategy = FakeStrategy::new("counted", Behaviour::Succeed(candidates()));
        let cache = Arc::new(ResultCache::new(chrono::Duration::seconds(60), 10));
        let resolver = resolver(vec![strategy.clone()]).with_cache(cache);
        let key = "https://youtu.be/dQw4w9WgXcQ";

        let first = resolver.resolve_cached(key, &youtube_video()).await;
        let second = resolver.resolve_cached(key, &youtube_video()).await;

        assert_eq!(first, second);
        assert_eq!(strategy.calls(), 1);
    }

    #[tokio::test]
    async fn repeated_cold_resolutions_are_independent() {
        let strategy = FakeStrategy::new("counted", Behaviour::Succeed(candidates()));
        let resolver = resolver(vec![strategy.clone()]);

        let first = resolver.resolve(&youtube_video()).await;
        let second = resolver.resolve(&youtube_video()).await;

        assert_eq!(first, second);
        assert_eq!(strategy.calls(), 2);
    }

    #[tokio::test]
    async fn end_to_end_short_link_with_failing_strategies() {
        let video = crate::classify::classify("https://youtu.be/dQw4w9WgXcQ").unwrap();
        assert_eq!(video, youtube_video());

        let resolver = resolver(vec![
            FakeStrategy::new("a", Behaviour::Fail),
            FakeStrategy::new("b", Behaviour::Fail),
        ]);
        let result = resolver.resolve(&video).await;

        assert!(result
            .candidates
            .iter()
            .any(|candidate| candidate.url.contains("dQw4w9WgXcQ")));
    }
}
