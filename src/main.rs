mod api;
mod cache;
mod classify;
mod config;
mod error;
mod fallback;
mod models;
mod resolver;
mod strategy;
#[cfg(test)]
mod test_support;

use std::{collections::HashSet, sync::Arc};

use axum::{
    Router,
    http::{HeaderValue, Method, header::CONTENT_TYPE},
    routing::get,
};
use tokio::net::TcpListener;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    api::AppState,
    cache::ResultCache,
    classify::ShortLinkExpander,
    config::AppConfig,
    error::{ApiError, panic_responder},
    fallback::StaticFallback,
    models::Platform,
    resolver::{FallbackResolver, StrategyList},
    strategy::{StrategyKind, YtDlpTool},
};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "youbili_api=info,tower_http=info".to_string()),
        )
        .init();

    if let Err(error) = run(AppConfig::from_env()).await {
        eprintln!(
            "Server error: {}: {}",
            error.message,
            error.detail.unwrap_or_default()
        );
        std::process::exit(1);
    }
}

async fn run(config: AppConfig) -> Result<(), ApiError> {
    let http = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(config.upstream_timeout)
        .build()
        .map_err(|error| startup_error("Could not build HTTP client", error))?;
    let no_redirect = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(config.upstream_timeout)
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .map_err(|error| startup_error("Could not build HTTP client", error))?;

    let tool = YtDlpTool::new(config.yt_dlp_path.clone(), config.yt_dlp_timeout);
    let resolver = build_resolver(&config, &http, &tool);

    info!(
        "strategy order youtube={:?} bilibili={:?}",
        resolver.strategy_names(Platform::YouTube),
        resolver.strategy_names(Platform::Bilibili)
    );
    if config.debug_errors {
        warn!("DEBUG_ERRORS=true: internal error detail is included in 500 responses.");
    }

    let state = AppState {
        resolver: Arc::new(resolver),
        expander: ShortLinkExpander::new(no_redirect, http),
        tool,
        debug_errors: config.debug_errors,
    };

    let cors = build_cors_layer(&config.allowed_origins)?;

    let app = Router::new()
        .route("/api", get(api::video_info_get).post(api::video_info_post))
        .route(
            "/api/video-info",
            get(api::video_info_get).post(api::video_info_post),
        )
        .route(
            "/api/download/youtube/{video_id}/{quality}",
            get(api::download_youtube),
        )
        .route("/api/hello", get(api::hello))
        .route("/api/health", get(api::health))
        .route("/api/ytdlp", get(api::ytdlp_status))
        .with_state(state)
        .layer(CatchPanicLayer::custom(panic_responder(config.debug_errors)))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .map_err(|error| startup_error(format!("Could not bind {}", config.bind_addr), error))?;

    info!("YouBili API listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .map_err(|error| startup_error("HTTP server error", error))
}

fn startup_error(message: impl Into<String>, error: impl std::fmt::Display) -> ApiError {
    ApiError::internal(message, error.to_string(), true)
}

fn build_resolver(config: &AppConfig, http: &reqwest::Client, tool: &YtDlpTool) -> FallbackResolver {
    let build = |kinds: &[StrategyKind]| -> StrategyList {
        kinds.iter().map(|kind| kind.build(http, tool)).collect()
    };

    let resolver = FallbackResolver::new(
        build(&config.youtube_strategies),
        build(&config.bilibili_strategies),
        StaticFallback::default(),
        config.attempt_timeout(),
    );

    if config.cache_enabled() {
        let ttl = chrono::Duration::from_std(config.cache_ttl)
            .unwrap_or_else(|_| chrono::Duration::days(365));
        info!(
            "result cache enabled: ttl={}s max_entries={}",
            config.cache_ttl.as_secs(),
            config.cache_max_entries
        );
        resolver.with_cache(Arc::new(ResultCache::new(ttl, config.cache_max_entries)))
    } else {
        info!("result cache disabled");
        resolver
    }
}

fn build_cors_layer(configured: &[String]) -> Result<CorsLayer, ApiError> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);

    if configured.is_empty() {
        info!("ALLOWED_ORIGINS not set, accepting any origin.");
        return Ok(layer.allow_origin(Any));
    }

    let normalized_origins = configured
        .iter()
        .map(|origin| {
            normalize_origin(origin).ok_or_else(|| {
                startup_error(
                    "Invalid origin in ALLOWED_ORIGINS",
                    format!("{origin}. Use values like https://example.com"),
                )
            })
        })
        .collect::<Result<HashSet<_>, _>>()?;
    let allowed_origins = Arc::new(normalized_origins);
    let allow_origin = AllowOrigin::predicate({
        let allowed_origins = Arc::clone(&allowed_origins);
        move |origin: &HeaderValue, _| {
            let normalized = origin.to_str().ok().and_then(normalize_origin);
            let allowed = normalized
                .as_ref()
                .is_some_and(|value| allowed_origins.contains(value));
            debug!(
                "CORS origin check raw={:?} normalized={:?} allowed={}",
                origin, normalized, allowed
            );
            allowed
        }
    });
    info!(
        "CORS allow-list loaded with {} origin(s): {:?}",
        allowed_origins.len(),
        allowed_origins.iter().collect::<Vec<_>>()
    );

    Ok(layer.allow_origin(allow_origin))
}

fn normalize_origin(value: &str) -> Option<String> {
    let parsed = Url::parse(value).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let scheme = parsed.scheme();
    let default_port = match scheme {
        "http" => 80,
        "https" => 443,
        _ => return None,
    };

    if parsed.path() != "/" || parsed.query().is_some() || parsed.fragment().is_some() {
        return None;
    }

    match parsed.port() {
        Some(port) if port != default_port => Some(format!("{scheme}://{host}:{port}")),
        _ => Some(format!("{scheme}://{host}")),
    }
}
