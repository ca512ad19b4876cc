use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::{StatusCode, header::LOCATION},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    classify::ShortLinkExpander,
    error::ApiError,
    fallback::youtube_redirect_target,
    models::{ResolutionResult, non_empty},
    resolver::FallbackResolver,
    strategy::YtDlpTool,
};

#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<FallbackResolver>,
    pub expander: ShortLinkExpander,
    pub tool: YtDlpTool,
    pub debug_errors: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct VideoInfoRequest {
    url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YtDlpStatus {
    status: &'static str,
    version: String,
    bin_path: String,
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn hello(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Hello from YouBili API!",
        "timestamp": Utc::now().to_rfc3339(),
        "env": {
            "version": env!("CARGO_PKG_VERSION"),
            "debugErrors": state.debug_errors,
        }
    }))
}

pub async fn video_info_get(
    State(state): State<AppState>,
    Query(query): Query<VideoInfoRequest>,
) -> Result<Json<ResolutionResult>, ApiError> {
    lookup(&state, query.url.as_deref()).await
}

pub async fn video_info_post(
    State(state): State<AppState>,
    payload: Result<Json<VideoInfoRequest>, JsonRejection>,
) -> Result<Json<ResolutionResult>, ApiError> {
    let Json(payload) =
        payload.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    lookup(&state, payload.url.as_deref()).await
}

async fn lookup(state: &AppState, raw_url: Option<&str>) -> Result<Json<ResolutionResult>, ApiError> {
    let raw_url = raw_url
        .and_then(non_empty)
        .ok_or_else(|| ApiError::bad_request("Please provide a video URL"))?;

    let video = state.expander.classify(raw_url).await?;
    info!("resolving {} video {}", video.platform, video.id);

    let result = state.resolver.resolve_cached(raw_url, &video).await;
    Ok(Json(result))
}

pub async fn download_youtube(
    Path((video_id, quality)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let video_id = non_empty(&video_id).ok_or_else(|| ApiError::bad_request("Missing video id"))?;
    let target = youtube_redirect_target(video_id, quality.trim())
        .ok_or_else(|| ApiError::bad_request("unsupported quality"))?;

    Ok((StatusCode::FOUND, [(LOCATION, target)]).into_response())
}

pub async fn ytdlp_status(State(state): State<AppState>) -> Result<Json<YtDlpStatus>, ApiError> {
    let version = state.tool.version().await.map_err(|error| {
        ApiError::internal("yt-dlp check failed", error.to_string(), state.debug_errors)
    })?;

    Ok(Json(YtDlpStatus {
        status: "success",
        version,
        bin_path: state.tool.path.clone(),
    }))
}
