use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use clipgate_domain::model::{platform_bucket, NewDownload};
use clipgate_domain::storage::DownloadStore;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::state::AppState;

use super::{current_session, observe, ApiError};

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct VideoInfoRequest {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct VideoDownloadRequest {
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub quality: Option<String>,
}

pub async fn video_info_handler(
    state: web::Data<AppState>,
    payload: web::Json<VideoInfoRequest>,
) -> Result<HttpResponse, ApiError> {
    observe("video_info", video_info(&state, payload.into_inner()).await)
}

async fn video_info(state: &AppState, payload: VideoInfoRequest) -> Result<HttpResponse, ApiError> {
    let url = required_url(payload.url)?;
    let info = state.extractor().extract(&url).await?;
    Ok(HttpResponse::Ok().json(info))
}

/// Records download intent only; no transfer happens here.
pub async fn video_download_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
    payload: web::Json<VideoDownloadRequest>,
) -> Result<HttpResponse, ApiError> {
    observe(
        "video_download",
        video_download(&state, &req, payload.into_inner()).await,
    )
}

async fn video_download(
    state: &AppState,
    req: &HttpRequest,
    payload: VideoDownloadRequest,
) -> Result<HttpResponse, ApiError> {
    let video_url = required_url(payload.url)?;
    let user_id = current_session(state, req).map(|session| session.user.id);
    let bucket = platform_bucket(payload.platform.as_deref());

    state
        .storage()
        .log_download(NewDownload {
            user_id: user_id.clone(),
            platform: payload.platform,
            video_url,
            format: payload.format,
            quality: payload.quality,
            downloaded_at: Utc::now(),
        })
        .await?;
    let signed_in = if user_id.is_some() { "yes" } else { "no" };
    counter!("downloads_logged_total", "signed_in" => signed_in).increment(1);
    info!(
        platform = %bucket,
        user_id = user_id.as_ref().map(|id| id.as_str()),
        "download requested"
    );

    Ok(HttpResponse::Ok().json(serde_json::json!({ "status": "started" })))
}

fn required_url(url: Option<String>) -> Result<String, ApiError> {
    url.map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .ok_or_else(|| ApiError::Validation("url is required".into()))
}
