use actix_web::{web, HttpRequest, HttpResponse};
use clipgate_domain::model::{flag_value, PAYMENTS_ENABLED_KEY};
use clipgate_domain::storage::{DownloadStore, SettingsStore};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::state::AppState;

use super::{current_session, observe, ApiError};

#[derive(Debug, Deserialize, Serialize)]
pub struct TogglePaymentsRequest {
    pub enabled: bool,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TogglePaymentsResponse {
    pub payments_enabled: bool,
}

pub async fn toggle_payments_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
    payload: web::Json<TogglePaymentsRequest>,
) -> Result<HttpResponse, ApiError> {
    observe(
        "admin_toggle_payments",
        toggle_payments(&state, &req, payload.enabled).await,
    )
}

async fn toggle_payments(
    state: &AppState,
    req: &HttpRequest,
    enabled: bool,
) -> Result<HttpResponse, ApiError> {
    let session = current_session(state, req);
    let admin = state.gate().require_admin(session.as_ref())?;
    state
        .storage()
        .set_setting(PAYMENTS_ENABLED_KEY, flag_value(enabled))
        .await?;
    info!(admin = %admin.user.email, enabled, "payments toggled");
    Ok(HttpResponse::Ok().json(TogglePaymentsResponse {
        payments_enabled: enabled,
    }))
}

pub async fn stats_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    observe("admin_stats", stats(&state, &req).await)
}

async fn stats(state: &AppState, req: &HttpRequest) -> Result<HttpResponse, ApiError> {
    let session = current_session(state, req);
    state.gate().require_admin(session.as_ref())?;
    let stats = state.storage().stats().await?;
    Ok(HttpResponse::Ok().json(stats))
}
