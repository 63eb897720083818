use actix_web::{http::header, web, HttpRequest, HttpResponse};
use clipgate_domain::services::{payments_enabled, SessionUser};
use clipgate_domain::storage::UserStore;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::state::AppState;

use super::{
    build_session_cookie, current_session, expired_session_cookie, observe, session_cookie,
    ApiError,
};

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
    pub is_admin: bool,
    pub is_paid: bool,
    pub payments_enabled: bool,
}

pub async fn login_handler(
    state: web::Data<AppState>,
    provider: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    observe("auth_login", login(&state, &provider).await)
}

async fn login(state: &AppState, provider_id: &str) -> Result<HttpResponse, ApiError> {
    let provider = state
        .identity_provider(provider_id)
        .ok_or(ApiError::UnknownProvider)?;
    let login_state = state.login_states().issue(provider.id())?;
    Ok(HttpResponse::Found()
        .insert_header((header::LOCATION, provider.authorization_url(&login_state)))
        .finish())
}

pub async fn oauth_callback_handler(
    state: web::Data<AppState>,
    provider: web::Path<String>,
    query: web::Query<CallbackQuery>,
) -> Result<HttpResponse, ApiError> {
    observe(
        "auth_callback",
        callback(&state, &provider, query.into_inner()).await,
    )
}

async fn callback(
    state: &AppState,
    provider_id: &str,
    query: CallbackQuery,
) -> Result<HttpResponse, ApiError> {
    let provider = state
        .identity_provider(provider_id)
        .ok_or(ApiError::UnknownProvider)?;
    if let Some(reason) = query.error {
        warn!(provider = provider_id, reason = %reason, "provider denied sign-in");
        return Err(ApiError::Validation("sign-in was not completed".into()));
    }
    let login_state = query.state.unwrap_or_default();
    if !state.login_states().consume(&login_state, provider.id()) {
        return Err(ApiError::InvalidLoginState);
    }
    let code = query
        .code
        .filter(|code| !code.is_empty())
        .ok_or_else(|| ApiError::Validation("code is required".into()))?;

    let identity = provider.exchange_code(&code).await?;
    let user = state
        .storage()
        .upsert_user(SessionUser::from(&identity).profile())
        .await?;
    let session = state.gate().login(&identity, user.is_paid);
    info!(
        user_id = user.id.as_str(),
        is_admin = session.is_admin,
        "user signed in"
    );
    let cookie = state.sessions().create(session)?;

    Ok(HttpResponse::Found()
        .cookie(build_session_cookie(state, cookie))
        .insert_header((header::LOCATION, state.post_login_redirect()))
        .finish())
}

pub async fn logout_handler(state: web::Data<AppState>, req: HttpRequest) -> HttpResponse {
    if let Some(cookie) = session_cookie(&req) {
        state.sessions().destroy(&cookie);
    }
    HttpResponse::Ok()
        .cookie(expired_session_cookie(&state))
        .json(StatusResponse {
            status: "ok".to_string(),
        })
}

pub async fn profile_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    observe("user_profile", profile(&state, &req).await)
}

async fn profile(state: &AppState, req: &HttpRequest) -> Result<HttpResponse, ApiError> {
    let session = current_session(state, req);
    let session = state.gate().require_authenticated(session.as_ref())?;
    let user = &session.user;
    let is_paid = state.storage().payment_flag(&user.id).await?;
    let payments_enabled = payments_enabled(state.storage()).await?;

    Ok(HttpResponse::Ok().json(ProfileResponse {
        id: user.id.as_str().to_string(),
        email: user.email.clone(),
        name: user.name.clone(),
        picture: user.picture.clone(),
        is_admin: state.gate().is_admin(&user.email),
        is_paid,
        payments_enabled,
    }))
}
