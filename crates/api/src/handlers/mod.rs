pub mod admin;
pub mod app;
pub mod auth;
pub mod metrics;
pub mod payment;
pub mod video;

pub use admin::{stats_handler, toggle_payments_handler};
pub use app::{app_config_handler, index_handler};
pub use auth::{login_handler, logout_handler, oauth_callback_handler, profile_handler};
pub use metrics::metrics_handler;
pub use payment::{create_order_handler, verify_payment_handler};
pub use video::{video_download_handler, video_info_handler};

use actix_web::cookie::{time, Cookie, SameSite};
use actix_web::{http::StatusCode, HttpRequest, HttpResponse, ResponseError};
use clipgate_domain::external::{ExtractionError, GatewayError, IdentityError};
use clipgate_domain::services::{AccessError, PaymentError, Session, SessionError, SESSION_COOKIE};
use clipgate_domain::storage::StorageError;
use ::metrics::counter;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::state::AppState;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not authenticated")]
    Unauthenticated,
    #[error("unauthorized")]
    Unauthorized,
    #[error("{0}")]
    Validation(String),
    #[error("payments are disabled")]
    FeatureDisabled,
    #[error("payment gateway is not configured")]
    GatewayNotConfigured,
    #[error("unknown identity provider")]
    UnknownProvider,
    #[error("invalid or expired login state")]
    InvalidLoginState,
    #[error("payment verification failed")]
    VerificationFailed,
    #[error("conflict")]
    Conflict,
    #[error("not found")]
    NotFound,
    #[error("storage failure: {0}")]
    Storage(StorageError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict(_) => ApiError::Conflict,
            StorageError::NotFound(_) => ApiError::NotFound,
            other => ApiError::Storage(other),
        }
    }
}

impl From<AccessError> for ApiError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::Unauthenticated => ApiError::Unauthenticated,
            AccessError::Unauthorized => ApiError::Unauthorized,
        }
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::Validation(field) => {
                ApiError::Validation(format!("{field} is required"))
            }
            PaymentError::FeatureDisabled => ApiError::FeatureDisabled,
            PaymentError::GatewayNotConfigured => ApiError::GatewayNotConfigured,
            PaymentError::Gateway(err) => ApiError::Gateway(err),
            PaymentError::Storage(err) => err.into(),
        }
    }
}

impl ApiError {
    /// Client-facing text. Server-side failures never echo driver,
    /// subprocess or gateway internals.
    fn public_message(&self) -> String {
        match self {
            ApiError::Storage(_) => "internal storage error".into(),
            ApiError::Extraction(ExtractionError::InvalidUrl(_)) => "invalid video url".into(),
            ApiError::Extraction(ExtractionError::Failure(_)) => {
                "could not fetch video information".into()
            }
            ApiError::Extraction(ExtractionError::Timeout) => {
                "video information request timed out".into()
            }
            ApiError::Gateway(GatewayError::Failure(_)) => "payment gateway error".into(),
            ApiError::Gateway(GatewayError::Timeout) => "payment gateway timed out".into(),
            ApiError::Identity(IdentityError::Timeout) => "identity provider timed out".into(),
            ApiError::Identity(_) => "sign-in failed".into(),
            ApiError::Session(_) => "could not establish session".into(),
            other => other.to_string(),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Unauthorized | ApiError::FeatureDisabled => StatusCode::FORBIDDEN,
            ApiError::Validation(_)
            | ApiError::InvalidLoginState
            | ApiError::VerificationFailed
            | ApiError::Extraction(ExtractionError::InvalidUrl(_)) => StatusCode::BAD_REQUEST,
            ApiError::UnknownProvider | ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Conflict => StatusCode::CONFLICT,
            ApiError::Extraction(ExtractionError::Timeout)
            | ApiError::Gateway(GatewayError::Timeout)
            | ApiError::Identity(IdentityError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::GatewayNotConfigured
            | ApiError::Storage(_)
            | ApiError::Extraction(_)
            | ApiError::Gateway(_)
            | ApiError::Identity(_)
            | ApiError::Session(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, %status, "request failed");
        }
        HttpResponse::build(status).json(ErrorBody {
            error: self.public_message(),
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Records `api_requests_total` for a finished handler.
pub(crate) fn observe(
    endpoint: &'static str,
    result: Result<HttpResponse, ApiError>,
) -> Result<HttpResponse, ApiError> {
    let status = match &result {
        Ok(response) => response.status(),
        Err(err) => err.status_code(),
    };
    counter!(
        "api_requests_total",
        "endpoint" => endpoint,
        "status" => status.as_str().to_owned()
    )
    .increment(1);
    result
}

pub(crate) fn session_cookie(req: &HttpRequest) -> Option<String> {
    req.cookie(SESSION_COOKIE)
        .map(|cookie| cookie.value().to_owned())
}

pub(crate) fn current_session(state: &AppState, req: &HttpRequest) -> Option<Session> {
    session_cookie(req).and_then(|value| state.sessions().resolve(&value))
}

pub(crate) fn build_session_cookie(state: &AppState, value: String) -> Cookie<'static> {
    let policy = state.cookie_policy();
    let max_age = i64::try_from(policy.ttl.as_secs()).unwrap_or(i64::MAX);
    Cookie::build(SESSION_COOKIE, value)
        .path("/")
        .http_only(true)
        .secure(policy.secure)
        .same_site(if policy.secure {
            SameSite::None
        } else {
            SameSite::Lax
        })
        .max_age(time::Duration::seconds(max_age))
        .finish()
}

pub(crate) fn expired_session_cookie(state: &AppState) -> Cookie<'static> {
    let mut cookie = build_session_cookie(state, String::new());
    cookie.make_removal();
    cookie
}
