//! Contracts for the third-party collaborators: the payment gateway, the
//! identity provider and the media metadata extractor. Concrete clients live
//! in the gateway crate; tests substitute fakes.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::model::{OrderId, UserId};

/// Maximum number of formats returned by the video info endpoint.
pub const MAX_FORMATS: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayOrder {
    pub order_id: OrderId,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("payment gateway error: {0}")]
    Failure(String),
    #[error("payment gateway timed out")]
    Timeout,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self, request: OrderRequest) -> Result<GatewayOrder, GatewayError>;
}

/// Identity established by the provider. This service trusts the provider's
/// result and does not re-verify tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub subject: String,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("identity provider rejected the exchange: {0}")]
    Exchange(String),
    #[error("identity provider response is missing `{0}`")]
    MissingClaim(&'static str),
    #[error("identity provider timed out")]
    Timeout,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Path segment used in `/api/auth/{provider}/...`.
    fn id(&self) -> &str;
    fn authorization_url(&self, state: &str) -> String;
    async fn exchange_code(&self, code: &str) -> Result<VerifiedIdentity, IdentityError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoFormat {
    pub format_id: String,
    pub ext: Option<String>,
    pub resolution: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoInfo {
    pub title: Option<String>,
    pub thumbnail: Option<String>,
    pub duration: Option<f64>,
    pub platform: Option<String>,
    pub formats: Vec<VideoFormat>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("unsupported url: {0}")]
    InvalidUrl(String),
    #[error("metadata extraction failed: {0}")]
    Failure(String),
    #[error("metadata extraction timed out")]
    Timeout,
}

#[async_trait]
pub trait VideoExtractor: Send + Sync {
    async fn extract(&self, url: &str) -> Result<VideoInfo, ExtractionError>;
}
