//! Order creation against a Razorpay-compatible REST API.

use std::time::Duration;

use async_trait::async_trait;
use clipgate_domain::external::{GatewayError, GatewayOrder, OrderRequest, PaymentGateway};
use clipgate_domain::model::OrderId;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const DEFAULT_API_BASE: &str = "https://api.razorpay.com";

pub struct RazorpayClient {
    http: reqwest::Client,
    api_base: String,
    key_id: String,
    key_secret: String,
}

#[derive(Debug, Serialize)]
struct CreateOrderBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
    notes: OrderNotes<'a>,
}

#[derive(Debug, Serialize)]
struct OrderNotes<'a> {
    user_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    amount: i64,
    currency: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    description: Option<String>,
}

impl RazorpayClient {
    pub fn new(
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| GatewayError::Failure(err.to_string()))?;
        Ok(Self {
            http,
            api_base: DEFAULT_API_BASE.to_string(),
            key_id: key_id.into(),
            key_secret: key_secret.into(),
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    async fn create_order(&self, request: OrderRequest) -> Result<GatewayOrder, GatewayError> {
        let body = CreateOrderBody {
            amount: request.amount,
            currency: &request.currency,
            receipt: &request.receipt,
            notes: OrderNotes {
                user_id: request.user_id.as_str(),
            },
        };
        let response = self
            .http
            .post(format!("{}/v1/orders", self.api_base))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(transport_error)?;
        if !status.is_success() {
            counter!("gateway_requests_total", "result" => "rejected").increment(1);
            let reason = failure_description(&bytes)
                .unwrap_or_else(|| format!("order api returned {status}"));
            warn!(%status, reason = %reason, "gateway rejected order creation");
            return Err(GatewayError::Failure(reason));
        }

        let order: OrderResponse = serde_json::from_slice(&bytes)
            .map_err(|err| GatewayError::Failure(format!("malformed order response: {err}")))?;
        counter!("gateway_requests_total", "result" => "ok").increment(1);
        debug!(order_id = %order.id, status = ?order.status, "gateway order created");
        Ok(GatewayOrder {
            order_id: OrderId::new(order.id),
            amount: order.amount,
            currency: order.currency,
        })
    }
}

fn transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        counter!("gateway_requests_total", "result" => "timeout").increment(1);
        GatewayError::Timeout
    } else {
        counter!("gateway_requests_total", "result" => "transport").increment(1);
        GatewayError::Failure(err.to_string())
    }
}

fn failure_description(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<ErrorEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.error.description)
        .filter(|description| !description.is_empty())
}
