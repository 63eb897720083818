use actix_web::{web, HttpRequest, HttpResponse};
use clipgate_domain::services::{PaymentCallback, PaymentError, VerificationOutcome};
use clipgate_domain::storage::StorageError;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::state::AppState;

use super::{current_session, observe, session_cookie, ApiError};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
    pub order_id: String,
    pub amount: i64,
    pub currency: String,
    pub key_id: String,
    pub name: String,
    pub email: String,
    pub customer_name: Option<String>,
}

/// Checkout callback. Accepts the gateway's own field names as well.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct VerifyPaymentRequest {
    #[serde(default, rename = "orderId", alias = "razorpay_order_id")]
    pub order_id: Option<String>,
    #[serde(default, rename = "paymentId", alias = "razorpay_payment_id")]
    pub payment_id: Option<String>,
    #[serde(default, alias = "razorpay_signature")]
    pub signature: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyPaymentResponse {
    pub status: String,
}

pub async fn create_order_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    observe("create_order", create_order(&state, &req).await)
}

async fn create_order(state: &AppState, req: &HttpRequest) -> Result<HttpResponse, ApiError> {
    let session = current_session(state, req);
    let session = state.gate().require_authenticated(session.as_ref())?;
    let order = state
        .payments()
        .create_order(state.storage(), &session.user)
        .await
        .map_err(|err| match err {
            // Buyers see a generic failure; the detail is logged.
            PaymentError::Storage(
                err @ (StorageError::Conflict(_) | StorageError::NotFound(_)),
            ) => ApiError::Storage(err),
            other => other.into(),
        })?;

    Ok(HttpResponse::Ok().json(CreateOrderResponse {
        order_id: order.order_id.into_inner(),
        amount: order.amount,
        currency: order.currency,
        key_id: order.key_id,
        name: state.payments().settings().product_name.clone(),
        email: session.user.email.clone(),
        customer_name: session.user.name.clone(),
    }))
}

pub async fn verify_payment_handler(
    state: web::Data<AppState>,
    req: HttpRequest,
    payload: web::Json<VerifyPaymentRequest>,
) -> Result<HttpResponse, ApiError> {
    observe(
        "verify_payment",
        verify_payment(&state, &req, payload.into_inner()).await,
    )
}

async fn verify_payment(
    state: &AppState,
    req: &HttpRequest,
    payload: VerifyPaymentRequest,
) -> Result<HttpResponse, ApiError> {
    let callback = PaymentCallback {
        order_id: payload.order_id.unwrap_or_default(),
        payment_id: payload.payment_id.unwrap_or_default(),
        signature: payload.signature.unwrap_or_default(),
    };

    match state
        .payments()
        .verify_callback(state.storage(), &callback)
        .await?
    {
        VerificationOutcome::Captured(record) => {
            // The store already holds the paid flag; this only refreshes the
            // caller's cached copy when they own the order.
            if let Some(cookie) = session_cookie(req) {
                let owns_order = state
                    .sessions()
                    .resolve(&cookie)
                    .is_some_and(|session| session.user.id == record.user_id);
                if owns_order && state.sessions().mark_paid(&cookie) {
                    debug!(order_id = record.order_id.as_str(), "session marked paid");
                }
            }
            Ok(HttpResponse::Ok().json(VerifyPaymentResponse {
                status: "success".to_string(),
            }))
        }
        VerificationOutcome::Rejected(reason) => {
            debug!(?reason, "payment callback rejected");
            Err(ApiError::VerificationFailed)
        }
    }
}
