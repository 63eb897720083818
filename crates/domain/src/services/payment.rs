//! Purchase lifecycle: minting a gateway order and proving, from the
//! gateway's HMAC signature alone, that the order was captured.

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use thiserror::Error;
use tracing::{info, warn};

use crate::external::{GatewayError, OrderRequest, PaymentGateway};
use crate::model::{
    parse_flag, NewPayment, OrderId, PaymentRecord, PaymentStatus, PAYMENTS_ENABLED_KEY,
};
use crate::services::session::SessionUser;
use crate::services::fraud::FraudTracker;
use crate::signature::verify_payment_signature;
use crate::storage::{PaymentStore, SettingsStore, StorageError};

/// Fixed price and labels for the paid tier. The amount is never taken from
/// the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentSettings {
    pub amount: i64,
    pub currency: String,
    pub product_name: String,
}

/// Gateway client plus the key pair it was issued with. The secret doubles as
/// the callback signing key.
#[derive(Clone)]
pub struct ConfiguredGateway {
    pub client: Arc<dyn PaymentGateway>,
    pub key_id: String,
    pub key_secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedOrder {
    pub order_id: OrderId,
    pub amount: i64,
    pub currency: String,
    pub key_id: String,
}

/// Fields reported by the client after checkout. Nothing else from the
/// request is trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentCallback {
    pub order_id: String,
    pub payment_id: String,
    pub signature: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    SignatureMismatch,
    UnknownOrder,
    TerminalConflict,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    Captured(PaymentRecord),
    Rejected(RejectReason),
}

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("missing required field `{0}`")]
    Validation(&'static str),
    #[error("payments are disabled")]
    FeatureDisabled,
    #[error("payment gateway is not configured")]
    GatewayNotConfigured,
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Reads the `payments_enabled` setting; absent means disabled.
pub async fn payments_enabled<S>(store: &S) -> Result<bool, StorageError>
where
    S: SettingsStore + ?Sized,
{
    Ok(store
        .get_setting(PAYMENTS_ENABLED_KEY)
        .await?
        .is_some_and(|value| parse_flag(&value)))
}

#[derive(Clone)]
pub struct PaymentService {
    settings: PaymentSettings,
    gateway: Option<ConfiguredGateway>,
    fraud: FraudTracker,
}

impl PaymentService {
    pub fn new(
        settings: PaymentSettings,
        gateway: Option<ConfiguredGateway>,
        fraud: FraudTracker,
    ) -> Self {
        Self {
            settings,
            gateway,
            fraud,
        }
    }

    pub fn settings(&self) -> &PaymentSettings {
        &self.settings
    }

    pub fn is_configured(&self) -> bool {
        self.gateway.is_some()
    }

    /// Mints a gateway order for the fixed price and records it as `created`.
    pub async fn create_order<S>(
        &self,
        store: &S,
        user: &SessionUser,
    ) -> Result<CreatedOrder, PaymentError>
    where
        S: SettingsStore + PaymentStore + ?Sized,
    {
        if !payments_enabled(store).await? {
            counter!("payment_orders_total", "result" => "disabled").increment(1);
            return Err(PaymentError::FeatureDisabled);
        }
        let gateway = self
            .gateway
            .as_ref()
            .ok_or(PaymentError::GatewayNotConfigured)?;

        let request = OrderRequest {
            amount: self.settings.amount,
            currency: self.settings.currency.clone(),
            receipt: format!("rcpt_{}", Utc::now().timestamp_millis()),
            user_id: user.id.clone(),
        };
        let order = gateway.client.create_order(request).await.inspect_err(|err| {
            counter!("payment_orders_total", "result" => "gateway_error").increment(1);
            warn!(user_id = user.id.as_str(), error = %err, "gateway order creation failed");
        })?;

        store
            .create_payment(NewPayment {
                order_id: order.order_id.clone(),
                user_id: user.id.clone(),
                amount: self.settings.amount,
                currency: self.settings.currency.clone(),
                created_at: Utc::now(),
            })
            .await?;

        counter!("payment_orders_total", "result" => "created").increment(1);
        info!(
            order_id = order.order_id.as_str(),
            user_id = user.id.as_str(),
            "payment order created"
        );
        Ok(CreatedOrder {
            order_id: order.order_id,
            amount: self.settings.amount,
            currency: self.settings.currency.clone(),
            key_id: gateway.key_id.clone(),
        })
    }

    /// Checks `HMAC-SHA256(secret, order_id|payment_id)` against the reported
    /// signature. A match captures the order (and marks the owner paid); a
    /// mismatch marks it failed and never elevates anything.
    pub async fn verify_callback<S>(
        &self,
        store: &S,
        callback: &PaymentCallback,
    ) -> Result<VerificationOutcome, PaymentError>
    where
        S: PaymentStore + ?Sized,
    {
        let order_id = required(&callback.order_id, "orderId")?;
        let payment_id = required(&callback.payment_id, "paymentId")?;
        let signature = required(&callback.signature, "signature")?;
        let gateway = self
            .gateway
            .as_ref()
            .ok_or(PaymentError::GatewayNotConfigured)?;
        let order = OrderId::new(order_id);

        if !verify_payment_signature(&gateway.key_secret, order_id, payment_id, signature) {
            warn!(order_id, payment_id, "payment signature mismatch");
            counter!("payment_verifications_total", "result" => "mismatch").increment(1);
            // Only orders that exist are tracked; forged ids must not grow the tracker.
            match store
                .update_payment(&order, payment_id, PaymentStatus::Failed)
                .await
            {
                Ok(_) | Err(StorageError::Conflict(_)) => {
                    self.fraud.record_mismatch(&order);
                }
                Err(StorageError::NotFound(_)) => {}
                Err(err) => return Err(err.into()),
            }
            return Ok(VerificationOutcome::Rejected(RejectReason::SignatureMismatch));
        }

        match store
            .update_payment(&order, payment_id, PaymentStatus::Captured)
            .await
        {
            Ok(record) => {
                counter!("payment_verifications_total", "result" => "captured").increment(1);
                info!(
                    order_id,
                    user_id = record.user_id.as_str(),
                    "payment captured"
                );
                Ok(VerificationOutcome::Captured(record))
            }
            Err(StorageError::NotFound(_)) => {
                counter!("payment_verifications_total", "result" => "unknown_order").increment(1);
                warn!(order_id, "signed callback for unknown order");
                Ok(VerificationOutcome::Rejected(RejectReason::UnknownOrder))
            }
            Err(StorageError::Conflict(_)) => {
                counter!("payment_verifications_total", "result" => "conflict").increment(1);
                warn!(order_id, "signed callback conflicts with terminal order status");
                Ok(VerificationOutcome::Rejected(RejectReason::TerminalConflict))
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Blank values are rejected. Anything else is passed through untouched: the
/// signature covers the exact bytes the client sent.
fn required<'a>(value: &'a str, field: &'static str) -> Result<&'a str, PaymentError> {
    if value.trim().is_empty() {
        Err(PaymentError::Validation(field))
    } else {
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::external::GatewayOrder;
    use crate::model::{flag_value, UserId};
    use crate::services::fraud::{FraudPolicy, FraudSignal};
    use crate::signature::payment_signature;
    use crate::storage::StorageResult;

    const SECRET: &str = "rzp_secret";

    #[derive(Default)]
    struct FakeStore {
        settings: Mutex<BTreeMap<String, String>>,
        payments: Mutex<HashMap<String, PaymentRecord>>,
        paid_users: Mutex<Vec<UserId>>,
    }

    impl FakeStore {
        fn with_payments_enabled(enabled: bool) -> Self {
            let store = Self::default();
            store
                .settings
                .lock()
                .unwrap()
                .insert(PAYMENTS_ENABLED_KEY.into(), flag_value(enabled).into());
            store
        }

        fn status_of(&self, order_id: &str) -> Option<PaymentStatus> {
            self.payments
                .lock()
                .unwrap()
                .get(order_id)
                .map(|record| record.status)
        }

        fn is_paid(&self, user: &str) -> bool {
            self.paid_users
                .lock()
                .unwrap()
                .iter()
                .any(|id| id.as_str() == user)
        }
    }

    #[async_trait]
    impl SettingsStore for FakeStore {
        async fn get_setting(&self, key: &str) -> StorageResult<Option<String>> {
            Ok(self.settings.lock().unwrap().get(key).cloned())
        }

        async fn set_setting(&self, key: &str, value: &str) -> StorageResult<()> {
            self.settings
                .lock()
                .unwrap()
                .insert(key.into(), value.into());
            Ok(())
        }

        async fn list_settings(&self) -> StorageResult<BTreeMap<String, String>> {
            Ok(self.settings.lock().unwrap().clone())
        }
    }

    #[async_trait]
    impl PaymentStore for FakeStore {
        async fn create_payment(&self, payment: NewPayment) -> StorageResult<()> {
            let mut payments = self.payments.lock().unwrap();
            if payments.contains_key(payment.order_id.as_str()) {
                return Err(StorageError::Conflict("duplicate order".into()));
            }
            payments.insert(
                payment.order_id.as_str().to_string(),
                PaymentRecord {
                    order_id: payment.order_id,
                    payment_id: None,
                    user_id: payment.user_id,
                    amount: payment.amount,
                    currency: payment.currency,
                    status: PaymentStatus::Created,
                    created_at: payment.created_at,
                    updated_at: payment.created_at,
                },
            );
            Ok(())
        }

        async fn update_payment(
            &self,
            order_id: &OrderId,
            payment_id: &str,
            status: PaymentStatus,
        ) -> StorageResult<PaymentRecord> {
            let mut payments = self.payments.lock().unwrap();
            let record = payments
                .get_mut(order_id.as_str())
                .ok_or_else(|| StorageError::NotFound(order_id.as_str().into()))?;
            if record.status == status && status.is_terminal() {
                return Ok(record.clone());
            }
            if record.status.is_terminal() || !status.is_terminal() {
                return Err(StorageError::Conflict(order_id.as_str().into()));
            }
            record.status = status;
            record.payment_id = Some(payment_id.to_string());
            if status == PaymentStatus::Captured {
                self.paid_users.lock().unwrap().push(record.user_id.clone());
            }
            Ok(record.clone())
        }

        async fn find_payment(&self, order_id: &OrderId) -> StorageResult<Option<PaymentRecord>> {
            Ok(self.payments.lock().unwrap().get(order_id.as_str()).cloned())
        }
    }

    struct FixedGateway {
        order_id: &'static str,
        requests: Mutex<Vec<OrderRequest>>,
    }

    #[async_trait]
    impl PaymentGateway for FixedGateway {
        async fn create_order(&self, request: OrderRequest) -> Result<GatewayOrder, GatewayError> {
            let order = GatewayOrder {
                order_id: OrderId::new(self.order_id),
                amount: request.amount,
                currency: request.currency.clone(),
            };
            self.requests.lock().unwrap().push(request);
            Ok(order)
        }
    }

    struct FailingGateway;

    #[async_trait]
    impl PaymentGateway for FailingGateway {
        async fn create_order(&self, _request: OrderRequest) -> Result<GatewayOrder, GatewayError> {
            Err(GatewayError::Timeout)
        }
    }

    fn settings() -> PaymentSettings {
        PaymentSettings {
            amount: 4900,
            currency: "INR".into(),
            product_name: "Clipgate Pro".into(),
        }
    }

    fn tracker() -> FraudTracker {
        FraudTracker::new(FraudPolicy {
            threshold: 3,
            ..FraudPolicy::default()
        })
    }

    fn service_with(client: Arc<dyn PaymentGateway>) -> PaymentService {
        PaymentService::new(
            settings(),
            Some(ConfiguredGateway {
                client,
                key_id: "rzp_test_key".into(),
                key_secret: SECRET.into(),
            }),
            tracker(),
        )
    }

    fn service() -> PaymentService {
        service_with(Arc::new(FixedGateway {
            order_id: "order_abc",
            requests: Mutex::new(Vec::new()),
        }))
    }

    fn user() -> SessionUser {
        SessionUser {
            id: UserId::new("u1"),
            email: "u1@example.com".into(),
            name: Some("User One".into()),
            picture: None,
        }
    }

    fn callback(order_id: &str, payment_id: &str, signature: String) -> PaymentCallback {
        PaymentCallback {
            order_id: order_id.into(),
            payment_id: payment_id.into(),
            signature,
        }
    }

    #[tokio::test]
    async fn disabled_payments_create_no_row() {
        let store = FakeStore::with_payments_enabled(false);
        let err = service().create_order(&store, &user()).await.unwrap_err();
        assert!(matches!(err, PaymentError::FeatureDisabled));
        assert!(store.payments.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_setting_counts_as_disabled() {
        let store = FakeStore::default();
        let err = service().create_order(&store, &user()).await.unwrap_err();
        assert!(matches!(err, PaymentError::FeatureDisabled));
    }

    #[tokio::test]
    async fn unconfigured_gateway_is_reported() {
        let store = FakeStore::with_payments_enabled(true);
        let service = PaymentService::new(settings(), None, tracker());
        let err = service.create_order(&store, &user()).await.unwrap_err();
        assert!(matches!(err, PaymentError::GatewayNotConfigured));
    }

    #[tokio::test]
    async fn gateway_failures_surface_without_a_row() {
        let store = FakeStore::with_payments_enabled(true);
        let err = service_with(Arc::new(FailingGateway))
            .create_order(&store, &user())
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Gateway(GatewayError::Timeout)));
        assert!(store.payments.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn create_then_verify_captures_and_marks_paid() {
        let store = FakeStore::with_payments_enabled(true);
        let service = service();

        let order = service.create_order(&store, &user()).await.unwrap();
        assert_eq!(order.order_id.as_str(), "order_abc");
        assert_eq!(order.amount, 4900);
        assert_eq!(order.key_id, "rzp_test_key");
        assert_eq!(store.status_of("order_abc"), Some(PaymentStatus::Created));

        let sig = payment_signature(SECRET, "order_abc", "pay_123");
        let outcome = service
            .verify_callback(&store, &callback("order_abc", "pay_123", sig))
            .await
            .unwrap();
        match outcome {
            VerificationOutcome::Captured(record) => {
                assert_eq!(record.status, PaymentStatus::Captured);
                assert_eq!(record.payment_id.as_deref(), Some("pay_123"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(store.is_paid("u1"));
    }

    #[tokio::test]
    async fn tampered_signature_fails_the_order() {
        let store = FakeStore::with_payments_enabled(true);
        let service = service();
        service.create_order(&store, &user()).await.unwrap();

        let mut sig = payment_signature(SECRET, "order_abc", "pay_123");
        sig.replace_range(0..1, if sig.starts_with('0') { "1" } else { "0" });
        let outcome = service
            .verify_callback(&store, &callback("order_abc", "pay_123", sig))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            VerificationOutcome::Rejected(RejectReason::SignatureMismatch)
        );
        assert_eq!(store.status_of("order_abc"), Some(PaymentStatus::Failed));
        assert!(!store.is_paid("u1"));
        assert_eq!(service.fraud.attempts(&OrderId::new("order_abc")), 1);
    }

    #[tokio::test]
    async fn forged_replay_cannot_downgrade_a_captured_order() {
        let store = FakeStore::with_payments_enabled(true);
        let service = service();
        service.create_order(&store, &user()).await.unwrap();
        let sig = payment_signature(SECRET, "order_abc", "pay_123");
        service
            .verify_callback(&store, &callback("order_abc", "pay_123", sig.clone()))
            .await
            .unwrap();

        let outcome = service
            .verify_callback(&store, &callback("order_abc", "pay_123", "bogus".into()))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            VerificationOutcome::Rejected(RejectReason::SignatureMismatch)
        );
        assert_eq!(store.status_of("order_abc"), Some(PaymentStatus::Captured));

        let replay = service
            .verify_callback(&store, &callback("order_abc", "pay_123", sig))
            .await
            .unwrap();
        assert!(matches!(replay, VerificationOutcome::Captured(_)));
    }

    #[tokio::test]
    async fn valid_signature_for_failed_order_is_a_conflict() {
        let store = FakeStore::with_payments_enabled(true);
        let service = service();
        service.create_order(&store, &user()).await.unwrap();
        service
            .verify_callback(&store, &callback("order_abc", "pay_123", "bogus".into()))
            .await
            .unwrap();

        let sig = payment_signature(SECRET, "order_abc", "pay_123");
        let outcome = service
            .verify_callback(&store, &callback("order_abc", "pay_123", sig))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            VerificationOutcome::Rejected(RejectReason::TerminalConflict)
        );
        assert!(!store.is_paid("u1"));
    }

    #[tokio::test]
    async fn unknown_orders_are_rejected() {
        let store = FakeStore::with_payments_enabled(true);
        let sig = payment_signature(SECRET, "order_missing", "pay_1");
        let outcome = service()
            .verify_callback(&store, &callback("order_missing", "pay_1", sig))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            VerificationOutcome::Rejected(RejectReason::UnknownOrder)
        );
    }

    #[tokio::test]
    async fn blank_fields_are_validation_errors() {
        let store = FakeStore::with_payments_enabled(true);
        let err = service()
            .verify_callback(&store, &callback("order_abc", " ", "sig".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Validation("paymentId")));
    }

    #[tokio::test]
    async fn padded_fields_are_not_normalised_before_verification() {
        let store = FakeStore::with_payments_enabled(true);
        let service = service();
        service.create_order(&store, &user()).await.unwrap();

        let sig = payment_signature(SECRET, "order_abc", "pay_123");
        let outcome = service
            .verify_callback(
                &store,
                &callback(" order_abc", "pay_123 ", format!("  {sig}\n")),
            )
            .await
            .unwrap();
        assert_eq!(
            outcome,
            VerificationOutcome::Rejected(RejectReason::SignatureMismatch)
        );

        let outcome = service
            .verify_callback(&store, &callback("order_abc", "pay_123", format!("{sig} ")))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            VerificationOutcome::Rejected(RejectReason::SignatureMismatch)
        );
        assert_eq!(store.status_of("order_abc"), Some(PaymentStatus::Failed));
        assert!(!store.is_paid("u1"));
    }

    #[tokio::test]
    async fn forgeries_for_unknown_orders_are_not_tracked() {
        let store = FakeStore::with_payments_enabled(true);
        let service = service();
        for n in 0..200 {
            let outcome = service
                .verify_callback(
                    &store,
                    &callback(&format!("order_forged_{n}"), "pay_1", "bogus".into()),
                )
                .await
                .unwrap();
            assert_eq!(
                outcome,
                VerificationOutcome::Rejected(RejectReason::SignatureMismatch)
            );
        }
        assert_eq!(service.fraud.tracked_orders(), 0);
    }

    #[tokio::test]
    async fn repeated_forgeries_on_one_order_are_counted() {
        let store = FakeStore::with_payments_enabled(true);
        let service = service();
        service.create_order(&store, &user()).await.unwrap();

        for _ in 0..3 {
            service
                .verify_callback(&store, &callback("order_abc", "pay_9", "bogus".into()))
                .await
                .unwrap();
        }
        let order = OrderId::new("order_abc");
        assert_eq!(service.fraud.attempts(&order), 3);
        assert_eq!(service.fraud.tracked_orders(), 1);
        assert_eq!(
            service.fraud.record_mismatch(&order),
            FraudSignal::Escalated { attempts: 4 }
        );
    }

    #[tokio::test]
    async fn order_request_uses_the_configured_price() {
        let store = FakeStore::with_payments_enabled(true);
        let gateway = Arc::new(FixedGateway {
            order_id: "order_xyz",
            requests: Mutex::new(Vec::new()),
        });
        let service = service_with(gateway.clone());
        service.create_order(&store, &user()).await.unwrap();

        let requests = gateway.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].amount, 4900);
        assert_eq!(requests[0].currency, "INR");
        assert_eq!(requests[0].user_id.as_str(), "u1");
        assert!(requests[0].receipt.starts_with("rcpt_"));
    }
}
