use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use clipgate_domain::external::{IdentityProvider, VideoExtractor};
use clipgate_domain::services::{
    AccessGate, LoginStateStore, PaymentService, SessionStore, TelemetryGuard,
};
use clipgate_storage::SeaOrmStorage;

/// Attributes applied to the session cookie.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookiePolicy {
    pub secure: bool,
    pub ttl: Duration,
}

#[derive(Clone)]
pub struct AppState {
    storage: SeaOrmStorage,
    telemetry: TelemetryGuard,
    sessions: Arc<SessionStore>,
    login_states: Arc<LoginStateStore>,
    gate: AccessGate,
    payments: PaymentService,
    extractor: Arc<dyn VideoExtractor>,
    identity_providers: HashMap<String, Arc<dyn IdentityProvider>>,
    cookie_policy: CookiePolicy,
    post_login_redirect: String,
}

impl AppState {
    pub fn new(
        storage: SeaOrmStorage,
        telemetry: TelemetryGuard,
        sessions: SessionStore,
        gate: AccessGate,
        payments: PaymentService,
        extractor: Arc<dyn VideoExtractor>,
    ) -> Self {
        Self {
            storage,
            telemetry,
            sessions: Arc::new(sessions),
            login_states: Arc::new(LoginStateStore::new()),
            gate,
            payments,
            extractor,
            identity_providers: HashMap::new(),
            cookie_policy: CookiePolicy {
                secure: false,
                ttl: Duration::from_secs(7 * 24 * 60 * 60),
            },
            post_login_redirect: "/".to_string(),
        }
    }

    pub fn with_identity_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.identity_providers
            .insert(provider.id().to_string(), provider);
        self
    }

    pub fn with_cookie_policy(mut self, policy: CookiePolicy) -> Self {
        self.cookie_policy = policy;
        self
    }

    pub fn with_post_login_redirect(mut self, target: impl Into<String>) -> Self {
        self.post_login_redirect = target.into();
        self
    }

    pub fn storage(&self) -> &SeaOrmStorage {
        &self.storage
    }

    pub fn telemetry(&self) -> &TelemetryGuard {
        &self.telemetry
    }

    pub fn sessions(&self) -> &SessionStore {
        self.sessions.as_ref()
    }

    pub fn login_states(&self) -> &LoginStateStore {
        self.login_states.as_ref()
    }

    pub fn gate(&self) -> &AccessGate {
        &self.gate
    }

    pub fn payments(&self) -> &PaymentService {
        &self.payments
    }

    pub fn extractor(&self) -> &dyn VideoExtractor {
        self.extractor.as_ref()
    }

    pub fn identity_provider(&self, id: &str) -> Option<&dyn IdentityProvider> {
        self.identity_providers.get(id).map(|provider| provider.as_ref())
    }

    pub fn cookie_policy(&self) -> CookiePolicy {
        self.cookie_policy
    }

    pub fn post_login_redirect(&self) -> &str {
        &self.post_login_redirect
    }
}
