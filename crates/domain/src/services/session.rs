//! Server-side sessions and the authorization gate guarding privileged
//! endpoints.

use std::time::Duration;

use chrono::{DateTime, Utc};
use moka::sync::Cache;
use serde::Serialize;
use thiserror::Error;

use crate::external::VerifiedIdentity;
use crate::model::{UserId, UserProfile};
use crate::signature::{constant_time_eq, hmac_sha256_hex};

/// Name of the cookie carrying the signed session id.
pub const SESSION_COOKIE: &str = "clipgate_session";

const SESSION_ID_BYTES: usize = 32;
const LOGIN_STATE_BYTES: usize = 16;
const LOGIN_STATE_TTL: Duration = Duration::from_secs(10 * 60);
const MAX_SESSIONS: u64 = 100_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionUser {
    pub id: UserId,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

impl SessionUser {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
            picture: self.picture.clone(),
        }
    }
}

impl From<&VerifiedIdentity> for SessionUser {
    fn from(identity: &VerifiedIdentity) -> Self {
        Self {
            id: UserId::new(identity.subject.clone()),
            email: identity.email.clone(),
            name: identity.name.clone(),
            picture: identity.picture.clone(),
        }
    }
}

/// Per-caller state established at login. `is_admin` and `is_paid` are a
/// snapshot; the store stays authoritative for the paid flag and
/// [`AccessGate::require_admin`] re-checks the email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: SessionUser,
    pub is_admin: bool,
    pub is_paid: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AccessError {
    #[error("not authenticated")]
    Unauthenticated,
    #[error("unauthorized")]
    Unauthorized,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to gather randomness: {0}")]
    Entropy(String),
}

/// Maps an authenticated identity to an authorization level.
#[derive(Debug, Clone)]
pub struct AccessGate {
    admin_email: String,
}

impl AccessGate {
    pub fn new(admin_email: impl Into<String>) -> Self {
        Self {
            admin_email: admin_email.into(),
        }
    }

    /// Exact, case-sensitive match against the configured admin email.
    pub fn is_admin(&self, email: &str) -> bool {
        !self.admin_email.is_empty() && email == self.admin_email
    }

    pub fn login(&self, identity: &VerifiedIdentity, is_paid: bool) -> Session {
        Session {
            user: SessionUser::from(identity),
            is_admin: self.is_admin(&identity.email),
            is_paid,
            created_at: Utc::now(),
        }
    }

    pub fn require_authenticated<'a>(
        &self,
        session: Option<&'a Session>,
    ) -> Result<&'a Session, AccessError> {
        session.ok_or(AccessError::Unauthenticated)
    }

    pub fn require_admin<'a>(
        &self,
        session: Option<&'a Session>,
    ) -> Result<&'a Session, AccessError> {
        match session {
            Some(session) if self.is_admin(&session.user.email) => Ok(session),
            _ => Err(AccessError::Unauthorized),
        }
    }
}

/// Random lowercase hex token of `bytes` bytes.
pub fn generate_token(bytes: usize) -> Result<String, SessionError> {
    let mut buf = vec![0u8; bytes];
    getrandom::fill(&mut buf).map_err(|err| SessionError::Entropy(err.to_string()))?;
    Ok(hex::encode(buf))
}

/// In-memory session table keyed by random ids. Cookies carry
/// `<id>.<hmac(id)>` so forged ids are rejected before any lookup.
pub struct SessionStore {
    sessions: Cache<String, Session>,
    secret: Vec<u8>,
}

impl SessionStore {
    pub fn new(secret: impl AsRef<[u8]>, ttl: Duration) -> Self {
        Self {
            sessions: Cache::builder()
                .time_to_idle(ttl)
                .max_capacity(MAX_SESSIONS)
                .build(),
            secret: secret.as_ref().to_vec(),
        }
    }

    /// Stores the session and returns the signed cookie value.
    pub fn create(&self, session: Session) -> Result<String, SessionError> {
        let id = generate_token(SESSION_ID_BYTES)?;
        let cookie = self.sign(&id);
        self.sessions.insert(id, session);
        Ok(cookie)
    }

    pub fn resolve(&self, cookie_value: &str) -> Option<Session> {
        let id = self.verify(cookie_value)?;
        self.sessions.get(&id)
    }

    /// Best-effort refresh of the cached paid flag for a live session.
    pub fn mark_paid(&self, cookie_value: &str) -> bool {
        let Some(id) = self.verify(cookie_value) else {
            return false;
        };
        match self.sessions.get(&id) {
            Some(mut session) => {
                session.is_paid = true;
                self.sessions.insert(id, session);
                true
            }
            None => false,
        }
    }

    pub fn destroy(&self, cookie_value: &str) {
        if let Some(id) = self.verify(cookie_value) {
            self.sessions.invalidate(&id);
        }
    }

    fn sign(&self, id: &str) -> String {
        format!("{id}.{}", hmac_sha256_hex(&self.secret, id.as_bytes()))
    }

    fn verify(&self, cookie_value: &str) -> Option<String> {
        let (id, signature) = cookie_value.rsplit_once('.')?;
        let expected = hmac_sha256_hex(&self.secret, id.as_bytes());
        if constant_time_eq(expected.as_bytes(), signature.as_bytes()) {
            Some(id.to_string())
        } else {
            None
        }
    }
}

/// Short-lived OAuth `state` values issued by the login redirect. Each value
/// is single-use and bound to the provider that issued it.
pub struct LoginStateStore {
    states: Cache<String, String>,
}

impl LoginStateStore {
    pub fn new() -> Self {
        Self::with_ttl(LOGIN_STATE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            states: Cache::builder()
                .time_to_live(ttl)
                .max_capacity(MAX_SESSIONS)
                .build(),
        }
    }

    pub fn issue(&self, provider: &str) -> Result<String, SessionError> {
        let state = generate_token(LOGIN_STATE_BYTES)?;
        self.states.insert(state.clone(), provider.to_string());
        Ok(state)
    }

    pub fn consume(&self, state: &str, provider: &str) -> bool {
        match self.states.remove(state) {
            Some(issued_for) => issued_for == provider,
            None => false,
        }
    }
}

impl Default for LoginStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(email: &str) -> VerifiedIdentity {
        VerifiedIdentity {
            subject: "sub-1".into(),
            email: email.into(),
            name: Some("Ada".into()),
            picture: None,
        }
    }

    #[test]
    fn login_computes_admin_flag_by_exact_match() {
        let gate = AccessGate::new("admin@example.com");
        assert!(gate.login(&identity("admin@example.com"), false).is_admin);
        assert!(!gate.login(&identity("Admin@example.com"), false).is_admin);
        assert!(!gate.login(&identity("user@example.com"), false).is_admin);
    }

    #[test]
    fn require_admin_rejects_non_admins() {
        let gate = AccessGate::new("admin@example.com");
        let user = gate.login(&identity("user@example.com"), true);
        let admin = gate.login(&identity("admin@example.com"), false);

        assert_eq!(gate.require_admin(None), Err(AccessError::Unauthorized));
        assert_eq!(
            gate.require_admin(Some(&user)),
            Err(AccessError::Unauthorized)
        );
        assert!(gate.require_admin(Some(&admin)).is_ok());
    }

    #[test]
    fn require_admin_ignores_a_forged_cached_flag() {
        let gate = AccessGate::new("admin@example.com");
        let mut session = gate.login(&identity("user@example.com"), false);
        session.is_admin = true;
        assert_eq!(
            gate.require_admin(Some(&session)),
            Err(AccessError::Unauthorized)
        );
    }

    #[test]
    fn require_authenticated_needs_a_session() {
        let gate = AccessGate::new("admin@example.com");
        let session = gate.login(&identity("user@example.com"), false);
        assert_eq!(
            gate.require_authenticated(None),
            Err(AccessError::Unauthenticated)
        );
        assert!(gate.require_authenticated(Some(&session)).is_ok());
    }

    #[test]
    fn session_store_round_trips_signed_cookies() {
        let gate = AccessGate::new("admin@example.com");
        let store = SessionStore::new("secret", Duration::from_secs(60));
        let cookie = store
            .create(gate.login(&identity("user@example.com"), false))
            .expect("session created");

        let resolved = store.resolve(&cookie).expect("session resolves");
        assert_eq!(resolved.user.email, "user@example.com");

        let (id, _) = cookie.rsplit_once('.').unwrap();
        assert!(store.resolve(&format!("{id}.deadbeef")).is_none());
        assert!(store.resolve(id).is_none());
    }

    #[test]
    fn cookies_signed_with_another_secret_are_rejected() {
        let gate = AccessGate::new("admin@example.com");
        let issuer = SessionStore::new("secret-a", Duration::from_secs(60));
        let other = SessionStore::new("secret-b", Duration::from_secs(60));
        let cookie = issuer
            .create(gate.login(&identity("user@example.com"), false))
            .unwrap();
        assert!(other.resolve(&cookie).is_none());
    }

    #[test]
    fn mark_paid_and_destroy() {
        let gate = AccessGate::new("admin@example.com");
        let store = SessionStore::new("secret", Duration::from_secs(60));
        let cookie = store
            .create(gate.login(&identity("user@example.com"), false))
            .unwrap();

        assert!(store.mark_paid(&cookie));
        assert!(store.resolve(&cookie).unwrap().is_paid);

        store.destroy(&cookie);
        assert!(store.resolve(&cookie).is_none());
        assert!(!store.mark_paid(&cookie));
    }

    #[test]
    fn login_states_are_single_use_and_provider_bound() {
        let states = LoginStateStore::new();
        let state = states.issue("google").unwrap();
        assert_eq!(state.len(), 32);
        assert!(!states.consume(&state, "github"));

        let state = states.issue("google").unwrap();
        assert!(states.consume(&state, "google"));
        assert!(!states.consume(&state, "google"));
        assert!(!states.consume("never-issued", "google"));
    }
}
