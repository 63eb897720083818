//! Environment-driven configuration for the API binary.

use std::env;
use std::time::Duration;

use thiserror::Error;

const DEFAULT_PAYMENT_AMOUNT: i64 = 4900;
const DEFAULT_PAYMENT_CURRENCY: &str = "INR";
const DEFAULT_PRODUCT_NAME: &str = "Clipgate Pro";
const DEFAULT_GATEWAY_TIMEOUT_SECS: u64 = 5;
const DEFAULT_EXTRACTION_TIMEOUT_SECS: u64 = 8;
const DEFAULT_SESSION_TTL_SECS: u64 = 7 * 24 * 60 * 60;
const DEFAULT_YT_DLP_PATH: &str = "yt-dlp";

/// OAuth client registration for a single identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: String,
}

/// Key pair issued by the payment gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayKeys {
    pub key_id: String,
    pub key_secret: String,
}

/// Everything the HTTP binary needs to boot. Optional integrations (identity
/// provider, payment gateway) stay `None` when their keys are absent so the
/// rest of the surface keeps working.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    database_url: String,
    api_bind_address: String,
    internal_bind_address: Option<String>,
    base_url: String,
    frontend_url: String,
    admin_email: String,
    session_secret: String,
    session_ttl: Duration,
    google: Option<OAuthClientConfig>,
    gateway: Option<GatewayKeys>,
    payment_amount: i64,
    payment_currency: String,
    product_name: String,
    gateway_timeout: Duration,
    extraction_timeout: Duration,
    yt_dlp_path: String,
}

impl ApiConfig {
    /// Hydrates `.env` (if present) and reads the process variables. Missing
    /// or malformed entries surface as `ConfigError`.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        let google = match (
            get_optional_var("GOOGLE_CLIENT_ID"),
            get_optional_var("GOOGLE_CLIENT_SECRET"),
        ) {
            (Some(client_id), Some(client_secret)) => Some(OAuthClientConfig {
                client_id,
                client_secret,
            }),
            _ => None,
        };
        let gateway = match (
            get_optional_var("RAZORPAY_KEY_ID"),
            get_optional_var("RAZORPAY_KEY_SECRET"),
        ) {
            (Some(key_id), Some(key_secret)) => Some(GatewayKeys { key_id, key_secret }),
            _ => None,
        };

        Ok(Self {
            database_url: get_required_var("DATABASE_URL")?,
            api_bind_address: get_required_var("API_BIND_ADDRESS")?,
            internal_bind_address: get_optional_var("API_INTERNAL_BIND_ADDRESS"),
            base_url: trim_trailing_slash(get_required_var("BASE_URL")?),
            frontend_url: trim_trailing_slash(get_required_var("FRONTEND_URL")?),
            admin_email: get_required_var("ADMIN_EMAIL")?,
            session_secret: get_required_var("SESSION_SECRET")?,
            session_ttl: Duration::from_secs(get_number_or(
                "SESSION_TTL_SECS",
                DEFAULT_SESSION_TTL_SECS,
            )?),
            google,
            gateway,
            payment_amount: get_number_or("PAYMENT_AMOUNT", DEFAULT_PAYMENT_AMOUNT)?,
            payment_currency: get_optional_var("PAYMENT_CURRENCY")
                .unwrap_or_else(|| DEFAULT_PAYMENT_CURRENCY.to_string()),
            product_name: get_optional_var("PAYMENT_PRODUCT_NAME")
                .unwrap_or_else(|| DEFAULT_PRODUCT_NAME.to_string()),
            gateway_timeout: Duration::from_secs(get_number_or(
                "GATEWAY_TIMEOUT_SECS",
                DEFAULT_GATEWAY_TIMEOUT_SECS,
            )?),
            extraction_timeout: Duration::from_secs(get_number_or(
                "EXTRACTION_TIMEOUT_SECS",
                DEFAULT_EXTRACTION_TIMEOUT_SECS,
            )?),
            yt_dlp_path: get_optional_var("YT_DLP_PATH")
                .unwrap_or_else(|| DEFAULT_YT_DLP_PATH.to_string()),
        })
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn api_bind_address(&self) -> &str {
        &self.api_bind_address
    }

    pub fn internal_bind_address(&self) -> Option<&str> {
        self.internal_bind_address.as_deref()
    }

    pub fn has_internal_listener(&self) -> bool {
        self.internal_bind_address.is_some()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn frontend_url(&self) -> &str {
        &self.frontend_url
    }

    pub fn admin_email(&self) -> &str {
        &self.admin_email
    }

    pub fn session_secret(&self) -> &str {
        &self.session_secret
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    /// Cookies are only marked `Secure` (and cross-site capable) when the
    /// backend is reachable over HTTPS.
    pub fn secure_cookies(&self) -> bool {
        self.base_url.starts_with("https://")
    }

    /// Redirect target handed to the identity provider.
    pub fn oauth_callback_url(&self, provider: &str) -> String {
        format!("{}/api/auth/{provider}/callback", self.base_url)
    }

    pub fn post_login_redirect(&self) -> String {
        format!("{}/dashboard", self.frontend_url)
    }

    pub fn google(&self) -> Option<&OAuthClientConfig> {
        self.google.as_ref()
    }

    pub fn gateway(&self) -> Option<&GatewayKeys> {
        self.gateway.as_ref()
    }

    pub fn payment_amount(&self) -> i64 {
        self.payment_amount
    }

    pub fn payment_currency(&self) -> &str {
        &self.payment_currency
    }

    pub fn product_name(&self) -> &str {
        &self.product_name
    }

    pub fn gateway_timeout(&self) -> Duration {
        self.gateway_timeout
    }

    pub fn extraction_timeout(&self) -> Duration {
        self.extraction_timeout
    }

    pub fn yt_dlp_path(&self) -> &str {
        &self.yt_dlp_path
    }
}

fn trim_trailing_slash(value: String) -> String {
    value.trim_end_matches('/').to_string()
}

fn get_required_var(key: &'static str) -> Result<String, ConfigError> {
    get_optional_var(key).ok_or(ConfigError::MissingVar { key })
}

fn get_optional_var(key: &'static str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn get_number_or<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr<Err = std::num::ParseIntError>,
{
    match get_optional_var(key) {
        Some(raw) => raw
            .parse()
            .map_err(|source| ConfigError::InvalidNumber { key, source }),
        None => Ok(default),
    }
}

pub fn hydrate_env_file() -> Result<(), ConfigError> {
    if env::var_os("CLIPGATE_SKIP_DOTENV").is_some() {
        return Ok(());
    }
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(ConfigError::Dotenv { source: err }),
    }

    Ok(())
}

/// Errors emitted when `.env` hydration or environment parsing fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable `{key}`")]
    MissingVar { key: &'static str },
    #[error("invalid integer in `{key}`: {source}")]
    InvalidNumber {
        key: &'static str,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to load .env file: {source}")]
    Dotenv {
        #[from]
        source: dotenvy::Error,
    },
}
