use std::{env, net::SocketAddr, sync::Arc, time::Duration};

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::hydrate_env_file;
use crate::services::fraud::FraudPolicy;

static SUBSCRIBER_INSTALLED: OnceCell<()> = OnceCell::new();
static METRICS_HANDLE: OnceCell<Arc<PrometheusHandle>> = OnceCell::new();

/// Logging, exporter and fraud-monitoring options, read from variables named
/// `<PREFIX>_LOG_FILTER`, `<PREFIX>_METRICS_ADDRESS`,
/// `<PREFIX>_FRAUD_THRESHOLD` and `<PREFIX>_FRAUD_WINDOW_SECS`.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    log_filter: String,
    metrics_address: Option<SocketAddr>,
    fraud: FraudPolicy,
}

impl TelemetryConfig {
    pub fn from_env(prefix: &str) -> Result<Self, TelemetryError> {
        let _ = hydrate_env_file();
        let vars = PrefixedVars(prefix.trim().to_ascii_uppercase());

        let metrics_address = match vars.get("METRICS_ADDRESS") {
            Some(addr) => Some(addr.parse().map_err(|err: std::net::AddrParseError| {
                TelemetryError::InvalidMetricsAddress(addr.clone(), err.to_string())
            })?),
            None => None,
        };

        let defaults = FraudPolicy::default();
        let fraud = FraudPolicy {
            threshold: vars.positive("FRAUD_THRESHOLD").unwrap_or(defaults.threshold),
            window: vars
                .positive("FRAUD_WINDOW_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.window),
            ..defaults
        };

        Ok(Self {
            log_filter: vars.get("LOG_FILTER").unwrap_or_else(|| "info".into()),
            metrics_address,
            fraud,
        })
    }

    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    pub fn metrics_address(&self) -> Option<SocketAddr> {
        self.metrics_address
    }

    pub fn fraud_policy(&self) -> FraudPolicy {
        self.fraud
    }
}

struct PrefixedVars(String);

impl PrefixedVars {
    fn get(&self, suffix: &str) -> Option<String> {
        env::var(format!("{}_{suffix}", self.0))
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    /// Unparseable or zero values fall back to the caller's default.
    fn positive<T>(&self, suffix: &str) -> Option<T>
    where
        T: std::str::FromStr + Default + PartialOrd,
    {
        self.get(suffix)
            .and_then(|value| value.parse::<T>().ok())
            .filter(|value| *value > T::default())
    }
}

/// Handle to the installed Prometheus recorder.
#[derive(Clone)]
pub struct TelemetryGuard {
    metrics: Arc<PrometheusHandle>,
    fraud: FraudPolicy,
}

impl TelemetryGuard {
    pub fn render_metrics(&self) -> String {
        self.metrics.render()
    }

    pub fn fraud_policy(&self) -> FraudPolicy {
        self.fraud
    }
}

/// Installs the tracing subscriber and the Prometheus recorder. Later calls
/// in the same process reuse what the first call installed.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    if SUBSCRIBER_INSTALLED.get().is_none() {
        let filter = EnvFilter::try_new(config.log_filter())
            .map_err(|err| TelemetryError::InvalidLogFilter(err.to_string()))?;
        if SUBSCRIBER_INSTALLED.set(()).is_ok() {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_target(true))
                .try_init()
                .map_err(|err| TelemetryError::Tracing(err.to_string()))?;
        }
    }

    let metrics = METRICS_HANDLE
        .get_or_try_init(|| {
            let builder = match config.metrics_address() {
                Some(socket) => PrometheusBuilder::new().with_http_listener(socket),
                None => PrometheusBuilder::new(),
            };
            builder
                .install_recorder()
                .map(Arc::new)
                .map_err(|err| TelemetryError::Metrics(err.to_string()))
        })?
        .clone();

    Ok(TelemetryGuard {
        metrics,
        fraud: config.fraud_policy(),
    })
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    InvalidLogFilter(String),
    #[error("failed to install tracing subscriber: {0}")]
    Tracing(String),
    #[error("invalid metrics address `{0}`: {1}")]
    InvalidMetricsAddress(String, String),
    #[error("failed to install metrics recorder: {0}")]
    Metrics(String),
}
