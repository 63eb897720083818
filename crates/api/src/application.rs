use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{error::JsonPayloadError, middleware::Logger, web, App, HttpRequest, HttpServer};
use clipgate_domain::config::{ApiConfig, ConfigError};
use clipgate_domain::external::{GatewayError, IdentityError};
use clipgate_domain::services::{
    init_telemetry, AccessGate, ConfiguredGateway, FraudTracker, PaymentService, PaymentSettings,
    SessionStore, TelemetryConfig, TelemetryError, TelemetryGuard,
};
use clipgate_domain::storage::StorageError;
use clipgate_gateway::{GoogleIdentityProvider, RazorpayClient, YtDlpExtractor};
use clipgate_storage::SeaOrmStorage;
use thiserror::Error;
use tracing::{info, warn};

use crate::handlers::{
    app_config_handler, create_order_handler, index_handler, login_handler, logout_handler,
    metrics_handler, oauth_callback_handler, profile_handler, stats_handler,
    toggle_payments_handler, verify_payment_handler, video_download_handler, video_info_handler,
    ApiError,
};
use crate::state::{AppState, CookiePolicy};

pub async fn run() -> Result<(), BootstrapError> {
    let config = ApiConfig::load_from_env()?;
    let telemetry = init_telemetry(&TelemetryConfig::from_env("API")?)?;
    let storage = SeaOrmStorage::connect(config.database_url()).await?;
    let state = build_state(&config, storage, telemetry)?;

    let include_metrics_on_public = !config.has_internal_listener();
    let frontend_url = config.frontend_url().to_string();
    let public_state = state.clone();
    let public_server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(public_state.clone()))
            .wrap(cors(&frontend_url))
            .wrap(Logger::default())
            .configure(|cfg| routes(cfg, include_metrics_on_public))
    })
    .bind(config.api_bind_address())?
    .run();
    info!(address = config.api_bind_address(), "public listener started");

    if let Some(addr) = config.internal_bind_address() {
        let internal_state = state.clone();
        let internal_server = HttpServer::new(move || {
            App::new()
                .app_data(web::Data::new(internal_state.clone()))
                .wrap(Logger::default())
                .route("/metrics", web::get().to(metrics_handler))
        })
        .bind(addr)?
        .run();
        info!(address = addr, "internal listener started");
        tokio::try_join!(public_server, internal_server)?;
    } else {
        public_server.await?;
    }

    Ok(())
}

fn build_state(
    config: &ApiConfig,
    storage: SeaOrmStorage,
    telemetry: TelemetryGuard,
) -> Result<AppState, BootstrapError> {
    let gateway = match config.gateway() {
        Some(keys) => {
            let client = RazorpayClient::new(
                keys.key_id.clone(),
                keys.key_secret.clone(),
                config.gateway_timeout(),
            )?;
            Some(ConfiguredGateway {
                client: Arc::new(client),
                key_id: keys.key_id.clone(),
                key_secret: keys.key_secret.clone(),
            })
        }
        None => {
            warn!("payment gateway keys missing; order creation is unavailable");
            None
        }
    };
    let payments = PaymentService::new(
        PaymentSettings {
            amount: config.payment_amount(),
            currency: config.payment_currency().to_string(),
            product_name: config.product_name().to_string(),
        },
        gateway,
        FraudTracker::new(telemetry.fraud_policy()),
    );
    let extractor = YtDlpExtractor::new(config.yt_dlp_path(), config.extraction_timeout());

    let mut state = AppState::new(
        storage,
        telemetry,
        SessionStore::new(config.session_secret(), config.session_ttl()),
        AccessGate::new(config.admin_email()),
        payments,
        Arc::new(extractor),
    )
    .with_cookie_policy(CookiePolicy {
        secure: config.secure_cookies(),
        ttl: config.session_ttl(),
    })
    .with_post_login_redirect(config.post_login_redirect());

    match config.google() {
        Some(google) => {
            let provider = GoogleIdentityProvider::new(
                google.client_id.clone(),
                google.client_secret.clone(),
                config.oauth_callback_url("google"),
                config.gateway_timeout(),
            )?;
            state = state.with_identity_provider(Arc::new(provider));
        }
        None => warn!("google oauth credentials missing; sign-in is unavailable"),
    }

    Ok(state)
}

fn cors(frontend_url: &str) -> Cors {
    Cors::default()
        .allowed_origin(frontend_url)
        .allow_any_method()
        .allow_any_header()
        .supports_credentials()
        .max_age(3600)
}

/// Registers the public surface. Shared with the integration tests.
pub fn routes(cfg: &mut web::ServiceConfig, include_metrics: bool) {
    cfg.app_data(web::JsonConfig::default().error_handler(json_error))
        .route("/", web::get().to(index_handler))
        .route("/api/auth/logout", web::get().to(logout_handler))
        .route("/api/auth/{provider}/login", web::get().to(login_handler))
        .route(
            "/api/auth/{provider}/callback",
            web::get().to(oauth_callback_handler),
        )
        .route("/api/user/profile", web::get().to(profile_handler))
        .route("/api/app/config", web::get().to(app_config_handler))
        .route(
            "/api/admin/toggle-payments",
            web::post().to(toggle_payments_handler),
        )
        .route("/api/admin/stats", web::get().to(stats_handler))
        .route("/api/video/info", web::post().to(video_info_handler))
        .route("/api/video/download", web::post().to(video_download_handler))
        .route("/api/create-order", web::post().to(create_order_handler))
        .route("/api/verify-payment", web::post().to(verify_payment_handler));
    if include_metrics {
        cfg.route("/metrics", web::get().to(metrics_handler));
    }
}

fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::Validation(format!("invalid request body: {err}")).into()
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("payment gateway error: {0}")]
    Gateway(#[from] GatewayError),
    #[error("identity provider error: {0}")]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
