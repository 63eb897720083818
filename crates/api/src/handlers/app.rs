use actix_web::{web, HttpResponse};
use clipgate_domain::model::PAYMENTS_ENABLED_KEY;
use clipgate_domain::service_ready_message;
use clipgate_domain::storage::SettingsStore;
use serde_json::{Map, Value};

use crate::state::AppState;

use super::{observe, ApiError};

pub async fn index_handler() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(service_ready_message())
}

/// Public view of every app setting. Boolean-looking values are rendered as
/// JSON booleans and `payments_enabled` is always present.
pub async fn app_config_handler(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    observe("app_config", app_config(&state).await)
}

async fn app_config(state: &AppState) -> Result<HttpResponse, ApiError> {
    let settings = state.storage().list_settings().await?;
    let mut body: Map<String, Value> = settings
        .into_iter()
        .map(|(key, value)| (key, render_setting(value)))
        .collect();
    body.entry(PAYMENTS_ENABLED_KEY).or_insert(Value::Bool(false));
    Ok(HttpResponse::Ok().json(Value::Object(body)))
}

fn render_setting(value: String) -> Value {
    match value.as_str() {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(value),
    }
}
