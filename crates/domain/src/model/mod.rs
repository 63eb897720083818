//! Data structures shared across the API, storage and gateway crates.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum_macros::{AsRefStr, EnumString};

/// Settings key for the boolean-as-string payment flag.
pub const PAYMENTS_ENABLED_KEY: &str = "payments_enabled";

/// Bucket used for downloads whose platform label is missing or empty.
pub const UNKNOWN_PLATFORM: &str = "unknown";

/// Interprets a boolean-as-string setting value.
pub fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1")
}

pub fn flag_value(enabled: bool) -> &'static str {
    if enabled {
        "true"
    } else {
        "false"
    }
}

/// Stable subject id assigned by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self::new(value.to_owned())
    }
}

/// Order id minted by the payment gateway.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<&str> for OrderId {
    fn from(value: &str) -> Self {
        Self::new(value.to_owned())
    }
}

/// Mutable profile fields written on every login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub id: UserId,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: UserId,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
    pub is_paid: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle of a purchase attempt. `Created` is the only state that can
/// transition; `Captured` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    Created,
    Captured,
    Failed,
}

impl PaymentStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, PaymentStatus::Created)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub amount: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRecord {
    pub order_id: OrderId,
    pub payment_id: Option<String>,
    pub user_id: UserId,
    pub amount: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only record of a download request. `user_id` is `None` for
/// anonymous callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDownload {
    pub user_id: Option<UserId>,
    pub platform: Option<String>,
    pub video_url: String,
    pub format: Option<String>,
    pub quality: Option<String>,
    pub downloaded_at: DateTime<Utc>,
}

/// Aggregates over the download log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadStats {
    pub total_downloads: u64,
    pub active_users: u64,
    pub platform_stats: BTreeMap<String, u64>,
}

/// Normalizes a platform label for aggregation.
pub fn platform_bucket(label: Option<&str>) -> String {
    match label.map(str::trim) {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => UNKNOWN_PLATFORM.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn flags_parse_leniently() {
        assert!(parse_flag("true"));
        assert!(parse_flag(" TRUE "));
        assert!(parse_flag("1"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag("yes please"));
        assert_eq!(flag_value(true), "true");
        assert_eq!(flag_value(false), "false");
    }

    #[test]
    fn only_created_is_non_terminal() {
        assert!(!PaymentStatus::Created.is_terminal());
        assert!(PaymentStatus::Captured.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
    }

    #[test]
    fn payment_status_round_trips_through_strings() {
        assert_eq!(PaymentStatus::Captured.as_ref(), "captured");
        assert_eq!(
            PaymentStatus::from_str("failed").unwrap(),
            PaymentStatus::Failed
        );
    }

    #[test]
    fn missing_platform_maps_to_unknown() {
        assert_eq!(platform_bucket(None), UNKNOWN_PLATFORM);
        assert_eq!(platform_bucket(Some("  ")), UNKNOWN_PLATFORM);
        assert_eq!(platform_bucket(Some("youtube")), "youtube");
    }

    #[test]
    fn stats_serialize_in_camel_case() {
        let mut stats = DownloadStats {
            total_downloads: 5,
            active_users: 2,
            ..Default::default()
        };
        stats.platform_stats.insert("youtube".into(), 5);
        let value = serde_json::to_value(&stats).unwrap();
        assert_eq!(value["totalDownloads"], 5);
        assert_eq!(value["activeUsers"], 2);
        assert_eq!(value["platformStats"]["youtube"], 5);
    }
}
