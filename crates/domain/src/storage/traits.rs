use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{
    DownloadStats, NewDownload, NewPayment, OrderId, PaymentRecord, PaymentStatus, UserId,
    UserProfile, UserRecord,
};

/// Common result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Connection, lock or driver failure.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
}

impl StorageError {
    pub fn from_source(err: impl std::fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Inserts the user or refreshes the profile fields. Never touches
    /// `is_paid`.
    async fn upsert_user(&self, profile: UserProfile) -> StorageResult<UserRecord>;
    async fn find_user(&self, id: &UserId) -> StorageResult<Option<UserRecord>>;
    /// `false` for unknown users.
    async fn payment_flag(&self, id: &UserId) -> StorageResult<bool>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Fails with `Conflict` when the order id already exists.
    async fn create_payment(&self, payment: NewPayment) -> StorageResult<()>;
    /// Moves a `created` payment to a terminal status. Re-applying the current
    /// terminal status is a no-op; any other transition is a `Conflict`.
    /// Capturing also marks the owner as paid within the same transaction.
    async fn update_payment(
        &self,
        order_id: &OrderId,
        payment_id: &str,
        status: PaymentStatus,
    ) -> StorageResult<PaymentRecord>;
    async fn find_payment(&self, order_id: &OrderId) -> StorageResult<Option<PaymentRecord>>;
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get_setting(&self, key: &str) -> StorageResult<Option<String>>;
    async fn set_setting(&self, key: &str, value: &str) -> StorageResult<()>;
    async fn list_settings(&self) -> StorageResult<BTreeMap<String, String>>;
}

#[async_trait]
pub trait DownloadStore: Send + Sync {
    async fn log_download(&self, download: NewDownload) -> StorageResult<()>;
    async fn stats(&self) -> StorageResult<DownloadStats>;
}
