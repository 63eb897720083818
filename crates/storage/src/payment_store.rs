use clipgate_domain::model::{NewPayment, OrderId, PaymentRecord, PaymentStatus, UserId};
use clipgate_domain::storage::{PaymentStore, StorageError, StorageResult};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveEnum, ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use tracing::debug;

use crate::entity::payments::{self, PaymentStatusDb};
use crate::entity::users;
use crate::{map_db_err, SeaOrmStorage};

#[async_trait::async_trait]
impl PaymentStore for SeaOrmStorage {
    async fn create_payment(&self, payment: NewPayment) -> StorageResult<()> {
        let model = payments::ActiveModel {
            order_id: Set(payment.order_id.into_inner()),
            payment_id: Set(None),
            user_id: Set(payment.user_id.into_inner()),
            amount: Set(payment.amount),
            currency: Set(payment.currency),
            status: Set(PaymentStatusDb::Created),
            created_at: Set(payment.created_at),
            updated_at: Set(payment.created_at),
            ..Default::default()
        };
        model.insert(self.connection()).await.map_err(map_db_err)?;
        Ok(())
    }

    async fn update_payment(
        &self,
        order_id: &OrderId,
        payment_id: &str,
        status: PaymentStatus,
    ) -> StorageResult<PaymentRecord> {
        let txn = self.connection().begin().await.map_err(map_db_err)?;
        let record = apply_transition(&txn, order_id, payment_id, status).await?;
        txn.commit().await.map_err(map_db_err)?;
        Ok(record)
    }

    async fn find_payment(&self, order_id: &OrderId) -> StorageResult<Option<PaymentRecord>> {
        let maybe = payments::Entity::find()
            .filter(payments::Column::OrderId.eq(order_id.as_str()))
            .one(self.connection())
            .await
            .map_err(map_db_err)?;
        Ok(maybe.map(payment_to_record))
    }
}

/// Runs inside the caller's transaction; dropping the transaction on any
/// early return rolls back partial writes.
async fn apply_transition(
    txn: &DatabaseTransaction,
    order_id: &OrderId,
    payment_id: &str,
    status: PaymentStatus,
) -> StorageResult<PaymentRecord> {
    let current = payments::Entity::find()
        .filter(payments::Column::OrderId.eq(order_id.as_str()))
        .one(txn)
        .await
        .map_err(map_db_err)?
        .ok_or_else(|| StorageError::NotFound(format!("order {}", order_id.as_str())))?;

    let from = status_from_db(current.status);
    if from == status && status.is_terminal() {
        debug!(
            order_id = order_id.as_str(),
            status = status.as_ref(),
            "payment already in requested status"
        );
        return Ok(payment_to_record(current));
    }
    if from.is_terminal() || !status.is_terminal() {
        return Err(StorageError::Conflict(format!(
            "order {} cannot move from {} to {}",
            order_id.as_str(),
            from.as_ref(),
            status.as_ref()
        )));
    }

    let now = Utc::now();
    let updated = payments::Entity::update_many()
        .col_expr(payments::Column::Status, Expr::value(status_to_db(status).to_value()))
        .col_expr(payments::Column::PaymentId, Expr::value(payment_id))
        .col_expr(payments::Column::UpdatedAt, Expr::value(now))
        .filter(payments::Column::Id.eq(current.id))
        .filter(payments::Column::Status.eq(PaymentStatusDb::Created))
        .exec(txn)
        .await
        .map_err(map_db_err)?;
    if updated.rows_affected != 1 {
        return Err(StorageError::Conflict(format!(
            "order {} changed concurrently",
            order_id.as_str()
        )));
    }

    if status == PaymentStatus::Captured {
        users::Entity::update_many()
            .col_expr(users::Column::IsPaid, Expr::value(true))
            .col_expr(users::Column::UpdatedAt, Expr::value(now))
            .filter(users::Column::Id.eq(current.user_id.as_str()))
            .exec(txn)
            .await
            .map_err(map_db_err)?;
    }

    let mut record = payment_to_record(current);
    record.status = status;
    record.payment_id = Some(payment_id.to_owned());
    record.updated_at = now;
    Ok(record)
}

fn status_from_db(status: PaymentStatusDb) -> PaymentStatus {
    match status {
        PaymentStatusDb::Created => PaymentStatus::Created,
        PaymentStatusDb::Captured => PaymentStatus::Captured,
        PaymentStatusDb::Failed => PaymentStatus::Failed,
    }
}

fn status_to_db(status: PaymentStatus) -> PaymentStatusDb {
    match status {
        PaymentStatus::Created => PaymentStatusDb::Created,
        PaymentStatus::Captured => PaymentStatusDb::Captured,
        PaymentStatus::Failed => PaymentStatusDb::Failed,
    }
}

fn payment_to_record(model: payments::Model) -> PaymentRecord {
    PaymentRecord {
        order_id: OrderId::new(model.order_id),
        payment_id: model.payment_id,
        user_id: UserId::new(model.user_id),
        amount: model.amount,
        currency: model.currency,
        status: status_from_db(model.status),
        created_at: model.created_at,
        updated_at: model.updated_at,
    }
}
