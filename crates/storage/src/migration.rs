use clipgate_domain::storage::{StorageError, StorageResult};
use sea_orm::sea_query::{ColumnDef, Index, Table, TableCreateStatement};
use sea_orm::{ConnectionTrait, DatabaseConnection};

use crate::entity::{app_settings, downloads, payments, users};

pub async fn run_migrations(db: &DatabaseConnection) -> StorageResult<()> {
    let users_table = Table::create()
        .table(users::Entity)
        .col(
            ColumnDef::new(users::Column::Id)
                .string_len(128)
                .not_null()
                .primary_key(),
        )
        .col(ColumnDef::new(users::Column::Email).string().not_null())
        .col(ColumnDef::new(users::Column::Name).string().null())
        .col(ColumnDef::new(users::Column::Picture).text().null())
        .col(
            ColumnDef::new(users::Column::IsPaid)
                .boolean()
                .not_null()
                .default(false),
        )
        .col(
            ColumnDef::new(users::Column::CreatedAt)
                .timestamp_with_time_zone()
                .not_null(),
        )
        .col(
            ColumnDef::new(users::Column::UpdatedAt)
                .timestamp_with_time_zone()
                .not_null(),
        )
        .to_owned();
    create_table(db, users_table).await?;

    let payments_table = Table::create()
        .table(payments::Entity)
        .col(
            ColumnDef::new(payments::Column::Id)
                .integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(
            ColumnDef::new(payments::Column::OrderId)
                .string_len(64)
                .not_null()
                .unique_key(),
        )
        .col(
            ColumnDef::new(payments::Column::PaymentId)
                .string_len(64)
                .null(),
        )
        .col(
            ColumnDef::new(payments::Column::UserId)
                .string_len(128)
                .not_null(),
        )
        .col(
            ColumnDef::new(payments::Column::Amount)
                .big_integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(payments::Column::Currency)
                .string_len(8)
                .not_null(),
        )
        .col(
            ColumnDef::new(payments::Column::Status)
                .string_len(16)
                .not_null(),
        )
        .col(
            ColumnDef::new(payments::Column::CreatedAt)
                .timestamp_with_time_zone()
                .not_null(),
        )
        .col(
            ColumnDef::new(payments::Column::UpdatedAt)
                .timestamp_with_time_zone()
                .not_null(),
        )
        .to_owned();
    create_table(db, payments_table).await?;

    let downloads_table = Table::create()
        .table(downloads::Entity)
        .col(
            ColumnDef::new(downloads::Column::Id)
                .integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(
            ColumnDef::new(downloads::Column::UserId)
                .string_len(128)
                .null(),
        )
        .col(
            ColumnDef::new(downloads::Column::Platform)
                .text()
                .null(),
        )
        .col(ColumnDef::new(downloads::Column::VideoUrl).text().not_null())
        .col(ColumnDef::new(downloads::Column::Format).text().null())
        .col(ColumnDef::new(downloads::Column::Quality).text().null())
        .col(
            ColumnDef::new(downloads::Column::DownloadedAt)
                .timestamp_with_time_zone()
                .not_null(),
        )
        .to_owned();
    create_table(db, downloads_table).await?;

    let settings_table = Table::create()
        .table(app_settings::Entity)
        .col(
            ColumnDef::new(app_settings::Column::Key)
                .string_len(64)
                .not_null()
                .primary_key(),
        )
        .col(ColumnDef::new(app_settings::Column::Value).text().not_null())
        .to_owned();
    create_table(db, settings_table).await?;

    let downloads_by_user = Index::create()
        .if_not_exists()
        .name("idx_downloads_user_id")
        .table(downloads::Entity)
        .col(downloads::Column::UserId)
        .to_owned();
    let backend = db.get_database_backend();
    db.execute(backend.build(&downloads_by_user))
        .await
        .map_err(StorageError::from_source)?;

    Ok(())
}

async fn create_table(
    db: &DatabaseConnection,
    mut statement: TableCreateStatement,
) -> StorageResult<()> {
    statement.if_not_exists();
    let backend = db.get_database_backend();
    db.execute(backend.build(&statement))
        .await
        .map_err(StorageError::from_source)?;
    Ok(())
}
