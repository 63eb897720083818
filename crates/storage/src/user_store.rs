use clipgate_domain::model::{UserId, UserProfile, UserRecord};
use clipgate_domain::storage::{StorageError, StorageResult, UserStore};
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{EntityTrait, Set};

use crate::entity::users;
use crate::{map_db_err, SeaOrmStorage};

#[async_trait::async_trait]
impl UserStore for SeaOrmStorage {
    async fn upsert_user(&self, profile: UserProfile) -> StorageResult<UserRecord> {
        let now = Utc::now();
        let id = profile.id.as_str().to_owned();
        let model = users::ActiveModel {
            id: Set(id.clone()),
            email: Set(profile.email),
            name: Set(profile.name),
            picture: Set(profile.picture),
            is_paid: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
        };
        users::Entity::insert(model)
            .on_conflict(
                OnConflict::column(users::Column::Id)
                    .update_columns([
                        users::Column::Email,
                        users::Column::Name,
                        users::Column::Picture,
                        users::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.connection())
            .await
            .map_err(map_db_err)?;

        users::Entity::find_by_id(id.clone())
            .one(self.connection())
            .await
            .map_err(map_db_err)?
            .map(user_to_record)
            .ok_or(StorageError::NotFound(id))
    }

    async fn find_user(&self, id: &UserId) -> StorageResult<Option<UserRecord>> {
        let maybe = users::Entity::find_by_id(id.as_str().to_owned())
            .one(self.connection())
            .await
            .map_err(map_db_err)?;
        Ok(maybe.map(user_to_record))
    }

    async fn payment_flag(&self, id: &UserId) -> StorageResult<bool> {
        Ok(self.find_user(id).await?.is_some_and(|user| user.is_paid))
    }
}

pub(crate) fn user_to_record(model: users::Model) -> UserRecord {
    UserRecord {
        id: UserId::new(model.id),
        email: model.email,
        name: model.name,
        picture: model.picture,
        is_paid: model.is_paid,
        created_at: model.created_at,
        updated_at: model.updated_at,
    }
}
