use std::collections::BTreeMap;

use clipgate_domain::storage::{SettingsStore, StorageResult};
use sea_orm::sea_query::OnConflict;
use sea_orm::{EntityTrait, QueryOrder, Set};

use crate::entity::app_settings;
use crate::{map_db_err, SeaOrmStorage};

#[async_trait::async_trait]
impl SettingsStore for SeaOrmStorage {
    async fn get_setting(&self, key: &str) -> StorageResult<Option<String>> {
        let maybe = app_settings::Entity::find_by_id(key.to_owned())
            .one(self.connection())
            .await
            .map_err(map_db_err)?;
        Ok(maybe.map(|row| row.value))
    }

    async fn set_setting(&self, key: &str, value: &str) -> StorageResult<()> {
        let model = app_settings::ActiveModel {
            key: Set(key.to_owned()),
            value: Set(value.to_owned()),
        };
        app_settings::Entity::insert(model)
            .on_conflict(
                OnConflict::column(app_settings::Column::Key)
                    .update_column(app_settings::Column::Value)
                    .to_owned(),
            )
            .exec_without_returning(self.connection())
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn list_settings(&self) -> StorageResult<BTreeMap<String, String>> {
        let rows = app_settings::Entity::find()
            .order_by_asc(app_settings::Column::Key)
            .all(self.connection())
            .await
            .map_err(map_db_err)?;
        Ok(rows.into_iter().map(|row| (row.key, row.value)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_storage;

    #[tokio::test]
    async fn set_overwrites_previous_value() {
        let storage = memory_storage().await;
        assert_eq!(storage.get_setting("payments_enabled").await.unwrap(), None);

        storage.set_setting("payments_enabled", "true").await.unwrap();
        storage.set_setting("payments_enabled", "false").await.unwrap();
        storage.set_setting("banner", "hello").await.unwrap();

        assert_eq!(
            storage.get_setting("payments_enabled").await.unwrap().as_deref(),
            Some("false")
        );
        let all = storage.list_settings().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all.get("banner").map(String::as_str), Some("hello"));
    }
}
