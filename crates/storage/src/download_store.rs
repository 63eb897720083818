use clipgate_domain::model::{platform_bucket, DownloadStats, NewDownload};
use clipgate_domain::storage::{DownloadStore, StorageResult};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QuerySelect, Set,
};

use crate::entity::downloads;
use crate::{map_db_err, SeaOrmStorage};

#[async_trait::async_trait]
impl DownloadStore for SeaOrmStorage {
    async fn log_download(&self, download: NewDownload) -> StorageResult<()> {
        let model = downloads::ActiveModel {
            user_id: Set(download.user_id.map(|id| id.into_inner())),
            platform: Set(download.platform),
            video_url: Set(download.video_url),
            format: Set(download.format),
            quality: Set(download.quality),
            downloaded_at: Set(download.downloaded_at),
            ..Default::default()
        };
        model.insert(self.connection()).await.map_err(map_db_err)?;
        Ok(())
    }

    async fn stats(&self) -> StorageResult<DownloadStats> {
        let db = self.connection();
        let total_downloads = downloads::Entity::find()
            .count(db)
            .await
            .map_err(map_db_err)?;

        let active_users = downloads::Entity::find()
            .select_only()
            .column(downloads::Column::UserId)
            .distinct()
            .filter(downloads::Column::UserId.is_not_null())
            .count(db)
            .await
            .map_err(map_db_err)?;

        let by_platform: Vec<(Option<String>, i64)> = downloads::Entity::find()
            .select_only()
            .column(downloads::Column::Platform)
            .column_as(Expr::col(downloads::Column::Id).count(), "count")
            .group_by(downloads::Column::Platform)
            .into_tuple()
            .all(db)
            .await
            .map_err(map_db_err)?;

        let mut stats = DownloadStats {
            total_downloads,
            active_users,
            ..Default::default()
        };
        for (platform, count) in by_platform {
            *stats
                .platform_stats
                .entry(platform_bucket(platform.as_deref()))
                .or_default() += u64::try_from(count).unwrap_or_default();
        }
        Ok(stats)
    }
}
