use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{MediaRepo, RepoError},
    domain::media::ImageAsset,
};

use super::{PostgresRepositories, map_sqlx_error};

const MAX_RECENT_LIMIT: u32 = 500;

#[derive(sqlx::FromRow)]
struct ImageRow {
    id: Uuid,
    url: String,
    content_type: String,
    created_at: OffsetDateTime,
}

impl From<ImageRow> for ImageAsset {
    fn from(row: ImageRow) -> Self {
        Self {
            id: row.id,
            url: row.url,
            content_type: row.content_type,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl MediaRepo for PostgresRepositories {
    async fn find_image(&self, id: Uuid) -> Result<Option<ImageAsset>, RepoError> {
        let row = sqlx::query_as::<_, ImageRow>(
            r#"
            SELECT id, url, content_type, created_at
            FROM media_images
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(ImageAsset::from))
    }

    async fn recent_images(&self, limit: u32) -> Result<Vec<ImageAsset>, RepoError> {
        let limit = i64::from(limit.clamp(1, MAX_RECENT_LIMIT));
        let rows = sqlx::query_as::<_, ImageRow>(
            r#"
            SELECT id, url, content_type, created_at
            FROM media_images
            WHERE lower(trim(content_type)) IN ('image/jpeg', 'image/jpg', 'image/pjpeg', 'image/png')
            ORDER BY created_at DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(ImageAsset::from).collect())
    }
}
