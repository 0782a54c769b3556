use async_trait::async_trait;

use crate::application::repos::{OptionStore, RepoError};

use super::{PostgresRepositories, like_prefix_pattern, map_sqlx_error};

#[async_trait]
impl OptionStore for PostgresRepositories {
    async fn get(&self, key: &str) -> Result<Option<String>, RepoError> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT option_value
            FROM options
            WHERE option_name = $1
            "#,
        )
        .bind(key)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), RepoError> {
        sqlx::query(
            r#"
            INSERT INTO options (option_name, option_value, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (option_name) DO UPDATE SET
                option_value = EXCLUDED.option_value,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM options WHERE option_name = $1")
            .bind(key)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_by_prefix(&self, prefix: &str) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM options WHERE option_name LIKE $1")
            .bind(like_prefix_pattern(prefix))
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn list_by_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, RepoError> {
        sqlx::query_as::<_, (String, String)>(
            r#"
            SELECT option_name, option_value
            FROM options
            WHERE option_name LIKE $1
            ORDER BY option_name
            "#,
        )
        .bind(like_prefix_pattern(prefix))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)
    }
}
