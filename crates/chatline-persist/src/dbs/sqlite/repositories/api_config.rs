use chrono::Utc;
use sqlx::SqlitePool;

use crate::dbs::sqlite::models::{conflict_on_unique, ApiConfigRow};
use crate::error::{PersistError, Result};
use crate::models::{NewApiConfig, UserApiConfig};

#[derive(Clone)]
pub(crate) struct SqliteApiConfigRepository {
    pool: SqlitePool,
}

impl SqliteApiConfigRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, user_id: i64, config: NewApiConfig) -> Result<UserApiConfig> {
        config.validate()?;

        let (existing,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM user_api_configs WHERE user_id = ? AND api_name = ?",
        )
        .bind(user_id)
        .bind(&config.api_name)
        .fetch_one(&self.pool)
        .await?;

        if existing > 0 {
            return Err(PersistError::Conflict(format!(
                "API configuration '{}' already exists",
                config.api_name
            )));
        }

        let now = Utc::now();
        let id = sqlx::query(
            r#"
            INSERT INTO user_api_configs (user_id, api_name, api_key, model_name, base_url, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user_id)
        .bind(&config.api_name)
        .bind(&config.api_key)
        .bind(&config.model_name)
        .bind(&config.base_url)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            conflict_on_unique(e, || {
                format!("API configuration '{}' already exists", config.api_name)
            })
        })?
        .last_insert_rowid();

        Ok(UserApiConfig {
            id,
            user_id,
            api_name: config.api_name,
            api_key: config.api_key,
            model_name: config.model_name,
            base_url: config.base_url,
            created_at: now,
        })
    }

    /// Most recently registered configuration for `model_name`
    pub async fn find_by_model(&self, user_id: i64, model_name: &str) -> Result<UserApiConfig> {
        let row = sqlx::query_as::<_, ApiConfigRow>(
            r#"
            SELECT id, user_id, api_name, api_key, model_name, base_url, created_at
            FROM user_api_configs
            WHERE user_id = ? AND model_name = ?
            ORDER BY id DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(model_name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserApiConfig::from)
            .ok_or_else(|| PersistError::ApiConfigNotFound {
                user_id,
                model_name: model_name.to_string(),
            })
    }
}
