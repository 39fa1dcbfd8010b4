use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::dbs::sqlite::models::{into_messages, MessageRow, SessionRow, SharedLinkRow};
use crate::error::{PersistError, Result};
use crate::models::{
    validate_max_views, LinkRejection, Session, SharedAccess, SharedLink, SharedLinkPatch,
};

const LINK_COLUMNS: &str = "share_id, session_id, created_by, is_public, max_views, \
     view_count, expires_at, last_access_at, created_at";

#[derive(Clone)]
pub(crate) struct SqliteSharedLinkRepository {
    pool: SqlitePool,
}

impl SqliteSharedLinkRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        session_id: &str,
        created_by: i64,
        max_views: i64,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<SharedLink> {
        validate_max_views(max_views)?;

        let (owned,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM chat_sessions WHERE session_id = ? AND user_id = ?",
        )
        .bind(session_id)
        .bind(created_by)
        .fetch_one(&self.pool)
        .await?;

        if owned == 0 {
            return Err(PersistError::SessionNotFound(session_id.to_string()));
        }

        let link = SharedLink {
            share_id: SharedLink::generate_token(),
            session_id: session_id.to_string(),
            created_by,
            is_public: true,
            max_views,
            view_count: 0,
            expires_at,
            last_access_at: None,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO shared_links
                (share_id, session_id, created_by, is_public, max_views, view_count, expires_at, created_at)
            VALUES (?, ?, ?, ?, ?, 0, ?, ?)
            "#,
        )
        .bind(&link.share_id)
        .bind(&link.session_id)
        .bind(link.created_by)
        .bind(link.is_public)
        .bind(link.max_views)
        .bind(link.expires_at)
        .bind(link.created_at)
        .execute(&self.pool)
        .await?;

        tracing::info!(share_id = %link.share_id, session_id = %session_id, created_by, "created shared link");
        Ok(link)
    }

    pub async fn get(&self, share_id: &str) -> Result<Option<SharedLink>> {
        let row = sqlx::query_as::<_, SharedLinkRow>(&format!(
            "SELECT {} FROM shared_links WHERE share_id = ?",
            LINK_COLUMNS
        ))
        .bind(share_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(SharedLink::from))
    }

    pub async fn list_by_creator(&self, created_by: i64) -> Result<Vec<SharedLink>> {
        let rows = sqlx::query_as::<_, SharedLinkRow>(&format!(
            "SELECT {} FROM shared_links WHERE created_by = ? ORDER BY created_at DESC",
            LINK_COLUMNS
        ))
        .bind(created_by)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SharedLink::from).collect())
    }

    /// Apply an owner's patch; only policy columns are writable
    pub async fn update(
        &self,
        share_id: &str,
        user_id: i64,
        patch: SharedLinkPatch,
    ) -> Result<SharedLink> {
        patch.validate()?;

        let result = sqlx::query(
            r#"
            UPDATE shared_links
            SET is_public = COALESCE(?, is_public),
                max_views = COALESCE(?, max_views),
                expires_at = CASE WHEN ? THEN ? ELSE expires_at END
            WHERE share_id = ? AND created_by = ?
            "#,
        )
        .bind(patch.is_public)
        .bind(patch.max_views)
        .bind(patch.expires_at.is_some())
        .bind(patch.expires_at.flatten())
        .bind(share_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PersistError::SharedLinkNotFound(share_id.to_string()));
        }

        tracing::info!(share_id = %share_id, user_id, "updated shared link");
        self.get(share_id)
            .await?
            .ok_or_else(|| PersistError::SharedLinkNotFound(share_id.to_string()))
    }

    pub async fn delete(&self, share_id: &str, user_id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM shared_links WHERE share_id = ? AND created_by = ?")
            .bind(share_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(PersistError::SharedLinkNotFound(share_id.to_string()));
        }

        tracing::info!(share_id = %share_id, user_id, "deleted shared link");
        Ok(())
    }

    /// Count one view and read the shared transcript in a single transaction
    ///
    /// The guarded UPDATE runs first so the transaction holds the write lock
    /// before anything is read; concurrent accesses queue behind it and see
    /// the incremented counter.
    pub async fn access(&self, share_id: &str) -> Result<SharedAccess> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let counted = sqlx::query(
            r#"
            UPDATE shared_links
            SET view_count = view_count + 1, last_access_at = ?
            WHERE share_id = ?
              AND is_public = 1
              AND (expires_at IS NULL OR expires_at >= ?)
              AND (max_views = -1 OR view_count < max_views)
            "#,
        )
        .bind(now)
        .bind(share_id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let link = sqlx::query_as::<_, SharedLinkRow>(&format!(
            "SELECT {} FROM shared_links WHERE share_id = ?",
            LINK_COLUMNS
        ))
        .bind(share_id)
        .fetch_optional(&mut *tx)
        .await?
        .map(SharedLink::from);

        let link = match (counted.rows_affected(), link) {
            (_, None) => return Err(PersistError::LinkRejected(LinkRejection::NotFound)),
            (0, Some(link)) => {
                let reason = link.rejection_at(now).unwrap_or(LinkRejection::LimitReached);
                tracing::debug!(share_id = %share_id, reason = %reason, "shared link access rejected");
                return Err(PersistError::LinkRejected(reason));
            }
            (_, Some(link)) => link,
        };

        let session = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT session_id, user_id, title, model_name, persona_name,
                   message_count, last_message_at, created_at, updated_at
            FROM chat_sessions
            WHERE session_id = ?
            "#,
        )
        .bind(&link.session_id)
        .fetch_optional(&mut *tx)
        .await?
        .map(Session::from)
        .ok_or_else(|| PersistError::SessionNotFound(link.session_id.clone()))?;

        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, session_id, user_id, role, content, message_order, created_at
            FROM chat_messages
            WHERE session_id = ?
            ORDER BY message_order
            "#,
        )
        .bind(&link.session_id)
        .fetch_all(&mut *tx)
        .await?;
        let messages = into_messages(rows)?;

        tx.commit().await?;

        tracing::info!(share_id = %share_id, view_count = link.view_count, "shared link accessed");
        Ok(SharedAccess {
            session,
            messages,
            link,
        })
    }
}
