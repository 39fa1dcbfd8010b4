use std::sync::Arc;

use chatline_persist::{
    PersistenceClient, SharedAccess, SharedLink, SharedLinkPatch, UNLIMITED_VIEWS,
};
use chrono::{DateTime, Utc};

use crate::error::{ChatError, Result};

/// Owner-facing and public operations on shared links
pub struct ShareService {
    persist: Arc<dyn PersistenceClient>,
}

impl ShareService {
    pub fn new(persist: Arc<dyn PersistenceClient>) -> Self {
        Self { persist }
    }

    /// Share one of the owner's sessions; `None` means unlimited views
    pub async fn create(
        &self,
        session_id: &str,
        owner_id: i64,
        max_views: Option<i64>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<SharedLink> {
        if expires_at.is_some_and(|at| at <= Utc::now()) {
            return Err(ChatError::Validation("expires_at must be in the future".into()));
        }

        let link = self
            .persist
            .create_shared_link(
                session_id,
                owner_id,
                max_views.unwrap_or(UNLIMITED_VIEWS),
                expires_at,
            )
            .await?;
        tracing::info!(share_id = %link.share_id, session_id = %session_id, "shared link created");
        Ok(link)
    }

    /// Count a view and return the transcript, or the policy rejection
    pub async fn access(&self, share_id: &str) -> Result<SharedAccess> {
        let access = self.persist.access_shared_link(share_id).await?;
        tracing::debug!(share_id = %share_id, views = access.link.view_count, "shared link accessed");
        Ok(access)
    }

    /// Link metadata without counting a view
    pub async fn info(&self, share_id: &str) -> Result<SharedLink> {
        self.persist
            .get_shared_link(share_id)
            .await?
            .ok_or_else(|| ChatError::NotFound(format!("shared link {}", share_id)))
    }

    /// Whether an access right now would be admitted
    pub async fn validate(&self, share_id: &str) -> Result<bool> {
        Ok(self
            .persist
            .get_shared_link(share_id)
            .await?
            .is_some_and(|link| link.is_accessible_at(Utc::now())))
    }

    pub async fn list(&self, owner_id: i64) -> Result<Vec<SharedLink>> {
        Ok(self.persist.list_shared_links(owner_id).await?)
    }

    pub async fn update(
        &self,
        share_id: &str,
        owner_id: i64,
        patch: SharedLinkPatch,
    ) -> Result<SharedLink> {
        Ok(self.persist.update_shared_link(share_id, owner_id, patch).await?)
    }

    pub async fn delete(&self, share_id: &str, owner_id: i64) -> Result<()> {
        self.persist.delete_shared_link(share_id, owner_id).await?;
        tracing::info!(share_id = %share_id, "shared link deleted");
        Ok(())
    }
}
