use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{
    DBMessage, MessagePage, NewApiConfig, NewMessage, Session, SessionPage, SessionPatch,
    SharedAccess, SharedLink, SharedLinkPatch, UserApiConfig,
};

/// Trait for database persistence operations
///
/// Implementations provide database-specific CRUD operations. Operations that
/// touch more than one row run inside a single transaction.
#[async_trait]
pub trait PersistenceClient: Send + Sync {
    // Sessions

    /// Return the user's session with this id, creating it when absent
    async fn find_or_create_session(
        &self,
        session_id: &str,
        user_id: i64,
        model_name: &str,
    ) -> Result<Session>;

    /// Get a session owned by `user_id`
    async fn get_session(&self, session_id: &str, user_id: i64) -> Result<Option<Session>>;

    /// List a user's sessions, most recently active first
    async fn list_sessions(
        &self,
        user_id: i64,
        page: Option<i64>,
        page_size: Option<i64>,
    ) -> Result<SessionPage>;

    /// Apply a typed patch to a session owned by `user_id`
    async fn update_session(
        &self,
        session_id: &str,
        user_id: i64,
        patch: SessionPatch,
    ) -> Result<Session>;

    /// Delete a session and all of its messages
    async fn delete_session(&self, session_id: &str) -> Result<()>;

    // Messages

    /// Append a message, assigning the next order value and bumping the
    /// session's counters
    async fn save_message(&self, message: NewMessage) -> Result<DBMessage>;

    /// Full history of a session in order
    async fn get_messages(&self, session_id: &str) -> Result<Vec<DBMessage>>;

    /// Cursor page of history ending before `before_order`
    async fn get_messages_page(
        &self,
        session_id: &str,
        before_order: Option<i64>,
        limit: Option<i64>,
    ) -> Result<MessagePage>;

    // API configurations

    async fn create_api_config(&self, user_id: i64, config: NewApiConfig) -> Result<UserApiConfig>;

    /// Credentials a user registered for `model_name`
    async fn get_api_config(&self, user_id: i64, model_name: &str) -> Result<UserApiConfig>;

    // Shared links

    async fn create_shared_link(
        &self,
        session_id: &str,
        created_by: i64,
        max_views: i64,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<SharedLink>;

    /// Read a link without counting a view
    async fn get_shared_link(&self, share_id: &str) -> Result<Option<SharedLink>>;

    async fn list_shared_links(&self, created_by: i64) -> Result<Vec<SharedLink>>;

    async fn update_shared_link(
        &self,
        share_id: &str,
        user_id: i64,
        patch: SharedLinkPatch,
    ) -> Result<SharedLink>;

    async fn delete_shared_link(&self, share_id: &str, user_id: i64) -> Result<()>;

    /// Validate a link, count the view and read the shared transcript atomically
    async fn access_shared_link(&self, share_id: &str) -> Result<SharedAccess>;
}
