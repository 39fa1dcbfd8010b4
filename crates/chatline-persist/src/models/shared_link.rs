use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{DBMessage, Session};

/// `max_views` sentinel meaning the link may be opened any number of times
pub const UNLIMITED_VIEWS: i64 = -1;

/// Publicly shareable, policy-bounded read access to one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedLink {
    pub share_id: String,
    pub session_id: String,
    pub created_by: i64,
    pub is_public: bool,
    pub max_views: i64,
    pub view_count: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_access_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl SharedLink {
    /// Fresh share token: `share_` followed by 16 hex characters
    pub fn generate_token() -> String {
        let raw = uuid::Uuid::new_v4().simple().to_string();
        format!("share_{}", &raw[..16])
    }

    /// Why this link cannot be opened at `now`, if it cannot
    pub fn rejection_at(&self, now: DateTime<Utc>) -> Option<LinkRejection> {
        if !self.is_public {
            return Some(LinkRejection::Private);
        }
        if self.expires_at.is_some_and(|expires| now > expires) {
            return Some(LinkRejection::Expired);
        }
        if self.max_views != UNLIMITED_VIEWS && self.view_count >= self.max_views {
            return Some(LinkRejection::LimitReached);
        }
        None
    }

    pub fn is_accessible_at(&self, now: DateTime<Utc>) -> bool {
        self.rejection_at(now).is_none()
    }
}

/// Policy reasons an access attempt is refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkRejection {
    #[error("shared link does not exist")]
    NotFound,
    #[error("shared link is private")]
    Private,
    #[error("shared link has expired")]
    Expired,
    #[error("shared link view limit reached")]
    LimitReached,
}

/// Everything a successful access returns, read in the same transaction
/// that counted the view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedAccess {
    pub session: Session,
    pub messages: Vec<DBMessage>,
    pub link: SharedLink,
}
