use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::UNLIMITED_VIEWS;
use crate::error::{PersistError, Result};

/// Partial update of a session; `None` leaves the column untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persona_name: Option<String>,
}

impl SessionPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.persona_name.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(PersistError::Validation("no fields to update".into()));
        }
        if self.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(PersistError::Validation("title must not be empty".into()));
        }
        Ok(())
    }
}

/// Owner-issued change to a shared link's access policy
///
/// `expires_at` distinguishes "absent" (`None`) from an explicit `null`
/// (`Some(None)`), which removes the expiry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedLinkPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_views: Option<i64>,
    #[serde(
        default,
        deserialize_with = "explicit_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub expires_at: Option<Option<DateTime<Utc>>>,
}

impl SharedLinkPatch {
    pub fn is_empty(&self) -> bool {
        self.is_public.is_none() && self.max_views.is_none() && self.expires_at.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(PersistError::Validation("no fields to update".into()));
        }
        if let Some(max_views) = self.max_views {
            validate_max_views(max_views)?;
        }
        Ok(())
    }
}

/// `-1` (unlimited) or a positive bound
pub fn validate_max_views(max_views: i64) -> Result<()> {
    if max_views == UNLIMITED_VIEWS || max_views > 0 {
        Ok(())
    } else {
        Err(PersistError::Validation(format!(
            "max_views must be -1 or positive, got {}",
            max_views
        )))
    }
}

fn explicit_null<'de, D>(deserializer: D) -> std::result::Result<Option<Option<DateTime<Utc>>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<DateTime<Utc>>::deserialize(deserializer).map(Some)
}
