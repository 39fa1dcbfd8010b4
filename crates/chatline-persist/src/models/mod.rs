mod db_message;
mod db_session;
mod api_config;
mod patch;
mod shared_link;

// Export database-agnostic models
pub use db_message::{DBMessage, MessagePage, NewMessage};
pub use db_session::{Session, SessionPage};
pub use api_config::{NewApiConfig, UserApiConfig};
pub use patch::{validate_max_views, SessionPatch, SharedLinkPatch};
pub use shared_link::{LinkRejection, SharedAccess, SharedLink, UNLIMITED_VIEWS};
