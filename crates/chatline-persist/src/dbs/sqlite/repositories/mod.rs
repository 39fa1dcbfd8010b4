mod api_config;
mod message;
mod session;
mod shared_link;

pub(crate) use api_config::SqliteApiConfigRepository;
pub(crate) use message::SqliteMessageRepository;
pub(crate) use session::SqliteSessionRepository;
pub(crate) use shared_link::SqliteSharedLinkRepository;
