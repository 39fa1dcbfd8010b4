pub mod models;
pub mod dbs;
pub mod error;
pub mod trait_client;

pub use models::{
    DBMessage, LinkRejection, MessagePage, NewApiConfig, NewMessage, Session, SessionPage,
    SessionPatch, SharedAccess, SharedLink, SharedLinkPatch, UserApiConfig, UNLIMITED_VIEWS,
};
pub use dbs::sqlite::SqlitePersistenceClient;
pub use error::{PersistError, Result};
pub use trait_client::PersistenceClient;
