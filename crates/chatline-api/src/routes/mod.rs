pub mod api_configs;
pub mod chat;
pub mod health;
pub mod sessions;
pub mod share;
