mod client;
mod models;
mod repositories;
mod schema;

pub use client::SqlitePersistenceClient;
