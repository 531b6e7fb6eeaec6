/// Database module - durable storage for check configurations and events
pub mod migrations;
pub mod models;
pub mod repository;

pub use migrations::run_migrations;
pub use repository::{LibsqlStore, Store};
