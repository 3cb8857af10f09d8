pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod db_migrate;
pub mod error;
pub mod models;
pub mod permissions;
pub mod server;
pub mod state;
pub mod store;
pub mod sweeper;

pub use db::ScyllaConnector;
pub use error::Result as AppResult;
pub use state::NotificationManager;
pub use store::{MemoryStore, NotificationStore};
