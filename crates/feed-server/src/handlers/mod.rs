//! HTTP handlers for the feed server

pub mod auth;
pub mod feed;
pub mod form;
pub mod live;

// Re-export AppState from config
pub use crate::config::AppState;

pub use auth::{get_status, login, signup, update_status};
pub use feed::{create_post, delete_post, get_post, list_posts, update_post};
pub use live::live_updates;
