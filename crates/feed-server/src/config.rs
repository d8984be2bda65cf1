//! Feed server configuration

use std::path::PathBuf;
use std::sync::Arc;

use tracing::warn;

use crate::auth::{AccountManager, TokenCodec};
use crate::broadcast::ChangeBroadcaster;
use crate::feed::FeedService;

/// Configuration for the feed server
#[derive(Clone, Debug)]
pub struct FeedServerConfig {
    /// Data directory holding the database and `images/`
    pub data_dir: PathBuf,
    /// Port to listen on
    pub port: u16,
    /// HMAC secret for bearer tokens
    pub token_secret: String,
    /// Token lifetime in seconds
    pub token_ttl_secs: i64,
    /// Posts per page
    pub page_size: u32,
    /// Max request body (uploads) in MB
    pub max_upload_mb: usize,
    /// Events buffered per live subscriber before it starts skipping
    pub broadcast_capacity: usize,
    /// bcrypt work factor for new passwords
    pub bcrypt_cost: u32,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Default for FeedServerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("feed_data"),
            port: 5000,
            token_secret: ephemeral_secret(),
            token_ttl_secs: 3600,
            page_size: 2,
            max_upload_mb: 8,
            broadcast_capacity: 64,
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

/// Per-process secret; tokens stop verifying after a restart
fn ephemeral_secret() -> String {
    format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}

impl FeedServerConfig {
    /// Read settings from the environment, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let token_secret = match std::env::var("TOKEN_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ => {
                warn!("TOKEN_SECRET not set, using a random per-process secret");
                defaults.token_secret
            }
        };

        Self {
            data_dir: std::env::var("FEED_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            port: env_or("FEED_PORT", defaults.port),
            token_secret,
            token_ttl_secs: env_or("TOKEN_TTL_SECS", defaults.token_ttl_secs),
            page_size: env_or("FEED_PAGE_SIZE", defaults.page_size),
            max_upload_mb: env_or("FEED_MAX_UPLOAD_MB", defaults.max_upload_mb),
            broadcast_capacity: env_or("FEED_BROADCAST_CAPACITY", defaults.broadcast_capacity),
            bcrypt_cost: env_or("BCRYPT_COST", defaults.bcrypt_cost),
        }
    }

    /// Create config with custom base directory
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: base_dir.into(),
            ..Self::default()
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("feed.sqlite")
    }

    pub fn image_dir(&self) -> PathBuf {
        self.data_dir.join(crate::images::IMAGE_DIR)
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }

    /// Ensure all directories exist
    pub async fn ensure_dirs(&self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.data_dir).await?;
        tokio::fs::create_dir_all(self.image_dir()).await?;
        Ok(())
    }
}

/// App state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<AccountManager>,
    pub tokens: Arc<TokenCodec>,
    pub feed: Arc<FeedService>,
    pub broadcaster: ChangeBroadcaster,
}
