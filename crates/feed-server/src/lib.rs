//! Feed Server Library
//!
//! Multi-user post feed: bearer-token auth, ownership-checked post
//! mutations with image uploads, paginated listing and live change
//! notifications over WebSocket.

pub mod auth;
pub mod broadcast;
pub mod config;
pub mod ctx;
pub mod error;
pub mod feed;
pub mod handlers;
pub mod images;
pub mod models;
pub mod store;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use auth::{mw_require_auth, AccountManager, TokenCodec};
use broadcast::ChangeBroadcaster;
use config::{AppState, FeedServerConfig};
use feed::FeedService;
use handlers::{
    create_post, delete_post, get_post, get_status, list_posts, live_updates, login, signup,
    update_post, update_status,
};
use images::DiskImageStore;
use store::SqlitePostRepository;

/// Wire the storage, image store, broadcaster and auth components together
pub async fn build_state(config: &FeedServerConfig) -> anyhow::Result<AppState> {
    config.ensure_dirs().await?;

    let pool = store::connect(&config.db_path()).await?;

    let broadcaster = ChangeBroadcaster::new(config.broadcast_capacity);
    let feed = FeedService::new(
        Arc::new(SqlitePostRepository::new(pool.clone())),
        Arc::new(DiskImageStore::new(&config.data_dir)),
        broadcaster.clone(),
        config.page_size,
    );

    let tokens = TokenCodec::new(
        config.token_secret.as_bytes(),
        chrono::Duration::seconds(config.token_ttl_secs),
    );

    Ok(AppState {
        accounts: Arc::new(AccountManager::with_cost(pool, config.bcrypt_cost)),
        tokens: Arc::new(tokens),
        feed: Arc::new(feed),
        broadcaster,
    })
}

pub fn router(state: AppState, config: &FeedServerConfig) -> Router {
    let post_by_id = get(get_post).merge(
        put(update_post)
            .delete(delete_post)
            .route_layer(middleware::from_fn_with_state(state.clone(), mw_require_auth)),
    );

    Router::new()
        // Auth endpoints
        .route("/auth/signup", put(signup))
        .route("/auth/login", post(login))
        .route(
            "/auth/status",
            get(get_status)
                .patch(update_status)
                .route_layer(middleware::from_fn_with_state(state.clone(), mw_require_auth)),
        )
        // Feed endpoints
        .route("/feed/posts", get(list_posts))
        .route(
            "/feed/post",
            post(create_post)
                .route_layer(middleware::from_fn_with_state(state.clone(), mw_require_auth)),
        )
        .route("/feed/post/{post_id}", post_by_id)
        // Live updates
        .route("/live", get(live_updates))
        // Health check
        .route("/health", get(health_check))
        .nest_service("/images", ServeDir::new(config.image_dir()))
        .layer(DefaultBodyLimit::max(config.max_body_bytes()))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

pub async fn run() -> anyhow::Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        // Already set, ignore
    }

    info!("=== Feed Server ===");

    let config = FeedServerConfig::from_env();
    info!("Data directory: {:?}", config.data_dir);

    let state = build_state(&config).await?;
    info!("Feed service initialized (page size {})", config.page_size);

    let app = router(state, &config);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK - Feed Server"
}
