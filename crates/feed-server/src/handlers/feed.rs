//! Post handlers
//!
//! Reads are open; create, update and delete sit behind `mw_require_auth`
//! and receive the caller through `Ctx`.

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::config::AppState;
use crate::ctx::Ctx;
use crate::error::Result;
use crate::handlers::form::{page_query, PostForm};

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
}

/// GET /feed/posts?page=N
pub async fn list_posts(
    State(state): State<AppState>,
    query: std::result::Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<Value>> {
    let page = page_query(query)?.page.unwrap_or(1);
    info!("GET /feed/posts?page={}", page);

    let page = state.feed.list(page).await?;

    Ok(Json(json!({
        "message": "Fetched posts successfully.",
        "posts": page.posts,
        "totalItems": page.total_items,
    })))
}

/// GET /feed/post/{post_id}
pub async fn get_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
) -> Result<Json<Value>> {
    info!("GET /feed/post/{}", post_id);

    let post = state.feed.get(&post_id).await?;

    Ok(Json(json!({
        "message": "Post fetched.",
        "post": post,
    })))
}

/// POST /feed/post
pub async fn create_post(
    State(state): State<AppState>,
    ctx: Ctx,
    form: PostForm,
) -> Result<(StatusCode, Json<Value>)> {
    info!(
        "POST /feed/post - {} ({})",
        ctx.user_id(),
        ctx.display_name().unwrap_or("unnamed")
    );

    let post = state
        .feed
        .create(ctx.user_id(), form.input, form.upload)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Post created successfully.",
            "creator": post.creator,
            "post": post,
        })),
    ))
}

/// PUT /feed/post/{post_id}
pub async fn update_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    ctx: Ctx,
    form: PostForm,
) -> Result<Json<Value>> {
    info!("PUT /feed/post/{} - {}", post_id, ctx.user_id());

    let post = state
        .feed
        .update(
            ctx.user_id(),
            &post_id,
            form.input,
            form.upload,
            form.image_ref,
        )
        .await?;

    Ok(Json(json!({
        "message": "Post updated.",
        "post": post,
    })))
}

/// DELETE /feed/post/{post_id}
pub async fn delete_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    ctx: Ctx,
) -> Result<Json<Value>> {
    info!("DELETE /feed/post/{} - {}", post_id, ctx.user_id());

    state.feed.delete(ctx.user_id(), &post_id).await?;

    Ok(Json(json!({ "message": "Post deleted." })))
}
