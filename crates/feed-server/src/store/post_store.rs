//! Post persistence
//!
//! Pages are 1-indexed and ordered by insertion. The total count is a
//! separate query, so under concurrent writes it may disagree slightly with
//! the page it accompanies.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Creator, NewPost, Post};

#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Fetch page `page` (1-based) and the total number of posts
    async fn list(&self, page: u32, per_page: u32) -> Result<(Vec<Post>, u64)>;

    async fn get(&self, id: &str) -> Result<Post>;

    async fn create(&self, post: NewPost) -> Result<Post>;

    /// Persist title, content and image of an existing post
    async fn save(&self, post: &Post) -> Result<Post>;

    async fn delete(&self, id: &str) -> Result<()>;

    async fn append_owned(&self, user_id: &str, post_id: &str) -> Result<()>;

    async fn remove_owned(&self, user_id: &str, post_id: &str) -> Result<()>;

    async fn owned_posts(&self, user_id: &str) -> Result<Vec<String>>;
}

#[derive(sqlx::FromRow)]
struct PostRow {
    id: String,
    title: String,
    content: String,
    image_url: String,
    creator_id: String,
    creator_name: Option<String>,
    created_at: String,
    updated_at: String,
}

impl From<PostRow> for Post {
    fn from(row: PostRow) -> Self {
        Post {
            id: row.id,
            title: row.title,
            content: row.content,
            image_url: row.image_url,
            creator: Creator {
                id: row.creator_id,
                name: row.creator_name,
            },
            created_at: parse_time(&row.created_at),
            updated_at: parse_time(&row.updated_at),
        }
    }
}

fn parse_time(raw: &str) -> DateTime<Utc> {
    raw.parse().unwrap_or_else(|_| Utc::now())
}

const SELECT_POST: &str = r#"
    SELECT p.id, p.title, p.content, p.image_url, p.creator_id,
           u.name AS creator_name, p.created_at, p.updated_at
    FROM posts p
    LEFT JOIN users u ON u.id = p.creator_id
"#;

fn not_found() -> Error {
    Error::NotFound("Could not find post.".to_string())
}

pub struct SqlitePostRepository {
    pool: SqlitePool,
}

impl SqlitePostRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PostRepository for SqlitePostRepository {
    async fn list(&self, page: u32, per_page: u32) -> Result<(Vec<Post>, u64)> {
        let page = page.max(1);
        let offset = i64::from(page - 1) * i64::from(per_page);

        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await?;

        let rows: Vec<PostRow> =
            sqlx::query_as(&format!("{} ORDER BY p.seq LIMIT ? OFFSET ?", SELECT_POST))
                .bind(i64::from(per_page))
                .bind(offset)
                .fetch_all(&self.pool)
                .await?;

        Ok((
            rows.into_iter().map(Post::from).collect(),
            u64::try_from(total).unwrap_or_default(),
        ))
    }

    async fn get(&self, id: &str) -> Result<Post> {
        let row: Option<PostRow> = sqlx::query_as(&format!("{} WHERE p.id = ?", SELECT_POST))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Post::from).ok_or_else(not_found)
    }

    async fn create(&self, post: NewPost) -> Result<Post> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO posts (id, title, content, image_url, creator_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&post.title)
        .bind(&post.content)
        .bind(&post.image_url)
        .bind(&post.creator_id)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        info!("[Store] Created post {} for {}", id, post.creator_id);

        self.get(&id).await
    }

    async fn save(&self, post: &Post) -> Result<Post> {
        let result = sqlx::query(
            "UPDATE posts SET title = ?, content = ?, image_url = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&post.title)
        .bind(&post.content)
        .bind(&post.image_url)
        .bind(Utc::now().to_rfc3339())
        .bind(&post.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(not_found());
        }

        self.get(&post.id).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(not_found());
        }

        info!("[Store] Deleted post {}", id);
        Ok(())
    }

    async fn append_owned(&self, user_id: &str, post_id: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO user_posts (user_id, post_id) VALUES (?, ?)")
            .bind(user_id)
            .bind(post_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove_owned(&self, user_id: &str, post_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM user_posts WHERE user_id = ? AND post_id = ?")
            .bind(user_id)
            .bind(post_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn owned_posts(&self, user_id: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT post_id FROM user_posts WHERE user_id = ? ORDER BY rowid")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}
