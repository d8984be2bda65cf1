use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, FieldError, Result};

/// Owner of a post, with the display name resolved when the user is known
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creator {
    pub id: String,
    pub name: Option<String>,
}

/// A feed post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub title: String,
    pub content: String,
    pub image_url: String,
    pub creator: Creator,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to insert a post; id and timestamps are assigned by the store
#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub content: String,
    pub image_url: String,
    pub creator_id: String,
}

/// One page of the feed
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostPage {
    pub posts: Vec<Post>,
    pub total_items: u64,
}

/// Client-supplied title and content
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostInput {
    pub title: String,
    pub content: String,
}

impl PostInput {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
        }
    }

    /// Trim both fields and reject empty ones, reporting every bad field
    pub fn validate(self) -> Result<PostInput> {
        let title = self.title.trim().to_string();
        let content = self.content.trim().to_string();

        let mut errors = Vec::new();
        if title.is_empty() {
            errors.push(FieldError::new("title", "Title must not be empty."));
        }
        if content.is_empty() {
            errors.push(FieldError::new("content", "Content must not be empty."));
        }

        if !errors.is_empty() {
            return Err(Error::validation(errors));
        }

        Ok(PostInput { title, content })
    }
}

/// Account record (no password hash)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}
