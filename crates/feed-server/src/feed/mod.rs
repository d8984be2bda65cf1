//! Feed Service
//!
//! Orchestrates the post use cases over the repository, the image store and
//! the broadcaster. Callers pass the verified user id explicitly.
//!
//! Ordering within update/delete: existence is checked before ownership, so
//! a missing post is always `NotFound` and never `Forbidden`.
//!
//! The post write and the owner-association write are separate statements.
//! A crash between the two leaves the association list out of step with the
//! posts table; nothing repairs it.

use std::sync::Arc;

use tracing::{info, warn};

use crate::broadcast::{ChangeBroadcaster, FeedEvent};
use crate::error::{Error, FieldError, Result};
use crate::images::{Cleanup, ImageStore, ImageUpload};
use crate::models::{NewPost, Post, PostInput, PostPage};
use crate::store::PostRepository;

#[cfg(test)]
mod tests;

pub struct FeedService {
    posts: Arc<dyn PostRepository>,
    images: Arc<dyn ImageStore>,
    broadcaster: ChangeBroadcaster,
    page_size: u32,
}

impl FeedService {
    pub fn new(
        posts: Arc<dyn PostRepository>,
        images: Arc<dyn ImageStore>,
        broadcaster: ChangeBroadcaster,
        page_size: u32,
    ) -> Self {
        Self {
            posts,
            images,
            broadcaster,
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Page `page` (1-based) of the feed. Open to any caller.
    pub async fn list(&self, page: u32) -> Result<PostPage> {
        let (posts, total_items) = self.posts.list(page, self.page_size).await?;
        Ok(PostPage { posts, total_items })
    }

    pub async fn get(&self, post_id: &str) -> Result<Post> {
        self.posts.get(post_id).await
    }

    pub async fn create(
        &self,
        caller_id: &str,
        input: PostInput,
        upload: Option<ImageUpload>,
    ) -> Result<Post> {
        let input = input.validate()?;

        let upload = upload.ok_or_else(|| Error::MissingImage("No image provided.".into()))?;
        let image_url = self
            .images
            .store(upload)
            .await?
            .ok_or_else(|| Error::MissingImage("No image provided.".into()))?;

        let created = self
            .posts
            .create(NewPost {
                title: input.title,
                content: input.content,
                image_url: image_url.clone(),
                creator_id: caller_id.to_string(),
            })
            .await;

        let post = match created {
            Ok(post) => post,
            Err(e) => {
                self.discard_upload(&image_url).await;
                return Err(e);
            }
        };

        self.posts.append_owned(caller_id, &post.id).await?;

        info!("[Feed] {} created post {}", caller_id, post.id);
        self.broadcaster.publish(FeedEvent::Create(post.clone()));

        Ok(post)
    }

    /// Replace title, content and image of a post owned by `caller_id`.
    ///
    /// A new upload wins over `declared_ref`; `declared_ref` is how clients
    /// keep the current image without re-uploading it, so it must name the
    /// image the post already has.
    pub async fn update(
        &self,
        caller_id: &str,
        post_id: &str,
        input: PostInput,
        upload: Option<ImageUpload>,
        declared_ref: Option<String>,
    ) -> Result<Post> {
        let input = input.validate()?;

        let declared_ref = declared_ref
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());

        let uploaded_ref = match upload {
            Some(upload) => self.images.store(upload).await?,
            None => None,
        };

        let result = self
            .apply_update(caller_id, post_id, input, uploaded_ref.clone(), declared_ref)
            .await;

        if result.is_err() {
            if let Some(ref uploaded) = uploaded_ref {
                self.discard_upload(uploaded).await;
            }
        }

        result
    }

    async fn apply_update(
        &self,
        caller_id: &str,
        post_id: &str,
        input: PostInput,
        uploaded_ref: Option<String>,
        declared_ref: Option<String>,
    ) -> Result<Post> {
        if uploaded_ref.is_none() && declared_ref.is_none() {
            return Err(Error::MissingImage("No file picked.".into()));
        }

        let mut post = self.posts.get(post_id).await?;
        ensure_owner(&post, caller_id)?;

        // Without an upload the only image a post may keep is its own
        let image_url = match (uploaded_ref, declared_ref) {
            (Some(uploaded), _) => uploaded,
            (None, Some(declared)) if declared == post.image_url => declared,
            _ => {
                return Err(Error::validation(vec![FieldError::new(
                    "image",
                    "Image reference is not valid.",
                )]))
            }
        };

        let previous_image = std::mem::replace(&mut post.image_url, image_url);
        post.title = input.title;
        post.content = input.content;

        let post = self.posts.save(&post).await?;

        // Only drop the old file once the post points at the new one
        if previous_image != post.image_url {
            self.images.replace(&previous_image, &post.image_url).await;
        }

        info!("[Feed] {} updated post {}", caller_id, post.id);
        self.broadcaster.publish(FeedEvent::Update(post.clone()));

        Ok(post)
    }

    pub async fn delete(&self, caller_id: &str, post_id: &str) -> Result<()> {
        let post = self.posts.get(post_id).await?;
        ensure_owner(&post, caller_id)?;

        // Outcome is logged by the store; a failed cleanup never blocks the delete
        let _cleanup: Cleanup = self.images.delete(&post.image_url).await;

        self.posts.delete(post_id).await?;
        self.posts.remove_owned(caller_id, post_id).await?;

        info!("[Feed] {} deleted post {}", caller_id, post_id);
        self.broadcaster.publish(FeedEvent::Delete(post_id.to_string()));

        Ok(())
    }

    async fn discard_upload(&self, image_ref: &str) {
        match self.images.delete(image_ref).await {
            Cleanup::Removed => {}
            other => warn!("[Feed] Could not discard upload {}: {:?}", image_ref, other),
        }
    }
}

fn ensure_owner(post: &Post, caller_id: &str) -> Result<()> {
    if post.creator.id != caller_id {
        warn!(
            "[Feed] {} tried to modify post {} owned by {}",
            caller_id, post.id, post.creator.id
        );
        return Err(Error::Forbidden("Not authorized.".into()));
    }
    Ok(())
}
