use super::*;
use crate::images::DiskImageStore;
use crate::store::SqlitePostRepository;
use async_trait::async_trait;
use std::sync::Mutex;
use tempfile::TempDir;

/// Disk store that records every delete and can be told to fail them
struct RecordingImages {
    inner: DiskImageStore,
    deleted: Mutex<Vec<String>>,
    fail_deletes: bool,
}

impl RecordingImages {
    fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageStore for RecordingImages {
    async fn store(&self, upload: ImageUpload) -> Result<Option<String>> {
        self.inner.store(upload).await
    }

    async fn delete(&self, image_ref: &str) -> Cleanup {
        self.deleted.lock().unwrap().push(image_ref.to_string());
        if self.fail_deletes {
            return Cleanup::Failed("disk on fire".into());
        }
        self.inner.delete(image_ref).await
    }
}

struct Harness {
    dir: TempDir,
    service: FeedService,
    posts: Arc<SqlitePostRepository>,
    images: Arc<RecordingImages>,
    broadcaster: ChangeBroadcaster,
}

async fn harness_with(fail_deletes: bool) -> Harness {
    let dir = TempDir::new().unwrap();
    let pool = crate::store::connect(&dir.path().join("feed.sqlite"))
        .await
        .unwrap();
    let posts = Arc::new(SqlitePostRepository::new(pool));
    let images = Arc::new(RecordingImages {
        inner: DiskImageStore::new(dir.path()),
        deleted: Mutex::new(Vec::new()),
        fail_deletes,
    });
    let broadcaster = ChangeBroadcaster::new(16);
    let service = FeedService::new(posts.clone(), images.clone(), broadcaster.clone(), 2);

    Harness {
        dir,
        service,
        posts,
        images,
        broadcaster,
    }
}

async fn harness() -> Harness {
    harness_with(false).await
}

fn jpeg() -> Option<ImageUpload> {
    Some(ImageUpload::new(
        "photo.jpg",
        "image/jpeg",
        vec![0xFF, 0xD8, 0xFF],
    ))
}

fn input(title: &str, content: &str) -> PostInput {
    PostInput::new(title, content)
}

#[tokio::test]
async fn test_create_assigns_owner_and_image() {
    let h = harness().await;

    let post = h.service.create("u1", input("T", "C"), jpeg()).await.unwrap();

    assert_eq!(post.creator.id, "u1");
    assert_eq!(post.title, "T");
    assert!(h.dir.path().join(&post.image_url).exists());
    assert_eq!(h.posts.owned_posts("u1").await.unwrap(), vec![post.id]);
}

#[tokio::test]
async fn test_create_without_upload_is_missing_image() {
    let h = harness().await;

    let result = h.service.create("u1", input("T", "C"), None).await;

    assert!(matches!(result, Err(Error::MissingImage(_))));
    assert_eq!(h.service.list(1).await.unwrap().total_items, 0);
}

#[tokio::test]
async fn test_create_with_rejected_type_is_missing_image() {
    let h = harness().await;
    let gif = ImageUpload::new("a.gif", "image/gif", vec![1]);

    let result = h.service.create("u1", input("T", "C"), Some(gif)).await;

    assert!(matches!(result, Err(Error::MissingImage(_))));
}

#[tokio::test]
async fn test_create_validates_before_storing() {
    let h = harness().await;

    let result = h.service.create("u1", input("", "C"), jpeg()).await;

    assert!(matches!(result, Err(Error::Validation { .. })));
    assert!(!h.dir.path().join("images").exists());
}

#[tokio::test]
async fn test_create_broadcasts() {
    let h = harness().await;
    let mut live = h.broadcaster.subscribe();

    let post = h.service.create("u1", input("T", "C"), jpeg()).await.unwrap();

    assert_eq!(live.recv().await, Some(FeedEvent::Create(post)));
}

#[tokio::test]
async fn test_update_by_other_user_is_forbidden() {
    let h = harness().await;
    let post = h.service.create("u1", input("T", "C"), jpeg()).await.unwrap();

    let result = h
        .service
        .update(
            "u2",
            &post.id,
            input("Hijacked", "C"),
            None,
            Some(post.image_url.clone()),
        )
        .await;

    assert!(matches!(result, Err(Error::Forbidden(_))));
    assert_eq!(h.service.get(&post.id).await.unwrap(), post);
    assert!(h.images.deleted().is_empty());
}

#[tokio::test]
async fn test_forbidden_update_discards_new_upload() {
    let h = harness().await;
    let post = h.service.create("u1", input("T", "C"), jpeg()).await.unwrap();

    let result = h
        .service
        .update("u2", &post.id, input("T", "C"), jpeg(), None)
        .await;

    assert!(matches!(result, Err(Error::Forbidden(_))));
    let deleted = h.images.deleted();
    assert_eq!(deleted.len(), 1);
    assert_ne!(deleted[0], post.image_url);
    assert!(h.dir.path().join(&post.image_url).exists());
}

#[tokio::test]
async fn test_update_missing_post_is_not_found() {
    let h = harness().await;

    for caller in ["u1", "u2"] {
        let result = h
            .service
            .update(
                caller,
                "does-not-exist",
                input("T", "C"),
                None,
                Some("images/a.jpg".into()),
            )
            .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }
}

#[tokio::test]
async fn test_update_without_any_image_is_missing_image() {
    let h = harness().await;
    let post = h.service.create("u1", input("T", "C"), jpeg()).await.unwrap();

    let result = h
        .service
        .update("u1", &post.id, input("T2", "C2"), None, None)
        .await;

    assert!(matches!(result, Err(Error::MissingImage(_))));
}

#[tokio::test]
async fn test_update_rejects_foreign_declared_ref() {
    let h = harness().await;
    let post = h.service.create("u1", input("T", "C"), jpeg()).await.unwrap();

    let result = h
        .service
        .update(
            "u1",
            &post.id,
            input("T", "C"),
            None,
            Some("../feed.sqlite".into()),
        )
        .await;

    assert!(matches!(result, Err(Error::Validation { .. })));
}

#[tokio::test]
async fn test_update_with_new_ref_deletes_old_once() {
    let h = harness().await;
    let post = h.service.create("u1", input("T", "C"), jpeg()).await.unwrap();
    let old_ref = post.image_url.clone();

    let updated = h
        .service
        .update("u1", &post.id, input("T2", "C2"), jpeg(), None)
        .await
        .unwrap();

    assert_ne!(updated.image_url, old_ref);
    assert_eq!(updated.title, "T2");
    assert_eq!(h.images.deleted(), vec![old_ref.clone()]);
    assert!(!h.dir.path().join(&old_ref).exists());
    assert!(h.dir.path().join(&updated.image_url).exists());
}

#[tokio::test]
async fn test_update_rejects_dangling_declared_ref() {
    let h = harness().await;
    let post = h.service.create("u1", input("T", "C"), jpeg()).await.unwrap();

    let result = h
        .service
        .update(
            "u1",
            &post.id,
            input("T2", "C2"),
            None,
            Some("images/does-not-exist.jpg".into()),
        )
        .await;

    assert!(matches!(result, Err(Error::Validation { .. })));
    assert_eq!(h.service.get(&post.id).await.unwrap(), post);
    assert!(h.images.deleted().is_empty());
    assert!(h.dir.path().join(&post.image_url).exists());
}

#[tokio::test]
async fn test_update_cannot_adopt_another_users_image() {
    let h = harness().await;
    let theirs = h.service.create("u1", input("T", "C"), jpeg()).await.unwrap();
    let mine = h.service.create("u2", input("T", "C"), jpeg()).await.unwrap();

    let result = h
        .service
        .update(
            "u2",
            &mine.id,
            input("T", "C"),
            None,
            Some(theirs.image_url.clone()),
        )
        .await;
    assert!(matches!(result, Err(Error::Validation { .. })));

    h.service.delete("u2", &mine.id).await.unwrap();

    assert_eq!(h.images.deleted(), vec![mine.image_url]);
    assert!(h.dir.path().join(&theirs.image_url).exists());
    assert_eq!(h.service.get(&theirs.id).await.unwrap(), theirs);
}

#[tokio::test]
async fn test_declared_ref_checked_after_ownership() {
    let h = harness().await;
    let post = h.service.create("u1", input("T", "C"), jpeg()).await.unwrap();

    let result = h
        .service
        .update(
            "u2",
            &post.id,
            input("T", "C"),
            None,
            Some("images/other.jpg".into()),
        )
        .await;

    assert!(matches!(result, Err(Error::Forbidden(_))));
}

#[tokio::test]
async fn test_update_broadcasts() {
    let h = harness().await;
    let post = h.service.create("u1", input("T", "C"), jpeg()).await.unwrap();
    let mut live = h.broadcaster.subscribe();

    let updated = h
        .service
        .update(
            "u1",
            &post.id,
            input("T2", "C2"),
            None,
            Some(post.image_url.clone()),
        )
        .await
        .unwrap();

    assert_eq!(live.recv().await, Some(FeedEvent::Update(updated)));
}

#[tokio::test]
async fn test_update_keeping_same_ref_deletes_nothing() {
    let h = harness().await;
    let post = h.service.create("u1", input("T", "C"), jpeg()).await.unwrap();

    let updated = h
        .service
        .update(
            "u1",
            &post.id,
            input("New title", "New content"),
            None,
            Some(post.image_url.clone()),
        )
        .await
        .unwrap();

    assert_eq!(updated.title, "New title");
    assert_eq!(updated.image_url, post.image_url);
    assert!(h.images.deleted().is_empty());
}

#[tokio::test]
async fn test_update_survives_failed_cleanup() {
    let h = harness_with(true).await;
    let post = h.service.create("u1", input("T", "C"), jpeg()).await.unwrap();

    let updated = h
        .service
        .update("u1", &post.id, input("T", "C"), jpeg(), None)
        .await
        .unwrap();

    assert_ne!(updated.image_url, post.image_url);
    assert_eq!(h.images.deleted(), vec![post.image_url]);
}

#[tokio::test]
async fn test_delete_removes_post_association_and_image() {
    let h = harness().await;
    let post = h.service.create("u1", input("T", "C"), jpeg()).await.unwrap();
    let mut live = h.broadcaster.subscribe();

    h.service.delete("u1", &post.id).await.unwrap();

    assert!(matches!(h.service.get(&post.id).await, Err(Error::NotFound(_))));
    assert!(h.posts.owned_posts("u1").await.unwrap().is_empty());
    assert_eq!(h.images.deleted(), vec![post.image_url.clone()]);
    assert!(!h.dir.path().join(&post.image_url).exists());
    assert_eq!(live.recv().await, Some(FeedEvent::Delete(post.id)));
}

#[tokio::test]
async fn test_delete_succeeds_when_image_cleanup_fails() {
    let h = harness_with(true).await;
    let post = h.service.create("u1", input("T", "C"), jpeg()).await.unwrap();

    h.service.delete("u1", &post.id).await.unwrap();

    assert_eq!(h.images.deleted(), vec![post.image_url]);
    assert!(matches!(h.service.get(&post.id).await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_delete_by_other_user_is_forbidden() {
    let h = harness().await;
    let post = h.service.create("u1", input("T", "C"), jpeg()).await.unwrap();

    let result = h.service.delete("u2", &post.id).await;

    assert!(matches!(result, Err(Error::Forbidden(_))));
    assert!(h.images.deleted().is_empty());
    assert_eq!(h.posts.owned_posts("u1").await.unwrap(), vec![post.id]);
}

#[tokio::test]
async fn test_delete_twice_is_not_found() {
    let h = harness().await;
    let post = h.service.create("u1", input("T", "C"), jpeg()).await.unwrap();

    h.service.delete("u1", &post.id).await.unwrap();
    let second = h.service.delete("u1", &post.id).await;

    assert!(matches!(second, Err(Error::NotFound(_))));
    assert_eq!(h.images.deleted().len(), 1);
}

#[tokio::test]
async fn test_list_pages_cover_all_posts() {
    let h = harness().await;
    let mut ids = Vec::new();
    for title in ["a", "b", "c"] {
        ids.push(
            h.service
                .create("u1", input(title, "body"), jpeg())
                .await
                .unwrap()
                .id,
        );
    }

    let first = h.service.list(1).await.unwrap();
    let second = h.service.list(2).await.unwrap();

    assert_eq!(first.total_items, 3);
    assert_eq!(second.total_items, 3);
    let seen: Vec<_> = first
        .posts
        .iter()
        .chain(second.posts.iter())
        .map(|p| p.id.clone())
        .collect();
    assert_eq!(seen, ids);
}
