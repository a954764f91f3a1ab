//! Local post operations used by admin tooling and the scheduled job.

use chrono::Utc;
use tracing::{info, instrument};

use crate::db::{self, Pool};
use crate::error::{SyncError, SyncResult};
use crate::model::{NewPost, Post, PostStatus, SyncStatus};
use crate::text::slugify;

/// Full description of a post as saved by an admin. Every field is written;
/// absent optional values clear the stored ones.
#[derive(Debug, Clone, PartialEq)]
pub struct PostInput {
    pub title: String,
    pub content: String,
    pub url_key: String,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub featured_image: Option<String>,
    pub status: PostStatus,
    pub author: Option<String>,
    pub store_id: i64,
    pub external_id: Option<String>,
    pub product_ids: Option<Vec<i64>>,
}

/// Save a post, reusing the one that carries the same external id.
#[instrument(skip_all, fields(external_id = ?input.external_id))]
pub async fn create_or_update(pool: &Pool, input: &PostInput) -> SyncResult<Post> {
    let existing = match input.external_id.as_deref().filter(|id| !id.is_empty()) {
        Some(external_id) => db::find_post_by_external_id(pool, external_id).await?,
        None => None,
    };

    let url_key = slugify(&input.url_key);
    let mut post = NewPost::new(&input.title, &input.content, &url_key)?;
    post.meta_title = input.meta_title.clone();
    post.meta_description = input.meta_description.clone();
    post.featured_image = input.featured_image.clone();
    post.status = input.status;
    post.author = input.author.clone();
    post.store_id = input.store_id;
    post.external_id = input.external_id.clone().filter(|id| !id.is_empty());
    post.sync_status = SyncStatus::Synced;

    let exclude = existing.as_ref().map(|p| p.id);
    if db::url_key_taken(pool, &url_key, input.store_id, exclude).await? {
        return Err(SyncError::Conflict(format!(
            "URL key '{}' is already used by another post",
            url_key
        )));
    }

    let now = Some(Utc::now());
    let saved = match existing {
        Some(found) => db::replace_post(pool, found.id, &post, now)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("Post not found: {}", found.id)))?,
        None => db::insert_post(pool, &post, now).await?,
    };
    info!(post_id = saved.id, "post saved");

    if let Some(ids) = input.product_ids.as_deref().filter(|ids| !ids.is_empty()) {
        link_products(pool, saved.id, ids).await?;
    }
    Ok(saved)
}

/// Replace the post's product links with `product_ids`, in order.
pub async fn link_products(pool: &Pool, post_id: i64, product_ids: &[i64]) -> SyncResult<()> {
    db::replace_product_links(pool, post_id, product_ids).await?;
    info!(post_id, product_count = product_ids.len(), "linked products to post");
    Ok(())
}

pub async fn get_linked_products(pool: &Pool, post_id: i64) -> SyncResult<Vec<i64>> {
    Ok(db::linked_product_ids(pool, post_id).await?)
}

/// Posts linked to a product; links to deleted posts are skipped.
pub async fn get_posts_by_product(pool: &Pool, product_id: i64) -> SyncResult<Vec<Post>> {
    let mut posts = Vec::new();
    for post_id in db::post_ids_for_product(pool, product_id).await? {
        if let Some(post) = db::find_post_by_id(pool, post_id).await? {
            posts.push(post);
        }
    }
    Ok(posts)
}

/// Set the sync status; the sync timestamp only moves for `synced`.
#[instrument(skip_all, fields(post_id = post_id, status = status))]
pub async fn update_sync_status(pool: &Pool, post_id: i64, status: &str) -> SyncResult<Post> {
    let status = SyncStatus::validate(status)?;
    let synced_at = (status == SyncStatus::Synced).then(Utc::now);
    db::set_sync_status(pool, post_id, status, synced_at)
        .await?
        .ok_or_else(|| SyncError::NotFound(format!("Post not found: {}", post_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::SqlitePool;

    async fn setup_pool() -> Pool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn input(title: &str, external_id: Option<&str>) -> PostInput {
        PostInput {
            title: title.into(),
            content: "<p>body</p>".into(),
            url_key: title.to_lowercase().replace(' ', "-"),
            meta_title: Some("meta".into()),
            meta_description: None,
            featured_image: None,
            status: PostStatus::Published,
            author: Some("Editor".into()),
            store_id: 1,
            external_id: external_id.map(str::to_string),
            product_ids: None,
        }
    }

    #[tokio::test]
    async fn create_or_update_overwrites_by_external_id() {
        let pool = setup_pool().await;
        let first = create_or_update(&pool, &input("First Post", Some("rd-1")))
            .await
            .unwrap();
        assert_eq!(first.sync_status, SyncStatus::Synced);

        let mut change = input("Renamed Post", Some("rd-1"));
        change.meta_title = None;
        change.product_ids = Some(vec![30, 10, 20]);
        let second = create_or_update(&pool, &change).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.title, "Renamed Post");
        assert_eq!(second.url_key, "renamed-post");
        assert!(second.meta_title.is_none());
        assert_eq!(db::count_posts(&pool).await.unwrap(), 1);
        assert_eq!(
            get_linked_products(&pool, second.id).await.unwrap(),
            vec![30, 10, 20]
        );
    }

    #[tokio::test]
    async fn create_without_external_id_checks_url_key() {
        let pool = setup_pool().await;
        create_or_update(&pool, &input("One", None)).await.unwrap();
        let err = create_or_update(&pool, &input("One", None)).await.unwrap_err();
        assert!(matches!(err, SyncError::Conflict(_)));
        create_or_update(&pool, &input("Two", None)).await.unwrap();
        assert_eq!(db::count_posts(&pool).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn link_products_replaces_previous_links() {
        let pool = setup_pool().await;
        let post = create_or_update(&pool, &input("Linked", None)).await.unwrap();
        link_products(&pool, post.id, &[1, 2, 3]).await.unwrap();
        link_products(&pool, post.id, &[3, 1]).await.unwrap();
        assert_eq!(get_linked_products(&pool, post.id).await.unwrap(), vec![3, 1]);

        link_products(&pool, post.id, &[]).await.unwrap();
        assert!(get_linked_products(&pool, post.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn posts_by_product_skip_deleted_posts() {
        let pool = setup_pool().await;
        let a = create_or_update(&pool, &input("Alpha", None)).await.unwrap();
        let b = create_or_update(&pool, &input("Beta", None)).await.unwrap();
        link_products(&pool, a.id, &[7]).await.unwrap();
        link_products(&pool, b.id, &[7]).await.unwrap();
        db::delete_post(&pool, a.id).await.unwrap();

        let posts = get_posts_by_product(&pool, 7).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, b.id);
    }

    #[tokio::test]
    async fn update_sync_status_rules() {
        let pool = setup_pool().await;
        let post = create_or_update(&pool, &input("Status", None)).await.unwrap();
        let before = post.last_sync_at;

        let failed = update_sync_status(&pool, post.id, "failed").await.unwrap();
        assert_eq!(failed.sync_status, SyncStatus::Failed);
        assert_eq!(failed.last_sync_at, before);

        let err = update_sync_status(&pool, post.id, "done").await.unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));

        let err = update_sync_status(&pool, 9999, "synced").await.unwrap_err();
        assert!(matches!(err, SyncError::NotFound(_)));

        let synced = update_sync_status(&pool, post.id, "synced").await.unwrap();
        assert_eq!(synced.sync_status, SyncStatus::Synced);
        assert!(synced.last_sync_at.is_some());
    }
}
