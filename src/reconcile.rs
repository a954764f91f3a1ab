//! Find-or-create of local posts keyed by their RequestDesk id.

use chrono::Utc;
use tracing::{debug, info, instrument};

use crate::config::StoreContext;
use crate::db::{self, Pool};
use crate::error::{SyncError, SyncResult};
use crate::model::{NewPost, Post, PostPatch, PostStatus, SyncStatus, DEFAULT_AUTHOR};
use crate::text::excerpt;

pub use crate::text::slugify;

/// Incoming post fields. `None` means "not sent" and leaves stored values
/// alone on update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostFields {
    pub title: Option<String>,
    pub content: Option<String>,
    pub slug: Option<String>,
    pub summary: Option<String>,
    pub seo_title: Option<String>,
    pub seo_description: Option<String>,
    pub featured_image: Option<String>,
    pub author: Option<String>,
    pub status: Option<PostStatus>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpsertOutcome {
    pub post: Post,
    pub created: bool,
}

fn url_key_for(source: &str) -> SyncResult<String> {
    let key = slugify(source);
    if key.is_empty() {
        return Err(SyncError::Validation(format!(
            "cannot derive a url key from '{}'",
            source
        )));
    }
    Ok(key)
}

async fn ensure_url_key_free(
    pool: &Pool,
    url_key: &str,
    store_id: i64,
    exclude_id: Option<i64>,
) -> SyncResult<()> {
    if db::url_key_taken(pool, url_key, store_id, exclude_id).await? {
        return Err(SyncError::Conflict(format!(
            "URL key '{}' is already used by another post",
            url_key
        )));
    }
    Ok(())
}

/// Create the post for `external_id`, or patch the existing one with the
/// fields that were sent. Either way the post ends up `synced` with a fresh
/// sync timestamp.
#[instrument(skip_all, fields(external_id = external_id))]
pub async fn upsert(
    pool: &Pool,
    store: &StoreContext,
    external_id: &str,
    fields: &PostFields,
) -> SyncResult<UpsertOutcome> {
    if external_id.trim().is_empty() {
        return Err(SyncError::Validation("external id is required".into()));
    }

    match db::find_post_by_external_id(pool, external_id).await? {
        Some(existing) => {
            let post = apply_fields(pool, &existing, fields).await?;
            info!(post_id = post.id, "updated post from remote");
            Ok(UpsertOutcome {
                post,
                created: false,
            })
        }
        None => {
            let post = create(pool, store, Some(external_id), fields).await?;
            info!(post_id = post.id, "created post from remote");
            Ok(UpsertOutcome {
                post,
                created: true,
            })
        }
    }
}

/// Patch `existing` with the fields that were sent and mark it synced.
pub async fn apply_fields(pool: &Pool, existing: &Post, fields: &PostFields) -> SyncResult<Post> {
    if let Some(title) = &fields.title {
        if title.trim().is_empty() {
            return Err(SyncError::Validation("title cannot be empty".into()));
        }
    }
    let url_key = match &fields.slug {
        Some(slug) => {
            let key = url_key_for(slug)?;
            ensure_url_key_free(pool, &key, existing.store_id, Some(existing.id)).await?;
            Some(key)
        }
        None => None,
    };

    let patch = PostPatch {
        title: fields.title.clone(),
        content: fields.content.clone(),
        url_key,
        meta_title: fields.seo_title.clone(),
        meta_description: fields.seo_description.clone(),
        featured_image: fields.featured_image.clone(),
        status: fields.status,
        author: fields.author.clone(),
    };
    if patch.is_empty() {
        debug!(post_id = existing.id, "no fields sent; refreshing sync status only");
    } else {
        db::apply_patch(pool, existing.id, &patch).await?;
    }

    db::set_sync_status(pool, existing.id, SyncStatus::Synced, Some(Utc::now()))
        .await?
        .ok_or_else(|| SyncError::NotFound(format!("Post not found: {}", existing.id)))
}

/// Insert a post with defaults for every optional field that was not sent.
/// Title and content are required.
pub async fn create(
    pool: &Pool,
    store: &StoreContext,
    external_id: Option<&str>,
    fields: &PostFields,
) -> SyncResult<Post> {
    let title = fields
        .title
        .as_deref()
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| SyncError::Validation("title is required".into()))?;
    let content = fields
        .content
        .as_deref()
        .ok_or_else(|| SyncError::Validation("content is required".into()))?;

    let url_key = url_key_for(fields.slug.as_deref().unwrap_or(title))?;
    ensure_url_key_free(pool, &url_key, store.id, None).await?;

    let mut post = NewPost::new(title, content, &url_key)?;
    post.meta_title = Some(fields.seo_title.clone().unwrap_or_else(|| title.to_string()));
    post.meta_description = Some(
        fields
            .seo_description
            .clone()
            .or_else(|| fields.summary.clone())
            .unwrap_or_else(|| excerpt(content)),
    );
    post.featured_image = fields.featured_image.clone();
    post.author = Some(
        fields
            .author
            .clone()
            .filter(|a| !a.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_AUTHOR.to_string()),
    );
    post.status = fields.status.unwrap_or(PostStatus::Draft);
    post.store_id = store.id;
    post.external_id = external_id.map(str::to_string);
    post.sync_status = SyncStatus::Synced;

    Ok(db::insert_post(pool, &post, Some(Utc::now())).await?)
}

/// Resolve a caller-supplied identifier: local numeric id first, then the
/// RequestDesk id.
pub async fn resolve_post(pool: &Pool, identifier: &str) -> SyncResult<Option<Post>> {
    if let Ok(id) = identifier.trim().parse::<i64>() {
        if let Some(post) = db::find_post_by_id(pool, id).await? {
            return Ok(Some(post));
        }
    }
    Ok(db::find_post_by_external_id(pool, identifier).await?)
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

    fn store() -> StoreContext {
        StoreContext {
            id: 1,
            code: "default".into(),
            name: "Main".into(),
            base_url: "https://shop.example.com/".into(),
            media_url: "https://shop.example.com/media/".into(),
        }
    }

    fn fields(title: &str, content: &str) -> PostFields {
        PostFields {
            title: Some(title.into()),
            content: Some(content.into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_applies_defaults() {
        let pool = setup_pool().await;
        let out = upsert(&pool, &store(), "rd-1", &fields("Hello World", "<p>Body text</p>"))
            .await
            .unwrap();
        assert!(out.created);
        let post = out.post;
        assert_eq!(post.url_key, "hello-world");
        assert_eq!(post.meta_title.as_deref(), Some("Hello World"));
        assert_eq!(post.meta_description.as_deref(), Some("Body text"));
        assert_eq!(post.author.as_deref(), Some(DEFAULT_AUTHOR));
        assert_eq!(post.status, PostStatus::Draft);
        assert_eq!(post.store_id, 1);
        assert_eq!(post.sync_status, SyncStatus::Synced);
        assert!(post.last_sync_at.is_some());
    }

    #[tokio::test]
    async fn summary_wins_over_excerpt() {
        let pool = setup_pool().await;
        let mut f = fields("Summarized", "long body");
        f.summary = Some("Short summary".into());
        let post = upsert(&pool, &store(), "rd-s", &f).await.unwrap().post;
        assert_eq!(post.meta_description.as_deref(), Some("Short summary"));
    }

    #[tokio::test]
    async fn upserting_twice_keeps_one_post() {
        let pool = setup_pool().await;
        let first = upsert(&pool, &store(), "rd-1", &fields("One", "a")).await.unwrap();
        let mut again = PostFields {
            content: Some("b".into()),
            ..Default::default()
        };
        again.status = Some(PostStatus::Published);
        let second = upsert(&pool, &store(), "rd-1", &again).await.unwrap();

        assert!(!second.created);
        assert_eq!(first.post.id, second.post.id);
        assert_eq!(second.post.title, "One");
        assert_eq!(second.post.content, "b");
        assert_eq!(second.post.status, PostStatus::Published);
        assert_eq!(db::count_posts(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn create_requires_title_and_content() {
        let pool = setup_pool().await;
        let missing_title = PostFields {
            content: Some("x".into()),
            ..Default::default()
        };
        let err = upsert(&pool, &store(), "rd-2", &missing_title)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));

        let missing_content = PostFields {
            title: Some("Title".into()),
            ..Default::default()
        };
        let err = upsert(&pool, &store(), "rd-3", &missing_content)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));
        assert_eq!(db::count_posts(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn url_key_collision_is_conflict() {
        let pool = setup_pool().await;
        upsert(&pool, &store(), "rd-1", &fields("Same Title", "a"))
            .await
            .unwrap();
        let err = upsert(&pool, &store(), "rd-2", &fields("Same Title", "b"))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Conflict(_)));

        // Renaming onto another post's key is refused as well.
        upsert(&pool, &store(), "rd-3", &fields("Other", "c"))
            .await
            .unwrap();
        let rename = PostFields {
            slug: Some("same-title".into()),
            ..Default::default()
        };
        let err = upsert(&pool, &store(), "rd-3", &rename).await.unwrap_err();
        assert!(matches!(err, SyncError::Conflict(_)));
    }

    #[tokio::test]
    async fn resolve_prefers_numeric_id_then_external_id() {
        let pool = setup_pool().await;
        let a = upsert(&pool, &store(), "abc-123", &fields("Alpha", "a"))
            .await
            .unwrap()
            .post;
        let b = upsert(&pool, &store(), &a.id.to_string(), &fields("Beta", "b"))
            .await
            .unwrap()
            .post;

        // "abc-123" is not numeric and falls through to the external id.
        let found = resolve_post(&pool, "abc-123").await.unwrap().unwrap();
        assert_eq!(found.id, a.id);

        // A numeric identifier that is also b's external id resolves to a's local id.
        let found = resolve_post(&pool, &a.id.to_string()).await.unwrap().unwrap();
        assert_eq!(found.id, a.id);

        // Unknown numeric id falls back to external id lookup.
        let c = upsert(&pool, &store(), "999", &fields("Gamma", "c"))
            .await
            .unwrap()
            .post;
        let found = resolve_post(&pool, "999").await.unwrap().unwrap();
        assert_eq!(found.id, c.id);
        assert_ne!(b.id, c.id);

        assert!(resolve_post(&pool, "missing").await.unwrap().is_none());
    }
}
