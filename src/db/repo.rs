use super::model::{offset, post_from_row, Page, PostListFilter, POST_COLUMNS};
use crate::model::{NewPost, Post, PostPatch, SyncStatus};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized)
        .await
        .with_context(|| format!("failed to open database {}", normalized))?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = format!("sqlite://{}", expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[instrument(skip_all, fields(url_key = post.url_key()))]
pub async fn insert_post(
    pool: &Pool,
    post: &NewPost,
    synced_at: Option<DateTime<Utc>>,
) -> Result<Post> {
    let row = sqlx::query(&format!(
        "INSERT INTO posts (title, content, url_key, meta_title, meta_description, featured_image, \
         status, author, store_id, external_id, sync_status, last_sync_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING {}",
        POST_COLUMNS
    ))
    .bind(post.title())
    .bind(post.content())
    .bind(post.url_key())
    .bind(post.meta_title.as_deref())
    .bind(post.meta_description.as_deref())
    .bind(post.featured_image.as_deref())
    .bind(post.status.as_i64())
    .bind(post.author.as_deref())
    .bind(post.store_id)
    .bind(post.external_id.as_deref())
    .bind(post.sync_status.as_str())
    .bind(synced_at)
    .fetch_one(pool)
    .await
    .context("failed to insert post")?;
    post_from_row(&row)
}

/// Overwrite every client-writable column of an existing post.
#[instrument(skip_all, fields(post_id = id))]
pub async fn replace_post(
    pool: &Pool,
    id: i64,
    post: &NewPost,
    synced_at: Option<DateTime<Utc>>,
) -> Result<Option<Post>> {
    let row = sqlx::query(&format!(
        "UPDATE posts SET title = ?, content = ?, url_key = ?, meta_title = ?, meta_description = ?, \
         featured_image = ?, status = ?, author = ?, store_id = ?, external_id = ?, sync_status = ?, \
         last_sync_at = COALESCE(?, last_sync_at), updated_at = CURRENT_TIMESTAMP \
         WHERE id = ? RETURNING {}",
        POST_COLUMNS
    ))
    .bind(post.title())
    .bind(post.content())
    .bind(post.url_key())
    .bind(post.meta_title.as_deref())
    .bind(post.meta_description.as_deref())
    .bind(post.featured_image.as_deref())
    .bind(post.status.as_i64())
    .bind(post.author.as_deref())
    .bind(post.store_id)
    .bind(post.external_id.as_deref())
    .bind(post.sync_status.as_str())
    .bind(synced_at)
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to replace post")?;
    row.as_ref().map(post_from_row).transpose()
}

/// Apply a partial update; absent fields keep their stored values.
#[instrument(skip_all, fields(post_id = id))]
pub async fn apply_patch(pool: &Pool, id: i64, patch: &PostPatch) -> Result<Option<Post>> {
    let row = sqlx::query(&format!(
        "UPDATE posts SET title = COALESCE(?, title), content = COALESCE(?, content), \
         url_key = COALESCE(?, url_key), meta_title = COALESCE(?, meta_title), \
         meta_description = COALESCE(?, meta_description), \
         featured_image = COALESCE(?, featured_image), status = COALESCE(?, status), \
         author = COALESCE(?, author), updated_at = CURRENT_TIMESTAMP \
         WHERE id = ? RETURNING {}",
        POST_COLUMNS
    ))
    .bind(patch.title.as_deref())
    .bind(patch.content.as_deref())
    .bind(patch.url_key.as_deref())
    .bind(patch.meta_title.as_deref())
    .bind(patch.meta_description.as_deref())
    .bind(patch.featured_image.as_deref())
    .bind(patch.status.map(|s| s.as_i64()))
    .bind(patch.author.as_deref())
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to update post")?;
    row.as_ref().map(post_from_row).transpose()
}

/// Record a sync outcome. `synced_at` is only written when given.
#[instrument(skip_all, fields(post_id = id, status = status.as_str()))]
pub async fn set_sync_status(
    pool: &Pool,
    id: i64,
    status: SyncStatus,
    synced_at: Option<DateTime<Utc>>,
) -> Result<Option<Post>> {
    let row = sqlx::query(&format!(
        "UPDATE posts SET sync_status = ?, last_sync_at = COALESCE(?, last_sync_at), \
         updated_at = CURRENT_TIMESTAMP WHERE id = ? RETURNING {}",
        POST_COLUMNS
    ))
    .bind(status.as_str())
    .bind(synced_at)
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("failed to persist sync status")?;
    row.as_ref().map(post_from_row).transpose()
}

#[instrument(skip_all)]
pub async fn find_post_by_id(pool: &Pool, id: i64) -> Result<Option<Post>> {
    let row = sqlx::query(&format!("SELECT {} FROM posts WHERE id = ?", POST_COLUMNS))
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(post_from_row).transpose()
}

#[instrument(skip_all)]
pub async fn find_post_by_external_id(pool: &Pool, external_id: &str) -> Result<Option<Post>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM posts WHERE external_id = ?",
        POST_COLUMNS
    ))
    .bind(external_id)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(post_from_row).transpose()
}

/// Look up a post by URL key. A non-zero store also matches global posts,
/// with the store-specific one preferred.
#[instrument(skip_all)]
pub async fn find_post_by_url_key(
    pool: &Pool,
    url_key: &str,
    store_id: i64,
) -> Result<Option<Post>> {
    let row = if store_id > 0 {
        sqlx::query(&format!(
            "SELECT {} FROM posts WHERE url_key = ? AND store_id IN (0, ?) \
             ORDER BY store_id DESC LIMIT 1",
            POST_COLUMNS
        ))
        .bind(url_key)
        .bind(store_id)
        .fetch_optional(pool)
        .await?
    } else {
        sqlx::query(&format!(
            "SELECT {} FROM posts WHERE url_key = ? ORDER BY id LIMIT 1",
            POST_COLUMNS
        ))
        .bind(url_key)
        .fetch_optional(pool)
        .await?
    };
    row.as_ref().map(post_from_row).transpose()
}

/// Whether another post already owns `url_key` in the same store scope.
/// Global posts (store 0) collide with every store.
pub async fn url_key_taken(
    pool: &Pool,
    url_key: &str,
    store_id: i64,
    exclude_id: Option<i64>,
) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM posts WHERE url_key = ? \
         AND (? = 0 OR store_id IN (0, ?)) AND id != COALESCE(?, -1)",
    )
    .bind(url_key)
    .bind(store_id)
    .bind(store_id)
    .bind(exclude_id)
    .fetch_one(pool)
    .await?;
    Ok(count > 0)
}

#[instrument(skip_all, fields(post_id = id))]
pub async fn delete_post(pool: &Pool, id: i64) -> Result<bool> {
    let res = sqlx::query("DELETE FROM posts WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("failed to delete post")?;
    Ok(res.rows_affected() > 0)
}

#[instrument(skip_all)]
pub async fn list_posts(
    pool: &Pool,
    filter: PostListFilter,
    page: u32,
    per_page: u32,
) -> Result<Page<Post>> {
    let status = filter.status.map(|s| s.as_i64());
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE (? IS NULL OR status = ?)")
        .bind(status)
        .bind(status)
        .fetch_one(pool)
        .await?;
    let rows = sqlx::query(&format!(
        "SELECT {} FROM posts WHERE (? IS NULL OR status = ?) ORDER BY id DESC LIMIT ? OFFSET ?",
        POST_COLUMNS
    ))
    .bind(status)
    .bind(status)
    .bind(per_page as i64)
    .bind(offset(page, per_page))
    .fetch_all(pool)
    .await?;
    let items = rows.iter().map(post_from_row).collect::<Result<Vec<_>>>()?;
    Ok(Page {
        items,
        total,
        page: page.max(1),
        per_page,
    })
}

/// Replace all product links of a post: delete everything, then insert the
/// given products with positions 0..n in order. Duplicate IDs keep their
/// first position.
#[instrument(skip_all, fields(post_id = post_id))]
pub async fn replace_product_links(pool: &Pool, post_id: i64, product_ids: &[i64]) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM post_products WHERE post_id = ?")
        .bind(post_id)
        .execute(&mut *tx)
        .await?;
    for (position, product_id) in product_ids.iter().enumerate() {
        sqlx::query(
            "INSERT OR IGNORE INTO post_products (post_id, product_id, position) VALUES (?, ?, ?)",
        )
        .bind(post_id)
        .bind(*product_id)
        .bind(position as i64)
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;
    Ok(())
}

pub async fn linked_product_ids(pool: &Pool, post_id: i64) -> Result<Vec<i64>> {
    let ids = sqlx::query_scalar(
        "SELECT product_id FROM post_products WHERE post_id = ? ORDER BY position ASC",
    )
    .bind(post_id)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

pub async fn post_ids_for_product(pool: &Pool, product_id: i64) -> Result<Vec<i64>> {
    let ids = sqlx::query_scalar(
        "SELECT post_id FROM post_products WHERE product_id = ? ORDER BY position ASC",
    )
    .bind(product_id)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

pub async fn count_posts(pool: &Pool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PostStatus;

    async fn setup_pool() -> Pool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn new_post(title: &str, url_key: &str, store_id: i64) -> NewPost {
        let mut post = NewPost::new(title, "body", url_key).unwrap();
        post.store_id = store_id;
        post
    }

    #[test]
    fn sqlite_url_normalization() {
        assert_eq!(prepare_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(prepare_sqlite_url("postgres://x"), "postgres://x");
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("nested/db.sqlite");
        let url = format!("sqlite:{}?mode=rwc", path.display());
        let out = prepare_sqlite_url(&url);
        assert_eq!(out, format!("sqlite://{}?mode=rwc", path.display()));
        assert!(path.parent().unwrap().exists());
    }

    #[tokio::test]
    async fn insert_find_patch_delete() {
        let pool = setup_pool().await;
        let mut post = new_post("Hello", "hello", 1);
        post.external_id = Some("rd-1".into());
        post.meta_title = Some("Hello meta".into());
        let saved = insert_post(&pool, &post, None).await.unwrap();
        assert_eq!(saved.sync_status, SyncStatus::Pending);
        assert!(saved.last_sync_at.is_none());

        let by_ext = find_post_by_external_id(&pool, "rd-1").await.unwrap().unwrap();
        assert_eq!(by_ext.id, saved.id);

        let patch = PostPatch {
            title: Some("Hello again".into()),
            status: Some(PostStatus::Published),
            ..Default::default()
        };
        let patched = apply_patch(&pool, saved.id, &patch).await.unwrap().unwrap();
        assert_eq!(patched.title, "Hello again");
        assert_eq!(patched.status, PostStatus::Published);
        assert_eq!(patched.meta_title.as_deref(), Some("Hello meta"));
        assert_eq!(patched.content, "body");

        let now = Utc::now();
        let synced = set_sync_status(&pool, saved.id, SyncStatus::Synced, Some(now))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(synced.sync_status, SyncStatus::Synced);
        assert!(synced.last_sync_at.is_some());

        assert!(delete_post(&pool, saved.id).await.unwrap());
        assert!(find_post_by_id(&pool, saved.id).await.unwrap().is_none());
        assert!(!delete_post(&pool, saved.id).await.unwrap());
    }

    #[tokio::test]
    async fn external_id_is_unique() {
        let pool = setup_pool().await;
        let mut a = new_post("A", "a", 1);
        a.external_id = Some("dup".into());
        let mut b = new_post("B", "b", 1);
        b.external_id = Some("dup".into());
        insert_post(&pool, &a, None).await.unwrap();
        assert!(insert_post(&pool, &b, None).await.is_err());
        // NULL external ids never collide
        insert_post(&pool, &new_post("C", "c", 1), None).await.unwrap();
        insert_post(&pool, &new_post("D", "d", 1), None).await.unwrap();
    }

    #[tokio::test]
    async fn url_key_scope_includes_global_posts() {
        let pool = setup_pool().await;
        let global = insert_post(&pool, &new_post("G", "shared", 0), None).await.unwrap();
        assert!(url_key_taken(&pool, "shared", 1, None).await.unwrap());
        assert!(url_key_taken(&pool, "shared", 0, None).await.unwrap());
        assert!(!url_key_taken(&pool, "shared", 0, Some(global.id)).await.unwrap());
        assert!(!url_key_taken(&pool, "other", 1, None).await.unwrap());

        let local = insert_post(&pool, &new_post("L", "local", 2), None).await.unwrap();
        assert!(!url_key_taken(&pool, "local", 3, None).await.unwrap());
        assert!(url_key_taken(&pool, "local", 0, None).await.unwrap());

        let found = find_post_by_url_key(&pool, "local", 2).await.unwrap().unwrap();
        assert_eq!(found.id, local.id);
        let found = find_post_by_url_key(&pool, "shared", 5).await.unwrap().unwrap();
        assert_eq!(found.id, global.id);
        assert!(find_post_by_url_key(&pool, "local", 3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_filters_and_paginates() {
        let pool = setup_pool().await;
        for i in 0..5 {
            let mut p = new_post(&format!("P{i}"), &format!("p{i}"), 1);
            p.status = PostStatus::from_published(i % 2 == 0);
            insert_post(&pool, &p, None).await.unwrap();
        }
        let published = list_posts(
            &pool,
            PostListFilter {
                status: Some(PostStatus::Published),
            },
            1,
            2,
        )
        .await
        .unwrap();
        assert_eq!(published.total, 3);
        assert_eq!(published.items.len(), 2);
        assert!(published.has_more());

        let all = list_posts(&pool, PostListFilter::default(), 3, 2).await.unwrap();
        assert_eq!(all.total, 5);
        assert_eq!(all.items.len(), 1);
        assert!(!all.has_more());
    }

    #[tokio::test]
    async fn product_links_are_replaced_not_merged() {
        let pool = setup_pool().await;
        replace_product_links(&pool, 1, &[30, 10, 20]).await.unwrap();
        assert_eq!(linked_product_ids(&pool, 1).await.unwrap(), vec![30, 10, 20]);

        replace_product_links(&pool, 1, &[20, 40]).await.unwrap();
        assert_eq!(linked_product_ids(&pool, 1).await.unwrap(), vec![20, 40]);
        assert!(post_ids_for_product(&pool, 30).await.unwrap().is_empty());

        replace_product_links(&pool, 2, &[40]).await.unwrap();
        assert_eq!(post_ids_for_product(&pool, 40).await.unwrap().len(), 2);

        replace_product_links(&pool, 1, &[]).await.unwrap();
        assert!(linked_product_ids(&pool, 1).await.unwrap().is_empty());
    }
}
