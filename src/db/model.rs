//! Row decoding and view models used by repositories.
//!
//! Keep these focused on the data returned by queries. Business logic lives
//! in the reconciler and orchestrators.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use crate::model::{Post, PostStatus, SyncStatus};

/// One page of a paginated listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

impl<T> Page<T> {
    pub fn has_more(&self) -> bool {
        (self.page as i64).saturating_mul(self.per_page as i64) < self.total
    }
}

/// Filter for post listings.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostListFilter {
    pub status: Option<PostStatus>,
}

/// SQL offset for a 1-based page number. Saturates instead of wrapping.
pub(crate) fn offset(page: u32, per_page: u32) -> i64 {
    (page.max(1) as i64 - 1).saturating_mul(per_page as i64)
}

pub(crate) const POST_COLUMNS: &str = "id, title, content, url_key, meta_title, meta_description, \
     featured_image, status, author, store_id, external_id, sync_status, last_sync_at, \
     created_at, updated_at";

pub(crate) fn post_from_row(row: &SqliteRow) -> Result<Post> {
    let id: i64 = row.get("id");
    let status_raw: i64 = row.get("status");
    let status = PostStatus::from_i64(status_raw)
        .ok_or_else(|| anyhow!("post {} has unknown status {}", id, status_raw))?;
    let sync_raw: String = row.get("sync_status");
    let sync_status = SyncStatus::parse_status(&sync_raw)
        .ok_or_else(|| anyhow!("post {} has unknown sync status {}", id, sync_raw))?;

    Ok(Post {
        id,
        title: row.get("title"),
        content: row.get("content"),
        url_key: row.get("url_key"),
        meta_title: row.try_get::<Option<String>, _>("meta_title").ok().flatten(),
        meta_description: row
            .try_get::<Option<String>, _>("meta_description")
            .ok()
            .flatten(),
        featured_image: row
            .try_get::<Option<String>, _>("featured_image")
            .ok()
            .flatten(),
        status,
        author: row.try_get::<Option<String>, _>("author").ok().flatten(),
        store_id: row.get("store_id"),
        external_id: row
            .try_get::<Option<String>, _>("external_id")
            .ok()
            .flatten(),
        sync_status,
        last_sync_at: row
            .try_get::<Option<DateTime<Utc>>, _>("last_sync_at")
            .ok()
            .flatten(),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
