//! Inbound blog API: RequestDesk pushes posts here instead of waiting for
//! the scheduled import.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use crate::config::StoreContext;
use crate::db::{self, Pool, PostListFilter};
use crate::error::{SyncError, SyncResult};
use crate::model::{Post, PostStatus};
use crate::reconcile::{self, PostFields};
use crate::transform::post_record;

/// Header names accepted for the inbound API key, in lookup order.
pub const KEY_HEADERS: [&str; 2] = ["X-RequestDesk-Key", "x-requestdesk-api-key"];

pub const DEFAULT_PER_PAGE: u32 = 20;
pub const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CreatePostRequest {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub seo_title: Option<String>,
    #[serde(default)]
    pub seo_description: Option<String>,
    #[serde(default)]
    pub featured_image: Option<String>,
    /// Accepted for compatibility; posts carry no tags locally.
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub published: bool,
    #[serde(default)]
    pub requestdesk_post_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UpdatePostRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub seo_title: Option<String>,
    #[serde(default)]
    pub seo_description: Option<String>,
    #[serde(default)]
    pub featured_image: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub published: Option<bool>,
}

impl CreatePostRequest {
    fn fields(&self) -> PostFields {
        PostFields {
            title: Some(self.title.clone()),
            content: Some(self.content.clone()),
            slug: self.slug.clone().filter(|s| !s.trim().is_empty()),
            summary: self.summary.clone().filter(|s| !s.trim().is_empty()),
            seo_title: self.seo_title.clone().filter(|s| !s.trim().is_empty()),
            seo_description: self.seo_description.clone().filter(|s| !s.trim().is_empty()),
            featured_image: self.featured_image.clone(),
            author: self.author.clone().filter(|s| !s.trim().is_empty()),
            status: Some(PostStatus::from_published(self.published)),
        }
    }
}

impl UpdatePostRequest {
    fn fields(&self) -> PostFields {
        PostFields {
            title: self.title.clone(),
            content: self.content.clone(),
            slug: self.slug.clone(),
            summary: self.summary.clone(),
            seo_title: self.seo_title.clone(),
            seo_description: self.seo_description.clone(),
            featured_image: self.featured_image.clone(),
            author: self.author.clone(),
            status: self.published.map(PostStatus::from_published),
        }
    }
}

/// Key comparison whose running time depends only on the lengths.
fn keys_match(provided: &str, configured: &str) -> bool {
    let (a, b) = (provided.as_bytes(), configured.as_bytes());
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// `{success: false, error}` body for a failed call.
pub fn failure_body(err: &SyncError) -> Value {
    json!({ "success": false, "error": err.to_string() })
}

#[derive(Debug, Clone)]
pub struct ExternalBlog {
    pool: Pool,
    store: StoreContext,
    api_key: Option<String>,
}

impl ExternalBlog {
    pub fn new(pool: Pool, store: StoreContext, api_key: Option<String>) -> Self {
        Self {
            pool,
            store,
            api_key,
        }
    }

    /// Compare the caller's key with the configured one. A store without a
    /// configured key rejects every call.
    pub fn authenticate(&self, provided: Option<&str>) -> SyncResult<()> {
        let configured = self
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                SyncError::Authentication("RequestDesk API key not configured".into())
            })?;
        match provided {
            Some(key) if keys_match(key, configured) => Ok(()),
            _ => {
                warn!("invalid API key attempt");
                Err(SyncError::Authentication("Invalid RequestDesk API key".into()))
            }
        }
    }

    fn render(&self, post: &Post) -> Value {
        post_record(post, &self.store)
    }

    async fn find(&self, id: &str) -> SyncResult<Post> {
        reconcile::resolve_post(&self.pool, id)
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("Post not found: {}", id)))
    }

    pub fn test(&self) -> Value {
        json!({
            "success": true,
            "message": "External Blog API connection successful",
            "store": {
                "url": self.store.base_url,
                "name": self.store.name,
                "code": self.store.code,
            },
            "endpoints": {
                "create": "POST /V1/requestdesk/external/blog/posts",
                "update": "PUT /V1/requestdesk/external/blog/posts/:postId",
                "delete": "DELETE /V1/requestdesk/external/blog/posts/:postId",
                "get": "GET /V1/requestdesk/external/blog/posts/:postId",
                "list": "GET /V1/requestdesk/external/blog/posts",
            },
        })
    }

    /// Create a post. A known `requestdesk_post_id` turns this into a partial
    /// update of the existing post.
    #[instrument(skip_all, fields(external_id = ?req.requestdesk_post_id))]
    pub async fn create(&self, req: &CreatePostRequest) -> SyncResult<Value> {
        let fields = req.fields();
        let (post, created) = match req.requestdesk_post_id.as_deref().filter(|id| !id.is_empty()) {
            Some(external_id) => {
                let out = reconcile::upsert(&self.pool, &self.store, external_id, &fields).await?;
                (out.post, out.created)
            }
            None => (
                reconcile::create(&self.pool, &self.store, None, &fields).await?,
                true,
            ),
        };
        let message = if created {
            "Post created successfully"
        } else {
            "Post updated successfully"
        };
        info!(post_id = post.id, created, "external blog post saved");
        Ok(json!({ "success": true, "message": message, "post": self.render(&post) }))
    }

    #[instrument(skip_all, fields(id = id))]
    pub async fn update(&self, id: &str, req: &UpdatePostRequest) -> SyncResult<Value> {
        let existing = self.find(id).await?;
        let post = reconcile::apply_fields(&self.pool, &existing, &req.fields()).await?;
        info!(post_id = post.id, "external blog post updated");
        Ok(json!({
            "success": true,
            "message": "Post updated successfully",
            "post": self.render(&post),
        }))
    }

    #[instrument(skip_all, fields(id = id))]
    pub async fn delete(&self, id: &str) -> SyncResult<Value> {
        let post = self.find(id).await?;
        if !db::delete_post(&self.pool, post.id).await? {
            return Err(SyncError::NotFound(format!("Post not found: {}", id)));
        }
        info!(post_id = post.id, "external blog post deleted");
        Ok(json!({ "success": true, "message": "Post deleted successfully" }))
    }

    pub async fn get(&self, id: &str) -> SyncResult<Value> {
        let post = self.find(id).await?;
        Ok(json!({ "success": true, "post": self.render(&post) }))
    }

    /// `status` accepts `published` or `draft`; anything else lists all.
    pub async fn list(
        &self,
        page: Option<u32>,
        per_page: Option<u32>,
        status: Option<&str>,
    ) -> SyncResult<Value> {
        let page = page.filter(|p| *p > 0).unwrap_or(1);
        let per_page = per_page
            .filter(|p| *p > 0)
            .unwrap_or(DEFAULT_PER_PAGE)
            .min(MAX_PER_PAGE);
        let filter = PostListFilter {
            status: match status {
                Some("published") => Some(PostStatus::Published),
                Some("draft") => Some(PostStatus::Draft),
                _ => None,
            },
        };
        let result = db::list_posts(&self.pool, filter, page, per_page).await?;
        let posts: Vec<Value> = result.items.iter().map(|p| self.render(p)).collect();
        Ok(json!({
            "success": true,
            "posts": posts,
            "total": result.total,
            "page": page,
            "per_page": per_page,
            "has_more": result.has_more(),
        }))
    }
}
