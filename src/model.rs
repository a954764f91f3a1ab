use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{SyncError, SyncResult};

/// Author recorded when the remote side does not name one.
pub const DEFAULT_AUTHOR: &str = "RequestDesk";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PostStatus {
    Draft,
    Published,
}

impl PostStatus {
    pub fn as_i64(&self) -> i64 {
        match self {
            PostStatus::Draft => 0,
            PostStatus::Published => 1,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(PostStatus::Draft),
            1 => Some(PostStatus::Published),
            _ => None,
        }
    }

    pub fn from_published(published: bool) -> Self {
        if published {
            PostStatus::Published
        } else {
            PostStatus::Draft
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Published => "published",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Synced,
    Failed,
}

impl SyncStatus {
    pub const ALL: [SyncStatus; 3] = [SyncStatus::Pending, SyncStatus::Synced, SyncStatus::Failed];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "synced",
            SyncStatus::Failed => "failed",
        }
    }

    pub fn parse_status(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SyncStatus::Pending),
            "synced" => Some(SyncStatus::Synced),
            "failed" => Some(SyncStatus::Failed),
            _ => None,
        }
    }

    /// Strict parse used at API boundaries; unknown values are caller errors.
    pub fn validate(s: &str) -> SyncResult<Self> {
        Self::parse_status(s).ok_or_else(|| {
            let valid: Vec<&str> = Self::ALL.iter().map(SyncStatus::as_str).collect();
            SyncError::Validation(format!(
                "Invalid sync status: {}. Valid values are: {}",
                s,
                valid.join(", ")
            ))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub id: i64,
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
    pub sync_status: SyncStatus,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A post ready to be inserted. Constructed through [`NewPost::new`] so that
/// the required fields are always present.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPost {
    title: String,
    content: String,
    url_key: String,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub featured_image: Option<String>,
    pub status: PostStatus,
    pub author: Option<String>,
    pub store_id: i64,
    pub external_id: Option<String>,
    pub sync_status: SyncStatus,
}

impl NewPost {
    pub fn new(title: &str, content: &str, url_key: &str) -> SyncResult<Self> {
        if title.trim().is_empty() {
            return Err(SyncError::Validation("title is required".into()));
        }
        if url_key.trim().is_empty() {
            return Err(SyncError::Validation(format!(
                "url key for '{}' is empty",
                title
            )));
        }
        Ok(Self {
            title: title.to_string(),
            content: content.to_string(),
            url_key: url_key.to_string(),
            meta_title: None,
            meta_description: None,
            featured_image: None,
            status: PostStatus::Draft,
            author: None,
            store_id: 0,
            external_id: None,
            sync_status: SyncStatus::Pending,
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn url_key(&self) -> &str {
        &self.url_key
    }
}

/// Partial update: `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub url_key: Option<String>,
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    pub featured_image: Option<String>,
    pub status: Option<PostStatus>,
    pub author: Option<String>,
}

impl PostPatch {
    pub fn is_empty(&self) -> bool {
        *self == PostPatch::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductLink {
    pub post_id: i64,
    pub product_id: i64,
    pub position: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    EcommerceProduct,
    Category,
    CmsPage,
}

impl SourceType {
    pub fn id_prefix(&self) -> &'static str {
        match self {
            SourceType::EcommerceProduct => "magento_product",
            SourceType::Category => "magento_category",
            SourceType::CmsPage => "magento_cms",
        }
    }

    pub fn source_id(&self, local_id: i64) -> String {
        format!("{}_{}", self.id_prefix(), local_id)
    }
}

/// Outbound knowledge-base record. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub source_id: String,
    pub source_type: SourceType,
    pub title: String,
    pub content: String,
    pub url: String,
    pub metadata: Map<String, Value>,
    /// Extra top-level keys some consumers expect (`sku`, `price`, ...).
    #[serde(flatten, default)]
    pub extra: Map<String, Value>,
}

/// Per-post sync outcome sent back to the remote system.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub external_id: String,
    pub local_id: Option<i64>,
    pub sync_status: SyncStatus,
    pub local_url: Option<String>,
    pub store_identifier: String,
    pub error_message: Option<String>,
}

impl SyncReport {
    pub fn synced(external_id: &str, local_id: i64, local_url: String, store_id: i64) -> Self {
        Self {
            external_id: external_id.to_string(),
            local_id: Some(local_id),
            sync_status: SyncStatus::Synced,
            local_url: Some(local_url),
            store_identifier: store_id.to_string(),
            error_message: None,
        }
    }

    pub fn failed(external_id: &str, message: &str, store_id: i64) -> Self {
        Self {
            external_id: external_id.to_string(),
            local_id: None,
            sync_status: SyncStatus::Failed,
            local_url: None,
            store_identifier: store_id.to_string(),
            error_message: Some(message.to_string()),
        }
    }

    /// Wire body for `POST /api/public/posts/{id}/sync-status`.
    pub fn body(&self) -> Value {
        json!({
            "platform": "magento",
            "platform_post_id": self.local_id.map(|id| id.to_string()),
            "sync_status": self.sync_status.as_str(),
            "platform_url": self.local_url,
            "platform_store_id": self.store_identifier,
            "error_message": self.error_message,
        })
    }
}

/// Catalog visibility codes.
pub mod visibility {
    pub const NOT_VISIBLE: i64 = 1;
    pub const IN_CATALOG: i64 = 2;
    pub const IN_SEARCH: i64 = 3;
    pub const BOTH: i64 = 4;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Product {
    pub id: i64,
    pub sku: String,
    pub name: String,
    pub type_id: String,
    pub enabled: bool,
    pub visibility: i64,
    pub price: Option<f64>,
    pub special_price: Option<f64>,
    pub weight: Option<f64>,
    pub short_description: Option<String>,
    pub description: Option<String>,
    pub meta_keyword: Option<String>,
    pub url_key: Option<String>,
    pub image: Option<String>,
    /// `None` when the gallery could not be read; the main image is used instead.
    pub gallery: Option<Vec<String>>,
    pub category_ids: Vec<i64>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub path: String,
    pub level: i64,
    pub position: i64,
    pub is_active: bool,
    pub url_key: Option<String>,
    pub description: Option<String>,
    pub product_count: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CmsPage {
    pub id: i64,
    pub identifier: Option<String>,
    pub title: String,
    pub content: String,
    pub is_active: bool,
    pub meta_title: Option<String>,
    pub meta_keywords: Option<String>,
    pub meta_description: Option<String>,
    pub creation_time: Option<DateTime<Utc>>,
    pub update_time: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_status_rejects_unknown_values() {
        assert_eq!(SyncStatus::validate("synced").unwrap(), SyncStatus::Synced);
        let err = SyncStatus::validate("not_synced").unwrap_err();
        match err {
            SyncError::Validation(msg) => {
                assert!(msg.contains("not_synced"));
                assert!(msg.contains("pending, synced, failed"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn new_post_requires_title_and_url_key() {
        assert!(matches!(
            NewPost::new("  ", "body", "slug"),
            Err(SyncError::Validation(_))
        ));
        assert!(matches!(
            NewPost::new("Title", "body", ""),
            Err(SyncError::Validation(_))
        ));
        let post = NewPost::new("Title", "body", "title").unwrap();
        assert_eq!(post.status, PostStatus::Draft);
        assert_eq!(post.store_id, 0);
    }

    #[test]
    fn sync_report_body_shape() {
        let ok = SyncReport::synced("rd-1", 5, "https://s/blog/post/view/id/5".into(), 1);
        let body = ok.body();
        assert_eq!(body["platform"], "magento");
        assert_eq!(body["platform_post_id"], "5");
        assert_eq!(body["sync_status"], "synced");
        assert_eq!(body["platform_store_id"], "1");
        assert!(body["error_message"].is_null());

        let failed = SyncReport::failed("rd-2", "title is required", 1).body();
        assert!(failed["platform_post_id"].is_null());
        assert!(failed["platform_url"].is_null());
        assert_eq!(failed["sync_status"], "failed");
        assert_eq!(failed["error_message"], "title is required");
    }

    #[test]
    fn document_serializes_source_type_snake_case() {
        let doc = Document {
            source_id: SourceType::CmsPage.source_id(3),
            source_type: SourceType::CmsPage,
            title: "About".into(),
            content: "<p>hi</p>".into(),
            url: String::new(),
            metadata: Map::new(),
            extra: Map::new(),
        };
        let v = serde_json::to_value(&doc).unwrap();
        assert_eq!(v["source_type"], "cms_page");
        assert_eq!(v["source_id"], "magento_cms_3");
    }
}
