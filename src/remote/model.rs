use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::model::{Document, PostStatus};
use crate::reconcile::PostFields;

/// Ids arrive as strings or numbers depending on the backend version.
fn id_string<'de, D>(de: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(de)? {
        Value::String(s) if !s.trim().is_empty() => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a non-empty id, got {}",
            other
        ))),
    }
}

fn opt_id_string<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(de)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// One post as served by `GET /api/public/posts`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RemotePost {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub seo_title: Option<String>,
    #[serde(default)]
    pub seo_description: Option<String>,
    #[serde(default)]
    pub featured_image: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl RemotePost {
    /// `publish`/`published` map to a live post, anything else to a draft.
    pub fn post_status(&self) -> Option<PostStatus> {
        self.status
            .as_deref()
            .map(|s| PostStatus::from_published(matches!(s, "publish" | "published")))
    }

    pub fn fields(&self) -> PostFields {
        PostFields {
            title: self.title.clone(),
            content: self.content.clone(),
            slug: self.slug.clone().filter(|s| !s.trim().is_empty()),
            summary: self.summary.clone().filter(|s| !s.trim().is_empty()),
            seo_title: self.seo_title.clone().filter(|s| !s.trim().is_empty()),
            seo_description: self.seo_description.clone().filter(|s| !s.trim().is_empty()),
            featured_image: self.featured_image.clone(),
            author: self.author.clone().filter(|s| !s.trim().is_empty()),
            status: self.post_status(),
        }
    }
}

/// Raw page of posts. Items stay untyped so one malformed entry cannot
/// reject the whole page.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PostsPage {
    #[serde(default)]
    pub posts: Vec<Value>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub has_more: bool,
}

/// Filters for `GET /api/public/posts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostQuery {
    pub status: Option<String>,
    pub sync_status: Option<String>,
    pub page: u32,
    pub per_page: u32,
}

impl Default for PostQuery {
    fn default() -> Self {
        Self {
            status: None,
            sync_status: None,
            page: 1,
            per_page: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConnectionInfo {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub agent_name: Option<String>,
}

/// Body of `POST /api/public/magento/sync`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncPayload {
    pub store_url: String,
    pub documents: Vec<Document>,
    pub auto_create_collection: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SyncResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub total_chunks_created: Option<u64>,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub collection_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RelatedPosts {
    #[serde(default)]
    pub posts: Vec<Value>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub confidence: f64,
}
