use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, Url};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::config::Credentials;
use crate::error::{SyncError, SyncResult};
use crate::model::SyncReport;

pub mod model;

pub use model::{
    ConnectionInfo, PostQuery, PostsPage, RelatedPosts, RemotePost, SyncPayload, SyncResponse,
};

/// Header carrying the API key on every outbound call.
pub const API_KEY_HEADER: &str = "x-requestdesk-api-key";

/// Status code and decoded body of a remote call. Interpretation is left to
/// the caller (see [`RemoteResponse::into_result`]).
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResponse {
    pub status: u16,
    pub body: Value,
}

impl RemoteResponse {
    /// 2xx is success, 401/403 is an authentication failure, anything else
    /// is a remote error carrying the `detail` message when there is one.
    pub fn into_result(self) -> SyncResult<Value> {
        match self.status {
            200..=299 => Ok(self.body),
            401 | 403 => Err(SyncError::Authentication(format!(
                "RequestDesk rejected the API key (HTTP {})",
                self.status
            ))),
            _ => {
                let message = match &self.body {
                    Value::Object(map) => map
                        .get("detail")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
                    _ => None,
                };
                Err(SyncError::Remote {
                    status: Some(self.status),
                    message: message.unwrap_or_else(|| format!("HTTP {}", self.status)),
                })
            }
        }
    }
}

fn decode<T: DeserializeOwned>(body: Value, what: &str) -> SyncResult<T> {
    serde_json::from_value(body).map_err(|e| SyncError::Remote {
        status: None,
        message: format!("unexpected {} response: {}", what, e),
    })
}

/// Typed RequestDesk operations. Orchestrators depend on this trait so tests
/// can substitute a recording fake.
#[async_trait]
pub trait RequestDeskApi: Send + Sync {
    async fn test_connection(&self) -> SyncResult<ConnectionInfo>;

    async fn fetch_posts(&self, query: &PostQuery) -> SyncResult<PostsPage>;

    async fn report_sync_status(&self, report: &SyncReport) -> SyncResult<()>;

    async fn sync_documents(&self, payload: &SyncPayload) -> SyncResult<SyncResponse>;

    async fn related_posts(&self, query: &str, max_results: u32) -> SyncResult<RelatedPosts>;
}

#[derive(Clone)]
pub struct RequestDeskClient {
    http: Client,
    base_url: Url,
    api_key: String,
    timeout: Duration,
    test_timeout: Duration,
}

impl fmt::Debug for RequestDeskClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestDeskClient")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl RequestDeskClient {
    pub fn new(credentials: &Credentials) -> SyncResult<Self> {
        let http = Client::builder()
            .user_agent(concat!("requestdesk-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: credentials.endpoint.clone(),
            api_key: credentials.api_key.clone(),
            timeout: credentials.timeout,
            test_timeout: credentials.test_timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> SyncResult<Url> {
        self.base_url.join(path).map_err(|e| {
            SyncError::Configuration(format!("invalid RequestDesk path '{}': {}", path, e))
        })
    }

    /// `api/public/posts/{external_id}/sync-status` with the id encoded as a
    /// single path segment.
    fn sync_status_url(&self, external_id: &str) -> SyncResult<Url> {
        let mut url = self.endpoint("api/public/posts/")?;
        url.path_segments_mut()
            .map_err(|_| {
                SyncError::Configuration("RequestDesk endpoint cannot carry a path".into())
            })?
            .pop_if_empty()
            .push(external_id)
            .push("sync-status");
        Ok(url)
    }

    pub fn build_request(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
        timeout: Duration,
    ) -> SyncResult<reqwest::Request> {
        let mut builder = self
            .http
            .request(method, url)
            .header(CONTENT_TYPE, "application/json")
            .header(API_KEY_HEADER, &self.api_key)
            .timeout(timeout);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        Ok(builder.build()?)
    }

    async fn execute(&self, request: reqwest::Request) -> SyncResult<RemoteResponse> {
        debug!(method = %request.method(), url = %request.url(), "requestdesk request");
        for (name, value) in request.headers() {
            if name.as_str() == API_KEY_HEADER {
                debug!("  {}: [REDACTED]", name);
            } else {
                debug!("  {}: {}", name, value.to_str().unwrap_or("[invalid]"));
            }
        }

        let res = self.http.execute(request).await?;
        let status = res.status().as_u16();
        let text = res.text().await?;
        debug!(status, bytes = text.len(), "requestdesk response");

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            match serde_json::from_str(&text) {
                Ok(v) => v,
                Err(err) if (200..300).contains(&status) => {
                    return Err(SyncError::Remote {
                        status: Some(status),
                        message: format!("invalid JSON from RequestDesk: {}", err),
                    });
                }
                Err(_) => Value::String(text),
            }
        };
        Ok(RemoteResponse { status, body })
    }

    pub async fn get(&self, url: Url) -> SyncResult<RemoteResponse> {
        let request = self.build_request(Method::GET, url, None, self.timeout)?;
        self.execute(request).await
    }

    pub async fn post(&self, url: Url, body: &Value) -> SyncResult<RemoteResponse> {
        let request = self.build_request(Method::POST, url, Some(body), self.timeout)?;
        self.execute(request).await
    }
}

#[async_trait]
impl RequestDeskApi for RequestDeskClient {
    #[instrument(skip_all)]
    async fn test_connection(&self) -> SyncResult<ConnectionInfo> {
        let url = self.endpoint("api/public/magento/test")?;
        let request = self.build_request(Method::POST, url, Some(&json!({})), self.test_timeout)?;
        let body = self.execute(request).await?.into_result()?;
        let info: ConnectionInfo = decode(body, "connection test")?;
        info!(success = info.success, agent = ?info.agent_name, "connection test finished");
        Ok(info)
    }

    #[instrument(skip_all, fields(page = query.page, per_page = query.per_page))]
    async fn fetch_posts(&self, query: &PostQuery) -> SyncResult<PostsPage> {
        let mut url = self.endpoint("api/public/posts")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("page", &query.page.to_string())
                .append_pair("per_page", &query.per_page.to_string())
                .append_pair("platform", "magento");
            if let Some(status) = query.status.as_deref().filter(|s| !s.is_empty()) {
                pairs.append_pair("status", status);
            }
            if let Some(sync) = query.sync_status.as_deref().filter(|s| !s.is_empty()) {
                pairs.append_pair("sync_status", sync);
            }
        }
        let body = self.get(url).await?.into_result()?;
        let page: PostsPage = decode(body, "post listing")?;
        info!(total = page.total, fetched = page.posts.len(), "fetched posts");
        Ok(page)
    }

    #[instrument(skip_all, fields(external_id = %report.external_id, status = report.sync_status.as_str()))]
    async fn report_sync_status(&self, report: &SyncReport) -> SyncResult<()> {
        let url = self.sync_status_url(&report.external_id)?;
        self.post(url, &report.body()).await?.into_result()?;
        Ok(())
    }

    #[instrument(skip_all, fields(documents = payload.documents.len()))]
    async fn sync_documents(&self, payload: &SyncPayload) -> SyncResult<SyncResponse> {
        let url = self.endpoint("api/public/magento/sync")?;
        let body = serde_json::to_value(payload)
            .map_err(|e| SyncError::Transform(format!("cannot encode sync payload: {}", e)))?;
        let body = self.post(url, &body).await?.into_result()?;
        decode(body, "sync")
    }

    #[instrument(skip_all, fields(max_results = max_results))]
    async fn related_posts(&self, query: &str, max_results: u32) -> SyncResult<RelatedPosts> {
        let mut url = self.endpoint("api/public/posts/related")?;
        url.query_pairs_mut()
            .append_pair("query", query)
            .append_pair("max_results", &max_results.to_string());
        let body = self.post(url, &json!({})).await?.into_result()?;
        let related: RelatedPosts = decode(body, "related posts")?;
        if related.total == 0 {
            warn!(query, "no related posts found");
        } else {
            info!(total = related.total, confidence = related.confidence, "found related posts");
        }
        Ok(related)
    }
}
