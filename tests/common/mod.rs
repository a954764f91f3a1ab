#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;

use requestdesk_sync::config::StoreContext;
use requestdesk_sync::error::{SyncError, SyncResult};
use requestdesk_sync::model::SyncReport;
use requestdesk_sync::remote::{
    ConnectionInfo, PostQuery, PostsPage, RelatedPosts, RequestDeskApi, SyncPayload,
    SyncResponse,
};

pub async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

pub fn store() -> StoreContext {
    StoreContext {
        id: 1,
        code: "default".into(),
        name: "Main Website Store".into(),
        base_url: "https://shop.example.com/".into(),
        media_url: "https://shop.example.com/media/".into(),
    }
}

/// Scripted fake: pages and sync responses are popped in order; every call
/// is recorded.
#[derive(Clone, Default)]
pub struct RecordingRemote {
    pages: Arc<Mutex<VecDeque<SyncResult<PostsPage>>>>,
    sync_responses: Arc<Mutex<VecDeque<SyncResult<SyncResponse>>>>,
    queries: Arc<Mutex<Vec<PostQuery>>>,
    reports: Arc<Mutex<Vec<SyncReport>>>,
    payloads: Arc<Mutex<Vec<SyncPayload>>>,
    fail_reports: bool,
}

impl RecordingRemote {
    pub fn with_pages(pages: Vec<SyncResult<PostsPage>>) -> Self {
        Self {
            pages: Arc::new(Mutex::new(VecDeque::from(pages))),
            ..Default::default()
        }
    }

    pub fn with_sync_responses(responses: Vec<SyncResult<SyncResponse>>) -> Self {
        Self {
            sync_responses: Arc::new(Mutex::new(VecDeque::from(responses))),
            ..Default::default()
        }
    }

    pub fn failing_reports(mut self) -> Self {
        self.fail_reports = true;
        self
    }

    pub async fn queries(&self) -> Vec<PostQuery> {
        self.queries.lock().await.clone()
    }

    pub async fn reports(&self) -> Vec<SyncReport> {
        self.reports.lock().await.clone()
    }

    pub async fn payloads(&self) -> Vec<SyncPayload> {
        self.payloads.lock().await.clone()
    }
}

pub fn page(posts: Vec<Value>, has_more: bool) -> PostsPage {
    PostsPage {
        total: posts.len() as u64,
        posts,
        has_more,
    }
}

#[async_trait]
impl RequestDeskApi for RecordingRemote {
    async fn test_connection(&self) -> SyncResult<ConnectionInfo> {
        Ok(ConnectionInfo {
            success: true,
            message: Some("ok".into()),
            agent_name: Some("Test Agent".into()),
        })
    }

    async fn fetch_posts(&self, query: &PostQuery) -> SyncResult<PostsPage> {
        self.queries.lock().await.push(query.clone());
        self.pages
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(page(Vec::new(), false)))
    }

    async fn report_sync_status(&self, report: &SyncReport) -> SyncResult<()> {
        self.reports.lock().await.push(report.clone());
        if self.fail_reports {
            return Err(SyncError::Remote {
                status: Some(500),
                message: "report rejected".into(),
            });
        }
        Ok(())
    }

    async fn sync_documents(&self, payload: &SyncPayload) -> SyncResult<SyncResponse> {
        self.payloads.lock().await.push(payload.clone());
        self.sync_responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok(SyncResponse::default()))
    }

    async fn related_posts(&self, _query: &str, _max_results: u32) -> SyncResult<RelatedPosts> {
        Ok(RelatedPosts::default())
    }
}
