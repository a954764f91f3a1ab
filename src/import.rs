//! Pull one page of RequestDesk posts into the local blog.

use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use crate::config::{Cron, StoreContext};
use crate::db::{self, Pool};
use crate::error::SyncResult;
use crate::model::{SyncReport, SyncStatus};
use crate::reconcile::{self, UpsertOutcome};
use crate::remote::{PostQuery, RemotePost, RequestDeskApi};
use crate::transform::post_view_url;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportSummary {
    pub created: u32,
    pub updated: u32,
    pub failed: u32,
    pub total_fetched: usize,
    pub has_more: bool,
    pub errors: Vec<String>,
}

impl ImportSummary {
    pub fn processed(&self) -> u32 {
        self.created + self.updated
    }
}

/// Best-effort id for an item that did not decode.
fn raw_id(item: &Value) -> Option<String> {
    match item.get("id") {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

async fn report(api: &dyn RequestDeskApi, report: SyncReport) {
    if let Err(err) = api.report_sync_status(&report).await {
        warn!(
            external_id = %report.external_id,
            %err,
            "could not report sync status"
        );
    }
}

/// Flag an already imported post whose latest update did not apply.
async fn mark_failed(pool: &Pool, external_id: &str) {
    let marked = match db::find_post_by_external_id(pool, external_id).await {
        Ok(Some(post)) => db::set_sync_status(pool, post.id, SyncStatus::Failed, None)
            .await
            .map(|_| ()),
        Ok(None) => Ok(()),
        Err(err) => Err(err),
    };
    if let Err(err) = marked {
        warn!(external_id, ?err, "could not mark post as failed");
    }
}

/// Fetch one page and reconcile every post on it. A failing item is counted
/// and reported but never stops the rest of the page; configuration and
/// authentication errors abort the call.
#[instrument(skip_all, fields(page = query.page, per_page = query.per_page))]
pub async fn import_page(
    pool: &Pool,
    api: &dyn RequestDeskApi,
    store: &StoreContext,
    query: &PostQuery,
) -> SyncResult<ImportSummary> {
    let page = api.fetch_posts(query).await?;
    let mut summary = ImportSummary {
        total_fetched: page.posts.len(),
        has_more: page.has_more,
        ..Default::default()
    };

    for item in page.posts {
        let remote: RemotePost = match serde_json::from_value(item.clone()) {
            Ok(post) => post,
            Err(err) => {
                let external_id = raw_id(&item);
                let label = external_id.clone().unwrap_or_else(|| "unknown".into());
                let message = format!("malformed post: {}", err);
                error!(external_id = %label, %message, "skipping post");
                summary.failed += 1;
                summary.errors.push(format!("{}: {}", label, message));
                if let Some(id) = external_id {
                    report(api, SyncReport::failed(&id, &message, store.id)).await;
                }
                continue;
            }
        };

        match reconcile::upsert(pool, store, &remote.id, &remote.fields()).await {
            Ok(UpsertOutcome { post, created }) => {
                if created {
                    summary.created += 1;
                } else {
                    summary.updated += 1;
                }
                let url = post_view_url(post.id, store);
                report(api, SyncReport::synced(&remote.id, post.id, url, store.id)).await;
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                let message = err.to_string();
                error!(external_id = %remote.id, %message, "failed to import post");
                summary.failed += 1;
                summary.errors.push(format!("{}: {}", remote.id, message));
                mark_failed(pool, &remote.id).await;
                report(api, SyncReport::failed(&remote.id, &message, store.id)).await;
            }
        }
    }

    info!(
        created = summary.created,
        updated = summary.updated,
        failed = summary.failed,
        has_more = summary.has_more,
        "import page finished"
    );
    Ok(summary)
}

/// Query used by the scheduled job.
pub fn scheduled_query(cron: &Cron) -> PostQuery {
    PostQuery {
        status: cron.status.clone(),
        sync_status: cron.sync_status.clone(),
        page: 1,
        per_page: cron.per_page,
    }
}

/// One scheduled run. Returns `None` when the job is disabled.
#[instrument(skip_all)]
pub async fn run_scheduled(
    pool: &Pool,
    api: &dyn RequestDeskApi,
    store: &StoreContext,
    cron: &Cron,
) -> SyncResult<Option<ImportSummary>> {
    if !cron.enabled {
        info!("scheduled import disabled");
        return Ok(None);
    }
    let summary = import_page(pool, api, store, &scheduled_query(cron)).await?;
    if summary.has_more {
        info!(
            per_page = cron.per_page,
            "more posts are waiting; the next run will pick them up"
        );
    }
    Ok(Some(summary))
}

/// Follow `has_more` for up to `max_pages` pages, stopping at the first
/// failed fetch. With a sync-status filter, imported posts drop out of the
/// remote listing, so the first page is re-read instead of advancing.
pub async fn import_all(
    pool: &Pool,
    api: &dyn RequestDeskApi,
    store: &StoreContext,
    query: &PostQuery,
    max_pages: u32,
) -> SyncResult<ImportSummary> {
    let mut total = ImportSummary::default();
    let mut query = query.clone();
    for _ in 0..max_pages.max(1) {
        let page = import_page(pool, api, store, &query).await?;
        total.created += page.created;
        total.updated += page.updated;
        total.failed += page.failed;
        total.total_fetched += page.total_fetched;
        total.errors.extend(page.errors);
        total.has_more = page.has_more;
        if !page.has_more || page.total_fetched == 0 {
            break;
        }
        if query.sync_status.is_none() {
            query.page += 1;
        }
    }
    Ok(total)
}
