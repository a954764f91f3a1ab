mod common;

use common::{page, setup_pool, store, RecordingRemote};
use requestdesk_sync::config::Cron;
use requestdesk_sync::db;
use requestdesk_sync::error::SyncError;
use requestdesk_sync::import;
use requestdesk_sync::model::{PostStatus, SyncStatus};
use requestdesk_sync::remote::PostQuery;
use serde_json::json;

fn remote_post(id: &str, title: &str, status: &str) -> serde_json::Value {
    json!({
        "id": id,
        "title": title,
        "content": format!("<p>{} body</p>", title),
        "status": status,
    })
}

#[tokio::test]
async fn publish_and_draft_posts_are_imported_and_reported() {
    let pool = setup_pool().await;
    let store = store();
    let remote = RecordingRemote::with_pages(vec![Ok(page(
        vec![
            remote_post("a1", "Spring Launch", "publish"),
            remote_post("b2", "Work In Progress", "draft"),
        ],
        false,
    ))]);

    let summary = import::import_page(&pool, &remote, &store, &PostQuery::default())
        .await
        .unwrap();

    assert_eq!(summary.created, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.processed(), 2);

    let queries = remote.queries().await;
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].page, 1);
    assert_eq!(queries[0].per_page, 20);

    let published = db::find_post_by_external_id(&pool, "a1").await.unwrap().unwrap();
    assert_eq!(published.status, PostStatus::Published);
    assert_eq!(published.status.as_i64(), 1);
    assert_eq!(published.url_key, "spring-launch");
    assert_eq!(published.sync_status, SyncStatus::Synced);
    let draft = db::find_post_by_external_id(&pool, "b2").await.unwrap().unwrap();
    assert_eq!(draft.status.as_i64(), 0);
    assert_eq!(draft.sync_status, SyncStatus::Synced);

    let reports = remote.reports().await;
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.sync_status == SyncStatus::Synced));
    assert_eq!(reports[0].external_id, "a1");
    assert_eq!(reports[0].local_id, Some(published.id));
    assert_eq!(
        reports[0].local_url.as_deref(),
        Some(format!("https://shop.example.com/blog/post/view/id/{}", published.id).as_str())
    );
    assert_eq!(reports[0].store_identifier, "1");
}

#[tokio::test]
async fn malformed_item_does_not_stop_the_page() {
    let pool = setup_pool().await;
    let store = store();
    let remote = RecordingRemote::with_pages(vec![Ok(page(
        vec![
            remote_post("ok-1", "First", "publish"),
            json!({ "title": "No id at all" }),
            json!({ "id": "bad-2", "title": ["not", "a", "string"] }),
            remote_post("ok-2", "Second", "publish"),
            json!({ "id": "no-title", "content": "<p>x</p>" }),
        ],
        true,
    ))]);

    let summary = import::import_page(&pool, &remote, &store, &PostQuery::default())
        .await
        .unwrap();

    assert_eq!(summary.total_fetched, 5);
    assert_eq!(summary.created, 2);
    assert_eq!(summary.failed, 3);
    assert!(summary.has_more);
    assert_eq!(summary.errors.len(), 3);
    assert!(summary.errors.iter().any(|e| e.starts_with("unknown: malformed post")));
    assert!(summary.errors.iter().any(|e| e.starts_with("bad-2: malformed post")));
    assert!(summary.errors.iter().any(|e| e.starts_with("no-title: ")));
    assert_eq!(db::count_posts(&pool).await.unwrap(), 2);

    // The item without an id cannot be reported back.
    let reports = remote.reports().await;
    assert_eq!(reports.len(), 4);
    let failed: Vec<_> = reports
        .iter()
        .filter(|r| r.sync_status == SyncStatus::Failed)
        .map(|r| r.external_id.as_str())
        .collect();
    assert_eq!(failed, vec!["bad-2", "no-title"]);
}

#[tokio::test]
async fn importing_twice_keeps_one_post() {
    let pool = setup_pool().await;
    let store = store();
    let remote = RecordingRemote::with_pages(vec![
        Ok(page(vec![remote_post("dup", "Original", "draft")], false)),
        Ok(page(vec![remote_post("dup", "Edited", "publish")], false)),
    ]);

    let first = import::import_page(&pool, &remote, &store, &PostQuery::default())
        .await
        .unwrap();
    let second = import::import_page(&pool, &remote, &store, &PostQuery::default())
        .await
        .unwrap();

    assert_eq!(first.created, 1);
    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 1);
    assert_eq!(db::count_posts(&pool).await.unwrap(), 1);

    let post = db::find_post_by_external_id(&pool, "dup").await.unwrap().unwrap();
    assert_eq!(post.title, "Edited");
    assert_eq!(post.status, PostStatus::Published);
    assert_eq!(post.url_key, "original");
}

#[tokio::test]
async fn authentication_failure_aborts_the_import() {
    let pool = setup_pool().await;
    let remote = RecordingRemote::with_pages(vec![Err(SyncError::Authentication(
        "RequestDesk rejected the API key (HTTP 403)".into(),
    ))]);

    let err = import::import_page(&pool, &remote, &store(), &PostQuery::default())
        .await
        .unwrap_err();
    assert!(err.is_auth());
    assert!(remote.reports().await.is_empty());
}

#[tokio::test]
async fn report_failures_do_not_fail_the_item() {
    let pool = setup_pool().await;
    let remote = RecordingRemote::with_pages(vec![Ok(page(
        vec![remote_post("r1", "Reported", "publish")],
        false,
    ))])
    .failing_reports();

    let summary = import::import_page(&pool, &remote, &store(), &PostQuery::default())
        .await
        .unwrap();
    assert_eq!(summary.created, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(remote.reports().await.len(), 1);
}

#[tokio::test]
async fn scheduled_run_uses_cron_filters() {
    let pool = setup_pool().await;
    let remote = RecordingRemote::with_pages(vec![Ok(page(
        vec![remote_post("c1", "Cron Post", "publish")],
        true,
    ))]);

    let disabled = Cron::default();
    assert!(import::run_scheduled(&pool, &remote, &store(), &disabled)
        .await
        .unwrap()
        .is_none());
    assert!(remote.queries().await.is_empty());

    let cron = Cron {
        enabled: true,
        ..Cron::default()
    };
    let summary = import::run_scheduled(&pool, &remote, &store(), &cron)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(summary.created, 1);

    let queries = remote.queries().await;
    assert_eq!(queries[0].status.as_deref(), Some("publish"));
    assert_eq!(queries[0].sync_status.as_deref(), Some("not_synced"));
    assert_eq!(queries[0].page, 1);
    assert_eq!(queries[0].per_page, 50);
}

#[tokio::test]
async fn import_all_follows_has_more() {
    let pool = setup_pool().await;
    let remote = RecordingRemote::with_pages(vec![
        Ok(page(vec![remote_post("p1", "Page One", "publish")], true)),
        Ok(page(vec![remote_post("p2", "Page Two", "publish")], false)),
        Ok(page(vec![remote_post("p3", "Never Read", "publish")], false)),
    ]);

    let summary = import::import_all(&pool, &remote, &store(), &PostQuery::default(), 10)
        .await
        .unwrap();
    assert_eq!(summary.created, 2);
    assert!(!summary.has_more);

    let pages: Vec<u32> = remote.queries().await.iter().map(|q| q.page).collect();
    assert_eq!(pages, vec![1, 2]);
}

#[tokio::test]
async fn import_all_rereads_first_page_when_filtering_by_sync_status() {
    let pool = setup_pool().await;
    let remote = RecordingRemote::with_pages(vec![
        Ok(page(vec![remote_post("s1", "Unsynced One", "publish")], true)),
        Ok(page(vec![remote_post("s2", "Unsynced Two", "publish")], true)),
    ]);
    let query = PostQuery {
        sync_status: Some("not_synced".into()),
        ..PostQuery::default()
    };

    let summary = import::import_all(&pool, &remote, &store(), &query, 2)
        .await
        .unwrap();
    assert_eq!(summary.created, 2);
    assert!(summary.has_more);

    let pages: Vec<u32> = remote.queries().await.iter().map(|q| q.page).collect();
    assert_eq!(pages, vec![1, 1]);
}

#[tokio::test]
async fn failed_update_marks_the_local_post_failed() {
    let pool = setup_pool().await;
    let remote = RecordingRemote::with_pages(vec![
        Ok(page(vec![remote_post("f1", "Good Title", "publish")], false)),
        Ok(page(
            vec![json!({ "id": "f1", "title": "   ", "status": "publish" })],
            false,
        )),
    ]);

    import::import_page(&pool, &remote, &store(), &PostQuery::default())
        .await
        .unwrap();
    let summary = import::import_page(&pool, &remote, &store(), &PostQuery::default())
        .await
        .unwrap();
    assert_eq!(summary.failed, 1);

    let post = db::find_post_by_external_id(&pool, "f1").await.unwrap().unwrap();
    assert_eq!(post.title, "Good Title");
    assert_eq!(post.sync_status, SyncStatus::Failed);
    assert!(post.last_sync_at.is_some());

    let reports = remote.reports().await;
    assert_eq!(reports.last().unwrap().sync_status, SyncStatus::Failed);
}
