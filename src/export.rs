//! Catalog → RequestDesk knowledge base.
//!
//! Push: [`export_all`] and [`export_one`] send product documents in a single
//! sync call. Pull: [`DataExport`] serves the same catalog as paginated
//! document listings for the inbound API.

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, instrument};

use crate::config::StoreContext;
use crate::db::{catalog, Pool};
use crate::error::{SyncError, SyncResult};
use crate::model::Document;
use crate::remote::{RequestDeskApi, SyncPayload};
use crate::transform;

/// Page size used by the pull listings when the caller sends none.
pub const DEFAULT_PAGE_SIZE: u32 = 100;
pub const MAX_PAGE_SIZE: u32 = 500;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExportSummary {
    pub success: bool,
    pub message: Option<String>,
    pub total_products: usize,
    pub total_synced: u64,
    pub collection_id: Option<String>,
}

async fn send_documents(
    api: &dyn RequestDeskApi,
    store: &StoreContext,
    documents: Vec<Document>,
) -> SyncResult<ExportSummary> {
    let total_products = documents.len();
    let payload = SyncPayload {
        store_url: store.identifier(),
        documents,
        auto_create_collection: true,
    };
    info!(
        documents = total_products,
        store_url = %payload.store_url,
        "sending documents to RequestDesk"
    );
    let response = api.sync_documents(&payload).await?;
    let total_synced = response
        .total_chunks_created
        .unwrap_or(total_products as u64);
    info!(total_synced, collection = ?response.collection_id, "sync accepted");
    Ok(ExportSummary {
        success: true,
        message: Some(
            response
                .message
                .unwrap_or_else(|| "Products synced successfully".into()),
        ),
        total_products,
        total_synced,
        collection_id: response.collection_id,
    })
}

/// Export every enabled, visible product (optionally capped) in one batch.
#[instrument(skip_all, fields(limit = ?limit))]
pub async fn export_all(
    pool: &Pool,
    api: &dyn RequestDeskApi,
    store: &StoreContext,
    limit: Option<u32>,
) -> SyncResult<ExportSummary> {
    let products = catalog::eligible_products(pool, limit).await?;
    if products.is_empty() {
        info!("no products to export");
        return Ok(ExportSummary {
            success: true,
            message: Some("No products to export".into()),
            ..Default::default()
        });
    }

    let names = catalog::category_names(pool).await?;
    let documents = products
        .iter()
        .map(|p| transform::product_to_document(p, &names, store))
        .collect();
    send_documents(api, store, documents).await
}

#[instrument(skip_all, fields(product_id = product_id))]
pub async fn export_one(
    pool: &Pool,
    api: &dyn RequestDeskApi,
    store: &StoreContext,
    product_id: i64,
) -> SyncResult<ExportSummary> {
    let product = catalog::product_by_id(pool, product_id)
        .await?
        .ok_or_else(|| SyncError::NotFound(format!("Product not found: {}", product_id)))?;
    let names = catalog::category_names(pool).await?;
    let document = transform::product_to_document(&product, &names, store);
    send_documents(api, store, vec![document]).await
}

fn paging(page_size: Option<u32>, current_page: Option<u32>) -> (u32, u32) {
    (
        page_size
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .min(MAX_PAGE_SIZE),
        current_page.filter(|p| *p > 0).unwrap_or(1),
    )
}

/// Read side of the pull API. Callers authenticate before using it.
#[derive(Debug, Clone)]
pub struct DataExport {
    pool: Pool,
    store: StoreContext,
}

impl DataExport {
    pub fn new(pool: Pool, store: StoreContext) -> Self {
        Self { pool, store }
    }

    pub fn test_connection(&self) -> Value {
        json!({
            "success": true,
            "store_url": self.store.base_url,
            "store_name": self.store.name,
            "store_code": self.store.code,
            "message": "Connection successful",
        })
    }

    /// Enabled products of every visibility; the knowledge base wants
    /// content that the storefront may hide.
    pub async fn products(
        &self,
        page_size: Option<u32>,
        current_page: Option<u32>,
    ) -> SyncResult<Value> {
        let (page_size, current_page) = paging(page_size, current_page);
        let page = catalog::enabled_products_page(&self.pool, current_page, page_size).await?;
        let products: Vec<Document> = page
            .items
            .iter()
            .map(|p| transform::compact_product_document(p, &self.store))
            .collect();
        info!(count = products.len(), page = current_page, "exported products");
        Ok(json!({
            "success": true,
            "products": products,
            "total_count": page.total,
            "page_size": page_size,
            "current_page": current_page,
        }))
    }

    pub async fn categories(&self) -> SyncResult<Value> {
        let categories: Vec<Document> = catalog::active_categories(&self.pool)
            .await?
            .iter()
            .map(|c| transform::category_to_document(c, &self.store))
            .collect();
        info!(count = categories.len(), "exported categories");
        Ok(json!({
            "success": true,
            "total_count": categories.len(),
            "categories": categories,
        }))
    }

    pub async fn cms_pages(
        &self,
        page_size: Option<u32>,
        current_page: Option<u32>,
    ) -> SyncResult<Value> {
        let (page_size, current_page) = paging(page_size, current_page);
        let page = catalog::active_cms_pages(&self.pool, current_page, page_size).await?;
        let pages: Vec<Document> = page
            .items
            .iter()
            .map(|p| transform::cms_page_to_document(p, &self.store))
            .collect();
        info!(count = pages.len(), "exported CMS pages");
        Ok(json!({
            "success": true,
            "pages": pages,
            "total_count": page.total,
            "page_size": page_size,
            "current_page": current_page,
        }))
    }
}
