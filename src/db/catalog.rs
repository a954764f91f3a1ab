//! Read-only queries over the catalog mirror (products, categories, CMS pages).

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::{instrument, warn};

use super::model::{offset, Page};
use super::repo::Pool;
use crate::model::{visibility, Category, CmsPage, Product};

const PRODUCT_COLUMNS: &str = "id, sku, name, type_id, status, visibility, price, special_price, \
     weight, short_description, description, meta_keyword, url_key, image, created_at, updated_at";

fn opt_string(row: &SqliteRow, col: &str) -> Option<String> {
    row.try_get::<Option<String>, _>(col)
        .ok()
        .flatten()
        .filter(|s| !s.trim().is_empty())
}

fn opt_time(row: &SqliteRow, col: &str) -> Option<DateTime<Utc>> {
    row.try_get::<Option<DateTime<Utc>>, _>(col).ok().flatten()
}

fn product_from_row(row: &SqliteRow) -> Product {
    Product {
        id: row.get("id"),
        sku: row.get("sku"),
        name: row.get("name"),
        type_id: row.get("type_id"),
        enabled: row.get::<i64, _>("status") == 1,
        visibility: row.get("visibility"),
        price: row.try_get::<Option<f64>, _>("price").ok().flatten(),
        special_price: row.try_get::<Option<f64>, _>("special_price").ok().flatten(),
        weight: row.try_get::<Option<f64>, _>("weight").ok().flatten(),
        short_description: opt_string(row, "short_description"),
        description: opt_string(row, "description"),
        meta_keyword: opt_string(row, "meta_keyword"),
        url_key: opt_string(row, "url_key"),
        image: opt_string(row, "image"),
        gallery: None,
        category_ids: Vec::new(),
        created_at: opt_time(row, "created_at"),
        updated_at: opt_time(row, "updated_at"),
    }
}

/// Attach gallery images and category IDs. A gallery read failure leaves
/// `gallery` as `None` so the transformer falls back to the main image.
async fn hydrate(pool: &Pool, mut product: Product) -> Result<Product> {
    match sqlx::query_scalar::<_, String>(
        "SELECT url FROM catalog_product_images WHERE product_id = ? ORDER BY position ASC",
    )
    .bind(product.id)
    .fetch_all(pool)
    .await
    {
        Ok(urls) => product.gallery = Some(urls),
        Err(err) => {
            warn!(?err, product_id = product.id, "gallery unavailable; using main image");
            product.gallery = None;
        }
    }

    product.category_ids = sqlx::query_scalar(
        "SELECT category_id FROM catalog_product_categories WHERE product_id = ? ORDER BY category_id",
    )
    .bind(product.id)
    .fetch_all(pool)
    .await?;
    Ok(product)
}

/// Enabled products that are visible somewhere in the storefront, by id.
#[instrument(skip_all)]
pub async fn eligible_products(pool: &Pool, limit: Option<u32>) -> Result<Vec<Product>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM catalog_products WHERE status = 1 AND visibility != ? \
         ORDER BY id ASC LIMIT ?",
        PRODUCT_COLUMNS
    ))
    .bind(visibility::NOT_VISIBLE)
    .bind(limit.map(i64::from).unwrap_or(-1))
    .fetch_all(pool)
    .await?;

    let mut products = Vec::with_capacity(rows.len());
    for row in &rows {
        products.push(hydrate(pool, product_from_row(row)).await?);
    }
    Ok(products)
}

/// All enabled products regardless of visibility, paginated.
#[instrument(skip_all)]
pub async fn enabled_products_page(pool: &Pool, page: u32, per_page: u32) -> Result<Page<Product>> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM catalog_products WHERE status = 1")
        .fetch_one(pool)
        .await?;
    let rows = sqlx::query(&format!(
        "SELECT {} FROM catalog_products WHERE status = 1 ORDER BY id ASC LIMIT ? OFFSET ?",
        PRODUCT_COLUMNS
    ))
    .bind(per_page as i64)
    .bind(offset(page, per_page))
    .fetch_all(pool)
    .await?;

    let mut items = Vec::with_capacity(rows.len());
    for row in &rows {
        items.push(hydrate(pool, product_from_row(row)).await?);
    }
    Ok(Page {
        items,
        total,
        page: page.max(1),
        per_page,
    })
}

pub async fn product_by_id(pool: &Pool, id: i64) -> Result<Option<Product>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM catalog_products WHERE id = ?",
        PRODUCT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    match row {
        Some(row) => Ok(Some(hydrate(pool, product_from_row(&row)).await?)),
        None => Ok(None),
    }
}

/// Category id → display name, for resolving product category lists.
pub async fn category_names(pool: &Pool) -> Result<HashMap<i64, String>> {
    let rows = sqlx::query("SELECT id, name FROM catalog_categories")
        .fetch_all(pool)
        .await?;
    Ok(rows
        .iter()
        .map(|row| (row.get::<i64, _>("id"), row.get::<String, _>("name")))
        .collect())
}

/// Active, non-root categories with their product counts.
#[instrument(skip_all)]
pub async fn active_categories(pool: &Pool) -> Result<Vec<Category>> {
    let rows = sqlx::query(
        "SELECT c.id, c.name, c.path, c.level, c.position, c.is_active, c.url_key, c.description, \
                (SELECT COUNT(*) FROM catalog_product_categories pc WHERE pc.category_id = c.id) AS product_count \
         FROM catalog_categories c WHERE c.is_active = 1 AND c.level > 1 ORDER BY c.path ASC",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows
        .iter()
        .map(|row| Category {
            id: row.get("id"),
            name: row.get("name"),
            path: row.get("path"),
            level: row.get("level"),
            position: row.get("position"),
            is_active: row.get::<i64, _>("is_active") == 1,
            url_key: opt_string(row, "url_key"),
            description: opt_string(row, "description"),
            product_count: row.get("product_count"),
        })
        .collect())
}

#[instrument(skip_all)]
pub async fn active_cms_pages(pool: &Pool, page: u32, per_page: u32) -> Result<Page<CmsPage>> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cms_pages WHERE is_active = 1")
        .fetch_one(pool)
        .await?;
    let rows = sqlx::query(
        "SELECT id, identifier, title, content, is_active, meta_title, meta_keywords, \
                meta_description, creation_time, update_time \
         FROM cms_pages WHERE is_active = 1 ORDER BY id ASC LIMIT ? OFFSET ?",
    )
    .bind(per_page as i64)
    .bind(offset(page, per_page))
    .fetch_all(pool)
    .await?;
    let items = rows
        .iter()
        .map(|row| CmsPage {
            id: row.get("id"),
            identifier: opt_string(row, "identifier"),
            title: row.get("title"),
            content: row.get("content"),
            is_active: row.get::<i64, _>("is_active") == 1,
            meta_title: opt_string(row, "meta_title"),
            meta_keywords: opt_string(row, "meta_keywords"),
            meta_description: opt_string(row, "meta_description"),
            creation_time: opt_time(row, "creation_time"),
            update_time: opt_time(row, "update_time"),
        })
        .collect();
    Ok(Page {
        items,
        total,
        page: page.max(1),
        per_page,
    })
}
