//! Store entity → outbound [`Document`] conversion.
//!
//! Everything here is pure: callers load entities and the store context,
//! these functions only shape them.

use std::collections::HashMap;

use serde_json::{json, Map, Value};

use crate::config::StoreContext;
use crate::model::{Category, CmsPage, Document, Post, Product, SourceType};
use crate::text::{format_number, format_price, slugify, strip_tags};

/// Placeholder the catalog stores when a product has no main image.
const NO_SELECTION: &str = "no_selection";

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| *v != 0.0)
}

/// Storefront URL of a product: `{base}/{url_key or sku}.html`.
pub fn product_url(product: &Product, store: &StoreContext) -> String {
    let key = non_empty(&product.url_key).unwrap_or(product.sku.as_str());
    if key.trim().is_empty() {
        return String::new();
    }
    format!("{}/{}.html", store.trimmed_base(), key)
}

fn main_image_url(product: &Product, store: &StoreContext) -> Option<String> {
    non_empty(&product.image)
        .filter(|img| *img != NO_SELECTION)
        .map(|img| format!("{}catalog/product{}", store.media_url, img))
}

/// Gallery URLs in order; the main image when the gallery was unreadable.
pub fn product_images(product: &Product, store: &StoreContext) -> Vec<String> {
    match &product.gallery {
        Some(urls) => urls.clone(),
        None => main_image_url(product, store).into_iter().collect(),
    }
}

/// Markdown-ish body with one section per populated attribute group.
pub fn product_content(product: &Product) -> String {
    let mut parts = vec![format!("# {}", product.name)];

    if let Some(short) = non_empty(&product.short_description) {
        parts.push(format!("\n## Overview\n{}", strip_tags(short)));
    }
    if let Some(desc) = non_empty(&product.description) {
        parts.push(format!("\n## Description\n{}", strip_tags(desc)));
    }

    let mut details = Vec::new();
    if !product.sku.is_empty() {
        details.push(format!("SKU: {}", product.sku));
    }
    if let Some(price) = positive(product.price) {
        details.push(format!("Price: ${}", format_price(price, true)));
    }
    if let Some(special) = positive(product.special_price) {
        details.push(format!("Sale Price: ${}", format_price(special, true)));
    }
    if let Some(weight) = positive(product.weight) {
        details.push(format!("Weight: {}", format_number(weight)));
    }
    if !details.is_empty() {
        parts.push(format!("\n## Product Details\n{}", details.join("\n")));
    }

    if let Some(keywords) = non_empty(&product.meta_keyword) {
        parts.push(format!("\n## Keywords\n{}", keywords));
    }

    parts.join("\n")
}

/// Full document used by the push export.
pub fn product_to_document(
    product: &Product,
    category_names: &HashMap<i64, String>,
    store: &StoreContext,
) -> Document {
    let images = product_images(product, store);
    let categories: Vec<&String> = product
        .category_ids
        .iter()
        .filter_map(|id| category_names.get(id))
        .collect();

    let mut metadata = Map::new();
    metadata.insert("sku".into(), json!(product.sku));
    metadata.insert(
        "price".into(),
        json!(format_price(product.price.unwrap_or(0.0), false)),
    );
    metadata.insert(
        "special_price".into(),
        json!(positive(product.special_price).map(|p| format_price(p, false))),
    );
    metadata.insert("product_type".into(), json!(product.type_id));
    metadata.insert(
        "status".into(),
        json!(if product.enabled { "enabled" } else { "disabled" }),
    );
    metadata.insert("visibility".into(), json!(product.visibility));
    metadata.insert("categories".into(), json!(categories));
    metadata.insert("thumbnail".into(), json!(images.first()));
    metadata.insert("images".into(), json!(images));
    metadata.insert("weight".into(), json!(product.weight));
    metadata.insert("created_at".into(), json!(product.created_at));
    metadata.insert("updated_at".into(), json!(product.updated_at));
    metadata.insert("store_url".into(), json!(store.trimmed_base()));
    metadata.insert("magento_id".into(), json!(product.id));

    Document {
        source_id: SourceType::EcommerceProduct.source_id(product.id),
        source_type: SourceType::EcommerceProduct,
        title: product.name.clone(),
        content: product_content(product),
        url: product_url(product, store),
        metadata,
        extra: Map::new(),
    }
}

/// Short product form served by the pull API.
pub fn compact_product_document(product: &Product, store: &StoreContext) -> Document {
    let mut parts = vec![format!("Product: {}", product.name)];
    if !product.sku.is_empty() {
        parts.push(format!("SKU: {}", product.sku));
    }
    if let Some(price) = positive(product.price) {
        parts.push(format!("Price: ${}", format_price(price, true)));
    }
    if let Some(short) = non_empty(&product.short_description) {
        parts.push(format!("\n{}", strip_tags(short)));
    }
    if let Some(desc) = non_empty(&product.description) {
        parts.push(format!("\n{}", strip_tags(desc)));
    }

    let mut metadata = Map::new();
    metadata.insert("magento_id".into(), json!(product.id));
    metadata.insert("sku".into(), json!(product.sku));
    metadata.insert("type_id".into(), json!(product.type_id));
    metadata.insert("status".into(), json!(if product.enabled { 1 } else { 2 }));
    metadata.insert("visibility".into(), json!(product.visibility));
    metadata.insert("created_at".into(), json!(product.created_at));
    metadata.insert("updated_at".into(), json!(product.updated_at));

    let mut extra = Map::new();
    extra.insert(
        "featured_image".into(),
        json!(main_image_url(product, store).unwrap_or_default()),
    );
    extra.insert("sku".into(), json!(product.sku));
    extra.insert("price".into(), json!(product.price.unwrap_or(0.0)));

    Document {
        source_id: SourceType::EcommerceProduct.source_id(product.id),
        source_type: SourceType::EcommerceProduct,
        title: product.name.clone(),
        content: parts.join("\n"),
        url: product_url(product, store),
        metadata,
        extra,
    }
}

pub fn category_to_document(category: &Category, store: &StoreContext) -> Document {
    let mut content = format!("Category: {}\nPath: {}", category.name, category.path);
    if let Some(desc) = non_empty(&category.description) {
        content.push('\n');
        content.push_str(&strip_tags(desc));
    }

    let key = non_empty(&category.url_key)
        .map(str::to_string)
        .unwrap_or_else(|| slugify(&category.name));

    let mut metadata = Map::new();
    metadata.insert("magento_id".into(), json!(category.id));
    metadata.insert("path".into(), json!(category.path));
    metadata.insert("level".into(), json!(category.level));
    metadata.insert("position".into(), json!(category.position));
    metadata.insert("is_active".into(), json!(category.is_active));
    metadata.insert("product_count".into(), json!(category.product_count));

    Document {
        source_id: SourceType::Category.source_id(category.id),
        source_type: SourceType::Category,
        title: category.name.clone(),
        content,
        url: format!("{}/{}.html", store.trimmed_base(), key),
        metadata,
        extra: Map::new(),
    }
}

/// CMS pages keep their raw markup.
pub fn cms_page_to_document(page: &CmsPage, store: &StoreContext) -> Document {
    let url = non_empty(&page.identifier)
        .map(|id| format!("{}/{}", store.trimmed_base(), id))
        .unwrap_or_default();

    let mut metadata = Map::new();
    metadata.insert("magento_id".into(), json!(page.id));
    metadata.insert("identifier".into(), json!(page.identifier));
    metadata.insert("is_active".into(), json!(page.is_active));
    metadata.insert("creation_time".into(), json!(page.creation_time));
    metadata.insert("update_time".into(), json!(page.update_time));
    metadata.insert("meta_title".into(), json!(page.meta_title));
    metadata.insert("meta_keywords".into(), json!(page.meta_keywords));
    metadata.insert("meta_description".into(), json!(page.meta_description));

    Document {
        source_id: SourceType::CmsPage.source_id(page.id),
        source_type: SourceType::CmsPage,
        title: page.title.clone(),
        content: page.content.clone(),
        url,
        metadata,
        extra: Map::new(),
    }
}

/// Storefront view URL reported back after an import.
pub fn post_view_url(post_id: i64, store: &StoreContext) -> String {
    format!("{}blog/post/view/id/{}", store.base_url, post_id)
}

/// JSON shape of a post in inbound API responses.
pub fn post_record(post: &Post, store: &StoreContext) -> Value {
    json!({
        "id": post.id,
        "title": post.title,
        "content": post.content,
        "slug": post.url_key,
        "author": post.author,
        "seo_title": post.meta_title,
        "seo_description": post.meta_description,
        "featured_image": post.featured_image,
        "status": post.status.label(),
        "requestdesk_post_id": post.external_id,
        "sync_status": post.sync_status.as_str(),
        "last_sync": post.last_sync_at,
        "created_at": post.created_at,
        "updated_at": post.updated_at,
        "url": format!("{}blog/post/{}", store.base_url, post.url_key),
    })
}
