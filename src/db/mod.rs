//! Database module: row mapping and SQL repositories.
//!
//! This module is split into three submodules:
//! - `model`: row decoding and list/page view models returned by repositories.
//! - `repo`: pool setup plus SQL for posts and their product links.
//! - `catalog`: read-only queries over the product/category/CMS mirror.
//!
//! Callers import from `requestdesk_sync::db`; the repository API is
//! re-exported here.

pub mod catalog;
pub mod model;
pub mod repo;

pub use repo::*;

pub use model::{Page, PostListFilter};
