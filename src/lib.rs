pub mod blog;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod import;
pub mod model;
pub mod posts;
pub mod reconcile;
pub mod remote;
pub mod server;
pub mod text;
pub mod transform;
