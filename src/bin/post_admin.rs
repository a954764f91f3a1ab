use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use requestdesk_sync::config;
use requestdesk_sync::db;
use requestdesk_sync::model::PostStatus;
use requestdesk_sync::posts::{self, PostInput};
use requestdesk_sync::text::slugify;

#[derive(Parser, Debug)]
#[command(author, version, about = "Local blog post maintenance")]
struct Args {
    /// Path to YAML config
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a post, or overwrite the one carrying the same external id
    Save {
        #[arg(long)]
        title: String,
        #[arg(long)]
        content: String,
        /// Defaults to the slugified title
        #[arg(long)]
        url_key: Option<String>,
        #[arg(long)]
        meta_title: Option<String>,
        #[arg(long)]
        meta_description: Option<String>,
        #[arg(long)]
        featured_image: Option<String>,
        #[arg(long)]
        author: Option<String>,
        #[arg(long)]
        published: bool,
        #[arg(long)]
        external_id: Option<String>,
        /// Comma-separated product ids to link
        #[arg(long, value_delimiter = ',')]
        products: Vec<i64>,
    },
    /// Replace the products linked to a post
    Link {
        post_id: i64,
        #[arg(value_delimiter = ',')]
        product_ids: Vec<i64>,
    },
    /// Print the products linked to a post
    Linked { post_id: i64 },
    /// Print the posts linked to a product
    ByProduct { product_id: i64 },
    /// Set a post's sync status (pending, synced, failed)
    SyncStatus { post_id: i64, status: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;
    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    match args.command {
        Command::Save {
            title,
            content,
            url_key,
            meta_title,
            meta_description,
            featured_image,
            author,
            published,
            external_id,
            products,
        } => {
            let input = PostInput {
                url_key: url_key.unwrap_or_else(|| slugify(&title)),
                title,
                content,
                meta_title,
                meta_description,
                featured_image,
                status: PostStatus::from_published(published),
                author,
                store_id: cfg.store.id,
                external_id,
                product_ids: Some(products),
            };
            let post = posts::create_or_update(&pool, &input).await?;
            println!("{}\t{}\t{}", post.id, post.url_key, post.sync_status.as_str());
        }
        Command::Link {
            post_id,
            product_ids,
        } => posts::link_products(&pool, post_id, &product_ids).await?,
        Command::Linked { post_id } => {
            for id in posts::get_linked_products(&pool, post_id).await? {
                println!("{}", id);
            }
        }
        Command::ByProduct { product_id } => {
            for post in posts::get_posts_by_product(&pool, product_id).await? {
                println!("{}\t{}\t{}", post.id, post.url_key, post.title);
            }
        }
        Command::SyncStatus { post_id, status } => {
            let post = posts::update_sync_status(&pool, post_id, &status).await?;
            println!("{}\t{}", post.id, post.sync_status.as_str());
        }
    }
    Ok(())
}
