use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

use requestdesk_sync::blog::ExternalBlog;
use requestdesk_sync::config::{self, Config};
use requestdesk_sync::db::{self, Pool};
use requestdesk_sync::export::{self, DataExport};
use requestdesk_sync::import;
use requestdesk_sync::remote::{PostQuery, RequestDeskApi, RequestDeskClient};
use requestdesk_sync::server::{self, AppState};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the inbound API; runs the scheduled import when enabled (default)
    Serve,
    /// Import RequestDesk posts into the local blog
    Import {
        /// Remote status filter, e.g. `publish` or `draft`
        #[arg(long)]
        status: Option<String>,
        /// Remote sync-status filter, e.g. `not_synced`
        #[arg(long)]
        sync_status: Option<String>,
        #[arg(long, default_value = "1")]
        page: u32,
        #[arg(long, default_value = "20")]
        per_page: u32,
        /// Keep fetching while the remote reports more posts, up to this many pages
        #[arg(long)]
        max_pages: Option<u32>,
    },
    /// Send catalog products to the RequestDesk knowledge base
    Export {
        /// Export a single product by id
        #[arg(long, conflicts_with = "limit")]
        product: Option<i64>,
        /// Cap the number of exported products
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Check the API key against RequestDesk
    TestConnection,
    /// Ask RequestDesk for posts related to a query
    Related {
        query: String,
        #[arg(long, default_value = "5")]
        max_results: u32,
    },
    /// Run the scheduled import once and exit
    Cron,
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

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&cfg).await,
        Command::Import {
            status,
            sync_status,
            page,
            per_page,
            max_pages,
        } => {
            let pool = open_pool(&cfg).await?;
            let client = RequestDeskClient::new(&cfg.credentials()?)?;
            let store = cfg.store_context();
            let query = PostQuery {
                status,
                sync_status,
                page: page.max(1),
                per_page: per_page.max(1),
            };
            let summary = match max_pages {
                Some(max) => import::import_all(&pool, &client, &store, &query, max).await?,
                None => import::import_page(&pool, &client, &store, &query).await?,
            };
            for err in &summary.errors {
                warn!(error = %err, "post not imported");
            }
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Command::Export { product, limit } => {
            let pool = open_pool(&cfg).await?;
            let client = RequestDeskClient::new(&cfg.credentials()?)?;
            let store = cfg.store_context();
            let summary = match product {
                Some(id) => export::export_one(&pool, &client, &store, id).await?,
                None => export::export_all(&pool, &client, &store, limit).await?,
            };
            println!("{}", serde_json::to_string_pretty(&summary)?);
            Ok(())
        }
        Command::TestConnection => {
            let client = RequestDeskClient::new(&cfg.credentials()?)?;
            let info = client.test_connection().await?;
            println!("Endpoint: {}", client.base_url());
            println!("Success: {}", info.success);
            if let Some(agent) = info.agent_name {
                println!("Agent: {}", agent);
            }
            if let Some(message) = info.message {
                println!("Message: {}", message);
            }
            Ok(())
        }
        Command::Related { query, max_results } => {
            let client = RequestDeskClient::new(&cfg.credentials()?)?;
            let related = client.related_posts(&query, max_results).await?;
            println!(
                "Total: {} (confidence {:.2})",
                related.total, related.confidence
            );
            for post in related.posts {
                let title = post.get("title").and_then(|t| t.as_str()).unwrap_or("-");
                let id = post.get("id").map(|v| v.to_string()).unwrap_or_default();
                println!("  {} -> {}", id, title);
            }
            Ok(())
        }
        Command::Cron => {
            let pool = open_pool(&cfg).await?;
            let client = RequestDeskClient::new(&cfg.credentials()?)?;
            match import::run_scheduled(&pool, &client, &cfg.store_context(), &cfg.cron).await? {
                Some(summary) => println!("{}", serde_json::to_string_pretty(&summary)?),
                None => println!("Scheduled import is disabled"),
            }
            Ok(())
        }
    }
}

async fn open_pool(cfg: &Config) -> Result<Pool> {
    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;
    Ok(pool)
}

async fn serve(cfg: &Config) -> Result<()> {
    let pool = open_pool(cfg).await?;
    let store = cfg.store_context();

    // Scheduled import runs beside the server on its own interval.
    if cfg.cron.enabled {
        match cfg.credentials().and_then(|c| RequestDeskClient::new(&c)) {
            Ok(client) => {
                let worker_pool = pool.clone();
                let worker_store = store.clone();
                let cron = cfg.cron.clone();
                tokio::spawn(async move {
                    let mut ticker =
                        tokio::time::interval(Duration::from_secs(cron.interval_seconds));
                    loop {
                        ticker.tick().await;
                        match import::run_scheduled(&worker_pool, &client, &worker_store, &cron)
                            .await
                        {
                            Ok(Some(summary)) => info!(
                                processed = summary.processed(),
                                failed = summary.failed,
                                "scheduled import done"
                            ),
                            Ok(None) => {}
                            Err(err) => error!(%err, "scheduled import failed"),
                        }
                    }
                });
            }
            Err(err) => warn!(%err, "scheduled import disabled"),
        }
    }

    let state = AppState {
        blog: ExternalBlog::new(pool.clone(), store.clone(), cfg.api_key()),
        export: DataExport::new(pool, store),
    };
    info!(store = %cfg.store.code, "starting RequestDesk sync service");
    server::serve(&cfg.server.bind, state).await
}
