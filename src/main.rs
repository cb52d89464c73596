//! docdex daemon and operational CLI.
//!
//! `serve` runs the background crawl scheduler; the remaining subcommands
//! are one-shot operational helpers against the same store.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;

use docdex::config::Config;
use docdex::error::Result;
use docdex::models::RequestKind;
use docdex::pipeline::{Crawler, Resolver, Scheduler};
use docdex::services::Fetcher;
use docdex::store::{MemoryKv, RedisKv, Store};
use docdex::utils::HttpClient;

/// docdex - documentation search and indexing service
#[derive(Parser, Debug)]
#[command(name = "docdex", version, about = "Documentation search and indexing service")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Use an in-process store instead of the configured server
    #[arg(long)]
    memory_store: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the background crawl scheduler
    Serve,

    /// Crawl one import path now and print the stored synopsis
    Crawl {
        /// Import path to refresh
        path: String,
    },

    /// Block an import-path prefix and delete everything under it
    Block {
        /// Prefix to block
        prefix: String,
    },

    /// Show the most popular packages
    Popular {
        /// Number of entries to print
        #[arg(short, long, default_value_t = 25)]
        count: usize,
    },

    /// Validate the configuration file
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let default_filter = if verbose { "docdex=debug,info" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();
}

async fn open_store(config: &Config, memory: bool) -> Result<Store> {
    if memory {
        return Ok(Store::new(Arc::new(MemoryKv::new())));
    }
    let kv = RedisKv::connect(
        &config.store.server,
        Duration::from_secs(config.store.idle_timeout_secs),
    )
    .await?;
    Ok(Store::new(Arc::new(kv)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load_or_default(&cli.config);
    config.validate()?;

    if matches!(cli.command, Command::Validate) {
        info!("configuration OK");
        return Ok(());
    }

    let client = HttpClient::new(
        &config.http.user_agent,
        config.dial_timeout(),
        config.request_timeout(),
    )?;
    let store = open_store(&config, cli.memory_store).await?;
    let fetcher = Arc::new(Fetcher::new(client, &config));
    let crawler = Arc::new(Crawler::new(
        store.clone(),
        Arc::clone(&fetcher),
        config.max_age(),
    ));

    match cli.command {
        Command::Serve => {
            info!(
                crawl_interval = config.crawler.crawl_interval_secs,
                github_interval = config.crawler.github_interval_secs,
                "scheduler starting"
            );
            let scheduler = Scheduler::new(
                crawler,
                store,
                fetcher,
                Duration::from_secs(config.crawler.crawl_interval_secs),
                Duration::from_secs(config.crawler.github_interval_secs),
            );
            scheduler.run().await;
        }

        Command::Crawl { path } => {
            let resolver = Resolver::new(
                store,
                crawler,
                config.get_timeout(),
                config.first_get_timeout(),
            );
            let (pdoc, subdirs) = resolver.resolve(&path, RequestKind::Refresh).await?;
            match pdoc {
                Some(pdoc) => info!(
                    path = %pdoc.import_path,
                    name = %pdoc.name,
                    synopsis = %pdoc.synopsis,
                    "crawled"
                ),
                None => info!(path = %path, subdirs = subdirs.len(), "directory only"),
            }
        }

        Command::Block { prefix } => {
            store.block(&prefix).await?;
            info!(prefix = %prefix, "blocked");
        }

        Command::Popular { count } => {
            for package in store.popular(count).await? {
                println!("{}\t{}", package.path, package.synopsis);
            }
        }

        Command::Validate => unreachable!("handled above"),
    }

    Ok(())
}
