//! sitesearch CLI entry point

use clap::{Parser, Subcommand};
use sitesearch::{
    commands::{
        cmd_init, cmd_search, cmd_statistics, print_crawl_reports, print_indexing_response,
        print_search_results, print_statistics, IndexingService, SearchOptions,
    },
    config::Config,
    error::{Error, Result},
    store::IndexStore,
};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "sitesearch")]
#[command(version, about = "Crawl web sites into a lemma index and search them", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration and create the index database
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// Crawl and index every configured site (Ctrl-C stops the crawl)
    Crawl,

    /// Fetch and index a single page of a configured site
    IndexPage {
        /// Absolute URL of the page
        url: String,
    },

    /// Search the index
    Search {
        /// The search query
        query: String,

        /// Restrict results to one site URL
        #[arg(long)]
        site: Option<String>,

        /// Results to skip
        #[arg(long, default_value = "0")]
        offset: usize,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show index statistics
    Stats,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    if cli.log_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }

    if let Commands::Init { force } = cli.command {
        return handle_init(cli.config, force).await;
    }

    let config = load_config(cli.config.as_deref())?;
    let store = IndexStore::connect(&config).await?;

    match cli.command {
        Commands::Init { .. } => unreachable!(),

        Commands::Crawl => {
            let service = IndexingService::new(config, store);
            let response = service.start_crawl().await;
            if !response.result {
                print_or_json(cli.json, &response, |r| print_indexing_response("Crawl", r))?;
                return Ok(());
            }

            let control = service.control();
            let waiter = service.wait_for_completion();
            tokio::pin!(waiter);

            let reports = tokio::select! {
                reports = &mut waiter => reports,
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, stopping crawl");
                    control.request_stop();
                    waiter.await
                }
            };

            print_or_json(cli.json, &reports, |r| print_crawl_reports(r))?;
        }

        Commands::IndexPage { url } => {
            let service = IndexingService::new(config, store);
            let response = service.index_single_page(&url).await;
            print_or_json(cli.json, &response, |r| print_indexing_response("Index page", r))?;
        }

        Commands::Search {
            query,
            site,
            offset,
            limit,
        } => {
            let options = SearchOptions {
                site,
                offset,
                limit,
            };
            let response = cmd_search(&config, &store, &query, options).await?;
            print_or_json(cli.json, &response, print_search_results)?;
        }

        Commands::Stats => {
            let response = cmd_statistics(&store).await?;
            print_or_json(cli.json, &response, print_statistics)?;
        }
    }

    Ok(())
}

fn print_or_json<T: serde::Serialize + ?Sized>(
    json: bool,
    value: &T,
    print: impl FnOnce(&T),
) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print(value);
    }
    Ok(())
}

async fn handle_init(config_path: Option<PathBuf>, force: bool) -> Result<()> {
    // A config path names either a .toml file or the base directory
    let base_dir = config_path.map(|path| {
        if path.extension().map_or(false, |e| e == "toml") {
            path.parent()
                .map(PathBuf::from)
                .unwrap_or_else(Config::default_base_dir)
        } else {
            path
        }
    });

    let config = cmd_init(base_dir, force).await?;

    println!("✓ sitesearch initialized successfully");
    println!("  Config: {}", config.paths.config_file.display());
    println!("  Index:  {}", config.paths.db_file.display());
    println!("\nNext steps:");
    println!("  1. List the sites to index under [[sites]] in the config file");
    println!("  2. Crawl them: sitesearch crawl");
    println!("  3. Search: sitesearch search \"your query\"");

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config_path = path
        .map(PathBuf::from)
        .unwrap_or_else(Config::default_config_path);

    if !config_path.exists() {
        return Err(Error::Config(format!(
            "Config file not found: {}. Run 'sitesearch init' first.",
            config_path.display()
        )));
    }

    Config::load(&config_path)
}
