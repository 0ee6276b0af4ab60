use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pageviews::{CliArgs, Config, CounterState, ViewCounter, ViewsContext};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "pageviews")]
#[command(about = "Read and count page views against a views API")]
struct Cli {
    #[arg(long, help = "Views API base URL", env = "PAGEVIEWS_API_URL")]
    api_url: Option<String>,

    #[arg(short, long, help = "Path to a config file")]
    config: Option<PathBuf>,

    #[arg(short, long, help = "Increase verbosity")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the view count for a slug, counting this view
    Get {
        slug: String,
        /// Read without counting a view
        #[arg(long)]
        read_only: bool,
    },
    /// Increment the counter for a slug and print the new count
    Bump { slug: String },
    /// Read counts for several slugs in one batch call
    Batch { slugs: Vec<String> },
    /// Show the sitewide visitor count
    Visitors {
        /// Also count this visit
        #[arg(long)]
        record: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        })
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = CliArgs {
        api_url: cli.api_url.clone(),
        config_file: cli.config.clone(),
        ..Default::default()
    };
    let config = Config::load_with_cli(&args).context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let ctx = Arc::new(ViewsContext::from_config(&config).context("Failed to build context")?);

    match cli.command {
        Commands::Get { slug, read_only } => {
            let counter = ViewCounter::mount(Arc::clone(&ctx), slug, read_only).await;
            // Resolve any queued read before printing
            ctx.flush().await;
            match counter.state() {
                CounterState::Resolved(views) => println!("{}: {}", counter.slug(), views),
                CounterState::Loading => println!("{}: unavailable", counter.slug()),
            }
        }
        Commands::Bump { slug } => {
            let views = ctx
                .client()
                .increment_views(&slug)
                .await
                .context("Increment failed")?;
            println!("{}: {}", slug, views);
        }
        Commands::Batch { slugs } => {
            ctx.prefetch_views(&slugs).await;
            for slug in &slugs {
                match ctx.get_views(slug) {
                    Some(views) => println!("{}: {}", slug, views),
                    None => println!("{}: unavailable", slug),
                }
            }
        }
        Commands::Visitors { record } => {
            if record {
                let _ = ctx.record_visit().await;
            }
            let visitors = ctx
                .visitor_count()
                .await
                .context("Failed to read visitor count")?;
            println!("visitors: {}", visitors);
        }
    }

    if cli.verbose {
        ctx.metrics().log_summary();
    }

    Ok(())
}
