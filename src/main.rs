mod bot;
mod cache;
mod config;
mod evaluator;
mod fetcher;
mod mastodon;
mod notifier;
mod render;
mod schedule;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};

use bot::Bot;
use cache::CacheStore;
use fetcher::Spla2Client;
use mastodon::MastodonClient;
use notifier::MastodonNotifier;

#[derive(Parser)]
#[command(
    name = "kombu-area-bot",
    version,
    about = "Posts to Mastodon when the watched Splatoon 2 rotation comes up"
)]
struct Cli {
    #[arg(
        short,
        long,
        default_value = "~/.kombu-area-bot/config.toml",
        env = "KOMBU_CONFIG"
    )]
    config: String,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// One polling pass: fetch or reuse the schedule, post what is due, persist
    Run,
    /// Write a config file template
    Init,
    /// Register this bot as an OAuth app on the configured server
    Register,
    /// Show the watched target and cached schedule state
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(&cli.config).await?,
        Commands::Init => {
            let path = config::init_config_file()?;
            tracing::info!("Wrote config template to {}", path.display());
        }
        Commands::Register => register(&cli.config).await?,
        Commands::Status => status(&cli.config)?,
    }
    Ok(())
}

async fn run(config_path: &str) -> Result<()> {
    let config = config::load(config_path)?;
    config.mastodon.require_credentials()?;

    let ttl = config.cache.ttl();
    let cache = CacheStore::new(config.cache.resolved_path());
    let bot = Bot::new(
        Box::new(Spla2Client::new(&config.api)),
        cache,
        Box::new(MastodonNotifier::new(config.mastodon)),
        config.target,
        ttl,
    );
    bot.run().await
}

async fn register(config_path: &str) -> Result<()> {
    let config = config::load(config_path)?;
    let client = MastodonClient::new(&config.mastodon.server);
    let app = client
        .register_app(env!("CARGO_PKG_NAME"), config.mastodon.website.as_deref())
        .await?;

    println!("Registered on {}", config.mastodon.server);
    println!("Put these under [mastodon] in your config file:");
    println!("client_id = \"{}\"", app.client_id);
    println!("client_secret = \"{}\"", app.client_secret);
    Ok(())
}

fn status(config_path: &str) -> Result<()> {
    let config = config::load(config_path)?;
    let cache = CacheStore::new(config.cache.resolved_path());
    let offset = config.target.offset();
    let now = Utc::now();

    println!("watching {} on {}", config.target.rule, config.target.map);
    let Some(snapshot) = cache.load()? else {
        println!("cache: none");
        return Ok(());
    };

    match snapshot.fetched_at {
        Some(at) => {
            let state = if snapshot.is_stale(now, config.cache.ttl()) {
                "stale"
            } else {
                "fresh"
            };
            println!("cache: {state}, fetched at {}", render::format_time(at, offset));
        }
        None => println!("cache: present, never fetched"),
    }
    if let Some(at) = snapshot.last_summary_at {
        println!("last summary posted at {}", render::format_time(at, offset));
    }

    for window in &snapshot.windows {
        let watched = window.matches(&config.target.rule, &config.target.map);
        println!("  {}", render::status_line(window, watched, offset));
    }
    Ok(())
}
