//! Operator CLI for shortlink-relay.
//!
//! Inspects and administers links, the click ledger and dead letters directly
//! against the database, without going through the HTTP API.
//!
//! # Usage
//!
//! ```bash
//! # Show a link
//! cargo run --bin linkctl -- link show abc123
//!
//! # Disable / re-enable a link
//! cargo run --bin linkctl -- link disable abc123
//! cargo run --bin linkctl -- link enable abc123
//!
//! # Set or clear an expiry
//! cargo run --bin linkctl -- link expire abc123 2030-01-01T00:00:00Z
//! cargo run --bin linkctl -- link expire abc123 never
//!
//! # Ledger counters and recent dead letters
//! cargo run --bin linkctl -- stats
//! cargo run --bin linkctl -- dead-letters --limit 20
//!
//! # Check database connection
//! cargo run --bin linkctl -- db check
//! ```
//!
//! # Environment Variables
//!
//! - `DATABASE_URL` (or `DB_*` components, required): PostgreSQL connection string
//! - `REDIS_URL` (optional): when set, mutations also drop the cached record
//!
//! Without Redis, servers pick up a mutation once their cached copy expires.

use shortlink_relay::application::services::{LinkService, LinkSettings};
use shortlink_relay::config::Config;
use shortlink_relay::domain::entities::ShortLink;
use shortlink_relay::domain::repositories::{ClickRepository, LinkRepository};
use shortlink_relay::infrastructure::cache::{CacheService, NullCache, RedisCache};
use shortlink_relay::infrastructure::persistence::{PgClickRepository, PgLinkRepository};
use shortlink_relay::utils::code_generator::{RandomCodeGenerator, validate_code};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use colored::*;
use dialoguer::Confirm;
use sqlx::PgPool;
use std::sync::Arc;

/// CLI tool for operating shortlink-relay.
#[derive(Parser)]
#[command(name = "linkctl")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect or change a single link
    Link {
        #[command(subcommand)]
        action: LinkAction,
    },

    /// Show link and ledger counters
    Stats,

    /// List recent dead-lettered click messages
    DeadLetters {
        /// Maximum number of entries to show
        #[arg(short, long, default_value_t = 20)]
        limit: i64,
    },

    /// Database operations
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
}

#[derive(Subcommand)]
enum LinkAction {
    /// Show a link
    Show { code: String },

    /// Stop a link from resolving (answers 410)
    Disable {
        code: String,

        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },

    /// Let a disabled link resolve again
    Enable { code: String },

    /// Set an RFC 3339 expiry, or `never` to clear it
    Expire { code: String, at: String },
}

#[derive(Subcommand)]
enum DbAction {
    /// Check database connection
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let pool = PgPool::connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    match cli.command {
        Commands::Link { action } => handle_link_action(action, &config, &pool).await?,
        Commands::Stats => handle_stats(&pool).await?,
        Commands::DeadLetters { limit } => handle_dead_letters(&pool, limit).await?,
        Commands::Db { action } => handle_db_action(action, &pool).await?,
    }

    Ok(())
}

/// Builds a [`LinkService`] over the database and, when configured, the shared cache.
async fn link_service(config: &Config, pool: &PgPool) -> LinkService {
    let cache: Arc<dyn CacheService> = match &config.redis_url {
        Some(url) => match RedisCache::connect(url).await {
            Ok(cache) => Arc::new(cache),
            Err(e) => {
                println!(
                    "{} {}",
                    "⚠️  Redis unavailable, cached copies expire with their TTL:".yellow(),
                    e
                );
                Arc::new(NullCache::new())
            }
        },
        None => Arc::new(NullCache::new()),
    };

    let links: Arc<dyn LinkRepository> = Arc::new(PgLinkRepository::new(Arc::new(pool.clone())));

    LinkService::new(
        links,
        cache,
        Arc::new(RandomCodeGenerator::default()),
        LinkSettings {
            base_url: config.base_url.clone(),
            max_attempts: config.shorten_max_attempts,
            cache_ttl: config.cache_ttl(),
        },
    )
}

async fn handle_link_action(action: LinkAction, config: &Config, pool: &PgPool) -> Result<()> {
    let service = link_service(config, pool).await;

    match action {
        LinkAction::Show { code } => {
            validate_code(&code)?;
            let link = service.get_link(&code).await?;
            print_link(&link, &service.short_url(&link.short_code));
        }
        LinkAction::Disable { code, yes } => {
            validate_code(&code)?;
            let link = service.get_link(&code).await?;
            if !link.active {
                println!("{}", "⚠️  This link is already disabled".yellow());
                return Ok(());
            }

            println!("  Code: {}", link.short_code.cyan());
            println!("  URL:  {}", link.original_url.bright_white());
            println!();

            if !yes {
                let confirmed = Confirm::new()
                    .with_prompt("Disable this link?")
                    .default(false)
                    .interact()?;

                if !confirmed {
                    println!("{}", "❌ Cancelled".red());
                    return Ok(());
                }
            }

            service.set_active(&code, false).await?;
            println!("{}", "✅ Link disabled".green().bold());
        }
        LinkAction::Enable { code } => {
            validate_code(&code)?;
            service.set_active(&code, true).await?;
            println!("{}", "✅ Link enabled".green().bold());
        }
        LinkAction::Expire { code, at } => {
            validate_code(&code)?;
            let expires_at = parse_expiry(&at)?;
            let link = service.set_expiry(&code, expires_at).await?;

            match link.expires_at {
                Some(at) => println!(
                    "{} {}",
                    "✅ Link expires at".green().bold(),
                    at.to_rfc3339().bright_white()
                ),
                None => println!("{}", "✅ Expiry cleared".green().bold()),
            }
        }
    }

    Ok(())
}

fn parse_expiry(raw: &str) -> Result<Option<DateTime<Utc>>> {
    if raw.eq_ignore_ascii_case("never") {
        return Ok(None);
    }

    let at = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("'{}' is neither an RFC 3339 timestamp nor 'never'", raw))?;
    Ok(Some(at.with_timezone(&Utc)))
}

fn print_link(link: &ShortLink, short_url: &str) {
    let status = if !link.active {
        "DISABLED".red()
    } else if link.is_expired() {
        "EXPIRED".yellow()
    } else {
        "ACTIVE".green()
    };

    println!("{}", "🔗 Link".bright_blue().bold());
    println!();
    println!("  ID:        {}", link.id.to_string().bright_black());
    println!("  Code:      {}", link.short_code.cyan());
    println!("  Short URL: {}", short_url.bright_white());
    println!("  URL:       {}", link.original_url.bright_white());
    println!("  Clicks:    {}", link.clicks.to_string().bright_green().bold());
    println!(
        "  Created:   {}",
        link.created_at.format("%Y-%m-%d %H:%M").to_string().bright_black()
    );
    println!(
        "  Expires:   {}",
        link.expires_at
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string())
            .bright_black()
    );
    println!("  Status:    {}", status);
    println!();
}

/// Displays link and ledger counters.
///
/// `Clicks` is the sum of link counters; `Ledger rows` should match it unless
/// links were deleted together with their ledger rows.
async fn handle_stats(pool: &PgPool) -> Result<()> {
    println!("{}", "📊 Statistics".bright_blue().bold());
    println!();

    let repo = PgClickRepository::new(Arc::new(pool.clone()));
    let summary = repo.ledger_summary().await?;

    println!(
        "  Links:         {}",
        summary.links.to_string().bright_green().bold()
    );
    println!(
        "  Clicks:        {}",
        summary.total_clicks.to_string().bright_green().bold()
    );
    println!(
        "  Ledger rows:   {}",
        summary.ledger_rows.to_string().bright_green().bold()
    );

    let dead_letters = summary.dead_letters.to_string();
    let dead_letters = if summary.dead_letters > 0 {
        dead_letters.red().bold()
    } else {
        dead_letters.bright_green().bold()
    };
    println!("  Dead letters:  {}", dead_letters);
    println!();

    Ok(())
}

async fn handle_dead_letters(pool: &PgPool, limit: i64) -> Result<()> {
    println!("{}", "📭 Dead letters".bright_blue().bold());
    println!();

    let repo = PgClickRepository::new(Arc::new(pool.clone()));
    let entries = repo.list_dead_letters(limit.max(1)).await?;

    if entries.is_empty() {
        println!("{}", "  No dead letters".green());
        println!();
        return Ok(());
    }

    println!(
        "  {:<12} {:<24} {:<8} {}",
        "Source".bright_white().bold(),
        "Message".bright_white().bold(),
        "Tries".bright_white().bold(),
        "Reason".bright_white().bold()
    );
    println!("  {}", "─".repeat(75).bright_black());

    for entry in &entries {
        println!(
            "  {:<12} {:<24} {:<8} {}",
            entry.source.cyan(),
            entry.message_id.bright_black(),
            entry.attempts.to_string().yellow(),
            entry.reason
        );
        println!("    {}", entry.payload.bright_black());
    }

    println!();
    println!(
        "  Shown: {}",
        entries.len().to_string().bright_white().bold()
    );
    println!();

    Ok(())
}

async fn handle_db_action(action: DbAction, pool: &PgPool) -> Result<()> {
    match action {
        DbAction::Check => {
            println!("{}", "🔍 Checking database connection...".bright_blue());

            let repo = PgLinkRepository::new(Arc::new(pool.clone()));
            repo.ping().await?;

            println!("{}", "✅ Database connection OK".green().bold());
        }
    }

    Ok(())
}
