//! # Psalter
//!
//! Runs scripted scenarios for each store against a seeded in-process
//! gateway and prints what the stores hold after every step.
//!
//! ```text
//! psalter roles
//! psalter --once-policy success setlist
//! RUST_LOG=psalter_sdk=debug psalter all
//! ```

mod display;
mod scenarios;

use clap::{Parser, Subcommand};
use psalter_sdk::{OncePolicy, StoreConfig, StoreConfigBuilder, StoreError};
use std::future::Future;
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

// ─── CLI ───────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "psalter")]
#[command(about = "Scenario runner for the Psalter church stores")]
#[command(version)]
struct Cli {
    /// Setlists fetched per page
    #[arg(long, default_value_t = 50)]
    page_size: u32,

    /// When a once-only load counts as done: `attempt` or `success`
    #[arg(long, default_value = "attempt")]
    once_policy: OncePolicy,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Roles, assignments and permission coverage
    Roles,
    /// Setlist list filters and a builder session
    Setlist,
    /// Skill catalogue, assignments and a rejected delete
    Skills,
    /// API keys and the Elvanto import
    Settings,
    /// Pushed events from another client folding into the caches
    Realtime,
    /// Every scenario in turn
    All,
}

impl Cli {
    fn config(&self) -> StoreConfig {
        StoreConfigBuilder::new()
            .page_size(self.page_size)
            .once_policy(self.once_policy)
            .build()
    }
}

/// Run one scenario and log how it ended.
async fn run(name: &str, scenario: impl Future<Output = Result<(), StoreError>>) -> Result<(), StoreError> {
    let started = Instant::now();
    match scenario.await {
        Ok(()) => {
            info!("{} scenario finished in {:?}", name, started.elapsed());
            Ok(())
        }
        Err(e) => {
            error!("{} scenario aborted: {}", name, e.display_message());
            Err(e)
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), StoreError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = cli.config();
    info!(
        "Running with page size {} and once policy {:?}",
        config.page_size, config.once_policy
    );

    match cli.command {
        Commands::Roles => run("roles", scenarios::run_roles(config)).await,
        Commands::Setlist => run("setlist", scenarios::run_setlist(config)).await,
        Commands::Skills => run("skills", scenarios::run_skills(config)).await,
        Commands::Settings => run("settings", scenarios::run_settings(config)).await,
        Commands::Realtime => run("realtime", scenarios::run_realtime(config)).await,
        Commands::All => {
            run("roles", scenarios::run_roles(config.clone())).await?;
            run("setlist", scenarios::run_setlist(config.clone())).await?;
            run("skills", scenarios::run_skills(config.clone())).await?;
            run("settings", scenarios::run_settings(config.clone())).await?;
            run("realtime", scenarios::run_realtime(config)).await
        }
    }
}
