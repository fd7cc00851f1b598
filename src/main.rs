//! m3u-bridge - Keep M3U playlists in sync between two music folders

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod config;
mod conflict;
mod device;
mod error;
mod playlist;
mod sync;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "m3u_bridge=debug"
    } else {
        "m3u_bridge=info"
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let profile = cli.profile.as_deref();

    match cli.command {
        Commands::Init {
            folder_a,
            folder_b,
            label_a,
            label_b,
            data_dir,
            force,
        } => {
            cli::commands::init(profile, folder_a, folder_b, label_a, label_b, data_dir, force).await?;
        }
        Commands::Sync { dry_run } => {
            cli::commands::sync(profile, dry_run).await?;
        }
        Commands::Event {
            path,
            side,
            dry_run,
        } => {
            cli::commands::event(profile, &path, side.into(), dry_run).await?;
        }
        Commands::Daemon { interval, dry_run } => {
            cli::commands::daemon(profile, interval, dry_run).await?;
        }
        Commands::Conflicts => {
            cli::commands::conflicts(profile).await?;
        }
        Commands::Resolve { strategy } => {
            cli::commands::resolve(profile, strategy).await?;
        }
        Commands::Duplicates { remove, dry_run } => {
            cli::commands::duplicates(profile, remove, dry_run).await?;
        }
        Commands::Analyze { playlist } => {
            cli::commands::analyze(profile, &playlist).await?;
        }
        Commands::Rule {
            playlist,
            strategy,
            clear,
        } => {
            cli::commands::rule(profile, &playlist, strategy, clear)?;
        }
        Commands::Completion { shell } => {
            cli::commands::completion(shell);
        }
    }

    Ok(())
}
