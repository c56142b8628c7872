mod playlists;
mod pulses;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "perfpulse-cli")]
#[command(about = "Perfpulse operator command line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Run one reaper sweep now
    Reap,
    /// Validate and print the playlist file
    Playlists {
        /// Playlist YAML file (defaults to `PERFPULSE_PLAYLISTS_PATH`)
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Show a pulse's status, heartbeats and statistic
    Pulse {
        /// Pulse slug
        slug: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("warn"))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("perfpulse-cli: run with --help to list commands");
        return Ok(());
    };

    match command {
        Commands::Playlists { path } => {
            let path = match path {
                Some(path) => path,
                None => perfpulse_core::load_app_config()?.playlists_path,
            };
            playlists::run_playlists(&path)
        }
        Commands::Migrate => {
            let (_, pool) = connect().await?;
            let applied = perfpulse_db::run_migrations(&pool).await?;
            println!("applied {applied} migration(s)");
            Ok(())
        }
        Commands::Reap => {
            let (config, pool) = connect().await?;
            pulses::run_reap(pool, &config).await
        }
        Commands::Pulse { slug } => {
            let (_, pool) = connect().await?;
            pulses::run_pulse_show(pool, &slug).await
        }
    }
}

async fn connect() -> anyhow::Result<(perfpulse_core::AppConfig, sqlx::PgPool)> {
    let config = perfpulse_core::load_app_config()?;
    let pool_config = perfpulse_db::PoolConfig::from_app_config(&config);
    let pool = perfpulse_db::connect_pool(&config.database_url, pool_config).await?;
    Ok((config, pool))
}
