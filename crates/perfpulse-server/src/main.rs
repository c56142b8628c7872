mod api;
mod middleware;
mod scheduler;

use std::sync::Arc;

use perfpulse_engine::{BroadcastPublisher, Engine, Notifier};
use tracing_subscriber::EnvFilter;

use crate::{
    api::{build_app, default_rate_limit_state, AppState},
    middleware::AuthState,
};

const EVENT_CHANNEL_CAPACITY: usize = 1_024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = perfpulse_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = perfpulse_db::PoolConfig::from_app_config(&config);
    let pool = perfpulse_db::connect_pool(&config.database_url, pool_config).await?;
    perfpulse_db::run_migrations(&pool).await?;

    let playlists = Arc::new(perfpulse_core::load_playlists(&config.playlists_path)?);
    tracing::info!(
        path = %config.playlists_path.display(),
        playlists = playlists.playlists.len(),
        "playlists loaded"
    );

    let events = BroadcastPublisher::new(EVENT_CHANNEL_CAPACITY);
    let notifier = Notifier::single(Arc::new(events.clone()));
    let engine = Engine::postgres(pool.clone(), &config, playlists, notifier)?;

    let _scheduler =
        scheduler::build_scheduler(engine.reaper.clone(), config.reaper_interval_secs).await?;

    let auth = AuthState::from_env(matches!(
        config.env,
        perfpulse_core::Environment::Development
    ))?;
    let app = build_app(
        AppState {
            pool,
            engine,
            events,
        },
        auth,
        default_rate_limit_state(),
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "perfpulse server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl-c");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("received shutdown signal, starting graceful shutdown");
}
