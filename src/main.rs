use clap::Parser;
use pr_reviewer::config::Config;
use pr_reviewer::db::{self, SqliteStore};
use pr_reviewer::services::server::{self, AppState};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::parse();
    let addr = config.socket_addr()?;

    let pool = db::initialize(&config.database_path, &config.pool_settings()).await?;
    log::info!("[server] Database ready at {}", config.database_path.display());

    let state = AppState::new(SqliteStore::new(pool.clone()), StdRng::from_entropy());

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", addr, e))?;

    let cancel_token = CancellationToken::new();
    tokio::spawn(watch_shutdown_signals(cancel_token.clone()));

    server::serve(listener, server::router(state), cancel_token).await?;

    pool.close().await;
    Ok(())
}

/// Cancel `token` on Ctrl-C or SIGTERM.
async fn watch_shutdown_signals(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("[server] Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("[server] Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    token.cancel();
}
