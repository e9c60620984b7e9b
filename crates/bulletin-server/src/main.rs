mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use bulletin_api::session::{AuthSettings, Authenticator};
use bulletin_api::state::{AppState, AppStateInner, WebSettings};
use bulletin_db::Database;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bulletin=debug,bulletin_api=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env();
    if config.skip_verify {
        warn!("Email verification is disabled");
    }

    let db = Arc::new(Database::open(&config.db_path)?);

    let auth = Authenticator::new(
        db.clone(),
        AuthSettings {
            session_ttl: chrono::Duration::hours(config.session_expiry_hours),
            invite_only: config.invite_only,
            skip_verify: config.skip_verify,
        },
    );

    let state: AppState = Arc::new(AppStateInner {
        db,
        auth,
        web: WebSettings {
            redirect_after_login: config.redirect_after_login.clone(),
            secure_cookies: config.secure_cookies,
        },
    });

    let app = bulletin_api::router(state).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Bulletin server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
