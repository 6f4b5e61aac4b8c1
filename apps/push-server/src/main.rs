use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use push_server::auth::verifier::{AccountVerifier, IdentityVerifier};
use push_server::config::Config;
use push_server::db::kv::{RedisSessionLookup, SessionLookup};
use push_server::error::ServerError;
use push_server::gateway::fanout::{PushSource, RedisPushSource};
use push_server::gateway::tls::{self, TlsListener};
use push_server::AppState;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing; env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("push-server: {e}");
            std::process::exit(2);
        }
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "push-server stopped");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), ServerError> {
    // TLS material is read once, before anything else is started.
    let acceptor = config.tls.as_ref().map(tls::load_acceptor).transpose()?;

    let session_client = push_server::db::redis_client(&config, config.redis_session_db)?;
    let lookup: Arc<dyn SessionLookup> =
        Arc::new(RedisSessionLookup::connect(session_client, config.redis_session_db).await?);

    let verifier: Arc<dyn IdentityVerifier> = Arc::new(AccountVerifier::new(
        lookup,
        &config.account_api_url(),
        config.verify_timeout,
    )?);

    let collab_client = push_server::db::redis_client(&config, config.redis_collab_db)?;
    let push_source: Arc<dyn PushSource> = Arc::new(RedisPushSource::new(collab_client));
    let port = config.port;

    tracing::info!(
        account_api = %config.account_api_url(),
        redis_host = %config.redis_host,
        versions = ?config.supported_versions,
        tls = acceptor.is_some(),
        "push-server configured"
    );

    let state = AppState::new(config, verifier);
    tokio::spawn(state.dispatcher.clone().run(push_source));

    let app = push_server::app(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "push-server listening");

    match acceptor {
        Some(acceptor) => {
            axum::serve(TlsListener::new(listener, acceptor)?, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?
        }
        None => {
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?
        }
    }

    tracing::info!("push-server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(?e, "failed to listen for Ctrl-C");
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
                tracing::error!(?e, "failed to listen for SIGTERM");
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
    tracing::info!("shutdown signal received");
}
