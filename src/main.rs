use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderValue, Method, header};
use tokio::signal;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use portal_gateway::aicore::client::HttpPlatform;
use portal_gateway::aicore::credentials::{CredentialResolver, StaticCredentialStore};
use portal_gateway::aicore::{AiCore, AiCoreSettings};
use portal_gateway::catalog::PgDirectory;
use portal_gateway::config::Config;
use portal_gateway::{api, store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env("PORTAL_LOG").unwrap_or_else(|_| "info".into()))
        .with(fmt::layer().json())
        .init();

    // reqwest and sqlx both link rustls; pin one process-wide provider.
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        tracing::debug!("rustls crypto provider already installed");
    }

    let cfg = Config::load();

    let pool = store::pool::connect(&cfg.database_url, cfg.db_max_connections).await?;

    let credentials = match cfg.credentials_document()? {
        Some(doc) => StaticCredentialStore::from_json(&doc)?,
        None => {
            tracing::warn!("no AI platform credentials configured; every team will be skipped");
            StaticCredentialStore::default()
        }
    };
    tracing::info!(teams = credentials.len(), "AI platform credentials loaded");

    let platform = HttpPlatform::new(cfg.upstream_connect_timeout, cfg.inference_timeout)?;
    let ai_core = AiCore::new(
        CredentialResolver::new(Arc::new(PgDirectory::new(pool)), Arc::new(credentials)),
        Arc::new(platform),
        AiCoreSettings {
            fanout_concurrency: cfg.fanout_concurrency,
            upload_max_bytes: cfg.upload_max_bytes,
        },
    );

    let state = store::AppState {
        ai_core,
        config: Arc::new(cfg.clone()),
    };

    let mut app = api::app(state).layer(TraceLayer::new_for_http());
    if let Some(cors) = cors_layer(&cfg.cors_origins) {
        app = app.layer(cors);
    }

    let addr: SocketAddr = cfg.listen.parse()?;
    tracing::info!(%addr, "starting portal gateway");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("portal gateway stopped");
    Ok(())
}

/// Cross-origin access for the portal frontend; `None` keeps the API same-origin only.
fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter(|o| !o.is_empty())
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    if origins.is_empty() {
        return None;
    }
    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            .allow_credentials(true),
    )
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
