use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cache;
mod config;
mod extract;
mod handlers;
mod hierarchy;
mod models;
mod session;
mod store;

use cache::LinkCache;
use config::{AppConfig, StoreBackend};
use extract::{chromium::ChromiumLauncher, LinkExtractor};
use session::FormSession;
use store::{firestore::ServiceAccount, DocumentStore, FirestoreStore, SqliteStore};

// ── Shared application state ───────────────────────────────────────────────

pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub extractor: LinkExtractor,
    /// Single-operator form state: drafts, generated ids, current report.
    pub session: FormSession,
}

// ── Router ─────────────────────────────────────────────────────────────────

pub fn router(state: Arc<AppState>) -> Router {
    let admin_router = Router::new()
        .route("/", get(handlers::admin::admin_page))
        .route("/report", post(handlers::admin::set_report))
        .route("/report/refresh", post(handlers::admin::refresh_report))
        .route("/dashboards", post(handlers::admin::create_dashboard))
        .route("/pages", post(handlers::admin::create_dropdown_page))
        .route("/dashboard-pages", post(handlers::admin::create_dashboard_page));

    let api_router = Router::new()
        .route("/links", get(handlers::api::links))
        .route("/dashboards", get(handlers::api::dashboards))
        .route("/dashboards/:uid/pages", get(handlers::api::pages));

    Router::new()
        .route("/", get(|| async { axum::response::Redirect::to("/admin") }))
        .route("/health", get(|| async { axum::http::StatusCode::OK }))
        .nest("/admin", admin_router)
        .nest("/api", api_router)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn DocumentStore>> {
    match config.store_backend {
        StoreBackend::Sqlite => {
            tracing::info!("Using SQLite document store at {}", config.database_url);
            Ok(Arc::new(SqliteStore::connect(&config.database_url).await?))
        }
        StoreBackend::Firestore => {
            if let Some(host) = &config.firestore_emulator_host {
                let project = config
                    .firestore_project_id
                    .clone()
                    .unwrap_or_else(|| "demo-portal".into());
                tracing::info!("Using Firestore emulator at {} (project {})", host, project);
                return Ok(Arc::new(FirestoreStore::emulator(
                    &format!("http://{host}"),
                    &project,
                )?));
            }

            let account = ServiceAccount::from_file(&config.credentials_path)?;
            tracing::info!(
                "Using Firestore as {} (credentials {})",
                account.client_email,
                config.credentials_path.display()
            );
            Ok(Arc::new(FirestoreStore::with_service_account(
                account,
                config.firestore_project_id.clone(),
            )?))
        }
    }
}

// ── Entry point ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present; the environment may already be set
    dotenvy::dotenv().ok();

    // Initialise structured logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "portal_admin=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!("Starting portal-admin on {}:{}", config.host, config.port);

    let store = open_store(&config).await?;

    let launcher = Arc::new(ChromiumLauncher::new(config.chromium_path.as_ref()));
    let extractor = LinkExtractor::new(
        launcher,
        config.settle.clone(),
        LinkCache::new(config.extract_cache_ttl),
    );

    let state = Arc::new(AppState {
        store,
        extractor,
        session: FormSession::new(),
    });

    let bind_addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Listening on http://{}/admin", listener.local_addr()?);

    axum::serve(listener, router(state)).await?;

    Ok(())
}
