use crate::extract::Settle;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Which document database the tool writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Firestore,
    Sqlite,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host to bind the HTTP server to, e.g. "0.0.0.0"
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// DOCUMENT_STORE: "firestore" (default) or "sqlite"
    pub store_backend: StoreBackend,

    /// Service-account key file. Defaults to "service-account.json".
    pub credentials_path: PathBuf,

    /// Overrides the project named in the credentials file.
    pub firestore_project_id: Option<String>,

    /// "host:port" of a Firestore emulator. When set, no credentials are read.
    pub firestore_emulator_host: Option<String>,

    /// SQLite connection string for the local backend, e.g. "sqlite:./portal-admin.db"
    pub database_url: String,

    /// Chromium binary to drive. Searched on PATH when unset.
    pub chromium_path: Option<PathBuf>,

    /// EXTRACT_SETTLE: "fixed" (default) or "poll"
    pub settle: Settle,

    /// How long a scrape of one report URL is reused.
    pub extract_cache_ttl: Duration,
}

impl AppConfig {
    /// Load configuration from environment variables (populated by dotenvy before this is called).
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let port = var("PORT")
            .unwrap_or_else(|| "3000".into())
            .parse::<u16>()
            .context("PORT must be a valid port number (1–65535)")?;

        let store_backend = match var("DOCUMENT_STORE").as_deref().map(str::trim) {
            None | Some("") | Some("firestore") => StoreBackend::Firestore,
            Some("sqlite") => StoreBackend::Sqlite,
            Some(other) => anyhow::bail!("DOCUMENT_STORE must be 'firestore' or 'sqlite', got '{other}'"),
        };

        let settle = match var("EXTRACT_SETTLE").as_deref().map(str::trim) {
            None | Some("") | Some("fixed") => Settle::fixed(),
            Some("poll") => Settle::poll(),
            Some(other) => anyhow::bail!("EXTRACT_SETTLE must be 'fixed' or 'poll', got '{other}'"),
        };

        let extract_cache_ttl = var("EXTRACT_CACHE_TTL_SECS")
            .unwrap_or_else(|| "3600".into())
            .parse::<u64>()
            .map(Duration::from_secs)
            .context("EXTRACT_CACHE_TTL_SECS must be a whole number of seconds")?;

        let non_blank = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            host: var("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            store_backend,
            credentials_path: non_blank("FIREBASE_CREDENTIALS_PATH")
                .unwrap_or_else(|| "service-account.json".into())
                .into(),
            firestore_project_id: non_blank("FIRESTORE_PROJECT_ID"),
            firestore_emulator_host: non_blank("FIRESTORE_EMULATOR_HOST"),
            database_url: var("DATABASE_URL")
                .unwrap_or_else(|| "sqlite:./portal-admin.db".into()),
            chromium_path: non_blank("CHROMIUM_PATH").map(PathBuf::from),
            settle,
            extract_cache_ttl,
        })
    }
}
