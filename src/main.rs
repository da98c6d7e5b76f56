//! CivicSense server binary.
//!
//! Wires the storage layer, department directory, identity verifier, and
//! optional classifier into an axum router. Everything is configured through
//! environment variables:
//!
//! - `CIVICSENSE_PORT` - listen port (default 8000)
//! - `CIVICSENSE_DATABASE_URL` - SQLite connection string
//! - `CIVICSENSE_VERIFIER_URL` - identity verification endpoint
//! - `CIVICSENSE_DEV_TOKENS` - static `token=subject` pairs, comma separated
//!   (development fallback when no verifier URL is set)
//! - `CIVICSENSE_CLASSIFIER_URL` / `CIVICSENSE_CLASSIFIER_KEY` - advisory
//!   classifier endpoint (optional)
//! - `CIVICSENSE_SEED_DEPARTMENTS` - JSON file of departments to seed when
//!   the departments table is empty
//! - `CIVICSENSE_DIRECTORY_REFRESH_SECS` - directory refresh interval
//!
//! Startup fails fast when the department directory is empty: without at
//! least one department there is nothing to route complaints to.

use std::collections::HashMap;
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use civicsense::api::{AppState, router};
use civicsense::auth::TokenVerifier;
use civicsense::classify::HintClient;
use civicsense::directory::DepartmentDirectory;
use civicsense::model::Department;
use civicsense::storage::Storage;

/// Default port if not specified via environment variable.
const DEFAULT_PORT: u16 = 8000;

/// Default database path if not specified via environment variable.
const DEFAULT_DB_PATH: &str = "sqlite:civicsense.db?mode=rwc";

/// Default department directory refresh interval.
const DEFAULT_REFRESH_SECS: u64 = 300;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("civicsense=info".parse()?))
        .init();

    let port: u16 = env::var("CIVICSENSE_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);

    let db_url =
        env::var("CIVICSENSE_DATABASE_URL").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());

    info!(port, db_url = %db_url, "Starting CivicSense server");

    let storage = Storage::new(&db_url).await?;
    info!("Database initialized");

    if let Ok(path) = env::var("CIVICSENSE_SEED_DEPARTMENTS") {
        seed_departments(&storage, &path).await?;
    }

    // An empty directory is a configuration fault; refuse to serve.
    let directory = DepartmentDirectory::new();
    directory.load(&storage).await?;

    let refresh_secs: u64 = env::var("CIVICSENSE_DIRECTORY_REFRESH_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_REFRESH_SECS);
    spawn_directory_refresh(directory.clone(), storage.clone(), refresh_secs);

    let verifier = build_verifier()?;
    let hints = build_hint_client();

    let state = AppState {
        storage,
        directory,
        verifier,
        hints,
    };

    let app = router(state).layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "CivicSense is listening");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Pick the identity verifier from the environment: a remote endpoint when
/// configured, otherwise a static development token map.
fn build_verifier() -> anyhow::Result<TokenVerifier> {
    if let Ok(url) = env::var("CIVICSENSE_VERIFIER_URL") {
        info!(verifier_url = %url, "Using remote identity verification");
        return Ok(TokenVerifier::remote(&url));
    }

    if let Ok(pairs) = env::var("CIVICSENSE_DEV_TOKENS") {
        let tokens: HashMap<String, String> = pairs
            .split(',')
            .filter_map(|pair| {
                let (token, subject) = pair.split_once('=')?;
                Some((token.trim().to_string(), subject.trim().to_string()))
            })
            .collect();
        anyhow::ensure!(
            !tokens.is_empty(),
            "CIVICSENSE_DEV_TOKENS is set but contains no token=subject pairs"
        );
        warn!(
            tokens = tokens.len(),
            "Using static development tokens; do not run this in production"
        );
        return Ok(TokenVerifier::static_tokens(tokens));
    }

    anyhow::bail!("set CIVICSENSE_VERIFIER_URL (or CIVICSENSE_DEV_TOKENS for development)")
}

fn build_hint_client() -> Option<HintClient> {
    let url = env::var("CIVICSENSE_CLASSIFIER_URL").ok()?;
    let key = env::var("CIVICSENSE_CLASSIFIER_KEY").ok();
    info!(classifier_url = %url, "Advisory classifier enabled");
    Some(HintClient::new(&url, key))
}

/// Seed the departments table from a JSON file when it is empty. Existing
/// directory contents always win; the seed is a bootstrap convenience, not a
/// sync mechanism.
async fn seed_departments(storage: &Storage, path: &str) -> anyhow::Result<()> {
    let existing = storage.select_departments().await?;
    if !existing.is_empty() {
        info!(
            departments = existing.len(),
            "Departments already present; skipping seed file"
        );
        return Ok(());
    }

    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading department seed file {path}"))?;
    let departments: Vec<Department> =
        serde_json::from_str(&raw).with_context(|| format!("parsing department seed file {path}"))?;

    for department in &departments {
        storage.insert_department(department).await?;
    }

    info!(departments = departments.len(), "Seeded department directory");
    Ok(())
}

/// Keep the directory snapshot fresh in the background. Refresh failures keep
/// the current snapshot; readers never block on this task.
fn spawn_directory_refresh(directory: DepartmentDirectory, storage: Storage, refresh_secs: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(refresh_secs.max(1)));
        // The first tick fires immediately; the directory was just loaded.
        interval.tick().await;
        loop {
            interval.tick().await;
            directory.refresh(&storage).await;
        }
    });
}
