//! Federation Entity Server Binary
//!
//! Runs the OpenID Federation entity HTTP server.

use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::FmtSubscriber;

use oidfed_plane::{create_router, AppState, KeyRegistry, MemoryStore, PlaneConfig};
use oidfed_resolver::{HttpProvider, HttpProviderConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let config = match PlaneConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level)
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return ExitCode::FAILURE;
    }

    let registry = match config.signing_key.clone() {
        Some(key) => Arc::new(KeyRegistry::new(key)),
        None => {
            warn!("OIDFED_SIGNING_KEY not set, generating a key that will not survive a restart");
            Arc::new(KeyRegistry::generate(config.key_id.clone()))
        }
    };
    if config.admin_token.is_none() {
        warn!("OIDFED_ADMIN_TOKEN not set, management endpoints are disabled");
    }
    let store = Arc::new(MemoryStore::new());

    let upstream = match HttpProvider::with_config(
        HttpProviderConfig::default().with_timeout(config.fetch_timeout),
    ) {
        Ok(provider) => Arc::new(provider),
        Err(e) => {
            error!(error = %e, "Failed to build HTTP client");
            return ExitCode::FAILURE;
        }
    };

    info!(
        entity_id = %config.entity_id,
        kid = %registry.kid(),
        authority_hints = ?config.authority_hints,
        trust_anchors = ?config.trust_anchors,
        pinned_anchors = config.trust_anchor_jwks.len(),
        port = config.port,
        "Starting federation entity server"
    );

    let addr = format!("0.0.0.0:{}", config.port);
    let state = Arc::new(AppState::new(config, registry, store, upstream));
    let app = create_router(state);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(addr = %addr, error = %e, "Failed to bind to address");
            return ExitCode::FAILURE;
        }
    };

    info!(addr = %addr, "Federation entity listening");

    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "Server error");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
