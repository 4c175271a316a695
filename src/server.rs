//!
//! facegate HTTP server
//! --------------------
//! Axum frontend for the interaction service. Owns the wiring of the account
//! store, the biometric provider client and the in-process session engine, and
//! mounts the registration, enrollment and interaction routes.
//!
//! Responsibilities:
//! - Account registration and face enrollment.
//! - Login (password and face), consent and abort for a pending interaction.
//! - Render data for the current prompt.
//! - Starting and resuming interactions on the in-process engine.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::routing::{get, post};
use axum::Router;
use tracing::{debug, info};

use crate::biometric::{BiometricVerifier, FaceTecClient, MatchPolicy};
use crate::config::ServerConfig;
use crate::identity::{
    BiometricStrategy, JsonFileAccountStore, MemoryAccountStore, PasswordStrategy, SharedAccountStore,
};
use crate::interaction::{InteractionService, MemorySessionEngine};

pub mod handlers;
pub mod middleware;

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub accounts: SharedAccountStore,
    pub verifier: Arc<dyn BiometricVerifier>,
    /// Concrete engine, for starting and resuming interactions.
    pub engine: Arc<MemorySessionEngine>,
    pub interactions: InteractionService,
    pub passwords: Arc<PasswordStrategy>,
    pub biometrics: Arc<BiometricStrategy>,
    pub policy: MatchPolicy,
    pub biometric_timeout: Duration,
}

impl AppState {
    pub fn new(
        accounts: SharedAccountStore,
        verifier: Arc<dyn BiometricVerifier>,
        engine: Arc<MemorySessionEngine>,
        policy: MatchPolicy,
        biometric_timeout: Duration,
    ) -> Self {
        let passwords = Arc::new(PasswordStrategy::new(accounts.clone()));
        let biometrics =
            Arc::new(BiometricStrategy::new(accounts.clone(), verifier.clone(), policy, biometric_timeout));
        Self {
            interactions: InteractionService::new(engine.clone()),
            accounts,
            verifier,
            engine,
            passwords,
            biometrics,
            policy,
            biometric_timeout,
        }
    }
}

/// Builds the full route table. `production` adds the https guard.
pub fn router(state: AppState, production: bool) -> Router {
    let interaction = Router::new()
        .route("/interaction/{uid}", get(handlers::interaction))
        .route("/interaction/{uid}/login", post(handlers::login))
        .route("/interaction/{uid}/verify", post(handlers::verify))
        .route("/interaction/{uid}/confirm", post(handlers::confirm))
        .route("/interaction/{uid}/abort", get(handlers::abort))
        .layer(axum::middleware::from_fn(middleware::no_cache));

    let app = Router::new()
        .route("/", get(handlers::root))
        .route("/users", post(handlers::register))
        .route("/users/{username}/enrollment", post(handlers::enroll))
        .route("/auth", get(handlers::begin))
        .route("/auth/{uid}", get(handlers::resume))
        .merge(interaction)
        .with_state(state)
        .layer(axum::middleware::from_fn(middleware::log_requests));

    if production {
        app.layer(axum::middleware::from_fn(middleware::require_https))
    } else {
        app
    }
}

fn log_startup_config(cfg: &ServerConfig) {
    info!(
        target: "startup",
        http_port = cfg.http_port,
        issuer = %cfg.issuer,
        accounts_file = ?cfg.accounts_file,
        facetec_url = %cfg.facetec_base_url,
        face_timeout_ms = cfg.biometric_timeout.as_millis() as u64,
        min_match_level = cfg.min_match_level,
        interaction_ttl_secs = cfg.interaction_ttl.as_secs(),
        production = cfg.production,
        "facegate starting"
    );
}

/// Start the facegate HTTP server with the given configuration.
pub async fn run_with_config(cfg: ServerConfig) -> anyhow::Result<()> {
    log_startup_config(&cfg);

    let accounts: SharedAccountStore = match &cfg.accounts_file {
        Some(path) => Arc::new(JsonFileAccountStore::new(path.clone())),
        None => {
            info!("No accounts file configured; accounts live in memory only");
            Arc::new(MemoryAccountStore::new())
        }
    };
    let verifier = FaceTecClient::new(&cfg.facetec_base_url, cfg.biometric_timeout)
        .with_context(|| format!("While creating biometric client for {}", cfg.facetec_base_url))?;
    let engine = Arc::new(MemorySessionEngine::new(cfg.issuer.clone(), cfg.interaction_ttl));

    // Background sweeper for abandoned interactions
    {
        let engine = engine.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(30)).await;
                let removed = engine.sweep_expired();
                if removed > 0 {
                    debug!(removed, "interaction_sweep");
                }
            }
        });
    }

    let state = AppState::new(
        accounts,
        Arc::new(verifier),
        engine,
        MatchPolicy { min_match_level: cfg.min_match_level },
        cfg.biometric_timeout,
    );
    let app = router(state, cfg.production);

    let addr: SocketAddr = format!("0.0.0.0:{}", cfg.http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
