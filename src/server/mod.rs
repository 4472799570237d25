//! Web server: auth endpoints, AI flow endpoints and the session watchdog

pub mod http;

use anyhow::{Context, Result};
use axum::{
    routing::{get, patch, post},
    Router,
};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::ai::{ChatModelClient, ModelClient, UnconfiguredModel};
use crate::auth::{AuthService, ClientRegistry, SessionWatchdog};
use crate::config::Config;

/// Shared server state
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<Config>,
    pub auth: Arc<AuthService>,
    pub registry: Arc<ClientRegistry>,
    pub model: Arc<dyn ModelClient>,
}

impl ServerState {
    pub fn new(config: Config, auth: AuthService, model: Arc<dyn ModelClient>) -> Self {
        Self {
            config: Arc::new(config),
            auth: Arc::new(auth),
            registry: Arc::new(ClientRegistry::new()),
            model,
        }
    }

    /// Build state from config: provider or demo auth, DeepSeek or no model
    pub fn from_config(mut config: Config, config_path: &Path) -> Result<Self> {
        let secret = config.ensure_token_secret(config_path)?;
        let auth = AuthService::from_config(&config, secret)?;
        let model = model_from_config(&config);
        Ok(Self::new(config, auth, model))
    }
}

/// Model client for the configured provider. Without an API key every flow
/// serves its fallback.
pub fn model_from_config(config: &Config) -> Arc<dyn ModelClient> {
    match ChatModelClient::from_config(&config.llm) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            warn!("{}; AI flows will use fallback payloads", e);
            Arc::new(UnconfiguredModel)
        }
    }
}

pub fn router(state: ServerState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let auth = Router::new()
        .route("/api/auth/sign-in", post(http::sign_in_handler))
        .route("/api/auth/sign-up", post(http::sign_up_handler))
        .route("/api/auth/oauth", post(http::oauth_handler))
        .route("/api/auth/sign-out", post(http::sign_out_handler))
        .route("/api/auth/refresh", post(http::refresh_handler))
        .route("/api/auth/session", get(http::session_handler))
        .route("/api/auth/profile", patch(http::profile_handler));

    let ai = Router::new()
        .route("/api/ai/study-tips", post(http::study_tips_handler))
        .route("/api/ai/progress-insights", post(http::progress_insights_handler))
        .route("/api/ai/smart-notifications", post(http::smart_notifications_handler));

    Router::new()
        .merge(auth)
        .merge(ai)
        .route("/api/status", get(http::status_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the web server and the session watchdog; runs until Ctrl-C
pub async fn start(state: ServerState, host: &str, port: u16) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let watchdog = SessionWatchdog::new(
        state.auth.clone(),
        state.registry.clone(),
        state.config.session.refresh_interval(),
    )
    .spawn(shutdown_tx.subscribe());

    let demo_mode = state.auth.is_demo_mode();
    let app = router(state);

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("     Student Portal Server Starting");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();
    println!("✓ Server binding to: {}", addr);
    if demo_mode {
        println!("⚠ Demo mode: student@demo.com / teacher@demo.com / admin@demo.com");
    } else {
        println!("✓ Firebase authentication enabled");
    }
    println!();
    println!("🚀 Listening on http://{}", addr);
    println!();

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    let shutdown = shutdown_tx.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown requested");
            let _ = shutdown.send(());
        })
        .await?;

    let _ = shutdown_tx.send(());
    if let Err(e) = watchdog.await {
        warn!("Session watchdog ended abnormally: {}", e);
    }
    Ok(())
}
