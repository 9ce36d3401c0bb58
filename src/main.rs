//! Zentinel SAML2 SP
//!
//! Serves a small application behind the SAML2 module middleware.

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use zentinel_saml2_module::command::html_escape;
use zentinel_saml2_module::host::{session_from_headers, HostError};
use zentinel_saml2_module::session::{spawn_cleanup_task, SessionStore, DEFAULT_CLEANUP_INTERVAL_SECS};
use zentinel_saml2_module::{saml2_middleware, ModuleState, Saml2Config};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "zentinel-saml2-module")]
#[command(about = "SAML2 Service Provider module for Zentinel applications")]
struct Args {
    /// Path to the JSON module configuration
    #[arg(long, env = "SAML2_CONFIG")]
    config: PathBuf,

    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8080", env = "SAML2_LISTEN")]
    listen: SocketAddr,

    /// Session store path (overrides the configured one)
    #[arg(long, env = "SAML2_SESSION_STORE_PATH")]
    session_store: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, env = "SAML2_VERBOSE")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "{}={},zentinel_saml2_module={}",
            env!("CARGO_CRATE_NAME"),
            log_level,
            log_level
        ))
        .json()
        .init();

    info!("Starting Zentinel SAML2 module");

    let config = Saml2Config::from_file(&args.config)?;

    info!(
        module_path = %config.module_path,
        entity_id = %config.entity_id,
        idp_sso_url = ?config.idp_sso_url,
        "Configuration loaded"
    );

    let session_store_path = args
        .session_store
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.session_store_path));

    let session_store = match SessionStore::open(session_store_path.clone()) {
        Ok(store) => {
            info!(path = ?session_store_path, "Session store initialized");
            Some(Arc::new(store))
        }
        Err(e) => {
            warn!(
                error = %e,
                path = ?session_store_path,
                "Failed to initialize session store, SAML2 sign-in will be unavailable"
            );
            None
        }
    };

    let _cleanup_handle = session_store.as_ref().map(|store| {
        info!("Starting session cleanup task");
        spawn_cleanup_task(Arc::clone(store), DEFAULT_CLEANUP_INTERVAL_SECS)
    });

    let state = Arc::new(ModuleState::new(Arc::new(config), session_store));

    let app = Router::new()
        .route("/", get(index))
        .with_state(Arc::clone(&state))
        .fallback(|| async { StatusCode::NOT_FOUND })
        .layer(axum::middleware::from_fn_with_state(state, saml2_middleware));

    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("Failed to bind {}", args.listen))?;

    info!(listen = %args.listen, "Serving");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .context("Server error")?;

    Ok(())
}

async fn index(State(state): State<Arc<ModuleState>>, headers: HeaderMap) -> Response {
    let login = format!("{}login?ReturnUrl=%2F", state.config.module_path);

    let Some(store) = state.sessions.as_deref() else {
        return Html(format!("<p><a href=\"{}\">Sign in</a></p>", login)).into_response();
    };

    match session_from_headers(store, &state.config, &headers) {
        Ok(Some(session)) => {
            let display_name = session.get_attribute("displayName").unwrap_or(session.user_id.as_str());
            Html(format!(
                "<p>Signed in as {}</p><p><a href=\"{}logout\">Sign out</a></p>",
                html_escape(display_name),
                state.config.module_path
            ))
            .into_response()
        }
        Ok(None) => Html(format!("<p><a href=\"{}\">Sign in</a></p>", login)).into_response(),
        Err(e) => HostError(e).into_response(),
    }
}
