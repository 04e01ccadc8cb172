//! Scribe - blog API server
//! Mission: Serve the account and auth surface behind JWT, RBAC and rate limits

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use scribe_backend::{
    auth::{JwtHandler, UserStore},
    build_router,
    config::AuthConfig,
    AppState,
};
use std::{net::SocketAddr, path::Path, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often idle rate-limit keys are evicted
const LIMITER_SWEEP_PERIOD: Duration = Duration::from_secs(300);

#[derive(Parser, Debug)]
#[command(name = "scribe", about = "Scribe blog API server")]
struct Args {
    /// Address to listen on
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:3000")]
    bind: SocketAddr,

    /// SQLite file holding user accounts
    #[arg(long, env = "AUTH_DB_PATH", default_value = "scribe_auth.db")]
    db_path: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment and logging
    load_env();
    init_tracing();

    let args = Args::parse();
    let config = AuthConfig::from_env().context("Invalid auth configuration")?;

    info!(env = ?config.environment, "🚀 Scribe API starting");

    let user_store = Arc::new(UserStore::new(&args.db_path)?);
    if let Some((email, password)) = &config.admin_seed {
        user_store.ensure_admin(email, password)?;
    }
    info!(db_path = %args.db_path, "🔐 Authentication initialized");

    let jwt_handler = Arc::new(JwtHandler::new(&config.jwt_secret, config.token_ttl));
    let state = AppState::new(user_store, jwt_handler, config.lookup_timeout);

    state.login_limiter.spawn_sweeper(LIMITER_SWEEP_PERIOD);
    state.register_limiter.spawn_sweeper(LIMITER_SWEEP_PERIOD);

    let app = build_router(state);

    let listener = TcpListener::bind(args.bind).await?;
    info!(addr = %args.bind, "🎯 API server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scribe_backend=debug,scribe=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    // Standard dotenv search (cwd + parents), then the crate root
    let _ = dotenv();

    let manifest_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if manifest_env.exists() {
        let _ = dotenv::from_path(&manifest_env);
    }
}
