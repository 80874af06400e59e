//! Polygon identity server.
//!
//! Serves the session routes and fronts downstream services as the
//! perimeter gateway. Configuration comes from the environment (see
//! `polygon_api::config::ApiConfig::from_env`); a few flags override it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clap::{Parser, Subcommand};
use polygon_api::AppState;
use polygon_api::config::ApiConfig;
use polygon_core::auth::session::SessionService;
use polygon_core::auth::store::PgAuthStore;
use polygon_core::collaborators::{HttpProfileDirectory, HttpTeamDirectory, TeamDirectory};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "polygon-server", version, about = "Polygon identity service and gateway")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// PostgreSQL connection URL (overrides DATABASE_URL).
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Maximum number of database connections in the pool.
    #[arg(long, global = true, default_value_t = 10)]
    max_connections: u32,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run migrations, then serve HTTP (default).
    Serve {
        /// Address to listen on (overrides BIND_ADDR).
        #[arg(long)]
        bind: Option<String>,
    },
    /// Run database migrations and exit.
    Migrate,
    /// Delete refresh tokens that expired before now and exit.
    PurgeExpired,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new("info,polygon_api=debug,polygon_core=debug")
    });
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn connect(config: &ApiConfig, max_connections: u32) -> Result<PgPool, sqlx::Error> {
    info!(max_connections, "connecting to database");
    PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.database_url)
        .await
}

fn session_service(
    pool: PgPool,
    config: &ApiConfig,
    http: &reqwest::Client,
) -> SessionService {
    let profiles = HttpProfileDirectory::new(http.clone(), config.users_base_url.clone());
    let teams = config.polygon_base_url.clone().map(|url| {
        Arc::new(HttpTeamDirectory::new(http.clone(), url)) as Arc<dyn TeamDirectory>
    });
    if teams.is_none() {
        info!("POLYGON_BASE_URL unset, access tokens will carry no team");
    }
    SessionService::new(
        Arc::new(PgAuthStore::new(pool)),
        Arc::new(profiles),
        teams,
        &config.jwt_secret,
        config.session_settings(),
    )
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    init_tracing(args.log_json);

    let mut config = ApiConfig::from_env()?;
    if let Some(url) = args.database_url {
        config.database_url = url;
    }
    let command = args.command.unwrap_or(Command::Serve { bind: None });
    let pool = connect(&config, args.max_connections).await?;

    info!("running database migrations");
    polygon_api::migrate(&pool).await?;

    let http = reqwest::Client::new();
    let session = Arc::new(session_service(pool, &config, &http));

    match command {
        Command::Migrate => {
            info!("migrations complete");
        }
        Command::PurgeExpired => {
            let deleted = session.purge_expired(Utc::now()).await?;
            info!(deleted, "purge complete");
        }
        Command::Serve { bind } => {
            if let Some(bind) = bind {
                config.bind_addr = bind;
            }
            let bind_addr = config.bind_addr.clone();
            info!(
                upstreams = config.upstreams.len(),
                cookie = %config.cookie.name,
                "starting polygon-server"
            );

            let app = polygon_api::router(AppState::new(session, config, http));
            let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
            info!(addr = %listener.local_addr()?, "HTTP API listening");

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
    }

    Ok(())
}
