use std::{io, path::PathBuf, sync::Arc};

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::env;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    classify::ServerErrorsFailureClass, limit::RequestBodyLimitLayer, trace::TraceLayer,
};
use tracing::Span;
use utoipa::OpenApi;

pub mod content_reply;
pub mod domain;
pub mod error;
mod handlers;
pub mod sqlite;

#[cfg(test)] // <-- not needed in integration tests
extern crate rstest;

use crate::domain::Store;
use crate::sqlite::{Mode, Sqlite};

const DB_FILE: &str = "metark.db";
const CURRENT_DIR: &str = "./";
const DEFAULT_PORT: u16 = 5000;
const DEFAULT_SECRET: &str = "sandbox";

/// Credentials the sandbox accepts and the gateway it advertises.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_key: String,
    pub meta_key: String,
    pub meta_token: String,
    /// `None` makes the gateway lookup fail as for an account without one
    pub gateway: Option<String>,
}

/// Sandbox configuration read from the environment.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub port: u16,
    pub db: PathBuf,
    pub settings: Settings,
}

impl SandboxConfig {
    pub fn from_env() -> io::Result<Self> {
        let var = |name: &str| env::var(name).ok();

        let port = match var("METARK_SANDBOX_PORT") {
            Some(value) => value.parse::<u16>().map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("parsing METARK_SANDBOX_PORT value `{value}`: {e}"),
                )
            })?,
            None => DEFAULT_PORT,
        };
        let db_file = var("METARK_SANDBOX_DATA_FILE").unwrap_or_else(|| String::from(DB_FILE));
        let dir = var("METARK_SANDBOX_DATA_DIR").unwrap_or_else(|| String::from(CURRENT_DIR));

        // an explicitly empty gateway means the account has none
        let gateway = match var("METARK_SANDBOX_GATEWAY") {
            Some(g) if g.is_empty() => None,
            Some(g) => Some(g),
            None => Some(format!("http://localhost:{port}")),
        };

        Ok(Self {
            port,
            db: Path::new(&dir).join(db_file),
            settings: Settings {
                api_key: var("METARK_API_KEY").unwrap_or_else(|| DEFAULT_SECRET.into()),
                meta_key: var("METARK_META_KEY").unwrap_or_else(|| DEFAULT_SECRET.into()),
                meta_token: var("METARK_META_TOKEN").unwrap_or_else(|| DEFAULT_SECRET.into()),
                gateway,
            },
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<PathBuf>,
    pub settings: Arc<Settings>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::login,
        handlers::create_bucket,
        handlers::put_object,
        handlers::get_object,
        handlers::get_gateway,
        handlers::get_content,
        handlers::create_backup,
        handlers::list_backups,
        handlers::rebuild,
    ),
    tags(
        (name = "storage", description = "Bucket storage API"),
        (name = "gateway", description = "Content retrieval by identifier"),
        (name = "archive", description = "Metadata archive API")
    )
)]
struct ApiDoc;

/// Creates the database schema unless the file already exists.
pub fn init_database(db: &Path) -> Result<(), rusqlite::Error> {
    if !db.exists() {
        Sqlite::open(db, Mode::ReadWrite)?.new_database()?;
    }
    Ok(())
}

pub async fn run() -> io::Result<()> {
    let config = SandboxConfig::from_env()?;

    init_database(&config.db).map_err(io::Error::other)?;

    let socket = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(socket).await?;
    tracing::info!("sandbox listening on {}", listener.local_addr()?);
    match &config.settings.gateway {
        Some(gateway) => tracing::info!("gateway: {gateway}"),
        None => tracing::info!("no gateway configured"),
    }

    serve(listener, config.db, config.settings, shutdown_signal()).await
}

/// Serves the sandbox on `listener` until `shutdown` completes.
pub async fn serve<F>(
    listener: TcpListener,
    db: PathBuf,
    settings: Settings,
    shutdown: F,
) -> io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_routes(db, settings);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

pub fn create_routes(db: PathBuf, settings: Settings) -> Router {
    let state = AppState {
        db: Arc::new(db),
        settings: Arc::new(settings),
    };
    Router::new()
        .route("/api/v1/login", post(handlers::login))
        .route("/api/v1/buckets", post(handlers::create_bucket))
        .route(
            "/api/v1/buckets/:bucket/:object",
            get(handlers::get_object).put(handlers::put_object),
        )
        .route("/api/v1/gateway", get(handlers::get_gateway))
        .route("/ipfs/:cid", get(handlers::get_content))
        .route(
            "/meta/v1/datasets/:dataset/backups",
            post(handlers::create_backup).get(handlers::list_backups),
        )
        .route("/meta/v1/backups/:backup_id/rebuild", post(handlers::rebuild))
        .route("/api-docs/openapi.json", get(openapi))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http().on_failure(
                    |error: ServerErrorsFailureClass, _latency: Duration, _span: &Span| {
                        tracing::error!("Server error: {error}");
                    },
                ))
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(
                    2 * 1024 * 1024 * 1024, /* 2GB */
                ))
                .into_inner(),
        )
        .with_state(state)
}

async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("signal received, starting graceful shutdown");
}
