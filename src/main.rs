use std::sync::Arc;

use anyhow::Context;
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use axum_extra::extract::cookie::CookieJar;
use clap::Parser;
use serde::Deserialize;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod config;
mod download;
mod error;
mod flash;
mod html;
mod storage;
mod upload;

use config::{Cli, Config};
use error::AppError;
use flash::{Flash, FlashStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub flashes: Arc<FlashStore>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            flashes: Arc::new(FlashStore::default()),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "filedrop=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli)?;
    storage::ensure_dir(&config.storage_dir)
        .await
        .with_context(|| format!("creating storage directory {}", config.storage_dir.display()))?;

    let bind = config.bind;
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding {bind}"))?;

    tracing::info!("serving on http://{bind}");
    if let Some(local_ip) = get_local_ip() {
        tracing::info!("reachable on the LAN at http://{local_ip}:{}", bind.port());
    }

    axum::serve(listener, app(AppState::new(config)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(index).post(upload::upload))
        // The size ceiling is enforced in the upload handler so an oversized
        // file reports through the flash banner instead of a bare 413.
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::new())
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct ActionParams {
    download: Option<String>,
    delete: Option<String>,
}

/// `GET /`: download or delete when the matching query parameter is
/// present, otherwise render the page.
async fn index(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<ActionParams>,
) -> Result<Response, AppError> {
    storage::ensure_dir(&state.config.storage_dir).await?;

    if let Some(name) = params.download.as_deref() {
        return download::serve_file(&state.config.storage_dir, name).await;
    }
    if let Some(name) = params.delete.as_deref() {
        return delete_file(&state, jar, name).await;
    }

    let (jar, session) = flash::session(jar);
    let flash = state.flashes.take(session);
    let files = storage::list_files(&state.config.storage_dir).await?;
    let page = html::render_page(flash.as_ref(), &files, state.config.max_upload_bytes);
    Ok((jar, page).into_response())
}

async fn delete_file(state: &AppState, jar: CookieJar, unique_name: &str) -> Result<Response, AppError> {
    let path = storage::file_path(&state.config.storage_dir, unique_name);
    let (jar, session) = flash::session(jar);

    // A missing target is a silent no-op: no flash, just the redirect.
    if tokio::fs::metadata(&path).await.is_ok() {
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(file = %unique_name, "deleted");
                state
                    .flashes
                    .put(session, Flash::success("File deleted successfully."));
            }
            Err(err) => {
                tracing::error!(error = %err, file = %unique_name, "delete failed");
                state
                    .flashes
                    .put(session, Flash::danger("Error deleting file."));
            }
        }
    }

    Ok((jar, Redirect::to("/")).into_response())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to install ctrl-c handler");
    }
}

// Routeable local address, found by "connecting" a UDP socket outward.
fn get_local_ip() -> Option<String> {
    use std::net::{IpAddr, Ipv4Addr};

    let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:80").ok()?;

    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) if !ip.is_loopback() && ip != Ipv4Addr::UNSPECIFIED => Some(ip.to_string()),
        _ => None,
    }
}
