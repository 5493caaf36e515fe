use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Json, Router,
};
use tokio::net::TcpListener;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{
    classify::ServerErrorsFailureClass, limit::RequestBodyLimitLayer, services::ServeDir,
    trace::TraceLayer,
};
use tracing::Span;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;

pub mod archive;
pub mod config;
pub mod error;
pub mod file_reply;
mod handlers;
pub mod jobs;
pub mod layout;
pub mod orchestrator;
pub mod pages;
pub mod registry;
pub mod store;

use crate::config::Config;
use crate::error::StartupError;
use crate::orchestrator::Orchestrator;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::upload,
        handlers::search,
        handlers::get_rooms,
        handlers::check_room,
        handlers::download,
    ),
    components(schemas(kernel::RoomList, kernel::RoomStatus, kernel::CheckRoomRequest)),
    tags(
        (name = "rooms", description = "Room registration, upload and search"),
        (name = "clusters", description = "Cluster downloads")
    )
)]
struct ApiDoc;

pub async fn run() -> Result<(), StartupError> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "server=debug,genie=debug,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::debug!("configuration: {config:?}");

    let socket: SocketAddr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(socket).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    let app = create_routes(&config).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Builds the application router and prepares the data directory layout.
pub async fn create_routes(config: &Config) -> Result<Router, StartupError> {
    let genie = Arc::new(Orchestrator::new(config));
    genie.layout().create_dirs().await?;

    let clusters = ServeDir::new(genie.layout().clusters_dir());
    let public = ServeDir::new(&config.public_dir);

    Ok(Router::new()
        .route("/upload", post(handlers::upload))
        .route("/search", post(handlers::search))
        .route("/rooms", get(handlers::get_rooms))
        .route("/check-room", post(handlers::check_room))
        .route("/download/:room_id/:cluster", get(handlers::download))
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .nest_service("/clusters", clusters)
        .fallback_service(public)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http().on_failure(
                    |error: ServerErrorsFailureClass, _latency: Duration, _span: &Span| {
                        tracing::error!("Server error: {error}");
                    },
                ))
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
                .into_inner(),
        )
        .with_state(genie))
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("signal received, starting graceful shutdown");
}
