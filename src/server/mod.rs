use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post, put},
    Router,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, services::ServeDir, trace::TraceLayer,
};
use tracing::info;

pub mod auth;
pub mod events;
pub mod handlers;
pub mod state;

pub use self::state::AppState;
use auth::require_admin;
use handlers::{
    admin_html, asset, delete_image, gallery_events_stream, get_data, get_gallery, health,
    index_html, list_images, login, rebuild_placeholders, reorder_images, save_data,
    update_caption, upload_images, wormhole_html,
};

// Create the main application router
pub fn create_app(state: AppState) -> Router {
    let upload_limit = DefaultBodyLimit::max(state.settings.max_upload_bytes());

    let admin = Router::new()
        .route("/api/data", post(save_data))
        .route("/api/data/:filename", put(update_caption))
        .route("/api/upload", post(upload_images).layer(upload_limit))
        .route("/api/delete", post(delete_image))
        .route("/api/reorder", post(reorder_images))
        .route("/api/placeholders/rebuild", post(rebuild_placeholders))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    let public = Router::new()
        .route("/", get(index_html))
        .route("/admin", get(admin_html))
        .route("/wormhole", get(wormhole_html))
        .route("/assets/*path", get(asset))
        .route("/health", get(health))
        .route("/api/images", get(list_images))
        .route("/api/data", get(get_data))
        .route("/api/gallery", get(get_gallery))
        .route("/api/login", post(login))
        .route("/api/events", get(gallery_events_stream))
        .nest_service("/imgs", ServeDir::new(state.library.root()));

    Router::new()
        .merge(public)
        .merge(admin)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

pub async fn start_server(state: AppState) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", state.settings.host, state.settings.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", state.settings.host, state.settings.port))?;
    let app = create_app(state);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Gallery available at http://{}", addr);
    info!("Admin panel at http://{}/admin", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
