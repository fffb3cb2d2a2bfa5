use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use art_portfolio::processing::backfill_placeholders;
use art_portfolio::server::events::GalleryEvent;
use art_portfolio::{start_server, AppState, Settings};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Art portfolio server v{} starting", env!("CARGO_PKG_VERSION"));

    let settings = Settings::load().context("Failed to load settings")?;
    info!("Config: {}", Settings::config_path().display());
    info!("Metadata file: {}", settings.data_file.display());
    info!("Images directory: {}", settings.images_dir.display());
    if !settings.auth_enabled() {
        warn!("admin_password is empty, the admin API is open to anyone who can reach the server");
    }

    let state = AppState::new(settings);

    if state.settings.backfill_on_start {
        let background = state.clone();
        tokio::spawn(async move {
            let store = background.store.clone();
            let library = background.library.clone();
            match tokio::task::spawn_blocking(move || backfill_placeholders(&store, &library, false)).await {
                Ok(Ok(stats)) => {
                    if stats.generated > 0 {
                        background.notify(GalleryEvent::placeholders(stats));
                    }
                }
                Ok(Err(e)) => error!("Placeholder backfill failed: {:#}", e),
                Err(e) => error!("Placeholder backfill task panicked: {}", e),
            }
        });
    }

    start_server(state).await
}
