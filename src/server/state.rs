use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use super::events::GalleryEvent;
use crate::constants::EVENT_CHANNEL_CAPACITY;
use crate::library::ImageLibrary;
use crate::settings::Settings;
use crate::store::MetadataStore;

// Application state shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub store: MetadataStore,
    pub library: ImageLibrary,
    pub settings: Arc<Settings>,
    pub event_sender: broadcast::Sender<GalleryEvent>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let (event_sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store: MetadataStore::new(settings.data_file.clone()),
            library: ImageLibrary::new(settings.images_dir.clone()),
            settings: Arc::new(settings),
            event_sender,
        }
    }

    /// Broadcasts to connected SSE clients; having none is fine.
    pub fn notify(&self, event: GalleryEvent) {
        if self.event_sender.send(event).is_err() {
            debug!("No SSE subscribers for gallery event");
        }
    }
}
