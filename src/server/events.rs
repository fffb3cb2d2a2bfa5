use serde::{Deserialize, Serialize};

use crate::processing::BackfillStats;

pub const IMAGE_UPLOADED: &str = "image_uploaded";
pub const IMAGE_DELETED: &str = "image_deleted";
pub const METADATA_UPDATED: &str = "metadata_updated";
pub const GALLERY_REORDERED: &str = "gallery_reordered";
pub const PLACEHOLDERS_REBUILT: &str = "placeholders_rebuilt";
pub const HEARTBEAT: &str = "heartbeat";

// SSE Event types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GalleryEvent {
    pub event_type: String,
    pub data: GalleryEventData,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GalleryEventData {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filenames: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl GalleryEvent {
    pub fn new(event_type: &str, data: GalleryEventData) -> Self {
        Self {
            event_type: event_type.to_string(),
            data,
        }
    }

    pub fn for_files(event_type: &str, filenames: Vec<String>, kind: &str) -> Self {
        Self::new(
            event_type,
            GalleryEventData {
                filenames,
                kind: Some(kind.to_string()),
                ..Default::default()
            },
        )
    }

    pub fn placeholders(stats: BackfillStats) -> Self {
        Self::new(
            PLACEHOLDERS_REBUILT,
            GalleryEventData {
                generated: Some(stats.generated),
                failed: Some(stats.failed),
                message: Some(format!(
                    "Generated {} placeholder(s) for {} image(s)",
                    stats.generated, stats.scanned
                )),
                ..Default::default()
            },
        )
    }

    pub fn heartbeat() -> Self {
        Self::new(
            HEARTBEAT,
            GalleryEventData {
                message: Some("SSE connection alive".to_string()),
                ..Default::default()
            },
        )
    }
}
