// Server defaults
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_DATA_FILE: &str = "data/images.json";
pub const DEFAULT_IMAGES_DIR: &str = "public/imgs";
pub const DEFAULT_MAX_UPLOAD_MB: u64 = 25;

// Public URL prefix for the images directory
pub const IMAGES_URL_PREFIX: &str = "/imgs";
pub const FEATURED_SUBDIR: &str = "featured";

// Extensions the gallery accepts (lowercase, without dot)
pub const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "gif"];

// Placeholder generation
pub const COLOR_SAMPLE_SIZE: u32 = 32;
pub const BLUR_SIZE: u32 = 16;
pub const BLUR_JPEG_QUALITY: u8 = 60;

// SSE
pub const EVENT_CHANNEL_CAPACITY: usize = 100;
pub const HEARTBEAT_SECS: u64 = 30;
