//! Art portfolio server: a public gallery with a lightbox viewer and a
//! password-gated admin panel, stored as a flat JSON metadata file next to a
//! directory of images.

pub mod constants;
pub mod error;
pub mod gallery;
pub mod image_processing;
pub mod library;
pub mod processing;
pub mod server;
pub mod settings;
pub mod store;

pub use server::{create_app, start_server, AppState};
pub use settings::Settings;
