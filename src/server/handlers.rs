use anyhow::anyhow;
use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, Multipart, Path as AxumPath, Query, State},
    http::{header, StatusCode},
    response::{sse::Event as SseEvent, IntoResponse, Json, Response, Sse},
};
use chrono::Utc;
use rust_embed::RustEmbed;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tracing::{info, warn};

use super::auth::password_matches;
use super::events::{
    GalleryEvent, GALLERY_REORDERED, IMAGE_DELETED, IMAGE_UPLOADED, METADATA_UPDATED,
};
use super::state::AppState;
use crate::constants::HEARTBEAT_SECS;
use crate::error::{ApiError, ApiResult};
use crate::gallery::{build_gallery, humanize_title, next_order, reorder, GalleryItem};
use crate::image_processing::generate_placeholder;
use crate::library::{is_supported_image, sanitize_filename, validate_existing_name, ImageKind};
use crate::processing::{apply_placeholder, backfill_placeholders, BackfillStats};
use crate::store::{CaptionUpdate, ImageInfo, MetadataMap};

#[derive(RustEmbed)]
#[folder = "frontend/"]
struct Asset;

/// MIME type for embedded frontend files
fn get_mime_type(path: &str) -> &'static str {
    match path.rsplit('.').next() {
        Some("html") => "text/html; charset=utf-8",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("svg") => "image/svg+xml",
        Some("webp") => "image/webp",
        Some("png") => "image/png",
        Some("ico") => "image/x-icon",
        _ => "application/octet-stream",
    }
}

fn serve_embedded(path: &str) -> Response {
    match Asset::get(path) {
        Some(file) => (
            [(header::CONTENT_TYPE, get_mime_type(path))],
            file.data.into_owned(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Runs store or library work off the async workers.
async fn blocking<T, F>(work: F) -> ApiResult<T>
where
    F: FnOnce() -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| anyhow!("Blocking task failed: {}", e))?
}

/// Keeps the body-limit status axum reports for oversized uploads.
fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        warn!("Upload rejected: {}", e.body_text());
        return ApiError::PayloadTooLarge;
    }
    ApiError::BadRequest(format!("Malformed upload: {}", e.body_text()))
}

/// Parses a JSON body, reporting failures in the API's error shape.
fn parse_json<T: DeserializeOwned>(body: &Bytes) -> ApiResult<T> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {}", e)))
}

#[derive(Debug, Deserialize)]
pub struct KindQuery {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

impl KindQuery {
    fn kind(&self) -> ImageKind {
        ImageKind::parse(self.kind.as_deref())
    }
}

// Pages and assets

pub async fn index_html() -> Response {
    serve_embedded("index.html")
}

pub async fn admin_html() -> Response {
    serve_embedded("admin.html")
}

pub async fn wormhole_html() -> Response {
    serve_embedded("wormhole.html")
}

pub async fn asset(AxumPath(path): AxumPath<String>) -> Response {
    serve_embedded(&path)
}

pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// Public API

pub async fn list_images(
    State(state): State<AppState>,
    Query(query): Query<KindQuery>,
) -> ApiResult<Json<Vec<String>>> {
    let kind = query.kind();
    let library = state.library.clone();
    let images = blocking(move || {
        Ok(library.list(kind).unwrap_or_else(|e| {
            warn!("Listing images failed: {:#}", e);
            Vec::new()
        }))
    })
    .await?;
    Ok(Json(images))
}

pub async fn get_data(State(state): State<AppState>) -> ApiResult<Json<MetadataMap>> {
    let store = state.store.clone();
    let map = blocking(move || Ok(store.load()?)).await?;
    Ok(Json(map))
}

pub async fn get_gallery(
    State(state): State<AppState>,
    Query(query): Query<KindQuery>,
) -> ApiResult<Json<Vec<GalleryItem>>> {
    let kind = query.kind();
    let store = state.store.clone();
    let library = state.library.clone();
    let items = blocking(move || {
        let files = library.list(kind)?;
        let map = store.load()?;
        Ok(build_gallery(&files, &map, kind))
    })
    .await?;
    Ok(Json(items))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub password: String,
}

pub async fn login(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<Value>> {
    let request: LoginRequest = parse_json(&body)?;
    let settings = &state.settings;
    if settings.auth_enabled() && !password_matches(&request.password, &settings.admin_password) {
        warn!("Failed admin login attempt");
        return Err(ApiError::Unauthorized);
    }
    Ok(Json(json!({
        "success": true,
        "authRequired": settings.auth_enabled(),
    })))
}

// SSE endpoint for live gallery updates
pub async fn gallery_events_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let (tx, rx) = mpsc::channel(100);
    let mut event_receiver = state.event_sender.subscribe();

    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                received = event_receiver.recv() => match received {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("SSE client lagged, skipped {} event(s)", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = tokio::time::sleep(Duration::from_secs(HEARTBEAT_SECS)) => GalleryEvent::heartbeat(),
            };

            let sse_event = SseEvent::default()
                .json_data(&event)
                .unwrap_or_else(|_| SseEvent::default().data("Error serializing event"));

            if tx.send(Ok(sse_event)).await.is_err() {
                break; // Client disconnected
            }
        }
    });

    Sse::new(ReceiverStream::new(rx)).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keepalive-message"),
    )
}

// Admin API

pub async fn save_data(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<Value>> {
    let map: MetadataMap = parse_json(&body)?;
    let filenames: Vec<String> = map.keys().cloned().collect();
    let store = state.store.clone();
    blocking(move || Ok(store.replace(&map)?)).await?;
    info!("Metadata replaced ({} entries)", filenames.len());

    state.notify(GalleryEvent::for_files(
        METADATA_UPDATED,
        filenames,
        ImageKind::All.name(),
    ));
    Ok(Json(json!({ "success": true })))
}

pub async fn update_caption(
    State(state): State<AppState>,
    AxumPath(filename): AxumPath<String>,
    body: Bytes,
) -> ApiResult<Json<ImageInfo>> {
    validate_existing_name(&filename).map_err(|_| ApiError::BadRequest("Invalid filename".into()))?;
    let caption: CaptionUpdate = parse_json(&body)?;

    let store = state.store.clone();
    let library = state.library.clone();
    let name = filename.clone();
    let info = blocking(move || {
        if !library.contains(ImageKind::All, &name) && !library.contains(ImageKind::Featured, &name) {
            return Err(ApiError::NotFound(format!("Image not found: {}", name)));
        }
        Ok(store.upsert_caption(&name, caption)?)
    })
    .await?;

    state.notify(GalleryEvent::for_files(
        METADATA_UPDATED,
        vec![filename],
        ImageKind::All.name(),
    ));
    Ok(Json(info))
}

pub async fn upload_images(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<Value>> {
    let mut kind = ImageKind::All;
    let mut uploads: Vec<(String, Bytes)> = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "type" => {
                let value = field.text().await.map_err(multipart_error)?;
                kind = ImageKind::parse(Some(value.trim()));
            }
            "file" | "files" => {
                let original_name = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await.map_err(multipart_error)?;
                // Browsers send an empty part for an untouched file input
                if original_name.is_empty() && data.is_empty() {
                    continue;
                }
                uploads.push((original_name, data));
            }
            _ => {}
        }
    }

    if uploads.is_empty() {
        return Err(ApiError::BadRequest("No file uploaded".into()));
    }

    let mut prepared = Vec::with_capacity(uploads.len());
    for (original_name, data) in uploads {
        let filename = sanitize_filename(&original_name)
            .map_err(|_| ApiError::BadRequest(format!("Invalid filename: {}", original_name)))?;
        if !is_supported_image(&filename) {
            return Err(ApiError::BadRequest(format!("Unsupported file type: {}", filename)));
        }
        prepared.push((filename, data));
    }

    let library = state.library.clone();
    let store = state.store.clone();
    let saved = tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<String>> {
        let mut saved = Vec::with_capacity(prepared.len());
        for (filename, data) in prepared {
            let path = library.save(kind, &filename, &data)?;
            info!("Saved upload {} ({} bytes, {})", filename, data.len(), kind.name());

            if kind == ImageKind::All {
                let placeholder = match generate_placeholder(&path) {
                    Ok(placeholder) => Some(placeholder),
                    Err(e) => {
                        warn!("No placeholder for {}: {:#}", filename, e);
                        None
                    }
                };
                store.update(|map| {
                    let order = next_order(map);
                    let is_new = !map.contains_key(&filename);
                    let entry = map.entry(filename.clone()).or_default();
                    if is_new {
                        entry.title = humanize_title(&filename);
                        entry.order = Some(order);
                        entry.uploaded_at = Some(Utc::now());
                    }
                    if let Some(placeholder) = placeholder {
                        apply_placeholder(entry, placeholder);
                    }
                })?;
            }
            saved.push(filename);
        }
        Ok(saved)
    })
    .await
    .map_err(|e| anyhow!("Upload task failed: {}", e))??;

    state.notify(GalleryEvent::for_files(IMAGE_UPLOADED, saved.clone(), kind.name()));

    Ok(Json(json!({
        "success": true,
        "filename": saved.first(),
        "filenames": saved,
    })))
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    pub filename: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

pub async fn delete_image(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<Value>> {
    let request: DeleteRequest = parse_json(&body)?;
    let filename = request
        .filename
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Filename is required".into()))?;
    validate_existing_name(&filename).map_err(|_| ApiError::BadRequest("Invalid filename".into()))?;
    let kind = ImageKind::parse(request.kind.as_deref());

    let store = state.store.clone();
    let library = state.library.clone();
    let name = filename.clone();
    let (file_removed, entry_removed) = blocking(move || {
        let file_removed = library.remove(kind, &name)?;
        // Metadata is keyed by gallery filename; featured images have no entry of their own
        let entry_removed = kind == ImageKind::All && store.remove(&name)?.is_some();
        Ok((file_removed, entry_removed))
    })
    .await?;
    info!(
        "Deleted {} ({}): file removed={}, metadata removed={}",
        filename,
        kind.name(),
        file_removed,
        entry_removed
    );

    state.notify(GalleryEvent::for_files(IMAGE_DELETED, vec![filename], kind.name()));
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub order: Vec<String>,
}

pub async fn reorder_images(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<Value>> {
    let request: ReorderRequest = parse_json(&body)?;

    let store = state.store.clone();
    let library = state.library.clone();
    let sequence = blocking(move || {
        let files = library.list(ImageKind::All)?;
        store
            .update(|map| reorder(map, &files, &request.order))?
            .map_err(|unknown| ApiError::BadRequest(format!("Unknown image: {}", unknown)))
    })
    .await?;

    state.notify(GalleryEvent::for_files(
        GALLERY_REORDERED,
        sequence.clone(),
        ImageKind::All.name(),
    ));
    Ok(Json(json!({ "success": true, "order": sequence })))
}

#[derive(Debug, Deserialize)]
pub struct RebuildQuery {
    #[serde(default)]
    pub force: bool,
}

pub async fn rebuild_placeholders(
    State(state): State<AppState>,
    Query(query): Query<RebuildQuery>,
) -> ApiResult<Json<BackfillStats>> {
    let store = state.store.clone();
    let library = state.library.clone();
    let stats = tokio::task::spawn_blocking(move || backfill_placeholders(&store, &library, query.force))
        .await
        .map_err(|e| anyhow!("Placeholder task failed: {}", e))??;

    state.notify(GalleryEvent::placeholders(stats));
    Ok(Json(stats))
}
