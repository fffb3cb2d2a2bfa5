//! Joins the image directory listing with the metadata store into the
//! ordered view the gallery and admin pages render.

use serde::Serialize;
use std::collections::HashSet;

use crate::library::ImageKind;
use crate::store::{ImageInfo, MetadataMap};

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GalleryItem {
    pub filename: String,
    pub url: String,
    pub title: String,
    pub description: String,
    pub date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blur_data_url: Option<String>,
}

/// `"sunset_over_hills.png"` -> `"sunset over hills"`
pub fn humanize_title(filename: &str) -> String {
    let stem = match filename.rfind('.') {
        Some(idx) if idx > 0 => &filename[..idx],
        _ => filename,
    };
    stem.replace('_', " ")
}

/// Ordered items first (ascending), then unordered ones; ties break on filename.
pub fn build_gallery(files: &[String], map: &MetadataMap, kind: ImageKind) -> Vec<GalleryItem> {
    let mut items: Vec<GalleryItem> = files
        .iter()
        .map(|filename| {
            let info = map.get(filename).cloned().unwrap_or_default();
            to_item(filename, info, kind)
        })
        .collect();

    items.sort_by(|a, b| {
        let key = |item: &GalleryItem| (item.order.is_none(), item.order.unwrap_or(0));
        key(a).cmp(&key(b)).then_with(|| a.filename.cmp(&b.filename))
    });
    items
}

fn to_item(filename: &str, info: ImageInfo, kind: ImageKind) -> GalleryItem {
    let title = if info.title.trim().is_empty() {
        humanize_title(filename)
    } else {
        info.title
    };
    GalleryItem {
        filename: filename.to_string(),
        url: kind.url_for(filename),
        title,
        description: info.description,
        date: info.date,
        order: info.order,
        color: info.color,
        blur_data_url: info.blur_data_url,
    }
}

/// Order value for a newly added image: one past the current maximum.
pub fn next_order(map: &MetadataMap) -> u32 {
    map.values()
        .filter_map(|info| info.order)
        .max()
        .map_or(0, |max| max.saturating_add(1))
}

/// Puts `requested` first and renumbers every file in `files`.
///
/// Returns the unknown filename on failure, leaving `map` untouched.
pub fn reorder(map: &mut MetadataMap, files: &[String], requested: &[String]) -> Result<Vec<String>, String> {
    let known: HashSet<&str> = files.iter().map(String::as_str).collect();
    if let Some(unknown) = requested.iter().find(|name| !known.contains(name.as_str())) {
        return Err(unknown.clone());
    }

    let mut seen: HashSet<&str> = HashSet::new();
    let mut sequence = Vec::with_capacity(files.len());
    for name in requested {
        if seen.insert(name.as_str()) {
            sequence.push(name.clone());
        }
    }

    let current = build_gallery(files, map, ImageKind::All);
    sequence.extend(
        current
            .into_iter()
            .map(|item| item.filename)
            .filter(|name| !seen.contains(name.as_str())),
    );

    for (index, filename) in sequence.iter().enumerate() {
        let entry = map.entry(filename.clone()).or_default();
        entry.order = Some(index as u32);
    }
    Ok(sequence)
}
