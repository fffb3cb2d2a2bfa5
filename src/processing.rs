use anyhow::Result;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::image_processing::{generate_placeholder, Placeholder};
use crate::library::{ImageKind, ImageLibrary};
use crate::store::{ImageInfo, MetadataMap, MetadataStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackfillStats {
    pub scanned: usize,
    pub generated: usize,
    pub failed: usize,
}

pub fn apply_placeholder(info: &mut ImageInfo, placeholder: Placeholder) {
    info.color = Some(placeholder.color);
    info.blur_data_url = Some(placeholder.blur_data_url);
}

/// Stores freshly computed placeholders. Images deleted while decoding was in
/// progress are skipped so their entries are not recreated.
fn merge_placeholders(
    map: &mut MetadataMap,
    library: &ImageLibrary,
    generated: Vec<(String, Placeholder)>,
) {
    for (name, placeholder) in generated {
        if !library.path_of(ImageKind::All, &name).is_file() {
            debug!("Skipping placeholder for removed image {}", name);
            continue;
        }
        apply_placeholder(map.entry(name).or_default(), placeholder);
    }
}

/// Computes color and blur placeholders for gallery images that lack them
/// (or for every image when `force` is set) and stores them in one write.
pub fn backfill_placeholders(
    store: &MetadataStore,
    library: &ImageLibrary,
    force: bool,
) -> Result<BackfillStats> {
    let files = library.list(ImageKind::All)?;
    let map = store.load()?;

    let pending: Vec<&String> = files
        .iter()
        .filter(|name| force || !map.get(*name).is_some_and(ImageInfo::has_placeholder))
        .collect();

    let mut stats = BackfillStats {
        scanned: files.len(),
        ..BackfillStats::default()
    };
    if pending.is_empty() {
        return Ok(stats);
    }

    info!("Generating placeholders for {} of {} images", pending.len(), files.len());
    let start_time = std::time::Instant::now();

    let results: Vec<(String, Result<Placeholder>)> = pending
        .par_iter()
        .map(|name| {
            let path = library.path_of(ImageKind::All, name);
            ((*name).clone(), generate_placeholder(&path))
        })
        .collect();

    let mut generated = Vec::with_capacity(results.len());
    for (name, result) in results {
        match result {
            Ok(placeholder) => generated.push((name, placeholder)),
            Err(e) => {
                warn!("Placeholder generation failed for {}: {:#}", name, e);
                stats.failed += 1;
            }
        }
    }
    stats.generated = generated.len();

    if !generated.is_empty() {
        store.update(|map| merge_placeholders(map, library, generated))?;
    }

    info!(
        "Placeholders done in {:.2}s: {} generated, {} failed",
        start_time.elapsed().as_secs_f64(),
        stats.generated,
        stats.failed
    );
    Ok(stats)
}
