use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use exif::{In, Reader, Tag};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgb, RgbImage};
use std::fs;
use std::path::Path;

use crate::constants::{BLUR_JPEG_QUALITY, BLUR_SIZE, COLOR_SAMPLE_SIZE};

/// What the gallery paints before the full image arrives.
#[derive(Debug, Clone, PartialEq)]
pub struct Placeholder {
    /// `#rrggbb`
    pub color: String,
    /// `data:image/jpeg;base64,...`
    pub blur_data_url: String,
}

/// Decodes the image at `path` and builds its placeholder.
pub fn generate_placeholder(path: &Path) -> Result<Placeholder> {
    let img = image::open(path).with_context(|| format!("Failed to open image: {:?}", path))?;
    let img = apply_exif_orientation(path, img)?;
    placeholder_from_image(&img)
}

pub fn placeholder_from_image(img: &DynamicImage) -> Result<Placeholder> {
    let sample = flatten_onto_white(&img.thumbnail(COLOR_SAMPLE_SIZE, COLOR_SAMPLE_SIZE));
    let color = dominant_color(&sample);

    let tiny = flatten_onto_white(&img.thumbnail(BLUR_SIZE, BLUR_SIZE));
    let mut jpeg = Vec::new();
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, BLUR_JPEG_QUALITY);
        encoder
            .encode_image(&tiny)
            .context("Failed to encode blur placeholder")?;
    }

    Ok(Placeholder {
        color,
        blur_data_url: format!("data:image/jpeg;base64,{}", STANDARD.encode(&jpeg)),
    })
}

/// Composites the image over a white background, dropping alpha.
fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let alpha = u32::from(a);
        let blend = |c: u8| ((u32::from(c) * alpha + 255 * (255 - alpha)) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}

/// Mean color of all pixels.
fn dominant_color(img: &RgbImage) -> String {
    let count = u64::from(img.width()) * u64::from(img.height());
    if count == 0 {
        return "#ffffff".to_string();
    }

    let mut sums = [0u64; 3];
    for pixel in img.pixels() {
        for (sum, channel) in sums.iter_mut().zip(pixel.0) {
            *sum += u64::from(channel);
        }
    }

    format!(
        "#{:02x}{:02x}{:02x}",
        sums[0] / count,
        sums[1] / count,
        sums[2] / count
    )
}

/// Rotates/flips according to the EXIF orientation tag; images without EXIF are returned as-is.
pub fn apply_exif_orientation(source_path: &Path, img: DynamicImage) -> Result<DynamicImage> {
    let file = match fs::File::open(source_path) {
        Ok(f) => f,
        Err(_) => return Ok(img),
    };

    let mut bufreader = std::io::BufReader::new(&file);
    let exif = match Reader::new().read_from_container(&mut bufreader) {
        Ok(e) => e,
        Err(_) => return Ok(img),
    };

    let orientation = exif
        .get_field(Tag::Orientation, In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(1);

    Ok(orient(img, orientation))
}

/// Maps an EXIF orientation value (1-8) to the transform that makes the image upright.
fn orient(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        // transpose
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        // transverse
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}
