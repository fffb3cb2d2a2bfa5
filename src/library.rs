use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

use crate::constants::{FEATURED_SUBDIR, IMAGES_URL_PREFIX, SUPPORTED_EXTENSIONS};

/// Which image directory a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageKind {
    #[default]
    All,
    Featured,
}

impl ImageKind {
    /// Anything other than `"featured"` selects the main gallery.
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("featured") => ImageKind::Featured,
            _ => ImageKind::All,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ImageKind::All => "all",
            ImageKind::Featured => "featured",
        }
    }

    pub fn url_for(&self, filename: &str) -> String {
        match self {
            ImageKind::All => format!("{}/{}", IMAGES_URL_PREFIX, filename),
            ImageKind::Featured => format!("{}/{}/{}", IMAGES_URL_PREFIX, FEATURED_SUBDIR, filename),
        }
    }
}

pub fn is_supported_image(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|s| s.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Keeps `[A-Za-z0-9._-]` and drops leading dots.
pub fn sanitize_filename(name: &str) -> Result<String> {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        bail!("Invalid filename: {:?}", name);
    }
    Ok(cleaned.to_string())
}

/// Accepts only names that sanitization would leave unchanged.
pub fn validate_existing_name(name: &str) -> Result<()> {
    match sanitize_filename(name) {
        Ok(clean) if clean == name => Ok(()),
        _ => bail!("Invalid filename: {:?}", name),
    }
}

/// The on-disk image directories (`images_dir` and `images_dir/featured`).
#[derive(Debug, Clone)]
pub struct ImageLibrary {
    root: PathBuf,
}

impl ImageLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dir(&self, kind: ImageKind) -> PathBuf {
        match kind {
            ImageKind::All => self.root.clone(),
            ImageKind::Featured => self.root.join(FEATURED_SUBDIR),
        }
    }

    pub fn path_of(&self, kind: ImageKind, filename: &str) -> PathBuf {
        self.dir(kind).join(filename)
    }

    /// Image filenames in `kind`'s directory, sorted. A missing directory lists as empty.
    pub fn list(&self, kind: ImageKind) -> Result<Vec<String>> {
        let dir = self.dir(kind);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e).with_context(|| format!("Reading {}", dir.display())),
        };

        let mut images: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|e| e.file_type().map_or(false, |ft| ft.is_file()))
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .filter(|name| !name.starts_with('.') && is_supported_image(name))
            .collect();
        images.sort();
        Ok(images)
    }

    pub fn contains(&self, kind: ImageKind, filename: &str) -> bool {
        validate_existing_name(filename).is_ok() && self.path_of(kind, filename).is_file()
    }

    /// Writes `bytes` under `filename`, replacing any existing file.
    pub fn save(&self, kind: ImageKind, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
        validate_existing_name(filename)?;
        let dir = self.dir(kind);
        std::fs::create_dir_all(&dir).with_context(|| format!("Creating {}", dir.display()))?;
        let path = dir.join(filename);
        std::fs::write(&path, bytes).with_context(|| format!("Writing {}", path.display()))?;
        Ok(path)
    }

    /// Returns whether a file was actually deleted.
    pub fn remove(&self, kind: ImageKind, filename: &str) -> Result<bool> {
        validate_existing_name(filename)?;
        let path = self.path_of(kind, filename);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Deleting {}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_unsafe_characters() {
        assert_eq!(sanitize_filename("my art (1).PNG").unwrap(), "myart1.PNG");
        assert_eq!(sanitize_filename("../../etc/passwd").unwrap(), "etcpasswd");
        assert_eq!(sanitize_filename(".hidden.png").unwrap(), "hidden.png");
        assert!(sanitize_filename("..").is_err());
        assert!(sanitize_filename("日本").is_err());
    }

    #[test]
    fn existing_names_must_already_be_clean() {
        assert!(validate_existing_name("sketch_01.jpg").is_ok());
        assert!(validate_existing_name("../sketch.jpg").is_err());
        assert!(validate_existing_name("a/b.jpg").is_err());
        assert!(validate_existing_name(".env").is_err());
    }

    #[test]
    fn kind_parsing_defaults_to_all() {
        assert_eq!(ImageKind::parse(Some("featured")), ImageKind::Featured);
        assert_eq!(ImageKind::parse(Some("all")), ImageKind::All);
        assert_eq!(ImageKind::parse(Some("whatever")), ImageKind::All);
        assert_eq!(ImageKind::parse(None), ImageKind::All);
        assert_eq!(ImageKind::Featured.url_for("a.png"), "/imgs/featured/a.png");
    }

    #[test]
    fn list_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let library = ImageLibrary::new(dir.path());
        for name in ["b.JPG", "a.png", "notes.txt", ".hidden.png", "c.webp"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("featured")).unwrap();
        std::fs::create_dir(dir.path().join("folder.png")).unwrap();

        assert_eq!(library.list(ImageKind::All).unwrap(), vec!["a.png", "b.JPG", "c.webp"]);
        assert!(library.list(ImageKind::Featured).unwrap().is_empty());
    }

    #[test]
    fn missing_directory_lists_empty() {
        let dir = tempfile::tempdir().unwrap();
        let library = ImageLibrary::new(dir.path().join("nope"));
        assert!(library.list(ImageKind::All).unwrap().is_empty());
    }

    #[test]
    fn save_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let library = ImageLibrary::new(dir.path().join("imgs"));

        let path = library.save(ImageKind::Featured, "f.gif", b"GIF89a").unwrap();
        assert!(path.ends_with("imgs/featured/f.gif"));
        assert_eq!(library.list(ImageKind::Featured).unwrap(), vec!["f.gif"]);
        assert!(library.contains(ImageKind::Featured, "f.gif"));

        assert!(library.remove(ImageKind::Featured, "f.gif").unwrap());
        assert!(!library.remove(ImageKind::Featured, "f.gif").unwrap());
        assert!(library.save(ImageKind::All, "../escape.png", b"x").is_err());
    }
}
