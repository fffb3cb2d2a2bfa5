use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::constants::*;

#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub data_file: PathBuf,
    pub images_dir: PathBuf,
    pub admin_password: String,
    pub max_upload_mb: u64,
    pub backfill_on_start: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            data_file: PathBuf::from(DEFAULT_DATA_FILE),
            images_dir: PathBuf::from(DEFAULT_IMAGES_DIR),
            admin_password: String::new(),
            max_upload_mb: DEFAULT_MAX_UPLOAD_MB,
            backfill_on_start: true,
        }
    }
}

impl Settings {
    /// Loads settings from the default config path, writing a default file on first run,
    /// then applies environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();
        let mut settings = if config_path.exists() {
            Self::load_from(&config_path)?
        } else {
            let defaults = Settings::default();
            if let Err(e) = defaults.save_to(&config_path) {
                warn!("Could not write default config to {}: {:#}", config_path.display(), e);
            }
            defaults
        };
        settings.apply_env_overrides();
        Ok(settings)
    }

    pub fn load_from(config_path: &Path) -> Result<Self> {
        let file = File::open(config_path).context("Failed to open config file")?;
        let reader = BufReader::new(file);
        let mut config_map = HashMap::new();

        for line in reader.lines() {
            let line = line.context("Failed to read line from config")?;
            let line = line.trim();
            if line.starts_with('#') || line.is_empty() {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                config_map.insert(
                    key.trim().to_string(),
                    value.trim().trim_matches('"').to_string(),
                );
            }
        }

        Ok(Self::from_map(&config_map))
    }

    fn from_map(config_map: &HashMap<String, String>) -> Self {
        let mut settings = Settings::default();

        if let Some(host) = config_map.get("host").filter(|h| !h.is_empty()) {
            settings.host = host.clone();
        }
        if let Some(port) = config_map.get("port").and_then(|p| p.parse::<u16>().ok()) {
            settings.port = port;
        }
        if let Some(data_file) = config_map.get("data_file").filter(|p| !p.is_empty()) {
            settings.data_file = PathBuf::from(data_file);
        }
        if let Some(images_dir) = config_map.get("images_dir").filter(|p| !p.is_empty()) {
            settings.images_dir = PathBuf::from(images_dir);
        }
        if let Some(password) = config_map.get("admin_password") {
            settings.admin_password = password.clone();
        }
        if let Some(mb) = config_map.get("max_upload_mb").and_then(|v| v.parse::<u64>().ok()) {
            settings.max_upload_mb = mb;
        }
        if let Some(backfill) = config_map
            .get("backfill_on_start")
            .and_then(|v| v.parse::<bool>().ok())
        {
            settings.backfill_on_start = backfill;
        }

        settings
    }

    fn apply_env_overrides(&mut self) {
        if let Some(port) = std::env::var("PORTFOLIO_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
        {
            self.port = port;
        }
        if let Ok(password) = std::env::var("PORTFOLIO_ADMIN_PASSWORD") {
            self.admin_password = password;
        }
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context("Creating config directory")?;
        }

        let mut content = String::new();
        content.push_str("# Art Portfolio Configuration File\n");
        content.push_str(&format!("host = \"{}\"\n", self.host));
        content.push_str(&format!("port = {}\n", self.port));
        content.push_str(&format!("data_file = \"{}\"\n", self.data_file.display()));
        content.push_str(&format!("images_dir = \"{}\"\n", self.images_dir.display()));
        content.push_str("# Leave empty to disable admin authentication\n");
        content.push_str(&format!("admin_password = \"{}\"\n", self.admin_password));
        content.push_str(&format!("max_upload_mb = {}\n", self.max_upload_mb));
        content.push_str(&format!("backfill_on_start = {}\n", self.backfill_on_start));

        std::fs::write(config_path, content).context("Failed to write to config file")?;
        Ok(())
    }

    pub fn max_upload_bytes(&self) -> usize {
        usize::try_from(self.max_upload_mb.saturating_mul(1024 * 1024)).unwrap_or(usize::MAX)
    }

    pub fn auth_enabled(&self) -> bool {
        !self.admin_password.is_empty()
    }

    pub fn config_path() -> PathBuf {
        if let Ok(explicit) = std::env::var("PORTFOLIO_CONFIG") {
            return PathBuf::from(explicit);
        }

        let mut path = std::env::current_exe()
            .unwrap_or_default()
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();

        if path.ends_with("target/debug") || path.ends_with("target/release") {
            path.pop();
            path.pop();
        }
        path.push("portfolio.ini");
        path
    }
}
