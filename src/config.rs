use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Error;

pub static CONFIG_PATH: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("PHOTOSCORE_CONFIG_PATH").unwrap_or("/usr/local/etc/photoscore/config.toml"))
});

pub static STORE_PREFIX: Lazy<&'static Path> = Lazy::new(|| {
    Path::new(option_env!("PHOTOSCORE_STORE_PREFIX").unwrap_or("/var/lib/photoscore"))
});

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Exponent of the face-count divisor, in (0, 1].
    pub alpha: f32,
    /// Gallery whose score becomes the record's overall score.
    pub primary_gallery: String,
    pub gallery_dir: PathBuf,
    /// Only gallery files whose name starts with this are loaded.
    pub gallery_prefix: Option<String>,
    pub store_dir: PathBuf,
    pub collection: String,
    /// Uploads from any other bucket are ignored.
    pub bucket: Option<String>,
    /// Uploads outside this object prefix are ignored.
    pub path_prefix: Option<String>,
    pub public_url_base: String,
    pub default_user_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            alpha: 0.8,
            primary_gallery: "idol_vectors".to_string(),
            gallery_dir: PathBuf::from("target_vectors"),
            gallery_prefix: None,
            store_dir: STORE_PREFIX.to_path_buf(),
            collection: "photos".to_string(),
            bucket: None,
            path_prefix: None,
            public_url_base: "https://storage.googleapis.com".to_string(),
            default_user_name: "anonymous".to_string(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> crate::error::Result<()> {
        if !self.alpha.is_finite() || self.alpha <= 0.0 || self.alpha > 1.0 {
            return Err(Error::Configuration(format!(
                "alpha must lie in (0, 1], got {}",
                self.alpha
            )));
        }
        if self.primary_gallery.is_empty() {
            return Err(Error::Configuration(
                "primary_gallery must not be empty".to_string(),
            ));
        }
        if self.collection.is_empty() {
            return Err(Error::Configuration(
                "collection must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = path.unwrap_or(&CONFIG_PATH);
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config at {}", path.display()))?;
    let cfg: Config =
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validating config {}", path.display()))?;
    Ok(cfg)
}

pub fn save_config(cfg: &Config, path: Option<&Path>) -> Result<()> {
    let path = path.unwrap_or(&CONFIG_PATH);
    let data = toml::to_string_pretty(cfg)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}
