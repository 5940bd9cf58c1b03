use crate::config::Config;
use crate::error::Result;
use crate::gallery::{self, GalleryCollection};

/// Everything scoring needs, loaded once at startup and read-only after.
/// Share it across invocations behind an `Arc`.
#[derive(Debug, Clone)]
pub struct ScoringContext {
    pub galleries: GalleryCollection,
    pub config: Config,
}

impl ScoringContext {
    /// Validate the config and load galleries from `config.gallery_dir`.
    pub fn init(config: Config) -> Result<Self> {
        config.validate()?;
        let galleries = gallery::load(&config.gallery_dir, config.gallery_prefix.as_deref())?;
        Ok(Self { galleries, config })
    }

    /// Context over galleries that are already in memory.
    pub fn with_galleries(config: Config, galleries: GalleryCollection) -> Result<Self> {
        config.validate()?;
        Ok(Self { galleries, config })
    }

    pub fn alpha(&self) -> f32 {
        self.config.alpha
    }

    pub fn primary_gallery(&self) -> &str {
        &self.config.primary_gallery
    }
}
