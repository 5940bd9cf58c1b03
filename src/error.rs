use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Nothing usable to score against, or an invalid setting. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Embeddings that are compared disagree on dimensionality.
    #[error("{against} holds {expected}-d vectors but got {found}-d")]
    DimensionMismatch {
        against: String,
        expected: usize,
        found: usize,
    },

    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

/// A single gallery source that could not be turned into a gallery.
/// The loader logs and skips these; if nothing loads it reports
/// `Error::Configuration` instead.
#[derive(Debug, Error)]
pub enum GalleryLoadError {
    #[error("reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{} contains no vectors", .path.display())]
    Empty { path: PathBuf },

    #[error("{}: row {row} has {found} values, expected {expected}", .path.display())]
    Ragged {
        path: PathBuf,
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("{}: row {row} has zero or non-finite norm", .path.display())]
    ZeroNorm { path: PathBuf, row: usize },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io: {0}")]
    Io(#[from] std::io::Error),

    #[error("store codec: {0}")]
    Codec(#[from] postcard::Error),

    #[error("no record with id {0}")]
    NotFound(String),

    #[error("store lock poisoned")]
    Poisoned,
}
