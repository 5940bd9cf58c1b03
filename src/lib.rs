pub mod config;
pub mod context;
pub mod detect;
pub mod embedding;
pub mod error;
pub mod gallery;
pub mod pipeline;
pub mod reconcile;
pub mod scorer;
pub mod store;
pub mod trigger;

pub use context::ScoringContext;
pub use detect::{DetectedFace, FaceDetector};
pub use embedding::{Embedding, FaceSet};
pub use error::{Error, GalleryLoadError, StoreError};
pub use gallery::{Gallery, GalleryCollection};
pub use pipeline::{handle_upload, score_faces, Handled};
pub use reconcile::{Outcome, ReconcileReport, Reconciler};
pub use scorer::ScoreMap;
pub use store::{FileStore, MemoryStore, PhotoRecord, PhotoStore};
pub use trigger::UploadEvent;
