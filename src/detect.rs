use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::embedding::FaceSet;
use crate::error::Result as ScoreResult;

/// One face as reported by a detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedFace {
    pub embedding: Vec<f32>,
    /// x1, y1, x2, y2
    #[serde(default)]
    pub bbox: [f32; 4],
}

/// Face detection and embedding extraction. Implemented outside this crate.
pub trait FaceDetector {
    /// Detect every face in an encoded image. May return no faces.
    fn detect(&mut self, image: &[u8]) -> Result<Vec<DetectedFace>>;
}

impl FaceSet {
    /// Normalize detector output into a face set. Every detected face is
    /// kept, so `len()` is the detector's face count.
    pub fn from_detections(faces: &[DetectedFace]) -> ScoreResult<FaceSet> {
        let rows: Vec<&[f32]> = faces.iter().map(|f| f.embedding.as_slice()).collect();
        FaceSet::from_raw(&rows)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DetectionsFile {
    Faces(Vec<DetectedFace>),
    Vectors(Vec<Vec<f32>>),
}

/// Read detector output saved as JSON: a list of `{embedding, bbox}`
/// objects or a bare list of vectors.
pub fn load_detections(path: &Path) -> Result<Vec<DetectedFace>> {
    let raw = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let parsed: DetectionsFile =
        serde_json::from_slice(&raw).with_context(|| format!("parsing {}", path.display()))?;
    Ok(match parsed {
        DetectionsFile::Faces(faces) => faces,
        DetectionsFile::Vectors(vectors) => vectors
            .into_iter()
            .map(|embedding| DetectedFace {
                embedding,
                bbox: [0.0; 4],
            })
            .collect(),
    })
}
