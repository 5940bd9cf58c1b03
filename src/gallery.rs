//! Reference galleries: named sets of unit-length face embeddings.
//!
//! Galleries are read once from a directory of `*.json` files and never
//! change afterwards. A file is either a bare array of vectors or an object
//! with a `vectors` field; other fields (per-vector provenance and the like)
//! are ignored. Every row is normalized on load, so similarity against a
//! gallery is a plain dot product whether or not the file was normalized.

use std::path::{Path, PathBuf};

use log::{info, warn};
use ndarray::{Array2, ArrayView2};
use serde::Deserialize;

use crate::embedding::normalize_row;
use crate::error::{Error, GalleryLoadError, Result};

/// On-disk shape of a gallery file. Resolved into [`Gallery`] at load time.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GallerySource {
    Bare(Vec<Vec<f32>>),
    Tagged { vectors: Vec<Vec<f32>> },
}

impl GallerySource {
    fn into_rows(self) -> Vec<Vec<f32>> {
        match self {
            GallerySource::Bare(rows) => rows,
            GallerySource::Tagged { vectors } => vectors,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Gallery {
    name: String,
    vectors: Array2<f32>,
}

impl Gallery {
    /// Build a gallery from raw rows, normalizing each one.
    /// `origin` only labels errors.
    pub fn from_rows(
        name: impl Into<String>,
        rows: Vec<Vec<f32>>,
        origin: &Path,
    ) -> std::result::Result<Self, GalleryLoadError> {
        let Some(dim) = rows.first().map(Vec::len).filter(|d| *d > 0) else {
            return Err(GalleryLoadError::Empty {
                path: origin.to_path_buf(),
            });
        };
        let mut vectors = Array2::zeros((rows.len(), dim));
        for (i, (mut dst, src)) in vectors.rows_mut().into_iter().zip(&rows).enumerate() {
            if src.len() != dim {
                return Err(GalleryLoadError::Ragged {
                    path: origin.to_path_buf(),
                    row: i,
                    expected: dim,
                    found: src.len(),
                });
            }
            dst.assign(&ndarray::ArrayView1::from(src.as_slice()));
            if !normalize_row(dst) {
                return Err(GalleryLoadError::ZeroNorm {
                    path: origin.to_path_buf(),
                    row: i,
                });
            }
        }
        Ok(Self {
            name: name.into(),
            vectors,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of reference vectors (M).
    pub fn len(&self) -> usize {
        self.vectors.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dim(&self) -> usize {
        self.vectors.ncols()
    }

    pub fn view(&self) -> ArrayView2<'_, f32> {
        self.vectors.view()
    }
}

/// All galleries known to the process, ordered by file name.
///
/// The order is part of the contract: when the primary gallery is absent the
/// first gallery here supplies the overall score.
#[derive(Debug, Clone, PartialEq)]
pub struct GalleryCollection {
    galleries: Vec<Gallery>,
}

impl GalleryCollection {
    /// Galleries are sorted by name and must be non-empty with unique names.
    pub fn new(mut galleries: Vec<Gallery>) -> Result<Self> {
        if galleries.is_empty() {
            return Err(Error::Configuration("no galleries to score against".to_string()));
        }
        galleries.sort_by(|a, b| a.name.cmp(&b.name));
        if let Some(pair) = galleries.windows(2).find(|w| w[0].name == w[1].name) {
            return Err(Error::Configuration(format!(
                "duplicate gallery name '{}'",
                pair[0].name
            )));
        }
        Ok(Self { galleries })
    }

    pub fn get(&self, name: &str) -> Option<&Gallery> {
        self.galleries.iter().find(|g| g.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Gallery> {
        self.galleries.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.galleries.iter().map(|g| g.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.galleries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.galleries.is_empty()
    }
}

/// Gallery name for a source file: its base name without the extension.
pub fn gallery_name(path: &Path) -> Option<String> {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
}

/// Read and parse one gallery file.
pub fn load_file(path: &Path) -> std::result::Result<Gallery, GalleryLoadError> {
    let raw = std::fs::read(path).map_err(|source| GalleryLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let parsed: GallerySource =
        serde_json::from_slice(&raw).map_err(|source| GalleryLoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    // file_stem is never empty for a discovered *.json file
    let name = gallery_name(path).unwrap_or_default();
    Gallery::from_rows(name, parsed.into_rows(), path)
}

fn discover(dir: &Path, prefix: Option<&str>) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        Error::Configuration(format!("reading gallery dir {}: {}", dir.display(), e))
    })?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        })
        .filter(|p| match prefix {
            Some(prefix) => p
                .file_name()
                .is_some_and(|n| n.to_string_lossy().starts_with(prefix)),
            None => true,
        })
        .collect();
    paths.sort();
    Ok(paths)
}

/// Load every gallery file in `dir`.
///
/// Malformed files are logged and skipped. Ends in
/// [`Error::Configuration`] if nothing loads.
pub fn load(dir: &Path, prefix: Option<&str>) -> Result<GalleryCollection> {
    let paths = discover(dir, prefix)?;
    let mut galleries = Vec::with_capacity(paths.len());
    for path in &paths {
        match load_file(path) {
            Ok(gallery) => {
                info!(
                    "Loaded gallery '{}': {} x {}",
                    gallery.name(),
                    gallery.len(),
                    gallery.dim()
                );
                galleries.push(gallery);
            }
            Err(e) => warn!("Skipping gallery: {}", e),
        }
    }
    if galleries.is_empty() {
        return Err(Error::Configuration(format!(
            "no loadable galleries in {} ({} candidate file(s))",
            dir.display(),
            paths.len()
        )));
    }
    info!("Loaded {} galleries from {}", galleries.len(), dir.display());
    GalleryCollection::new(galleries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(g: &Gallery, row: usize) -> f32 {
        let r = g.view().row(row).to_owned();
        r.dot(&r).sqrt()
    }

    #[test]
    fn bare_and_tagged_shapes_parse() {
        let bare: GallerySource = serde_json::from_str("[[1.0, 0.0], [0.0, 2.0]]").unwrap();
        assert_eq!(bare.into_rows().len(), 2);

        let tagged: GallerySource = serde_json::from_str(
            r#"{"vectors": [[1.0, 0.0]], "face_info": [{"vector_index": 0, "bbox": [1, 2, 3, 4]}]}"#,
        )
        .unwrap();
        assert_eq!(tagged.into_rows(), vec![vec![1.0, 0.0]]);
    }

    #[test]
    fn rows_are_normalized() {
        let g = Gallery::from_rows(
            "g",
            vec![vec![3.0, 4.0], vec![0.0, 0.5], vec![-2.0, 0.0]],
            Path::new("g.json"),
        )
        .unwrap();
        for row in 0..g.len() {
            assert!((norm(&g, row) - 1.0).abs() < 1e-5);
        }
        assert!((g.view()[[0, 0]] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn ragged_rows_fail() {
        let err = Gallery::from_rows("g", vec![vec![1.0, 0.0], vec![1.0]], Path::new("g.json"))
            .unwrap_err();
        assert!(matches!(err, GalleryLoadError::Ragged { row: 1, .. }));
    }

    #[test]
    fn empty_and_zero_rows_fail() {
        assert!(matches!(
            Gallery::from_rows("g", vec![], Path::new("g.json")),
            Err(GalleryLoadError::Empty { .. })
        ));
        assert!(matches!(
            Gallery::from_rows("g", vec![vec![1.0, 0.0], vec![0.0, 0.0]], Path::new("g.json")),
            Err(GalleryLoadError::ZeroNorm { row: 1, .. })
        ));
    }

    #[test]
    fn name_strips_extension() {
        assert_eq!(
            gallery_name(Path::new("/srv/target_vectors/idol_vectors.json")).as_deref(),
            Some("idol_vectors")
        );
        assert_eq!(
            gallery_name(Path::new("contest_vectors_A.json")).as_deref(),
            Some("contest_vectors_A")
        );
    }

    #[test]
    fn collection_sorted_and_unique() {
        let a = Gallery::from_rows("b", vec![vec![1.0]], Path::new("b.json")).unwrap();
        let b = Gallery::from_rows("a", vec![vec![1.0]], Path::new("a.json")).unwrap();
        let c = GalleryCollection::new(vec![a.clone(), b]).unwrap();
        assert_eq!(c.names().collect::<Vec<_>>(), vec!["a", "b"]);

        assert!(matches!(
            GalleryCollection::new(vec![a.clone(), a]),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            GalleryCollection::new(vec![]),
            Err(Error::Configuration(_))
        ));
    }
}
