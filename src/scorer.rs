//! Face-count-normalized similarity scoring.
//!
//! For each gallery, every detected face takes its best match among the
//! gallery's reference vectors. The per-face best matches are summed and
//! divided by `N^alpha`, where `N` is the number of faces. With `alpha < 1`
//! a photo with several matching faces still beats a single clear match,
//! but not in proportion to the size of the crowd.

use log::debug;
use ndarray::{ArrayView2, Axis};

use crate::embedding::FaceSet;
use crate::error::{Error, Result};
use crate::gallery::{Gallery, GalleryCollection};

/// Per-gallery scores for one photo, in gallery collection order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScoreMap {
    entries: Vec<(String, f32)>,
}

impl ScoreMap {
    pub fn get(&self, name: &str) -> Option<f32> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, score)| *score)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.entries.iter().map(|(n, s)| (n.as_str(), *s))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Overall score: the `primary` gallery if scored, else the first entry.
    pub fn primary(&self, primary: &str) -> Option<(&str, f32)> {
        self.entries
            .iter()
            .find(|(n, _)| n == primary)
            .or_else(|| self.entries.first())
            .map(|(n, s)| (n.as_str(), *s))
    }
}

impl FromIterator<(String, f32)> for ScoreMap {
    fn from_iter<I: IntoIterator<Item = (String, f32)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Sum of per-face best matches. `gallery` is M x D, `faces` is N x D.
pub fn best_match_total(gallery: ArrayView2<f32>, faces: ArrayView2<f32>) -> f32 {
    if faces.nrows() == 0 || gallery.nrows() == 0 {
        return 0.0;
    }
    // M x N cosine matrix; rows of both sides are unit length.
    let sims = gallery.dot(&faces.t());
    sims.fold_axis(Axis(0), f32::NEG_INFINITY, |&best, &s| best.max(s))
        .iter()
        .map(|best| best.clamp(-1.0, 1.0))
        .sum()
}

/// Score one face set against one gallery.
pub fn score_gallery(faces: &FaceSet, gallery: &Gallery, alpha: f32) -> Result<f32> {
    if faces.is_empty() {
        return Ok(0.0);
    }
    if faces.dim() != gallery.dim() {
        return Err(Error::DimensionMismatch {
            against: format!("gallery '{}'", gallery.name()),
            expected: gallery.dim(),
            found: faces.dim(),
        });
    }
    let total = best_match_total(gallery.view(), faces.view());
    Ok(total / (faces.len() as f32).powf(alpha))
}

/// Score a face set against every gallery. All or nothing: a dimension
/// mismatch on any gallery fails the whole call.
pub fn score(faces: &FaceSet, galleries: &GalleryCollection, alpha: f32) -> Result<ScoreMap> {
    galleries
        .iter()
        .map(|gallery| -> Result<(String, f32)> {
            let score = score_gallery(faces, gallery, alpha)?;
            debug!("Score against '{}': {:.4}", gallery.name(), score);
            Ok((gallery.name().to_string(), score))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::Embedding;
    use std::path::Path;

    fn gallery(name: &str, rows: Vec<Vec<f32>>) -> Gallery {
        Gallery::from_rows(name, rows, Path::new("test.json")).unwrap()
    }

    fn faces(rows: Vec<Vec<f32>>) -> FaceSet {
        let embeddings: Vec<Embedding> = rows
            .into_iter()
            .map(|r| Embedding::new(r).unwrap())
            .collect();
        FaceSet::from_embeddings(&embeddings).unwrap()
    }

    #[test]
    fn single_face_best_match() {
        // A . B = 0.5
        let a = vec![1.0, 0.0];
        let b = vec![0.5, 0.75f32.sqrt()];
        let g = gallery("idol", vec![a.clone(), b]);
        let s = score_gallery(&faces(vec![a]), &g, 0.8).unwrap();
        assert!((s - 1.0).abs() < 1e-5);
    }

    #[test]
    fn two_faces_sublinear_divisor() {
        let a = vec![1.0, 0.0, 0.0];
        // 0.3 against a, orthogonal-ish otherwise
        let c = vec![0.3, (1.0f32 - 0.09).sqrt(), 0.0];
        let g = gallery("idol", vec![a.clone()]);
        let s = score_gallery(&faces(vec![a, c]), &g, 0.8).unwrap();
        let expected = 1.3 / 2f32.powf(0.8);
        assert!((s - expected).abs() < 1e-5);
        assert!((s - 0.7466).abs() < 1e-3);
    }

    #[test]
    fn empty_face_set_scores_zero() {
        let g = gallery("idol", vec![vec![1.0, 0.0]]);
        assert_eq!(score_gallery(&FaceSet::empty(2), &g, 0.8).unwrap(), 0.0);
        // no dimension check without faces
        assert_eq!(score_gallery(&FaceSet::empty(7), &g, 0.8).unwrap(), 0.0);
    }

    #[test]
    fn dimension_mismatch_is_an_error() {
        let g = gallery("idol", vec![vec![1.0, 0.0]]);
        let err = score_gallery(&faces(vec![vec![1.0, 0.0, 0.0]]), &g, 0.8).unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: 2,
                found: 3,
                ..
            }
        ));
    }

    #[test]
    fn alpha_bounds() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        let c = vec![0.6, 0.8];
        let g = gallery("g", vec![a.clone()]);
        let fs = faces(vec![a, b, c]);
        // per-face maxima: 1.0, 0.0, 0.6
        let sum = score_gallery(&fs, &g, 0.0).unwrap();
        let mean = score_gallery(&fs, &g, 1.0).unwrap();
        assert!((sum - 1.6).abs() < 1e-5);
        assert!((mean - 1.6 / 3.0).abs() < 1e-5);
    }

    #[test]
    fn primary_prefers_named_gallery() {
        let map: ScoreMap = vec![("a".to_string(), 0.1), ("idol_vectors".to_string(), 0.9)]
            .into_iter()
            .collect();
        assert_eq!(map.primary("idol_vectors"), Some(("idol_vectors", 0.9)));
        assert_eq!(map.primary("missing"), Some(("a", 0.1)));
        assert_eq!(ScoreMap::default().primary("idol_vectors"), None);
    }

    #[test]
    fn score_follows_collection_order() {
        let galleries = GalleryCollection::new(vec![
            gallery("zeta", vec![vec![0.0, 1.0]]),
            gallery("alpha", vec![vec![1.0, 0.0]]),
        ])
        .unwrap();
        let map = score(&faces(vec![vec![1.0, 0.0]]), &galleries, 0.8).unwrap();
        let names: Vec<&str> = map.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert_eq!(map.primary("idol_vectors"), Some(("alpha", 1.0)));
    }

    #[test]
    fn no_faces_zero_for_every_gallery() {
        let galleries = GalleryCollection::new(vec![
            gallery("a", vec![vec![1.0, 0.0]]),
            gallery("b", vec![vec![0.0, 1.0]]),
        ])
        .unwrap();
        let map = score(&FaceSet::empty(2), &galleries, 0.8).unwrap();
        assert_eq!(map.len(), 2);
        assert!(map.iter().all(|(_, s)| s == 0.0));
    }
}
