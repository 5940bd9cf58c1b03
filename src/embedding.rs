use log::warn;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use crate::error::{Error, Result};

/// L2-normalized face embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    pub vector: Array1<f32>,
}

impl Embedding {
    /// Normalizes `values` on entry. Returns `None` for an all-zero or
    /// non-finite vector, which has no direction to compare.
    pub fn new(values: Vec<f32>) -> Option<Self> {
        let mut vector = Array1::from_vec(values);
        let ok = normalize_row(vector.view_mut());
        ok.then_some(Self { vector })
    }

    pub fn dim(&self) -> usize {
        self.vector.len()
    }
}

/// Scale a row to unit length in place. False if the norm is zero or not finite.
pub(crate) fn normalize_row(mut row: ndarray::ArrayViewMut1<f32>) -> bool {
    // f64 so large finite rows do not overflow the sum of squares
    let norm = row
        .iter()
        .map(|&x| f64::from(x) * f64::from(x))
        .sum::<f64>()
        .sqrt();
    if !norm.is_finite() || norm == 0.0 {
        return false;
    }
    row.mapv_inplace(|x| (f64::from(x) / norm) as f32);
    true
}

/// Cosine similarity of two unit vectors.
pub fn match_embedding(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    // Both sides are unit length, so the dot product is the cosine.
    a.dot(&b).clamp(-1.0, 1.0)
}

/// The faces found in one photo, one row per face.
#[derive(Debug, Clone)]
pub struct FaceSet {
    vectors: Array2<f32>,
}

impl FaceSet {
    pub fn empty(dim: usize) -> Self {
        Self {
            vectors: Array2::zeros((0, dim)),
        }
    }

    /// All embeddings must share one dimensionality.
    pub fn from_embeddings(embeddings: &[Embedding]) -> Result<Self> {
        let Some(dim) = embeddings.first().map(Embedding::dim) else {
            return Ok(Self::empty(0));
        };
        if let Some(odd) = embeddings.iter().find(|e| e.dim() != dim) {
            return Err(Error::DimensionMismatch {
                against: "face set".to_string(),
                expected: dim,
                found: odd.dim(),
            });
        }
        let mut vectors = Array2::zeros((embeddings.len(), dim));
        for (mut row, e) in vectors.rows_mut().into_iter().zip(embeddings) {
            row.assign(&e.vector);
        }
        Ok(Self { vectors })
    }

    /// Build from raw detector embeddings, normalizing each row.
    ///
    /// A row that cannot be normalized (zero or non-finite) stays in the set
    /// as a zero row: the face still counts towards `N` but matches nothing.
    pub fn from_raw<R: AsRef<[f32]>>(rows: &[R]) -> Result<Self> {
        let Some(dim) = rows.first().map(|r| r.as_ref().len()) else {
            return Ok(Self::empty(0));
        };
        if let Some(odd) = rows.iter().find(|r| r.as_ref().len() != dim) {
            return Err(Error::DimensionMismatch {
                against: "face set".to_string(),
                expected: dim,
                found: odd.as_ref().len(),
            });
        }
        let mut vectors = Array2::zeros((rows.len(), dim));
        for (i, (mut row, raw)) in vectors.rows_mut().into_iter().zip(rows).enumerate() {
            row.assign(&ArrayView1::from(raw.as_ref()));
            if !normalize_row(row.view_mut()) {
                warn!("Face {} has a degenerate embedding; it will match nothing", i);
                row.fill(0.0);
            }
        }
        Ok(Self { vectors })
    }

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
