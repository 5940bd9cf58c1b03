//! Create-or-update of the persisted record for a scored photo.
//!
//! Records are looked up by file name. An existing record has its score
//! fields overwritten; otherwise a new one is created. The lookup and the
//! write are two store calls, so two reconciliations of the same photo
//! running at once can both create a record.

use std::collections::BTreeMap;

use log::{info, warn};

use crate::error::Result;
use crate::scorer::ScoreMap;
use crate::store::{NewPhoto, PhotoRecord, PhotoStore, ScoreUpdate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Updated,
}

/// Everything known about one photo before it is written.
#[derive(Debug, Clone)]
pub struct ScoredPhoto<'a> {
    pub file_name: &'a str,
    pub photo_url: &'a str,
    pub user_name: Option<&'a str>,
    pub scores: &'a ScoreMap,
    pub primary_score: f32,
    pub face_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileReport {
    pub outcome: Outcome,
    pub id: String,
    pub record: PhotoRecord,
    pub scores: ScoreMap,
}

pub struct Reconciler<'s, S: ?Sized> {
    store: &'s S,
    default_user_name: String,
}

impl<'s, S: PhotoStore + ?Sized> Reconciler<'s, S> {
    pub fn new(store: &'s S, default_user_name: impl Into<String>) -> Self {
        Self {
            store,
            default_user_name: default_user_name.into(),
        }
    }

    pub fn reconcile(&self, photo: ScoredPhoto<'_>) -> Result<ReconcileReport> {
        let gallery_scores: BTreeMap<String, f32> = photo
            .scores
            .iter()
            .map(|(name, score)| (name.to_string(), score))
            .collect();

        // Ask for two so a duplicate is noticed; act on the oldest.
        let matches = self.store.find_by_file_name(photo.file_name, 2)?;
        if matches.len() > 1 {
            warn!(
                "Multiple records share file name {}; updating oldest ({})",
                photo.file_name, matches[0].id
            );
        }

        let (outcome, stored) = match matches.into_iter().next() {
            Some(existing) => {
                info!("Updating record {} for {}", existing.id, photo.file_name);
                let stored = self.store.update(
                    &existing.id,
                    ScoreUpdate {
                        score: photo.primary_score,
                        gallery_scores,
                        face_count: photo.face_count,
                    },
                )?;
                (Outcome::Updated, stored)
            }
            None => {
                let stored = self.store.create(NewPhoto {
                    file_name: photo.file_name.to_string(),
                    photo_url: photo.photo_url.to_string(),
                    user_name: photo
                        .user_name
                        .unwrap_or(self.default_user_name.as_str())
                        .to_string(),
                    score: photo.primary_score,
                    gallery_scores,
                    face_count: photo.face_count,
                })?;
                info!("Created record {} for {}", stored.id, photo.file_name);
                (Outcome::Created, stored)
            }
        };

        Ok(ReconcileReport {
            outcome,
            id: stored.id,
            record: stored.record,
            scores: photo.scores.clone(),
        })
    }
}
