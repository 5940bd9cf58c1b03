use anyhow::Context as _;
use log::info;

use crate::context::ScoringContext;
use crate::detect::{DetectedFace, FaceDetector};
use crate::embedding::FaceSet;
use crate::reconcile::{ReconcileReport, Reconciler, ScoredPhoto};
use crate::scorer;
use crate::store::PhotoStore;
use crate::trigger::{SkipReason, UploadEvent};

#[derive(Debug)]
pub enum Handled {
    Processed(ReconcileReport),
    Skipped(SkipReason),
}

/// Score detected faces for an uploaded photo and write the result.
pub fn score_faces<S: PhotoStore + ?Sized>(
    ctx: &ScoringContext,
    store: &S,
    event: &UploadEvent,
    faces: &[DetectedFace],
) -> crate::error::Result<Handled> {
    if let Err(reason) = event.admit(&ctx.config) {
        info!("Skipping {}/{}: {}", event.bucket, event.name, reason);
        return Ok(Handled::Skipped(reason));
    }

    let face_set = FaceSet::from_detections(faces)?;
    info!("Detected {} face(s) in {}", face_set.len(), event.name);

    let scores = scorer::score(&face_set, &ctx.galleries, ctx.alpha())?;
    let primary_score = scores
        .primary(ctx.primary_gallery())
        .map_or(0.0, |(_, score)| score);

    let photo_url = event.public_url(&ctx.config.public_url_base);
    let reconciler = Reconciler::new(store, ctx.config.default_user_name.as_str());
    let report = reconciler.reconcile(ScoredPhoto {
        file_name: event.file_name(),
        photo_url: &photo_url,
        user_name: event.user_name(),
        scores: &scores,
        primary_score,
        face_count: face_set.len(),
    })?;
    Ok(Handled::Processed(report))
}

/// Full upload handling: filter, detect, score, reconcile.
///
/// Detection runs only for admitted events.
pub fn handle_upload<D: FaceDetector + ?Sized, S: PhotoStore + ?Sized>(
    ctx: &ScoringContext,
    detector: &mut D,
    store: &S,
    event: &UploadEvent,
    image: &[u8],
) -> anyhow::Result<Handled> {
    if let Err(reason) = event.admit(&ctx.config) {
        info!("Skipping {}/{}: {}", event.bucket, event.name, reason);
        return Ok(Handled::Skipped(reason));
    }
    let faces = detector
        .detect(image)
        .with_context(|| format!("detecting faces in {}", event.name))?;
    let handled = score_faces(ctx, store, event, &faces)
        .with_context(|| format!("scoring {}", event.name))?;
    Ok(handled)
}
