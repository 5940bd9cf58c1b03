use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StoreError;

/// A scored photo as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoRecord {
    /// Lookup key: base name of the uploaded object.
    pub file_name: String,
    pub photo_url: String,
    pub user_name: String,
    pub score: f32,
    /// Keyed by gallery name.
    pub gallery_scores: BTreeMap<String, f32>,
    pub face_count: usize,
    pub processed: bool,
    /// Assigned by the store when the record is created.
    pub timestamp: DateTime<Utc>,
    /// Assigned by the store on every create or update.
    pub processing_timestamp: DateTime<Utc>,
}

impl PhotoRecord {
    /// Render as a document: camelCase fields plus one `score_<gallery>`
    /// field per gallery.
    pub fn to_document(&self) -> Value {
        let mut doc = Map::new();
        doc.insert("fileName".into(), Value::from(self.file_name.clone()));
        doc.insert("photoUrl".into(), Value::from(self.photo_url.clone()));
        doc.insert("userName".into(), Value::from(self.user_name.clone()));
        doc.insert("score".into(), Value::from(self.score));
        for (name, score) in &self.gallery_scores {
            doc.insert(format!("score_{name}"), Value::from(*score));
        }
        doc.insert("faceCount".into(), Value::from(self.face_count));
        doc.insert("processed".into(), Value::from(self.processed));
        doc.insert("timestamp".into(), Value::from(self.timestamp.to_rfc3339()));
        doc.insert(
            "processingTimestamp".into(),
            Value::from(self.processing_timestamp.to_rfc3339()),
        );
        Value::Object(doc)
    }
}

/// Fields supplied when creating a record. The store adds the timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPhoto {
    pub file_name: String,
    pub photo_url: String,
    pub user_name: String,
    pub score: f32,
    pub gallery_scores: BTreeMap<String, f32>,
    pub face_count: usize,
}

/// Fields overwritten on re-scoring. Everything else on the record is kept.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreUpdate {
    pub score: f32,
    pub gallery_scores: BTreeMap<String, f32>,
    pub face_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPhoto {
    pub id: String,
    /// Creation order within the collection.
    pub seq: u64,
    pub record: PhotoRecord,
}

/// A document collection of photo records.
///
/// Lookup and write are separate calls, so a caller that reads then writes
/// is not atomic against another caller doing the same.
pub trait PhotoStore {
    /// Records whose file name equals `file_name`, oldest first, at most `limit`.
    fn find_by_file_name(
        &self,
        file_name: &str,
        limit: usize,
    ) -> Result<Vec<StoredPhoto>, StoreError>;

    fn get(&self, id: &str) -> Result<Option<StoredPhoto>, StoreError>;

    fn create(&self, photo: NewPhoto) -> Result<StoredPhoto, StoreError>;

    fn update(&self, id: &str, update: ScoreUpdate) -> Result<StoredPhoto, StoreError>;

    fn count(&self) -> Result<usize, StoreError>;

    /// Highest scoring records first, at most `limit`. Ranks by the primary
    /// score, or by the named gallery's score; records without that gallery
    /// score come last. Ties keep creation order.
    fn top(&self, gallery: Option<&str>, limit: usize) -> Result<Vec<StoredPhoto>, StoreError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Collection {
    next_seq: u64,
    docs: Vec<StoredPhoto>,
}

impl Collection {
    fn find(&self, file_name: &str, limit: usize) -> Vec<StoredPhoto> {
        let mut hits: Vec<StoredPhoto> = self
            .docs
            .iter()
            .filter(|d| d.record.file_name == file_name)
            .cloned()
            .collect();
        hits.sort_by_key(|d| d.seq);
        hits.truncate(limit);
        hits
    }

    fn top(&self, gallery: Option<&str>, limit: usize) -> Vec<StoredPhoto> {
        let key = |d: &StoredPhoto| match gallery {
            None => d.record.score,
            Some(name) => d
                .record
                .gallery_scores
                .get(name)
                .copied()
                .unwrap_or(f32::NEG_INFINITY),
        };
        let mut ranked: Vec<StoredPhoto> = self.docs.clone();
        ranked.sort_by(|a, b| key(b).total_cmp(&key(a)).then(a.seq.cmp(&b.seq)));
        ranked.truncate(limit);
        ranked
    }

    fn get(&self, id: &str) -> Option<StoredPhoto> {
        self.docs.iter().find(|d| d.id == id).cloned()
    }

    fn create(&mut self, photo: NewPhoto) -> StoredPhoto {
        let now = Utc::now();
        let doc = StoredPhoto {
            id: uuid::Uuid::new_v4().to_string(),
            seq: self.next_seq,
            record: PhotoRecord {
                file_name: photo.file_name,
                photo_url: photo.photo_url,
                user_name: photo.user_name,
                score: photo.score,
                gallery_scores: photo.gallery_scores,
                face_count: photo.face_count,
                processed: true,
                timestamp: now,
                processing_timestamp: now,
            },
        };
        self.next_seq += 1;
        self.docs.push(doc.clone());
        doc
    }

    fn update(&mut self, id: &str, update: ScoreUpdate) -> Result<StoredPhoto, StoreError> {
        let doc = self
            .docs
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let record = &mut doc.record;
        record.score = update.score;
        // merge so scores for galleries no longer loaded survive
        record.gallery_scores.extend(update.gallery_scores);
        record.face_count = update.face_count;
        record.processed = true;
        record.processing_timestamp = Utc::now();
        Ok(doc.clone())
    }
}

/// Process-local store, for tests and for hosts that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Collection>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PhotoStore for MemoryStore {
    fn find_by_file_name(
        &self,
        file_name: &str,
        limit: usize,
    ) -> Result<Vec<StoredPhoto>, StoreError> {
        let inner = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.find(file_name, limit))
    }

    fn get(&self, id: &str) -> Result<Option<StoredPhoto>, StoreError> {
        let inner = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.get(id))
    }

    fn create(&self, photo: NewPhoto) -> Result<StoredPhoto, StoreError> {
        let mut inner = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.create(photo))
    }

    fn update(&self, id: &str, update: ScoreUpdate) -> Result<StoredPhoto, StoreError> {
        let mut inner = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        inner.update(id, update)
    }

    fn count(&self) -> Result<usize, StoreError> {
        let inner = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.docs.len())
    }

    fn top(&self, gallery: Option<&str>, limit: usize) -> Result<Vec<StoredPhoto>, StoreError> {
        let inner = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(inner.top(gallery, limit))
    }
}

/// Collection persisted as one postcard file, `<dir>/<collection>.bin`.
/// Every write rewrites the whole file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStore {
    pub fn open(dir: &Path, collection: &str) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            path: dir.join(format!("{collection}.bin")),
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Collection, StoreError> {
        if !self.path.exists() {
            return Ok(Collection::default());
        }
        let data = std::fs::read(&self.path)?;
        Ok(postcard::from_bytes(&data)?)
    }

    fn write(&self, collection: &Collection) -> Result<(), StoreError> {
        let data = postcard::to_allocvec(collection)?;
        let tmp = self.path.with_extension("bin.tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!("Wrote {} record(s) to {}", collection.docs.len(), self.path.display());
        Ok(())
    }

    fn modify<T>(
        &self,
        f: impl FnOnce(&mut Collection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut collection = self.read()?;
        let out = f(&mut collection)?;
        self.write(&collection)?;
        Ok(out)
    }
}

impl PhotoStore for FileStore {
    fn find_by_file_name(
        &self,
        file_name: &str,
        limit: usize,
    ) -> Result<Vec<StoredPhoto>, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(self.read()?.find(file_name, limit))
    }

    fn get(&self, id: &str) -> Result<Option<StoredPhoto>, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(self.read()?.get(id))
    }

    fn create(&self, photo: NewPhoto) -> Result<StoredPhoto, StoreError> {
        self.modify(|c| Ok(c.create(photo)))
    }

    fn update(&self, id: &str, update: ScoreUpdate) -> Result<StoredPhoto, StoreError> {
        self.modify(|c| c.update(id, update))
    }

    fn count(&self) -> Result<usize, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(self.read()?.docs.len())
    }

    fn top(&self, gallery: Option<&str>, limit: usize) -> Result<Vec<StoredPhoto>, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(self.read()?.top(gallery, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_photo(file_name: &str, score: f32) -> NewPhoto {
        NewPhoto {
            file_name: file_name.to_string(),
            photo_url: format!("https://example.test/{file_name}"),
            user_name: "anonymous".to_string(),
            score,
            gallery_scores: BTreeMap::from([("idol_vectors".to_string(), score)]),
            face_count: 1,
        }
    }

    #[test]
    fn memory_find_is_ordered_and_limited() {
        let store = MemoryStore::new();
        let first = store.create(new_photo("a.jpg", 0.1)).unwrap();
        store.create(new_photo("b.jpg", 0.2)).unwrap();
        store.create(new_photo("a.jpg", 0.3)).unwrap();

        let hits = store.find_by_file_name("a.jpg", 1).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, first.id);
        assert_eq!(store.find_by_file_name("a.jpg", 5).unwrap().len(), 2);
        assert!(store.find_by_file_name("c.jpg", 1).unwrap().is_empty());
    }

    #[test]
    fn update_keeps_unrelated_fields() {
        let store = MemoryStore::new();
        let mut photo = new_photo("a.jpg", 0.1);
        photo.user_name = "Hanako".to_string();
        let created = store.create(photo).unwrap();

        let updated = store
            .update(
                &created.id,
                ScoreUpdate {
                    score: 0.9,
                    gallery_scores: BTreeMap::from([("idol_vectors".to_string(), 0.9)]),
                    face_count: 3,
                },
            )
            .unwrap();
        assert_eq!(updated.record.user_name, "Hanako");
        assert_eq!(updated.record.photo_url, created.record.photo_url);
        assert_eq!(updated.record.timestamp, created.record.timestamp);
        assert!(updated.record.processing_timestamp >= created.record.processing_timestamp);
        assert_eq!(updated.record.score, 0.9);
        assert_eq!(updated.record.face_count, 3);
    }

    #[test]
    fn update_unknown_id_fails() {
        let store = MemoryStore::new();
        let err = store
            .update(
                "nope",
                ScoreUpdate {
                    score: 0.0,
                    gallery_scores: BTreeMap::new(),
                    face_count: 0,
                },
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn file_store_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let created = {
            let store = FileStore::open(dir.path(), "photos").unwrap();
            store.create(new_photo("a.jpg", 0.4)).unwrap()
        };
        let store = FileStore::open(dir.path(), "photos").unwrap();
        assert_eq!(store.count().unwrap(), 1);
        let got = store.get(&created.id).unwrap().unwrap();
        assert_eq!(got, created);
        assert!(store.path().ends_with("photos.bin"));
    }

    fn file_names(ranked: &[StoredPhoto]) -> Vec<&str> {
        ranked.iter().map(|d| d.record.file_name.as_str()).collect()
    }

    #[test]
    fn top_ranks_by_primary_score() {
        let store = MemoryStore::new();
        store.create(new_photo("low.jpg", 0.1)).unwrap();
        store.create(new_photo("high.jpg", 0.9)).unwrap();
        store.create(new_photo("tie_first.jpg", 0.5)).unwrap();
        store.create(new_photo("tie_second.jpg", 0.5)).unwrap();

        let ranked = store.top(None, 10).unwrap();
        assert_eq!(
            file_names(&ranked),
            vec!["high.jpg", "tie_first.jpg", "tie_second.jpg", "low.jpg"]
        );
        assert_eq!(file_names(&store.top(None, 2).unwrap()), vec!["high.jpg", "tie_first.jpg"]);
        assert!(store.top(None, 0).unwrap().is_empty());
    }

    #[test]
    fn top_ranks_by_gallery_with_missing_scores_last() {
        let store = MemoryStore::new();
        let mut a = new_photo("a.jpg", 0.9);
        a.gallery_scores = BTreeMap::from([("contest_vectors_A".to_string(), 0.2)]);
        let mut b = new_photo("b.jpg", 0.1);
        b.gallery_scores = BTreeMap::from([("contest_vectors_A".to_string(), 0.7)]);
        store.create(new_photo("c.jpg", 1.0)).unwrap();
        store.create(a).unwrap();
        store.create(b).unwrap();

        let ranked = store.top(Some("contest_vectors_A"), 10).unwrap();
        assert_eq!(file_names(&ranked), vec!["b.jpg", "a.jpg", "c.jpg"]);
        assert_eq!(file_names(&store.top(None, 1).unwrap()), vec!["c.jpg"]);
    }

    #[test]
    fn file_store_ranks_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileStore::open(dir.path(), "photos").unwrap();
            store.create(new_photo("a.jpg", 0.3)).unwrap();
            store.create(new_photo("b.jpg", 0.6)).unwrap();
        }
        let store = FileStore::open(dir.path(), "photos").unwrap();
        let ranked = store.top(Some("idol_vectors"), 1).unwrap();
        assert_eq!(file_names(&ranked), vec!["b.jpg"]);
    }

    #[test]
    fn document_has_per_gallery_fields() {
        let store = MemoryStore::new();
        let mut photo = new_photo("a.jpg", 0.5);
        photo.gallery_scores.insert("contest_vectors_A".to_string(), 0.25);
        let doc = store.create(photo).unwrap().record.to_document();
        assert_eq!(doc["fileName"], "a.jpg");
        assert_eq!(doc["score_idol_vectors"], 0.5);
        assert_eq!(doc["score_contest_vectors_A"], 0.25);
        assert_eq!(doc["faceCount"], 1);
        assert_eq!(doc["processed"], true);
        assert_eq!(doc["userName"], "anonymous");
    }
}
