use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::Config;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Object-storage "new object" notification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadEvent {
    pub bucket: String,
    /// Object path within the bucket, e.g. `wedding-photos/abc.jpg`.
    pub name: String,
    /// Uploader-supplied metadata; `userName` carries the submitter.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Why an event was not scored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    WrongBucket(String),
    OutsidePrefix(String),
    NotAnImage(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::WrongBucket(b) => write!(f, "object in unwatched bucket {b}"),
            SkipReason::OutsidePrefix(p) => write!(f, "object outside watched prefix: {p}"),
            SkipReason::NotAnImage(p) => write!(f, "unsupported file type: {p}"),
        }
    }
}

impl UploadEvent {
    pub fn new(bucket: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            name: name.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_user_name(mut self, user_name: impl Into<String>) -> Self {
        self.metadata.insert("userName".to_string(), user_name.into());
        self
    }

    pub fn user_name(&self) -> Option<&str> {
        self.metadata
            .get("userName")
            .map(String::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// Base name of the object path; the record lookup key.
    pub fn file_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    pub fn public_url(&self, base: &str) -> String {
        format!("{}/{}/{}", base.trim_end_matches('/'), self.bucket, self.name)
    }

    /// Check the event against the configured bucket, prefix and file types.
    pub fn admit(&self, cfg: &Config) -> Result<(), SkipReason> {
        if let Some(bucket) = &cfg.bucket {
            if &self.bucket != bucket {
                return Err(SkipReason::WrongBucket(self.bucket.clone()));
            }
        }
        if let Some(prefix) = &cfg.path_prefix {
            if !self.name.starts_with(prefix.as_str()) {
                return Err(SkipReason::OutsidePrefix(self.name.clone()));
            }
        }
        if !is_supported_image(&self.name) {
            return Err(SkipReason::NotAnImage(self.name.clone()));
        }
        Ok(())
    }
}

/// Extension check only; the rest of the path is not inspected.
pub fn is_supported_image(path: &str) -> bool {
    path.rsplit_once('.').is_some_and(|(_, ext)| {
        IMAGE_EXTENSIONS
            .iter()
            .any(|allowed| ext.eq_ignore_ascii_case(allowed))
    })
}
